/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use crate::queuingstrategy::{QueuingStrategy, QueuingStrategyInit};

/// <https://streams.spec.whatwg.org/#countqueuingstrategy>
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CountQueuingStrategy {
    high_water_mark: f64,
}

impl CountQueuingStrategy {
    /// <https://streams.spec.whatwg.org/#cqs-constructor>
    pub fn new(init: QueuingStrategyInit) -> CountQueuingStrategy {
        CountQueuingStrategy {
            high_water_mark: init.high_water_mark,
        }
    }

    /// <https://streams.spec.whatwg.org/#cqs-high-water-mark>
    pub fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    /// <https://streams.spec.whatwg.org/#count-queuing-strategy-size-function>
    pub fn size<T>(_chunk: &T) -> f64 {
        // Return 1.
        1.
    }

    pub fn into_strategy<T: 'static>(self) -> QueuingStrategy<T> {
        QueuingStrategy {
            high_water_mark: Some(self.high_water_mark),
            size: Some(Rc::new(|chunk: &T| Ok(CountQueuingStrategy::size(chunk)))),
        }
    }
}

impl<T: 'static> From<CountQueuingStrategy> for QueuingStrategy<T> {
    fn from(strategy: CountQueuingStrategy) -> QueuingStrategy<T> {
        strategy.into_strategy()
    }
}
