/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use crate::queuingstrategy::{ByteLength, QueuingStrategy, QueuingStrategyInit};

/// <https://streams.spec.whatwg.org/#blqs-class>
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ByteLengthQueuingStrategy {
    high_water_mark: f64,
}

impl ByteLengthQueuingStrategy {
    /// <https://streams.spec.whatwg.org/#blqs-constructor>
    pub fn new(init: QueuingStrategyInit) -> ByteLengthQueuingStrategy {
        ByteLengthQueuingStrategy {
            high_water_mark: init.high_water_mark,
        }
    }

    /// <https://streams.spec.whatwg.org/#blqs-high-water-mark>
    pub fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    /// <https://streams.spec.whatwg.org/#byte-length-queuing-strategy-size-function>
    pub fn size<T: ByteLength>(chunk: &T) -> f64 {
        // Return ? GetV(chunk, "byteLength").
        chunk.byte_length() as f64
    }

    pub fn into_strategy<T: ByteLength + 'static>(self) -> QueuingStrategy<T> {
        QueuingStrategy {
            high_water_mark: Some(self.high_water_mark),
            size: Some(Rc::new(|chunk: &T| Ok(ByteLengthQueuingStrategy::size(chunk)))),
        }
    }
}

impl<T: ByteLength + 'static> From<ByteLengthQueuingStrategy> for QueuingStrategy<T> {
    fn from(strategy: ByteLengthQueuingStrategy) -> QueuingStrategy<T> {
        strategy.into_strategy()
    }
}
