/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use crate::algorithms::AlgorithmResult;
use crate::error::Error;
use crate::writablestreamdefaultcontroller::WritableStreamDefaultController;

/// <https://streams.spec.whatwg.org/#underlying-sink-api>
///
/// Every algorithm is optional; the provided implementations do nothing.
pub trait UnderlyingSink<T> {
    /// <https://streams.spec.whatwg.org/#dom-underlyingsink-start>
    fn start(&mut self, _controller: &Rc<WritableStreamDefaultController<T>>) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-underlyingsink-write>
    fn write(
        &mut self,
        _chunk: T,
        _controller: &Rc<WritableStreamDefaultController<T>>,
    ) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-underlyingsink-close>
    fn close(&mut self) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-underlyingsink-abort>
    fn abort(&mut self, _reason: Error) -> AlgorithmResult {
        Ok(None)
    }
}
