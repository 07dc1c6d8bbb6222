/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use crate::algorithms::AlgorithmResult;
use crate::error::Error;
use crate::readablebytestreamcontroller::ReadableByteStreamController;
use crate::readablestreamdefaultcontroller::ReadableStreamDefaultController;

/// <https://streams.spec.whatwg.org/#underlying-source-api>
///
/// Every algorithm is optional; the provided implementations do nothing.
pub trait UnderlyingSource<T> {
    /// <https://streams.spec.whatwg.org/#dom-underlyingsource-start>
    fn start(&mut self, _controller: &Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-underlyingsource-pull>
    fn pull(&mut self, _controller: &Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-underlyingsource-cancel>
    fn cancel(&mut self, _reason: Error) -> AlgorithmResult {
        Ok(None)
    }
}

/// <https://streams.spec.whatwg.org/#underlying-source-api>, for sources of
/// `type: "bytes"`.
pub trait UnderlyingByteSource {
    fn start(&mut self, _controller: &Rc<ReadableByteStreamController>) -> AlgorithmResult {
        Ok(None)
    }

    fn pull(&mut self, _controller: &Rc<ReadableByteStreamController>) -> AlgorithmResult {
        Ok(None)
    }

    fn cancel(&mut self, _reason: Error) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-underlyingsource-autoallocatechunksize>
    fn auto_allocate_chunk_size(&self) -> Option<u64> {
        None
    }
}
