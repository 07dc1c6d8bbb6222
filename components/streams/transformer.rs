/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use crate::algorithms::AlgorithmResult;
use crate::error::Error;
use crate::transformstreamdefaultcontroller::TransformStreamDefaultController;

/// <https://streams.spec.whatwg.org/#transformer-api>
pub trait Transformer<I, O> {
    /// <https://streams.spec.whatwg.org/#dom-transformer-start>
    fn start(&mut self, _controller: &Rc<TransformStreamDefaultController<I, O>>) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-transformer-transform>
    fn transform(
        &mut self,
        chunk: I,
        controller: &Rc<TransformStreamDefaultController<I, O>>,
    ) -> AlgorithmResult;

    /// <https://streams.spec.whatwg.org/#dom-transformer-flush>
    fn flush(&mut self, _controller: &Rc<TransformStreamDefaultController<I, O>>) -> AlgorithmResult {
        Ok(None)
    }

    /// <https://streams.spec.whatwg.org/#dom-transformer-cancel>
    fn cancel(&mut self, _reason: Error) -> AlgorithmResult {
        Ok(None)
    }
}

/// The transformer used when none is given: every chunk written to the writable side
/// is enqueued unchanged on the readable side.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTransformer;

impl<T: Clone + 'static> Transformer<T, T> for IdentityTransformer {
    /// <https://streams.spec.whatwg.org/#set-up-transform-stream-default-controller-from-transformer>
    fn transform(
        &mut self,
        chunk: T,
        controller: &Rc<TransformStreamDefaultController<T, T>>,
    ) -> AlgorithmResult {
        // Let result be TransformStreamDefaultControllerEnqueue(controller, chunk).
        // If result is an abrupt completion, return a promise rejected with result.[[Value]].
        controller.enqueue(chunk)?;

        // Otherwise, return a promise resolved with undefined.
        Ok(None)
    }
}
