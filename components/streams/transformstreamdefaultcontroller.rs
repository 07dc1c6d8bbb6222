/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::algorithms::{AlgorithmContainer, AlgorithmResult};
use crate::error::{Error, ErrorResult};
use crate::promise::Promise;
use crate::transformer::Transformer;
use crate::transformstream::TransformStream;

/// <https://streams.spec.whatwg.org/#transformstreamdefaultcontroller>
pub struct TransformStreamDefaultController<I, O> {
    /// The transformer implements these internal slots:
    ///
    /// <https://streams.spec.whatwg.org/#transformstreamdefaultcontroller-transformalgorithm>
    /// <https://streams.spec.whatwg.org/#transformstreamdefaultcontroller-flushalgorithm>
    /// <https://streams.spec.whatwg.org/#transformstreamdefaultcontroller-cancelalgorithm>
    transformer: AlgorithmContainer<dyn Transformer<I, O>>,

    /// <https://streams.spec.whatwg.org/#transformstreamdefaultcontroller-finishpromise>
    finish_promise: RefCell<Option<Promise<()>>>,

    /// <https://streams.spec.whatwg.org/#transformstreamdefaultcontroller-stream>
    stream: Weak<TransformStream<I, O>>,
}

impl<I: Clone + 'static, O: Clone + 'static> TransformStreamDefaultController<I, O> {
    /// <https://streams.spec.whatwg.org/#set-up-transform-stream-default-controller>
    pub(crate) fn set_up(
        stream: &Rc<TransformStream<I, O>>,
        transformer: Box<dyn Transformer<I, O>>,
    ) -> Rc<TransformStreamDefaultController<I, O>> {
        // Set controller.[[stream]] to stream.
        // Set controller.[[transformAlgorithm]] to transformAlgorithm.
        // Set controller.[[flushAlgorithm]] to flushAlgorithm.
        // Set controller.[[cancelAlgorithm]] to cancelAlgorithm.
        let controller = Rc::new(TransformStreamDefaultController {
            transformer: AlgorithmContainer::new(transformer),
            finish_promise: RefCell::new(None),
            stream: Rc::downgrade(stream),
        });

        // Set stream.[[controller]] to controller.
        stream.set_default_controller(controller.clone());

        controller
    }

    fn stream(&self) -> Option<Rc<TransformStream<I, O>>> {
        self.stream.upgrade()
    }

    /// Invoke the transformer's start method, as the last step of
    /// <https://streams.spec.whatwg.org/#ts-constructor>
    pub(crate) fn start(self: &Rc<Self>) -> AlgorithmResult {
        self.transformer
            .call(|transformer| transformer.start(self))
            .unwrap_or(Ok(None))
    }

    pub(crate) fn finish_promise(&self) -> Option<Promise<()>> {
        self.finish_promise.borrow().clone()
    }

    pub(crate) fn create_finish_promise(&self) -> Promise<()> {
        let promise = Promise::new();
        *self.finish_promise.borrow_mut() = Some(promise.clone());
        promise
    }

    pub(crate) fn cancel_algorithm(&self, reason: Error) -> Promise<()> {
        self.transformer
            .call_promise_or_defer(|transformer| transformer.cancel(reason))
    }

    pub(crate) fn flush_algorithm(self: &Rc<Self>) -> Promise<()> {
        self.transformer
            .call_promise(|transformer| transformer.flush(self))
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-default-controller-clear-algorithms>
    pub(crate) fn clear_algorithms(&self) {
        // Set controller.[[transformAlgorithm]] to undefined.
        // Set controller.[[flushAlgorithm]] to undefined.
        // Set controller.[[cancelAlgorithm]] to undefined.
        self.transformer.clear();
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-default-controller-perform-transform>
    pub(crate) fn perform_transform(self: &Rc<Self>, chunk: I) -> Promise<()> {
        // Let transformPromise be the result of performing controller.[[transformAlgorithm]], passing chunk.
        let transform_promise = self
            .transformer
            .call_promise(|transformer| transformer.transform(chunk, self));

        // Return the result of reacting to transformPromise with the following rejection steps given the argument r:
        let controller = self.clone();
        transform_promise.then(Ok, move |error| {
            // Perform ! TransformStreamError(controller.[[stream]], r).
            if let Some(stream) = controller.stream() {
                stream.error(error.clone());
            }

            // Throw r.
            Err(error)
        })
    }

    /// <https://streams.spec.whatwg.org/#ts-default-controller-desired-size>
    pub fn desired_size(&self) -> Option<f64> {
        // Let readableController be this.[[stream]].[[readable]].[[controller]].
        let stream = self.stream()?;

        // Return ! ReadableStreamDefaultControllerGetDesiredSize(readableController).
        stream.readable_controller().get_desired_size()
    }

    /// <https://streams.spec.whatwg.org/#ts-default-controller-enqueue>
    /// <https://streams.spec.whatwg.org/#transform-stream-default-controller-enqueue>
    pub fn enqueue(&self, chunk: O) -> ErrorResult {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return Err(Error::Type("The transform stream is gone".into()));
        };

        // Let readableController be stream.[[readable]].[[controller]].
        let readable_controller = stream.readable_controller();

        // If ! ReadableStreamDefaultControllerCanCloseOrEnqueue(readableController) is false,
        // throw a TypeError exception.
        if !readable_controller.can_close_or_enqueue() {
            return Err(Error::Type(
                "The readable side cannot be enqueued to".into(),
            ));
        }

        // Let enqueueResult be ReadableStreamDefaultControllerEnqueue(readableController, chunk).
        // If enqueueResult is an abrupt completion,
        if let Err(error) = readable_controller.perform_enqueue(chunk) {
            // Perform ! TransformStreamErrorWritableAndUnblockWrite(stream, enqueueResult.[[Value]]).
            stream.error_writable_and_unblock_write(error);

            // Throw stream.[[readable]].[[storedError]].
            return Err(stream.readable().get_stored_error());
        }

        // Let backpressure be ! ReadableStreamDefaultControllerHasBackpressure(readableController).
        let backpressure = readable_controller.has_backpressure();

        // If backpressure is not stream.[[backpressure]],
        if stream.get_backpressure() != Some(backpressure) {
            // Assert: backpressure is true.
            assert!(backpressure);

            // Perform ! TransformStreamSetBackpressure(stream, true).
            stream.set_backpressure(true);
        }
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#ts-default-controller-error>
    pub fn error(&self, error: Error) {
        // Perform ! TransformStreamDefaultControllerError(this, e).
        // Perform ! TransformStreamError(controller.[[stream]], e).
        if let Some(stream) = self.stream() {
            stream.error(error);
        }
    }

    /// <https://streams.spec.whatwg.org/#ts-default-controller-terminate>
    /// <https://streams.spec.whatwg.org/#transform-stream-default-controller-terminate>
    pub fn terminate(&self) {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // Let readableController be stream.[[readable]].[[controller]].
        // Perform ! ReadableStreamDefaultControllerClose(readableController).
        stream.readable_controller().perform_close();

        // Let error be a TypeError exception indicating that the stream has been terminated.
        let error = Error::Type("The transform stream has been terminated".into());

        // Perform ! TransformStreamErrorWritableAndUnblockWrite(stream, error).
        stream.error_writable_and_unblock_write(error);
    }
}
