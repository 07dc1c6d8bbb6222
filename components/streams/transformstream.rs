/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;

use crate::algorithms::AlgorithmResult;
use crate::error::{Error, Fallible};
use crate::promise::Promise;
use crate::queuingstrategy::{QueuingStrategy, extract_high_water_mark, extract_size_algorithm};
use crate::readablestream::ReadableStream;
use crate::readablestreamdefaultcontroller::ReadableStreamDefaultController;
use crate::transformer::{IdentityTransformer, Transformer};
use crate::transformstreamdefaultcontroller::TransformStreamDefaultController;
use crate::underlyingsink::UnderlyingSink;
use crate::underlyingsource::UnderlyingSource;
use crate::writablestream::WritableStream;
use crate::writablestreamdefaultcontroller::WritableStreamDefaultController;

/// <https://streams.spec.whatwg.org/#ts-class>
pub struct TransformStream<I, O> {
    /// <https://streams.spec.whatwg.org/#transformstream-backpressure>
    backpressure: Cell<Option<bool>>,

    /// <https://streams.spec.whatwg.org/#transformstream-backpressurechangepromise>
    backpressure_change_promise: RefCell<Option<Promise<()>>>,

    /// <https://streams.spec.whatwg.org/#transformstream-controller>
    controller: RefCell<Option<Rc<TransformStreamDefaultController<I, O>>>>,

    /// <https://streams.spec.whatwg.org/#transformstream-readable>
    readable: RefCell<Option<Rc<ReadableStream<O>>>>,

    /// The controller of `readable`, captured when its start algorithm runs.
    readable_controller: RefCell<Option<Rc<ReadableStreamDefaultController<O>>>>,

    /// <https://streams.spec.whatwg.org/#transformstream-writable>
    writable: RefCell<Option<Rc<WritableStream<I>>>>,
}

impl<I: Clone + 'static, O: Clone + 'static> TransformStream<I, O> {
    /// <https://streams.spec.whatwg.org/#ts-constructor>
    pub fn new(
        transformer: impl Transformer<I, O> + 'static,
        writable_strategy: QueuingStrategy<I>,
        readable_strategy: QueuingStrategy<O>,
    ) -> Fallible<Rc<TransformStream<I, O>>> {
        // Let readableHighWaterMark be ? ExtractHighWaterMark(readableStrategy, 0).
        let readable_high_water_mark = extract_high_water_mark(&readable_strategy, 0.)?;

        // Let readableSizeAlgorithm be ! ExtractSizeAlgorithm(readableStrategy).
        let readable_size_algorithm = extract_size_algorithm(&readable_strategy);

        // Let writableHighWaterMark be ? ExtractHighWaterMark(writableStrategy, 1).
        let writable_high_water_mark = extract_high_water_mark(&writable_strategy, 1.)?;

        // Let writableSizeAlgorithm be ! ExtractSizeAlgorithm(writableStrategy).
        let writable_size_algorithm = extract_size_algorithm(&writable_strategy);

        // Let startPromise be a new promise.
        let start_promise = Promise::new();

        let stream = Rc::new(TransformStream {
            backpressure: Cell::new(None),
            backpressure_change_promise: RefCell::new(None),
            controller: RefCell::new(None),
            readable: RefCell::new(None),
            readable_controller: RefCell::new(None),
            writable: RefCell::new(None),
        });

        // Perform ! InitializeTransformStream(this, startPromise, writableHighWaterMark,
        // writableSizeAlgorithm, readableHighWaterMark, readableSizeAlgorithm).
        // Let startAlgorithm be an algorithm that returns startPromise.

        // Set stream.[[writable]] to ! CreateWritableStream(startAlgorithm, writeAlgorithm,
        // closeAlgorithm, abortAlgorithm, writableHighWaterMark, writableSizeAlgorithm).
        let writable = WritableStream::create(
            Box::new(TransformStreamDefaultSink {
                stream: stream.clone(),
                start_promise: start_promise.clone(),
            }),
            writable_high_water_mark,
            writable_size_algorithm,
        )?;
        *stream.writable.borrow_mut() = Some(writable);

        // Set stream.[[readable]] to ! CreateReadableStream(startAlgorithm, pullAlgorithm,
        // cancelAlgorithm, readableHighWaterMark, readableSizeAlgorithm).
        let readable = ReadableStream::create(
            Box::new(TransformStreamDefaultSource {
                stream: stream.clone(),
                start_promise: start_promise.clone(),
            }),
            readable_high_water_mark,
            readable_size_algorithm,
        )?;
        *stream.readable.borrow_mut() = Some(readable);

        // Set stream.[[backpressure]] and stream.[[backpressureChangePromise]] to undefined.
        // Perform ! TransformStreamSetBackpressure(stream, true).
        stream.set_backpressure(true);

        // Set stream.[[controller]] to undefined.
        // Perform ? SetUpTransformStreamDefaultControllerFromTransformer(this, transformer, transformerDict).
        let controller = TransformStreamDefaultController::set_up(&stream, Box::new(transformer));

        // If transformerDict["start"] exists, then resolve startPromise with the result of invoking
        // transformerDict["start"] with argument list « this.[[controller]] » and callback this value transformer.
        // Otherwise, resolve startPromise with undefined.
        match controller.start()? {
            Some(promise) => start_promise.resolve_with_promise(&promise),
            None => start_promise.resolve_native(()),
        }

        Ok(stream)
    }

    pub(crate) fn set_default_controller(&self, controller: Rc<TransformStreamDefaultController<I, O>>) {
        *self.controller.borrow_mut() = Some(controller);
    }

    pub(crate) fn get_controller(&self) -> Rc<TransformStreamDefaultController<I, O>> {
        let Some(controller) = self.controller.borrow().clone() else {
            unreachable!("Transform stream should have a controller.");
        };
        controller
    }

    /// <https://streams.spec.whatwg.org/#ts-readable>
    pub fn readable(&self) -> Rc<ReadableStream<O>> {
        let Some(readable) = self.readable.borrow().clone() else {
            unreachable!("Transform stream should have a readable side.");
        };
        readable
    }

    /// <https://streams.spec.whatwg.org/#ts-writable>
    pub fn writable(&self) -> Rc<WritableStream<I>> {
        let Some(writable) = self.writable.borrow().clone() else {
            unreachable!("Transform stream should have a writable side.");
        };
        writable
    }

    pub(crate) fn readable_controller(&self) -> Rc<ReadableStreamDefaultController<O>> {
        let Some(controller) = self.readable_controller.borrow().clone() else {
            unreachable!("The readable side of a transform stream should have a controller.");
        };
        controller
    }

    fn writable_controller(&self) -> Rc<WritableStreamDefaultController<I>> {
        self.writable().get_controller()
    }

    pub(crate) fn get_backpressure(&self) -> Option<bool> {
        self.backpressure.get()
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-set-backpressure>
    pub(crate) fn set_backpressure(&self, backpressure: bool) {
        // Assert: stream.[[backpressure]] is not backpressure.
        assert_ne!(self.backpressure.get(), Some(backpressure));

        // If stream.[[backpressureChangePromise]] is not undefined,
        // resolve stream.[[backpressureChangePromise]] with undefined.
        let change_promise = self.backpressure_change_promise.borrow_mut().take();
        if let Some(promise) = change_promise {
            promise.resolve_native(());
        }

        // Set stream.[[backpressureChangePromise]] to a new promise.
        *self.backpressure_change_promise.borrow_mut() = Some(Promise::new());

        // Set stream.[[backpressure]] to backpressure.
        self.backpressure.set(Some(backpressure));
    }

    fn backpressure_change_promise(&self) -> Promise<()> {
        let Some(promise) = self.backpressure_change_promise.borrow().clone() else {
            unreachable!("Backpressure change promise should be set.");
        };
        promise
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-error>
    pub(crate) fn error(&self, error: Error) {
        debug!("Transform stream errored: {error}");

        // Perform ! ReadableStreamDefaultControllerError(stream.[[readable]].[[controller]], e).
        self.readable_controller().perform_error(error.clone());

        // Perform ! TransformStreamErrorWritableAndUnblockWrite(stream, e).
        self.error_writable_and_unblock_write(error);
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-error-writable-and-unblock-write>
    pub(crate) fn error_writable_and_unblock_write(&self, error: Error) {
        // Perform ! TransformStreamDefaultControllerClearAlgorithms(stream.[[controller]]).
        self.get_controller().clear_algorithms();

        // Perform ! WritableStreamDefaultControllerErrorIfNeeded(stream.[[writable]].[[controller]], e).
        self.writable_controller().error_if_needed(error);

        // Perform ! TransformStreamUnblockWrite(stream).
        self.unblock_write();
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-unblock-write>
    fn unblock_write(&self) {
        // If stream.[[backpressure]] is true, perform ! TransformStreamSetBackpressure(stream, false).
        if self.backpressure.get() == Some(true) {
            self.set_backpressure(false);
        }
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-default-sink-write-algorithm>
    fn sink_write(self: &Rc<Self>, chunk: I) -> Promise<()> {
        // Assert: stream.[[writable]].[[state]] is "writable".
        assert!(self.writable().is_writable());

        // Let controller be stream.[[controller]].
        let controller = self.get_controller();

        // If stream.[[backpressure]] is true,
        if self.backpressure.get() == Some(true) {
            // Let backpressureChangePromise be stream.[[backpressureChangePromise]].
            // Assert: backpressureChangePromise is not undefined.
            let backpressure_change_promise = self.backpressure_change_promise();

            // Return the result of reacting to backpressureChangePromise with the following fulfillment steps:
            let result = Promise::new();
            let fulfilled = result.clone();
            let rejected = result.clone();
            let stream = self.clone();
            backpressure_change_promise.append_native_handler(
                move |()| {
                    // Let writable be stream.[[writable]].
                    let writable = stream.writable();

                    // Let state be writable.[[state]].
                    // If state is "erroring", throw writable.[[storedError]].
                    if writable.is_erroring() {
                        fulfilled.reject_error(writable.get_stored_error());
                        return;
                    }

                    // Assert: state is "writable".
                    assert!(writable.is_writable());

                    // Return ! TransformStreamDefaultControllerPerformTransform(controller, chunk).
                    fulfilled.resolve_with_promise(&controller.perform_transform(chunk));
                },
                move |error| rejected.reject_error(error),
            );
            return result;
        }

        // Return ! TransformStreamDefaultControllerPerformTransform(controller, chunk).
        controller.perform_transform(chunk)
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-default-sink-abort-algorithm>
    fn sink_abort(&self, reason: Error) -> Promise<()> {
        // Let controller be stream.[[controller]].
        let controller = self.get_controller();

        // If controller.[[finishPromise]] is not undefined, return controller.[[finishPromise]].
        if let Some(finish_promise) = controller.finish_promise() {
            return finish_promise;
        }

        // Let readable be stream.[[readable]].
        let readable = self.readable();
        let readable_controller = self.readable_controller();

        // Let controller.[[finishPromise]] be a new promise.
        let finish_promise = controller.create_finish_promise();

        // Let cancelPromise be the result of performing controller.[[cancelAlgorithm]], passing reason.
        let cancel_promise = controller.cancel_algorithm(reason.clone());

        // Perform ! TransformStreamDefaultControllerClearAlgorithms(controller).
        controller.clear_algorithms();

        // React to cancelPromise:
        let fulfilled = finish_promise.clone();
        let rejected = finish_promise.clone();
        let rejection_readable_controller = readable_controller.clone();
        cancel_promise.append_native_handler(
            // If cancelPromise was fulfilled, then:
            move |()| {
                // If readable.[[state]] is "errored", reject controller.[[finishPromise]] with readable.[[storedError]].
                if readable.is_errored() {
                    fulfilled.reject_error(readable.get_stored_error());
                } else {
                    // Otherwise:
                    // Perform ! ReadableStreamDefaultControllerError(readable.[[controller]], reason).
                    readable_controller.perform_error(reason);

                    // Resolve controller.[[finishPromise]] with undefined.
                    fulfilled.resolve_native(());
                }
            },
            // If cancelPromise was rejected with reason r, then:
            move |error| {
                // Perform ! ReadableStreamDefaultControllerError(readable.[[controller]], r).
                rejection_readable_controller.perform_error(error.clone());

                // Reject controller.[[finishPromise]] with r.
                rejected.reject_error(error);
            },
        );

        // Return controller.[[finishPromise]].
        finish_promise
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-default-sink-close-algorithm>
    fn sink_close(&self) -> Promise<()> {
        // Let controller be stream.[[controller]].
        let controller = self.get_controller();

        // If controller.[[finishPromise]] is not undefined, return controller.[[finishPromise]].
        if let Some(finish_promise) = controller.finish_promise() {
            return finish_promise;
        }

        // Let readable be stream.[[readable]].
        let readable = self.readable();
        let readable_controller = self.readable_controller();

        // Let controller.[[finishPromise]] be a new promise.
        let finish_promise = controller.create_finish_promise();

        // Let flushPromise be the result of performing controller.[[flushAlgorithm]].
        let flush_promise = controller.flush_algorithm();

        // Perform ! TransformStreamDefaultControllerClearAlgorithms(controller).
        controller.clear_algorithms();

        // React to flushPromise:
        let fulfilled = finish_promise.clone();
        let rejected = finish_promise.clone();
        let rejection_readable_controller = readable_controller.clone();
        flush_promise.append_native_handler(
            // If flushPromise was fulfilled, then:
            move |()| {
                // If readable.[[state]] is "errored", reject controller.[[finishPromise]] with readable.[[storedError]].
                if readable.is_errored() {
                    fulfilled.reject_error(readable.get_stored_error());
                } else {
                    // Otherwise:
                    // Perform ! ReadableStreamDefaultControllerClose(readable.[[controller]]).
                    readable_controller.perform_close();

                    // Resolve controller.[[finishPromise]] with undefined.
                    fulfilled.resolve_native(());
                }
            },
            // If flushPromise was rejected with reason r, then:
            move |error| {
                // Perform ! ReadableStreamDefaultControllerError(readable.[[controller]], r).
                rejection_readable_controller.perform_error(error.clone());

                // Reject controller.[[finishPromise]] with r.
                rejected.reject_error(error);
            },
        );

        // Return controller.[[finishPromise]].
        finish_promise
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-default-source-pull>
    fn source_pull(&self) -> Promise<()> {
        // Assert: stream.[[backpressure]] is true.
        assert_eq!(self.backpressure.get(), Some(true));

        // Assert: stream.[[backpressureChangePromise]] is not undefined.
        assert!(self.backpressure_change_promise.borrow().is_some());

        // Perform ! TransformStreamSetBackpressure(stream, false).
        self.set_backpressure(false);

        // Return stream.[[backpressureChangePromise]].
        self.backpressure_change_promise()
    }

    /// <https://streams.spec.whatwg.org/#transform-stream-default-source-cancel>
    fn source_cancel(self: &Rc<Self>, reason: Error) -> Promise<()> {
        // Let controller be stream.[[controller]].
        let controller = self.get_controller();

        // If controller.[[finishPromise]] is not undefined, return controller.[[finishPromise]].
        if let Some(finish_promise) = controller.finish_promise() {
            return finish_promise;
        }

        // Let writable be stream.[[writable]].
        let writable = self.writable();

        // Let controller.[[finishPromise]] be a new promise.
        let finish_promise = controller.create_finish_promise();

        // Let cancelPromise be the result of performing controller.[[cancelAlgorithm]], passing reason.
        let cancel_promise = controller.cancel_algorithm(reason.clone());

        // Perform ! TransformStreamDefaultControllerClearAlgorithms(controller).
        controller.clear_algorithms();

        // React to cancelPromise:
        let fulfilled = finish_promise.clone();
        let rejected = finish_promise.clone();
        let fulfillment_stream = self.clone();
        let rejection_stream = self.clone();
        cancel_promise.append_native_handler(
            // If cancelPromise was fulfilled, then:
            move |()| {
                // If writable.[[state]] is "errored", reject controller.[[finishPromise]] with writable.[[storedError]].
                if writable.is_errored() {
                    fulfilled.reject_error(writable.get_stored_error());
                } else {
                    // Otherwise:
                    // Perform ! WritableStreamDefaultControllerErrorIfNeeded(writable.[[controller]], reason).
                    writable.get_controller().error_if_needed(reason);

                    // Perform ! TransformStreamUnblockWrite(stream).
                    fulfillment_stream.unblock_write();

                    // Resolve controller.[[finishPromise]] with undefined.
                    fulfilled.resolve_native(());
                }
            },
            // If cancelPromise was rejected with reason r, then:
            move |error| {
                // Perform ! WritableStreamDefaultControllerErrorIfNeeded(writable.[[controller]], r).
                rejection_stream.writable_controller().error_if_needed(error.clone());

                // Perform ! TransformStreamUnblockWrite(stream).
                rejection_stream.unblock_write();

                // Reject controller.[[finishPromise]] with r.
                rejected.reject_error(error);
            },
        );

        // Return controller.[[finishPromise]].
        finish_promise
    }
}

impl<T: Clone + 'static> TransformStream<T, T> {
    /// A transform stream whose readable side yields every chunk written to its
    /// writable side unchanged.
    pub fn new_identity(
        writable_strategy: QueuingStrategy<T>,
        readable_strategy: QueuingStrategy<T>,
    ) -> Fallible<Rc<TransformStream<T, T>>> {
        TransformStream::new(IdentityTransformer, writable_strategy, readable_strategy)
    }
}

/// The writable side's algorithms, created in
/// <https://streams.spec.whatwg.org/#initialize-transform-stream>
struct TransformStreamDefaultSink<I, O> {
    stream: Rc<TransformStream<I, O>>,
    start_promise: Promise<()>,
}

impl<I: Clone + 'static, O: Clone + 'static> UnderlyingSink<I> for TransformStreamDefaultSink<I, O> {
    fn start(&mut self, _controller: &Rc<WritableStreamDefaultController<I>>) -> AlgorithmResult {
        // Let startAlgorithm be an algorithm that returns startPromise.
        Ok(Some(self.start_promise.clone()))
    }

    fn write(
        &mut self,
        chunk: I,
        _controller: &Rc<WritableStreamDefaultController<I>>,
    ) -> AlgorithmResult {
        // Return ! TransformStreamDefaultSinkWriteAlgorithm(stream, chunk).
        Ok(Some(self.stream.sink_write(chunk)))
    }

    fn close(&mut self) -> AlgorithmResult {
        // Return ! TransformStreamDefaultSinkCloseAlgorithm(stream).
        Ok(Some(self.stream.sink_close()))
    }

    fn abort(&mut self, reason: Error) -> AlgorithmResult {
        // Return ! TransformStreamDefaultSinkAbortAlgorithm(stream, reason).
        Ok(Some(self.stream.sink_abort(reason)))
    }
}

/// The readable side's algorithms, created in
/// <https://streams.spec.whatwg.org/#initialize-transform-stream>
struct TransformStreamDefaultSource<I, O> {
    stream: Rc<TransformStream<I, O>>,
    start_promise: Promise<()>,
}

impl<I: Clone + 'static, O: Clone + 'static> UnderlyingSource<O>
    for TransformStreamDefaultSource<I, O>
{
    fn start(&mut self, controller: &Rc<ReadableStreamDefaultController<O>>) -> AlgorithmResult {
        *self.stream.readable_controller.borrow_mut() = Some(controller.clone());

        // Let startAlgorithm be an algorithm that returns startPromise.
        Ok(Some(self.start_promise.clone()))
    }

    fn pull(&mut self, _controller: &Rc<ReadableStreamDefaultController<O>>) -> AlgorithmResult {
        // Return ! TransformStreamDefaultSourcePullAlgorithm(stream).
        Ok(Some(self.stream.source_pull()))
    }

    fn cancel(&mut self, reason: Error) -> AlgorithmResult {
        // Return ! TransformStreamDefaultSourceCancelAlgorithm(stream, reason).
        Ok(Some(self.stream.source_cancel(reason)))
    }
}
