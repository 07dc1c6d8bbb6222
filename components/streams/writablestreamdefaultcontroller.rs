/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::abortcontroller::AbortController;
use crate::abortsignal::AbortSignal;
use crate::algorithms::AlgorithmContainer;
use crate::error::{Error, Fallible};
use crate::promise::Promise;
use crate::queuewithsizes::QueueWithSizes;
use crate::queuingstrategy::QueuingStrategySize;
use crate::underlyingsink::UnderlyingSink;
use crate::writablestream::WritableStream;

/// An entry of the controller's queue: a chunk, or the close sentinel.
/// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-queue>
#[derive(Clone, Debug)]
enum WriteQueueEntry<T> {
    Chunk(T),
    Close,
}

/// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller>
pub struct WritableStreamDefaultController<T> {
    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-abortcontroller>
    abort_controller: AbortController,

    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-queue>
    queue: RefCell<QueueWithSizes<WriteQueueEntry<T>>>,

    /// The underlying sink implements these internal slots:
    ///
    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-writealgorithm>
    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-closealgorithm>
    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-abortalgorithm>
    underlying_sink: AlgorithmContainer<dyn UnderlyingSink<T>>,

    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-stream>
    stream: Weak<WritableStream<T>>,

    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-strategyhwm>
    strategy_hwm: f64,

    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-strategysizealgorithm>
    strategy_size: RefCell<Option<QueuingStrategySize<T>>>,

    /// <https://streams.spec.whatwg.org/#writablestreamdefaultcontroller-started>
    started: Cell<bool>,
}

impl<T: Clone + 'static> WritableStreamDefaultController<T> {
    /// <https://streams.spec.whatwg.org/#set-up-writable-stream-default-controller>
    pub(crate) fn set_up(
        stream: &Rc<WritableStream<T>>,
        underlying_sink: Box<dyn UnderlyingSink<T>>,
        high_water_mark: f64,
        size_algorithm: QueuingStrategySize<T>,
    ) -> Fallible<Rc<WritableStreamDefaultController<T>>> {
        // Assert: stream implements WritableStream.
        // Assert: stream.[[controller]] is undefined.
        stream.assert_no_controller();

        // Set controller.[[stream]] to stream.
        // Perform ! ResetQueue(controller).
        // Set controller.[[abortController]] to a new AbortController.
        // Set controller.[[started]] to false.
        // Set controller.[[strategySizeAlgorithm]] to sizeAlgorithm.
        // Set controller.[[strategyHWM]] to highWaterMark.
        // Set controller.[[writeAlgorithm]] to writeAlgorithm.
        // Set controller.[[closeAlgorithm]] to closeAlgorithm.
        // Set controller.[[abortAlgorithm]] to abortAlgorithm.
        let controller = Rc::new(WritableStreamDefaultController {
            abort_controller: AbortController::new(),
            queue: RefCell::new(QueueWithSizes::new()),
            underlying_sink: AlgorithmContainer::new(underlying_sink),
            stream: Rc::downgrade(stream),
            strategy_hwm: high_water_mark,
            strategy_size: RefCell::new(Some(size_algorithm)),
            started: Cell::new(false),
        });

        // Set stream.[[controller]] to controller.
        stream.set_default_controller(controller.clone());

        // Let backpressure be ! WritableStreamDefaultControllerGetBackpressure(controller).
        let backpressure = controller.get_backpressure();

        // Perform ! WritableStreamUpdateBackpressure(stream, backpressure).
        stream.update_backpressure(backpressure);

        // Let startResult be the result of performing startAlgorithm. (This may throw an exception.)
        let start_result = controller
            .underlying_sink
            .call(|sink| sink.start(&controller))
            .unwrap_or(Ok(None))?;

        // Let startPromise be a promise resolved with startResult.
        let start_promise = start_result.unwrap_or_else(Promise::resolved);

        let fulfillment_controller = controller.clone();
        let rejection_controller = controller.clone();
        start_promise.append_native_handler(
            // Upon fulfillment of startPromise,
            move |()| {
                let Some(stream) = fulfillment_controller.stream() else {
                    return;
                };

                // Assert: stream.[[state]] is "writable" or "erroring".
                assert!(stream.is_writable() || stream.is_erroring());

                // Set controller.[[started]] to true.
                fulfillment_controller.started.set(true);

                // Perform ! WritableStreamDefaultControllerAdvanceQueueIfNeeded(controller).
                fulfillment_controller.advance_queue_if_needed();
            },
            // Upon rejection of startPromise with reason r,
            move |error| {
                let Some(stream) = rejection_controller.stream() else {
                    return;
                };

                // Assert: stream.[[state]] is "writable" or "erroring".
                assert!(stream.is_writable() || stream.is_erroring());

                // Set controller.[[started]] to true.
                rejection_controller.started.set(true);

                // Perform ! WritableStreamDealWithRejection(stream, r).
                stream.deal_with_rejection(error);
            },
        );

        Ok(controller)
    }

    fn stream(&self) -> Option<Rc<WritableStream<T>>> {
        self.stream.upgrade()
    }

    pub(crate) fn started(&self) -> bool {
        self.started.get()
    }

    /// Signal abort on controller.[[abortController]], as the first step of
    /// <https://streams.spec.whatwg.org/#writable-stream-abort>
    pub(crate) fn signal_abort(&self, reason: Error) {
        self.abort_controller.abort(Some(reason));
    }

    /// <https://streams.spec.whatwg.org/#ws-default-controller-private-abort>
    pub(crate) fn abort_steps(&self, reason: Error) -> Promise<()> {
        // Let result be the result of performing this.[[abortAlgorithm]], passing reason.
        let result = self.underlying_sink.call_promise(|sink| sink.abort(reason));

        // Perform ! WritableStreamDefaultControllerClearAlgorithms(this).
        self.clear_algorithms();

        // Return result.
        result
    }

    /// <https://streams.spec.whatwg.org/#ws-default-controller-private-error>
    pub(crate) fn perform_error_steps(&self) {
        // Perform ! ResetQueue(this).
        self.queue.borrow_mut().reset();
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-advance-queue-if-needed>
    fn advance_queue_if_needed(self: &Rc<Self>) {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // If controller.[[started]] is false, return.
        if !self.started.get() {
            return;
        }

        // If stream.[[inFlightWriteRequest]] is not undefined, return.
        if stream.has_in_flight_write_request() {
            return;
        }

        // Let state be stream.[[state]].
        // Assert: state is not "closed" or "errored".
        assert!(!(stream.is_closed() || stream.is_errored()));

        // If state is "erroring",
        if stream.is_erroring() {
            // Perform ! WritableStreamFinishErroring(stream).
            stream.finish_erroring();

            // Return.
            return;
        }

        // If controller.[[queue]] is empty, return.
        // Let value be ! PeekQueueValue(controller).
        let value = self.queue.borrow().peek_queue_value().cloned();
        match value {
            None => {},
            // If value is the close sentinel, perform ! WritableStreamDefaultControllerProcessClose(controller).
            Some(WriteQueueEntry::Close) => self.process_close(&stream),
            // Otherwise, perform ! WritableStreamDefaultControllerProcessWrite(controller, value).
            Some(WriteQueueEntry::Chunk(chunk)) => self.process_write(&stream, chunk),
        }
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-clear-algorithms>
    fn clear_algorithms(&self) {
        // Set controller.[[writeAlgorithm]] to undefined.
        // Set controller.[[closeAlgorithm]] to undefined.
        // Set controller.[[abortAlgorithm]] to undefined.
        self.underlying_sink.clear();

        // Set controller.[[strategySizeAlgorithm]] to undefined.
        self.strategy_size.borrow_mut().take();
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-close>
    pub(crate) fn close(self: &Rc<Self>) {
        // Perform ! EnqueueValueWithSize(controller, close sentinel, 0).
        self.queue
            .borrow_mut()
            .enqueue_value_with_size(WriteQueueEntry::Close, 0.)
            .expect("Enqueuing the close sentinel with a size of zero cannot fail");

        // Perform ! WritableStreamDefaultControllerAdvanceQueueIfNeeded(controller).
        self.advance_queue_if_needed();
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-error>
    fn perform_error(&self, stream: &Rc<WritableStream<T>>, error: Error) {
        // Let stream be controller.[[stream]].
        // Assert: stream.[[state]] is "writable".
        assert!(stream.is_writable());

        // Perform ! WritableStreamDefaultControllerClearAlgorithms(controller).
        self.clear_algorithms();

        // Perform ! WritableStreamStartErroring(stream, error).
        stream.start_erroring(error);
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-error-if-needed>
    pub(crate) fn error_if_needed(&self, error: Error) {
        // If controller.[[stream]].[[state]] is "writable",
        let Some(stream) = self.stream() else {
            return;
        };
        if stream.is_writable() {
            // Perform ! WritableStreamDefaultControllerError(controller, error).
            self.perform_error(&stream, error);
        }
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-get-backpressure>
    fn get_backpressure(&self) -> bool {
        // Let desiredSize be ! WritableStreamDefaultControllerGetDesiredSize(controller).
        // Return true if desiredSize ≤ 0, or false otherwise.
        self.get_desired_size() <= 0.
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-get-chunk-size>
    pub(crate) fn get_chunk_size(&self, chunk: &T) -> f64 {
        // If controller.[[strategySizeAlgorithm]] is undefined,
        let size_algorithm = self.strategy_size.borrow().clone();
        let Some(size_algorithm) = size_algorithm else {
            // Assert: controller.[[stream]].[[state]] is not "writable".
            assert!(self.stream().is_none_or(|stream| !stream.is_writable()));

            // Return 1.
            return 1.;
        };

        // Let returnValue be the result of performing controller.[[strategySizeAlgorithm]],
        // passing in chunk, and interpreting the result as a completion record.
        match size_algorithm(chunk) {
            Ok(size) => size,
            // If returnValue is an abrupt completion,
            Err(error) => {
                // Perform ! WritableStreamDefaultControllerErrorIfNeeded(controller, returnValue.[[Value]]).
                self.error_if_needed(error);

                // Return 1.
                1.
            },
        }
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-get-desired-size>
    pub(crate) fn get_desired_size(&self) -> f64 {
        // Return controller.[[strategyHWM]] − controller.[[queueTotalSize]].
        self.strategy_hwm - self.queue.borrow().total_size()
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-process-close>
    fn process_close(self: &Rc<Self>, stream: &Rc<WritableStream<T>>) {
        // Let stream be controller.[[stream]].
        // Perform ! WritableStreamMarkCloseRequestInFlight(stream).
        stream.mark_close_request_in_flight();

        // Perform ! DequeueValue(controller).
        // Assert: controller.[[queue]] is empty.
        {
            let mut queue = self.queue.borrow_mut();
            let sentinel = queue.dequeue_value();
            assert!(matches!(sentinel, WriteQueueEntry::Close));
            assert!(queue.is_empty());
        }

        // Let sinkClosePromise be the result of performing controller.[[closeAlgorithm]].
        let sink_close_promise = self.underlying_sink.call_promise(|sink| sink.close());

        // Perform ! WritableStreamDefaultControllerClearAlgorithms(controller).
        self.clear_algorithms();

        let fulfillment_stream = stream.clone();
        let rejection_stream = stream.clone();
        sink_close_promise.append_native_handler(
            // Upon fulfillment of sinkClosePromise,
            move |()| {
                // Perform ! WritableStreamFinishInFlightClose(stream).
                fulfillment_stream.finish_in_flight_close();
            },
            // Upon rejection of sinkClosePromise with reason reason,
            move |reason| {
                // Perform ! WritableStreamFinishInFlightCloseWithError(stream, reason).
                rejection_stream.finish_in_flight_close_with_error(reason);
            },
        );
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-process-write>
    fn process_write(self: &Rc<Self>, stream: &Rc<WritableStream<T>>, chunk: T) {
        // Let stream be controller.[[stream]].
        // Perform ! WritableStreamMarkFirstWriteRequestInFlight(stream).
        stream.mark_first_write_request_in_flight();

        // Let sinkWritePromise be the result of performing controller.[[writeAlgorithm]], passing in chunk.
        let sink_write_promise = self
            .underlying_sink
            .call_promise(|sink| sink.write(chunk, self));

        let fulfillment_controller = self.clone();
        let fulfillment_stream = stream.clone();
        let rejection_controller = self.clone();
        let rejection_stream = stream.clone();
        sink_write_promise.append_native_handler(
            // Upon fulfillment of sinkWritePromise,
            move |()| {
                let controller = fulfillment_controller;
                let stream = fulfillment_stream;

                // Perform ! WritableStreamFinishInFlightWrite(stream).
                stream.finish_in_flight_write();

                // Let state be stream.[[state]].
                // Assert: state is "writable" or "erroring".
                assert!(stream.is_writable() || stream.is_erroring());

                // Perform ! DequeueValue(controller).
                controller.queue.borrow_mut().dequeue_value();

                // If ! WritableStreamCloseQueuedOrInFlight(stream) is false and state is "writable",
                if !stream.close_queued_or_in_flight() && stream.is_writable() {
                    // Let backpressure be ! WritableStreamDefaultControllerGetBackpressure(controller).
                    let backpressure = controller.get_backpressure();

                    // Perform ! WritableStreamUpdateBackpressure(stream, backpressure).
                    stream.update_backpressure(backpressure);
                }

                // Perform ! WritableStreamDefaultControllerAdvanceQueueIfNeeded(controller).
                controller.advance_queue_if_needed();
            },
            // Upon rejection of sinkWritePromise with reason,
            move |reason| {
                // If stream.[[state]] is "writable", perform ! WritableStreamDefaultControllerClearAlgorithms(controller).
                if rejection_stream.is_writable() {
                    rejection_controller.clear_algorithms();
                }

                // Perform ! WritableStreamFinishInFlightWriteWithError(stream, reason).
                rejection_stream.finish_in_flight_write_with_error(reason);
            },
        );
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-controller-write>
    pub(crate) fn write(self: &Rc<Self>, chunk: T, chunk_size: f64) {
        // Let enqueueResult be EnqueueValueWithSize(controller, chunk, chunkSize).
        let enqueue_result = self
            .queue
            .borrow_mut()
            .enqueue_value_with_size(WriteQueueEntry::Chunk(chunk), chunk_size);

        // If enqueueResult is an abrupt completion,
        if let Err(error) = enqueue_result {
            // Perform ! WritableStreamDefaultControllerErrorIfNeeded(controller, enqueueResult.[[Value]]).
            self.error_if_needed(error);

            // Return.
            return;
        }

        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // If ! WritableStreamCloseQueuedOrInFlight(stream) is false and stream.[[state]] is "writable",
        if !stream.close_queued_or_in_flight() && stream.is_writable() {
            // Let backpressure be ! WritableStreamDefaultControllerGetBackpressure(controller).
            let backpressure = self.get_backpressure();

            // Perform ! WritableStreamUpdateBackpressure(stream, backpressure).
            stream.update_backpressure(backpressure);
        }

        // Perform ! WritableStreamDefaultControllerAdvanceQueueIfNeeded(controller).
        self.advance_queue_if_needed();
    }

    /// <https://streams.spec.whatwg.org/#ws-default-controller-signal>
    pub fn signal(&self) -> Rc<AbortSignal> {
        // Return this.[[abortController]]’s signal.
        self.abort_controller.signal()
    }

    /// <https://streams.spec.whatwg.org/#ws-default-controller-error>
    pub fn error(&self, error: Error) {
        // Let state be this.[[stream]].[[state]].
        let Some(stream) = self.stream() else {
            return;
        };

        // If state is not "writable", return.
        if !stream.is_writable() {
            return;
        }

        // Perform ! WritableStreamDefaultControllerError(this, e).
        self.perform_error(&stream, error);
    }
}
