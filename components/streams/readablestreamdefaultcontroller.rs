/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::algorithms::AlgorithmContainer;
use crate::defaultteeunderlyingsource::readable_stream_default_tee;
use crate::error::{Error, ErrorResult, Fallible};
use crate::promise::Promise;
use crate::queuewithsizes::QueueWithSizes;
use crate::queuingstrategy::QueuingStrategySize;
use crate::readablebytestreamcontroller::ReadableByteStreamController;
use crate::readablestream::{ReadableStream, ReadableStreamController, ReadableStreamState};
use crate::readablestreamdefaultreader::ReadRequest;
use crate::underlyingsource::UnderlyingSource;

/// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller>
pub struct ReadableStreamDefaultController<T> {
    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-queue>
    queue: RefCell<QueueWithSizes<T>>,

    /// The underlying source implements these two internal slots:
    ///
    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-pullalgorithm>
    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-cancelalgorithm>
    underlying_source: AlgorithmContainer<dyn UnderlyingSource<T>>,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-stream>
    stream: Weak<ReadableStream<T>>,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-strategyhwm>
    strategy_hwm: f64,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-strategysizealgorithm>
    strategy_size: RefCell<Option<QueuingStrategySize<T>>>,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-closerequested>
    close_requested: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-pullagain>
    pull_again: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-pulling>
    pulling: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-started>
    started: Cell<bool>,
}

impl<T: Clone + 'static> ReadableStreamDefaultController<T> {
    /// <https://streams.spec.whatwg.org/#set-up-readable-stream-default-controller>
    pub(crate) fn set_up(
        stream: &Rc<ReadableStream<T>>,
        underlying_source: Box<dyn UnderlyingSource<T>>,
        high_water_mark: f64,
        size_algorithm: QueuingStrategySize<T>,
    ) -> Fallible<Rc<ReadableStreamDefaultController<T>>> {
        // Assert: stream.[[controller]] is undefined.
        stream.assert_no_controller();

        // Set controller.[[stream]] to stream.
        // Perform ! ResetQueue(controller).
        // Set controller.[[started]], controller.[[closeRequested]], controller.[[pullAgain]],
        // and controller.[[pulling]] to false.
        // Set controller.[[strategySizeAlgorithm]] to sizeAlgorithm
        // and controller.[[strategyHWM]] to highWaterMark.
        // Set controller.[[pullAlgorithm]] to pullAlgorithm.
        // Set controller.[[cancelAlgorithm]] to cancelAlgorithm.
        let controller = Rc::new(ReadableStreamDefaultController {
            queue: RefCell::new(QueueWithSizes::new()),
            underlying_source: AlgorithmContainer::new(underlying_source),
            stream: Rc::downgrade(stream),
            strategy_hwm: high_water_mark,
            strategy_size: RefCell::new(Some(size_algorithm)),
            close_requested: Cell::new(false),
            pull_again: Cell::new(false),
            pulling: Cell::new(false),
            started: Cell::new(false),
        });

        // Set stream.[[controller]] to controller.
        stream.set_controller(controller.clone());

        // Let startResult be the result of performing startAlgorithm. (This might throw an exception.)
        let start_result = controller
            .underlying_source
            .call(|source| source.start(&controller))
            .unwrap_or(Ok(None))?;

        // Let startPromise be a promise resolved with startResult.
        let start_promise = start_result.unwrap_or_else(Promise::resolved);

        let fulfillment_controller = controller.clone();
        let rejection_controller = controller.clone();
        start_promise.append_native_handler(
            // Upon fulfillment of startPromise,
            move |()| {
                // Set controller.[[started]] to true.
                fulfillment_controller.started.set(true);

                // Assert: controller.[[pulling]] is false.
                assert!(!fulfillment_controller.pulling.get());

                // Assert: controller.[[pullAgain]] is false.
                assert!(!fulfillment_controller.pull_again.get());

                // Perform ! ReadableStreamDefaultControllerCallPullIfNeeded(controller).
                fulfillment_controller.call_pull_if_needed();
            },
            // Upon rejection of startPromise with reason r,
            move |error| {
                // Perform ! ReadableStreamDefaultControllerError(controller, r).
                rejection_controller.perform_error(error);
            },
        );

        Ok(controller)
    }

    pub(crate) fn stream(&self) -> Option<Rc<ReadableStream<T>>> {
        self.stream.upgrade()
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-should-call-pull>
    fn should_call_pull(&self) -> bool {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return false;
        };

        // If ! ReadableStreamDefaultControllerCanCloseOrEnqueue(controller) is false, return false.
        if !self.can_close_or_enqueue() {
            return false;
        }

        // If controller.[[started]] is false, return false.
        if !self.started.get() {
            return false;
        }

        // If ! IsReadableStreamLocked(stream) is true
        // and ! ReadableStreamGetNumReadRequests(stream) > 0, return true.
        if stream.locked() && stream.get_num_read_requests() > 0 {
            return true;
        }

        // Let desiredSize be ! ReadableStreamDefaultControllerGetDesiredSize(controller).
        // Assert: desiredSize is not null.
        let desired_size = self.get_desired_size().unwrap_or(0.0);

        // If desiredSize > 0, return true.
        // Return false.
        desired_size > 0.0
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-call-pull-if-needed>
    fn call_pull_if_needed(self: &Rc<Self>) {
        // Let shouldPull be ! ReadableStreamDefaultControllerShouldCallPull(controller).
        // If shouldPull is false, return.
        if !self.should_call_pull() {
            return;
        }

        // If controller.[[pulling]] is true,
        if self.pulling.get() {
            // Set controller.[[pullAgain]] to true.
            self.pull_again.set(true);
            // Return.
            return;
        }

        // Assert: controller.[[pullAgain]] is false.
        assert!(!self.pull_again.get());

        // Set controller.[[pulling]] to true.
        self.pulling.set(true);

        // Let pullPromise be the result of performing controller.[[pullAlgorithm]].
        let pull_promise = self.underlying_source.call_promise(|source| source.pull(self));

        let fulfillment_controller = self.clone();
        let rejection_controller = self.clone();
        pull_promise.append_native_handler(
            // Upon fulfillment of pullPromise,
            move |()| {
                // Set controller.[[pulling]] to false.
                fulfillment_controller.pulling.set(false);

                // If controller.[[pullAgain]] is true,
                if fulfillment_controller.pull_again.get() {
                    // Set controller.[[pullAgain]] to false.
                    fulfillment_controller.pull_again.set(false);

                    // Perform ! ReadableStreamDefaultControllerCallPullIfNeeded(controller).
                    fulfillment_controller.call_pull_if_needed();
                }
            },
            // Upon rejection of pullPromise with reason e,
            move |error| {
                // Perform ! ReadableStreamDefaultControllerError(controller, e).
                rejection_controller.perform_error(error);
            },
        );
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-clear-algorithms>
    fn clear_algorithms(&self) {
        // Set controller.[[pullAlgorithm]] to undefined.
        // Set controller.[[cancelAlgorithm]] to undefined.
        self.underlying_source.clear();

        // Set controller.[[strategySizeAlgorithm]] to undefined.
        self.strategy_size.borrow_mut().take();
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-close>
    pub(crate) fn perform_close(&self) {
        // If ! ReadableStreamDefaultControllerCanCloseOrEnqueue(controller) is false, return.
        if !self.can_close_or_enqueue() {
            return;
        }

        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // Set controller.[[closeRequested]] to true.
        self.close_requested.set(true);

        // If controller.[[queue]] is empty,
        if self.queue.borrow().is_empty() {
            // Perform ! ReadableStreamDefaultControllerClearAlgorithms(controller).
            self.clear_algorithms();

            // Perform ! ReadableStreamClose(stream).
            stream.close();
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-enqueue>
    pub(crate) fn perform_enqueue(self: &Rc<Self>, chunk: T) -> ErrorResult {
        // If ! ReadableStreamDefaultControllerCanCloseOrEnqueue(controller) is false, return.
        if !self.can_close_or_enqueue() {
            return Ok(());
        }

        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return Ok(());
        };

        // If ! IsReadableStreamLocked(stream) is true
        // and ! ReadableStreamGetNumReadRequests(stream) > 0,
        // perform ! ReadableStreamFulfillReadRequest(stream, chunk, false).
        if stream.locked() && stream.get_num_read_requests() > 0 {
            stream.fulfill_read_request(chunk, false);
        } else {
            // Otherwise,
            // Let result be the result of performing controller.[[strategySizeAlgorithm]],
            // passing in chunk, and interpreting the result as a completion record.
            let size_algorithm = self.strategy_size.borrow().clone();
            let result = match size_algorithm {
                Some(size_algorithm) => size_algorithm(&chunk),
                None => Ok(1.0),
            };

            // If result is an abrupt completion,
            let chunk_size = match result {
                Ok(chunk_size) => chunk_size,
                Err(error) => {
                    // Perform ! ReadableStreamDefaultControllerError(controller, result.[[Value]]).
                    self.perform_error(error.clone());

                    // Return result.
                    return Err(error);
                },
            };

            // Let enqueueResult be EnqueueValueWithSize(controller, chunk, chunkSize).
            let enqueue_result = self
                .queue
                .borrow_mut()
                .enqueue_value_with_size(chunk, chunk_size);

            // If enqueueResult is an abrupt completion,
            if let Err(error) = enqueue_result {
                // Perform ! ReadableStreamDefaultControllerError(controller, enqueueResult.[[Value]]).
                self.perform_error(error.clone());

                // Return enqueueResult.
                return Err(error);
            }
        }

        // Perform ! ReadableStreamDefaultControllerCallPullIfNeeded(controller).
        self.call_pull_if_needed();
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-error>
    pub(crate) fn perform_error(&self, error: Error) {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // If stream.[[state]] is not "readable", return.
        if !stream.is_readable() {
            return;
        }

        // Perform ! ResetQueue(controller).
        self.queue.borrow_mut().reset();

        // Perform ! ReadableStreamDefaultControllerClearAlgorithms(controller).
        self.clear_algorithms();

        // Perform ! ReadableStreamError(stream, e).
        stream.error(error);
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-get-desired-size>
    pub(crate) fn get_desired_size(&self) -> Option<f64> {
        // Let state be controller.[[stream]].[[state]].
        let state = self.stream()?.state();

        match state {
            // If state is "errored", return null.
            ReadableStreamState::Errored => None,
            // If state is "closed", return 0.
            ReadableStreamState::Closed => Some(0.0),
            // Return controller.[[strategyHWM]] − controller.[[queueTotalSize]].
            ReadableStreamState::Readable => {
                Some(self.strategy_hwm - self.queue.borrow().total_size())
            },
        }
    }

    /// <https://streams.spec.whatwg.org/#rs-default-controller-has-backpressure>
    pub(crate) fn has_backpressure(&self) -> bool {
        // If ! ReadableStreamDefaultControllerShouldCallPull(controller) is true, return false.
        // Otherwise, return true.
        !self.should_call_pull()
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-controller-can-close-or-enqueue>
    pub(crate) fn can_close_or_enqueue(&self) -> bool {
        // Let state be controller.[[stream]].[[state]].
        let Some(stream) = self.stream() else {
            return false;
        };

        // If controller.[[closeRequested]] is false and state is "readable", return true.
        // Otherwise, return false.
        !self.close_requested.get() && stream.is_readable()
    }

    /// <https://streams.spec.whatwg.org/#rs-default-controller-desired-size>
    pub fn desired_size(&self) -> Option<f64> {
        // Return ! ReadableStreamDefaultControllerGetDesiredSize(this).
        self.get_desired_size()
    }

    /// <https://streams.spec.whatwg.org/#rs-default-controller-close>
    pub fn close(&self) -> ErrorResult {
        // If ! ReadableStreamDefaultControllerCanCloseOrEnqueue(this) is false, throw a TypeError exception.
        if !self.can_close_or_enqueue() {
            return Err(Error::Type("Stream cannot be closed".into()));
        }

        // Perform ! ReadableStreamDefaultControllerClose(this).
        self.perform_close();
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#rs-default-controller-enqueue>
    pub fn enqueue(self: &Rc<Self>, chunk: T) -> ErrorResult {
        // If ! ReadableStreamDefaultControllerCanCloseOrEnqueue(this) is false, throw a TypeError exception.
        if !self.can_close_or_enqueue() {
            return Err(Error::Type("Cannot enqueue into a closed or errored stream".into()));
        }

        // Perform ? ReadableStreamDefaultControllerEnqueue(this, chunk).
        self.perform_enqueue(chunk)
    }

    /// <https://streams.spec.whatwg.org/#rs-default-controller-error>
    pub fn error(&self, error: Error) {
        // Perform ! ReadableStreamDefaultControllerError(this, e).
        self.perform_error(error);
    }
}

impl<T: Clone + 'static> ReadableStreamController<T> for ReadableStreamDefaultController<T> {
    /// <https://streams.spec.whatwg.org/#rs-default-controller-private-cancel>
    fn cancel_steps(self: Rc<Self>, reason: Error) -> Promise<()> {
        // Perform ! ResetQueue(this).
        self.queue.borrow_mut().reset();

        // Let result be the result of performing this.[[cancelAlgorithm]], passing reason.
        let result = self
            .underlying_source
            .call_promise_or_defer(|source| source.cancel(reason));

        // Perform ! ReadableStreamDefaultControllerClearAlgorithms(this).
        self.clear_algorithms();

        // Return result.
        result
    }

    /// <https://streams.spec.whatwg.org/#rs-default-controller-private-pull>
    fn pull_steps(self: Rc<Self>, read_request: ReadRequest<T>) {
        // Let stream be this.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // If this.[[queue]] is not empty,
        let queued = !self.queue.borrow().is_empty();
        if queued {
            // Let chunk be ! DequeueValue(this).
            let chunk = self.queue.borrow_mut().dequeue_value();

            // If this.[[closeRequested]] is true and this.[[queue]] is empty,
            if self.close_requested.get() && self.queue.borrow().is_empty() {
                // Perform ! ReadableStreamDefaultControllerClearAlgorithms(this).
                self.clear_algorithms();

                // Perform ! ReadableStreamClose(stream).
                stream.close();
            } else {
                // Otherwise, perform ! ReadableStreamDefaultControllerCallPullIfNeeded(this).
                self.call_pull_if_needed();
            }

            // Perform readRequest’s chunk steps, given chunk.
            read_request.chunk_steps(chunk);
        } else {
            // Otherwise,
            // Perform ! ReadableStreamAddReadRequest(stream, readRequest).
            stream.add_read_request(read_request);

            // Perform ! ReadableStreamDefaultControllerCallPullIfNeeded(this).
            self.call_pull_if_needed();
        }
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamdefaultcontroller-releasesteps>
    fn release_steps(self: Rc<Self>) {
        // Return.
    }

    fn tee(self: Rc<Self>) -> Fallible<(Rc<ReadableStream<T>>, Rc<ReadableStream<T>>)> {
        let Some(stream) = self.stream() else {
            unreachable!("Teeing a stream that no longer exists.");
        };
        readable_stream_default_tee(&stream)
    }

    fn as_byte_controller(self: Rc<Self>) -> Option<Rc<ReadableByteStreamController>> {
        None
    }
}
