/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Fallible};
use crate::promise::Promise;
use crate::queuingstrategy::{
    QueuingStrategy, QueuingStrategySize, extract_high_water_mark, extract_size_algorithm,
};
use crate::underlyingsink::UnderlyingSink;
use crate::writablestreamdefaultcontroller::WritableStreamDefaultController;
use crate::writablestreamdefaultwriter::WritableStreamDefaultWriter;

/// <https://streams.spec.whatwg.org/#pending-abort-request>
struct PendingAbortRequest {
    /// <https://streams.spec.whatwg.org/#pending-abort-request-promise>
    promise: Promise<()>,

    /// <https://streams.spec.whatwg.org/#pending-abort-request-reason>
    reason: Error,

    /// <https://streams.spec.whatwg.org/#pending-abort-request-was-already-erroring>
    was_already_erroring: bool,
}

/// <https://streams.spec.whatwg.org/#writablestream-state>
///
/// `Closing` is never stored: it is what [`WritableStream::state`] reports while the
/// stream is writable and a close is queued or in flight.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum WritableStreamState {
    #[default]
    Writable,
    Closing,
    Closed,
    Erroring,
    Errored,
}

/// <https://streams.spec.whatwg.org/#ws-class>
pub struct WritableStream<T> {
    /// <https://streams.spec.whatwg.org/#writablestream-backpressure>
    backpressure: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#writablestream-closerequest>
    close_request: RefCell<Option<Promise<()>>>,

    /// <https://streams.spec.whatwg.org/#writablestream-controller>
    controller: RefCell<Option<Rc<WritableStreamDefaultController<T>>>>,

    /// <https://streams.spec.whatwg.org/#writablestream-inflightwriterequest>
    in_flight_write_request: RefCell<Option<Promise<()>>>,

    /// <https://streams.spec.whatwg.org/#writablestream-inflightcloserequest>
    in_flight_close_request: RefCell<Option<Promise<()>>>,

    /// <https://streams.spec.whatwg.org/#writablestream-pendingabortrequest>
    pending_abort_request: RefCell<Option<PendingAbortRequest>>,

    /// <https://streams.spec.whatwg.org/#writablestream-state>
    state: Cell<WritableStreamState>,

    /// <https://streams.spec.whatwg.org/#writablestream-storederror>
    stored_error: RefCell<Option<Error>>,

    /// <https://streams.spec.whatwg.org/#writablestream-writer>
    writer: RefCell<Option<Rc<WritableStreamDefaultWriter<T>>>>,

    /// <https://streams.spec.whatwg.org/#writablestream-writerequests>
    write_requests: RefCell<VecDeque<Promise<()>>>,
}

impl<T: Clone + 'static> WritableStream<T> {
    /// <https://streams.spec.whatwg.org/#initialize-writable-stream>
    fn new_inherited() -> WritableStream<T> {
        WritableStream {
            backpressure: Cell::new(false),
            close_request: RefCell::new(None),
            controller: RefCell::new(None),
            in_flight_write_request: RefCell::new(None),
            in_flight_close_request: RefCell::new(None),
            pending_abort_request: RefCell::new(None),
            state: Cell::new(WritableStreamState::Writable),
            stored_error: RefCell::new(None),
            writer: RefCell::new(None),
            write_requests: RefCell::new(VecDeque::new()),
        }
    }

    /// <https://streams.spec.whatwg.org/#ws-constructor>
    pub fn new(
        underlying_sink: impl UnderlyingSink<T> + 'static,
        strategy: QueuingStrategy<T>,
    ) -> Fallible<Rc<WritableStream<T>>> {
        // Let sizeAlgorithm be ! ExtractSizeAlgorithm(strategy).
        let size_algorithm = extract_size_algorithm(&strategy);

        // Let highWaterMark be ? ExtractHighWaterMark(strategy, 1).
        let high_water_mark = extract_high_water_mark(&strategy, 1.0)?;

        // Perform ! InitializeWritableStream(this).
        // Perform ? SetUpWritableStreamDefaultControllerFromUnderlyingSink(this,
        // underlyingSink, underlyingSinkDict, highWaterMark, sizeAlgorithm).
        WritableStream::create(Box::new(underlying_sink), high_water_mark, size_algorithm)
    }

    /// <https://streams.spec.whatwg.org/#create-writable-stream>
    pub(crate) fn create(
        underlying_sink: Box<dyn UnderlyingSink<T>>,
        high_water_mark: f64,
        size_algorithm: QueuingStrategySize<T>,
    ) -> Fallible<Rc<WritableStream<T>>> {
        // Assert: ! IsNonNegativeNumber(highWaterMark) is true.
        assert!(high_water_mark >= 0.0);

        // Let stream be a new WritableStream.
        // Perform ! InitializeWritableStream(stream).
        let stream = Rc::new(WritableStream::new_inherited());

        // Let controller be a new WritableStreamDefaultController.
        // Perform ? SetUpWritableStreamDefaultController(stream, controller, startAlgorithm,
        // writeAlgorithm, closeAlgorithmWrapper, abortAlgorithmWrapper, highWaterMark, sizeAlgorithm).
        WritableStreamDefaultController::set_up(
            &stream,
            underlying_sink,
            high_water_mark,
            size_algorithm,
        )?;

        // Return stream.
        Ok(stream)
    }

    /// Used as part of
    /// <https://streams.spec.whatwg.org/#set-up-writable-stream-default-controller>
    pub(crate) fn assert_no_controller(&self) {
        assert!(self.controller.borrow().is_none());
    }

    /// Used as part of
    /// <https://streams.spec.whatwg.org/#set-up-writable-stream-default-controller>
    pub(crate) fn set_default_controller(&self, controller: Rc<WritableStreamDefaultController<T>>) {
        *self.controller.borrow_mut() = Some(controller);
    }

    // Returns the controller of the stream.
    pub(crate) fn get_controller(&self) -> Rc<WritableStreamDefaultController<T>> {
        let Some(controller) = self.controller.borrow().clone() else {
            unreachable!("Stream should have a controller.");
        };
        controller
    }

    pub(crate) fn is_writable(&self) -> bool {
        matches!(self.state.get(), WritableStreamState::Writable)
    }

    pub(crate) fn is_erroring(&self) -> bool {
        matches!(self.state.get(), WritableStreamState::Erroring)
    }

    pub(crate) fn is_errored(&self) -> bool {
        matches!(self.state.get(), WritableStreamState::Errored)
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.state.get(), WritableStreamState::Closed)
    }

    /// The state of the stream, reporting `Closing` while a close is queued or in flight.
    pub fn state(&self) -> WritableStreamState {
        match self.state.get() {
            WritableStreamState::Writable if self.close_queued_or_in_flight() => {
                WritableStreamState::Closing
            },
            state => state,
        }
    }

    pub(crate) fn has_in_flight_write_request(&self) -> bool {
        self.in_flight_write_request.borrow().is_some()
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-has-operation-marked-in-flight>
    pub(crate) fn has_operations_marked_inflight(&self) -> bool {
        let in_flight_write_requested = self.in_flight_write_request.borrow().is_some();
        let in_flight_close_requested = self.in_flight_close_request.borrow().is_some();

        in_flight_write_requested || in_flight_close_requested
    }

    /// <https://streams.spec.whatwg.org/#writablestream-storederror>
    pub(crate) fn get_stored_error(&self) -> Error {
        self.stored_error.borrow().clone().unwrap_or(Error::Undefined)
    }

    /// The error the stream was errored or aborted with, if any.
    pub fn stored_error(&self) -> Option<Error> {
        self.stored_error.borrow().clone()
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-finish-erroring>
    pub(crate) fn finish_erroring(self: &Rc<Self>) {
        // Assert: stream.[[state]] is "erroring".
        assert!(self.is_erroring());

        // Assert: ! WritableStreamHasOperationMarkedInFlight(stream) is false.
        assert!(!self.has_operations_marked_inflight());

        // Set stream.[[state]] to "errored".
        self.state.set(WritableStreamState::Errored);
        debug!("Writable stream is now errored");

        // Perform ! stream.[[controller]].[[ErrorSteps]]().
        let controller = self.get_controller();
        controller.perform_error_steps();

        // Let storedError be stream.[[storedError]].
        let stored_error = self.get_stored_error();

        // For each writeRequest of stream.[[writeRequests]]:
        // Set stream.[[writeRequests]] to an empty list.
        let write_requests = mem::take(&mut *self.write_requests.borrow_mut());
        for request in write_requests {
            // Reject writeRequest with storedError.
            request.reject_error(stored_error.clone());
        }

        // If stream.[[pendingAbortRequest]] is undefined,
        // Let abortRequest be stream.[[pendingAbortRequest]].
        // Set stream.[[pendingAbortRequest]] to undefined.
        let pending_abort_request = self.pending_abort_request.borrow_mut().take();
        let Some(pending_abort_request) = pending_abort_request else {
            // Perform ! WritableStreamRejectCloseAndClosedPromiseIfNeeded(stream).
            self.reject_close_and_closed_promise_if_needed();

            // Return.
            return;
        };

        // If abortRequest’s was already erroring is true,
        if pending_abort_request.was_already_erroring {
            // Reject abortRequest’s promise with storedError.
            pending_abort_request.promise.reject_error(stored_error);

            // Perform ! WritableStreamRejectCloseAndClosedPromiseIfNeeded(stream).
            self.reject_close_and_closed_promise_if_needed();

            // Return.
            return;
        }

        // Let promise be ! stream.[[controller]].[[AbortSteps]](abortRequest’s reason).
        let promise = controller.abort_steps(pending_abort_request.reason);

        let abort_request_promise = pending_abort_request.promise;
        let rejection_promise = abort_request_promise.clone();
        let fulfillment_stream = self.clone();
        let rejection_stream = self.clone();
        promise.append_native_handler(
            // Upon fulfillment of promise,
            move |()| {
                // Resolve abortRequest’s promise with undefined.
                abort_request_promise.resolve_native(());

                // Perform ! WritableStreamRejectCloseAndClosedPromiseIfNeeded(stream).
                fulfillment_stream.reject_close_and_closed_promise_if_needed();
            },
            // Upon rejection of promise with reason reason,
            move |reason| {
                // Reject abortRequest’s promise with reason.
                rejection_promise.reject_error(reason);

                // Perform ! WritableStreamRejectCloseAndClosedPromiseIfNeeded(stream).
                rejection_stream.reject_close_and_closed_promise_if_needed();
            },
        );
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-reject-close-and-closed-promise-if-needed>
    fn reject_close_and_closed_promise_if_needed(&self) {
        // Assert: stream.[[state]] is "errored".
        assert!(self.is_errored());

        let stored_error = self.get_stored_error();

        // If stream.[[closeRequest]] is not undefined
        let close_request = self.close_request.borrow_mut().take();
        if let Some(close_request) = close_request {
            // Assert: stream.[[inFlightCloseRequest]] is undefined.
            assert!(self.in_flight_close_request.borrow().is_none());

            // Reject stream.[[closeRequest]] with stream.[[storedError]].
            close_request.reject_error(stored_error.clone());

            // Set stream.[[closeRequest]] to undefined.
            // Done with `take` above.
        }

        // Let writer be stream.[[writer]].
        // If writer is not undefined,
        if let Some(writer) = self.writer() {
            // Reject writer.[[closedPromise]] with stream.[[storedError]].
            // Set writer.[[closedPromise]].[[PromiseIsHandled]] to true.
            writer.reject_closed_promise_with_stored_error(stored_error);
        }
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-close-queued-or-in-flight>
    pub(crate) fn close_queued_or_in_flight(&self) -> bool {
        let close_requested = self.close_request.borrow().is_some();
        let in_flight_close_requested = self.in_flight_close_request.borrow().is_some();

        close_requested || in_flight_close_requested
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-finish-in-flight-write>
    pub(crate) fn finish_in_flight_write(&self) {
        let Some(in_flight_write_request) = self.in_flight_write_request.borrow_mut().take() else {
            // Assert: stream.[[inFlightWriteRequest]] is not undefined.
            unreachable!("Stream should have a write request");
        };

        // Resolve stream.[[inFlightWriteRequest]] with undefined.
        in_flight_write_request.resolve_native(());

        // Set stream.[[inFlightWriteRequest]] to undefined.
        // Done above with `take`.
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-start-erroring>
    pub(crate) fn start_erroring(self: &Rc<Self>, error: Error) {
        // Assert: stream.[[storedError]] is undefined.
        assert!(self.stored_error.borrow().is_none());

        // Assert: stream.[[state]] is "writable".
        assert!(self.is_writable());

        // Let controller be stream.[[controller]].
        // Assert: controller is not undefined.
        let controller = self.get_controller();

        // Set stream.[[state]] to "erroring".
        self.state.set(WritableStreamState::Erroring);
        debug!("Writable stream is erroring: {error}");

        // Set stream.[[storedError]] to reason.
        *self.stored_error.borrow_mut() = Some(error.clone());

        // Let writer be stream.[[writer]].
        if let Some(writer) = self.writer() {
            // If writer is not undefined, perform ! WritableStreamDefaultWriterEnsureReadyPromiseRejected
            writer.ensure_ready_promise_rejected(error);
        }

        // If ! WritableStreamHasOperationMarkedInFlight(stream) is false and controller.[[started]] is true
        if !self.has_operations_marked_inflight() && controller.started() {
            // perform ! WritableStreamFinishErroring
            self.finish_erroring();
        }
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-deal-with-rejection>
    pub(crate) fn deal_with_rejection(self: &Rc<Self>, error: Error) {
        // Let state be stream.[[state]].

        // If state is "writable",
        if self.is_writable() {
            // Perform ! WritableStreamStartErroring(stream, error).
            self.start_erroring(error);

            // Return.
            return;
        }

        // Assert: state is "erroring".
        assert!(self.is_erroring());

        // Perform ! WritableStreamFinishErroring(stream).
        self.finish_erroring();
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-mark-first-write-request-in-flight>
    pub(crate) fn mark_first_write_request_in_flight(&self) {
        let mut in_flight_write_request = self.in_flight_write_request.borrow_mut();
        let mut write_requests = self.write_requests.borrow_mut();

        // Assert: stream.[[inFlightWriteRequest]] is undefined.
        assert!(in_flight_write_request.is_none());

        // Let writeRequest be stream.[[writeRequests]][0].
        // Remove writeRequest from stream.[[writeRequests]].
        let Some(write_request) = write_requests.pop_front() else {
            // Assert: stream.[[writeRequests]] is not empty.
            unreachable!("Stream should have a pending write request.");
        };

        // Set stream.[[inFlightWriteRequest]] to writeRequest.
        *in_flight_write_request = Some(write_request);
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-mark-close-request-in-flight>
    pub(crate) fn mark_close_request_in_flight(&self) {
        let mut in_flight_close_request = self.in_flight_close_request.borrow_mut();
        let mut close_request = self.close_request.borrow_mut();

        // Assert: stream.[[inFlightCloseRequest]] is undefined.
        assert!(in_flight_close_request.is_none());

        // Let closeRequest be stream.[[closeRequest]].
        // Set stream.[[closeRequest]] to undefined.
        let Some(close_request) = close_request.take() else {
            // Assert: stream.[[closeRequest]] is not undefined.
            unreachable!("Stream should have a close request.");
        };

        // Set stream.[[inFlightCloseRequest]] to closeRequest.
        *in_flight_close_request = Some(close_request);
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-finish-in-flight-close>
    pub(crate) fn finish_in_flight_close(&self) {
        let Some(in_flight_close_request) = self.in_flight_close_request.borrow_mut().take() else {
            // Assert: stream.[[inFlightCloseRequest]] is not undefined.
            unreachable!("in_flight_close_request must be Some");
        };

        // Resolve stream.[[inFlightCloseRequest]] with undefined.
        in_flight_close_request.resolve_native(());

        // Set stream.[[inFlightCloseRequest]] to undefined.
        // Done with take above.

        // Assert: stream.[[state]] is "writable" or "erroring".
        assert!(self.is_writable() || self.is_erroring());

        // If state is "erroring",
        if self.is_erroring() {
            // Set stream.[[storedError]] to undefined.
            *self.stored_error.borrow_mut() = None;

            // If stream.[[pendingAbortRequest]] is not undefined,
            let pending_abort_request = self.pending_abort_request.borrow_mut().take();
            if let Some(pending_abort_request) = pending_abort_request {
                // Resolve stream.[[pendingAbortRequest]]'s promise with undefined.
                pending_abort_request.promise.resolve_native(());

                // Set stream.[[pendingAbortRequest]] to undefined.
                // Done above with `take`.
            }
        }

        // Set stream.[[state]] to "closed".
        self.state.set(WritableStreamState::Closed);
        debug!("Writable stream is now closed");

        // Let writer be stream.[[writer]].
        if let Some(writer) = self.writer() {
            // If writer is not undefined,
            // resolve writer.[[closedPromise]] with undefined.
            writer.resolve_closed_promise_with_undefined();
        }

        // Assert: stream.[[pendingAbortRequest]] is undefined.
        assert!(self.pending_abort_request.borrow().is_none());

        // Assert: stream.[[storedError]] is undefined.
        assert!(self.stored_error.borrow().is_none());
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-finish-in-flight-close-with-error>
    pub(crate) fn finish_in_flight_close_with_error(self: &Rc<Self>, error: Error) {
        let Some(in_flight_close_request) = self.in_flight_close_request.borrow_mut().take() else {
            // Assert: stream.[[inFlightCloseRequest]] is not undefined.
            unreachable!("Inflight close request must be defined.");
        };

        // Reject stream.[[inFlightCloseRequest]] with error.
        in_flight_close_request.reject_error(error.clone());

        // Set stream.[[inFlightCloseRequest]] to undefined.
        // Done above with `take`.

        // Assert: stream.[[state]] is "writable" or "erroring".
        assert!(self.is_erroring() || self.is_writable());

        // If stream.[[pendingAbortRequest]] is not undefined,
        let pending_abort_request = self.pending_abort_request.borrow_mut().take();
        if let Some(pending_abort_request) = pending_abort_request {
            // Reject stream.[[pendingAbortRequest]]'s promise with error.
            pending_abort_request.promise.reject_error(error.clone());

            // Set stream.[[pendingAbortRequest]] to undefined.
            // Done above with `take`.
        }

        // Perform ! WritableStreamDealWithRejection(stream, error).
        self.deal_with_rejection(error);
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-finish-in-flight-write-with-error>
    pub(crate) fn finish_in_flight_write_with_error(self: &Rc<Self>, error: Error) {
        let Some(in_flight_write_request) = self.in_flight_write_request.borrow_mut().take() else {
            // Assert: stream.[[inFlightWriteRequest]] is not undefined.
            unreachable!("Inflight write request must be defined.");
        };

        // Reject stream.[[inFlightWriteRequest]] with error.
        in_flight_write_request.reject_error(error.clone());

        // Set stream.[[inFlightWriteRequest]] to undefined.
        // Done above with `take`.

        // Assert: stream.[[state]] is "writable" or "erroring".
        assert!(self.is_erroring() || self.is_writable());

        // Perform ! WritableStreamDealWithRejection(stream, error).
        self.deal_with_rejection(error);
    }

    pub(crate) fn writer(&self) -> Option<Rc<WritableStreamDefaultWriter<T>>> {
        self.writer.borrow().clone()
    }

    pub(crate) fn set_writer(&self, writer: Option<Rc<WritableStreamDefaultWriter<T>>>) {
        *self.writer.borrow_mut() = writer;
    }

    pub(crate) fn set_backpressure(&self, backpressure: bool) {
        self.backpressure.set(backpressure);
    }

    pub(crate) fn get_backpressure(&self) -> bool {
        self.backpressure.get()
    }

    /// <https://streams.spec.whatwg.org/#is-writable-stream-locked>
    pub fn locked(&self) -> bool {
        // If stream.[[writer]] is undefined, return false.
        // Return true.
        self.writer.borrow().is_some()
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-add-write-request>
    pub(crate) fn add_write_request(&self) -> Promise<()> {
        // Assert: ! IsWritableStreamLocked(stream) is true.
        assert!(self.locked());

        // Assert: stream.[[state]] is "writable".
        assert!(self.is_writable());

        // Let promise be a new promise.
        let promise = Promise::new();

        // Append promise to stream.[[writeRequests]].
        self.write_requests.borrow_mut().push_back(promise.clone());

        // Return promise.
        promise
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-abort>
    pub(crate) fn abort_stream(self: &Rc<Self>, reason: Error) -> Promise<()> {
        // If stream.[[state]] is "closed" or "errored",
        if self.is_closed() || self.is_errored() {
            // return a promise resolved with undefined.
            return Promise::resolved();
        }

        // Signal abort on stream.[[controller]].[[abortController]] with reason.
        self.get_controller().signal_abort(reason.clone());

        // Let state be stream.[[state]].
        // If state is "closed" or "errored", return a promise resolved with undefined.
        // Note: state may have changed because of signal above.
        if self.is_closed() || self.is_errored() {
            return Promise::resolved();
        }

        // If stream.[[pendingAbortRequest]] is not undefined,
        // return stream.[[pendingAbortRequest]]'s promise.
        let pending_promise = self
            .pending_abort_request
            .borrow()
            .as_ref()
            .map(|request| request.promise.clone());
        if let Some(promise) = pending_promise {
            return promise;
        }

        // Assert: state is "writable" or "erroring".
        assert!(self.is_writable() || self.is_erroring());

        // Let wasAlreadyErroring be false.
        // If state is "erroring",
        // Set wasAlreadyErroring to true.
        let was_already_erroring = self.is_erroring();

        // Set reason to undefined.
        let reason = if was_already_erroring {
            Error::Undefined
        } else {
            reason
        };

        // Let promise be a new promise.
        let promise = Promise::new();

        // Set stream.[[pendingAbortRequest]] to a new pending abort request
        // whose promise is promise,
        // reason is reason,
        // and was already erroring is wasAlreadyErroring.
        *self.pending_abort_request.borrow_mut() = Some(PendingAbortRequest {
            promise: promise.clone(),
            reason: reason.clone(),
            was_already_erroring,
        });

        // If wasAlreadyErroring is false,
        if !was_already_erroring {
            // perform ! WritableStreamStartErroring(stream, reason)
            self.start_erroring(reason);
        }

        // Return promise.
        promise
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-close>
    pub(crate) fn close_stream(self: &Rc<Self>) -> Promise<()> {
        // Let state be stream.[[state]].
        // If state is "closed" or "errored",
        if self.is_closed() || self.is_errored() {
            // return a promise rejected with a TypeError exception.
            return Promise::new_rejected(Error::Type("Stream is closed or errored.".to_string()));
        }

        // Assert: state is "writable" or "erroring".
        assert!(self.is_writable() || self.is_erroring());

        // Assert: ! WritableStreamCloseQueuedOrInFlight(stream) is false.
        assert!(!self.close_queued_or_in_flight());

        // Let promise be a new promise.
        let promise = Promise::new();

        // Set stream.[[closeRequest]] to promise.
        *self.close_request.borrow_mut() = Some(promise.clone());

        // Let writer be stream.[[writer]].
        // If writer is not undefined,
        if let Some(writer) = self.writer() {
            // and stream.[[backpressure]] is true,
            // and state is "writable",
            if self.get_backpressure() && self.is_writable() {
                // resolve writer.[[readyPromise]] with undefined.
                writer.resolve_ready_promise_with_undefined();
            }
        }

        // Perform ! WritableStreamDefaultControllerClose(stream.[[controller]]).
        self.get_controller().close();

        // Return promise.
        promise
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-default-writer-get-desired-size>
    /// Note: implement as a stream method, as opposed to a writer one, for convenience.
    pub(crate) fn get_desired_size(&self) -> Option<f64> {
        // Let stream be writer.[[stream]].
        // Stream is `self`.

        // Let state be stream.[[state]].
        // If state is "errored" or "erroring", return null.
        if self.is_errored() || self.is_erroring() {
            return None;
        }

        // If state is "closed", return 0.
        if self.is_closed() {
            return Some(0.);
        }

        // Return ! WritableStreamDefaultControllerGetDesiredSize(stream.[[controller]]).
        Some(self.get_controller().get_desired_size())
    }

    /// <https://streams.spec.whatwg.org/#writable-stream-update-backpressure>
    pub(crate) fn update_backpressure(&self, backpressure: bool) {
        // Assert: stream.[[state]] is "writable".
        assert!(self.is_writable());

        // Assert: ! WritableStreamCloseQueuedOrInFlight(stream) is false.
        assert!(!self.close_queued_or_in_flight());

        // Let writer be stream.[[writer]].
        // If writer is not undefined and backpressure is not stream.[[backpressure]],
        if let Some(writer) = self.writer() {
            if backpressure != self.get_backpressure() {
                if backpressure {
                    // If backpressure is true, set writer.[[readyPromise]] to a new promise.
                    writer.set_ready_promise(Promise::new());
                } else {
                    // Otherwise,
                    // Assert: backpressure is false.
                    // Resolve writer.[[readyPromise]] with undefined.
                    writer.resolve_ready_promise_with_undefined();
                }
            }
        }

        // Set stream.[[backpressure]] to backpressure.
        self.set_backpressure(backpressure);
    }

    /// <https://streams.spec.whatwg.org/#ws-abort>
    pub fn abort(self: &Rc<Self>, reason: Error) -> Promise<()> {
        // If ! IsWritableStreamLocked(this) is true,
        if self.locked() {
            // return a promise rejected with a TypeError exception.
            return Promise::new_rejected(Error::Type("Stream is locked.".to_string()));
        }

        // Return ! WritableStreamAbort(this, reason).
        self.abort_stream(reason)
    }

    /// <https://streams.spec.whatwg.org/#ws-close>
    pub fn close(self: &Rc<Self>) -> Promise<()> {
        // If ! IsWritableStreamLocked(this) is true,
        if self.locked() {
            // return a promise rejected with a TypeError exception.
            return Promise::new_rejected(Error::Type("Stream is locked.".to_string()));
        }

        // If ! WritableStreamCloseQueuedOrInFlight(this) is true
        if self.close_queued_or_in_flight() {
            // return a promise rejected with a TypeError exception.
            return Promise::new_rejected(Error::Type(
                "Stream has closed queued or in-flight".to_string(),
            ));
        }

        // Return ! WritableStreamClose(this).
        self.close_stream()
    }

    /// <https://streams.spec.whatwg.org/#ws-get-writer>
    /// <https://streams.spec.whatwg.org/#acquire-writable-stream-default-writer>
    pub fn get_writer(self: &Rc<Self>) -> Fallible<Rc<WritableStreamDefaultWriter<T>>> {
        // Let writer be a new WritableStreamDefaultWriter object.
        // Perform ? SetUpWritableStreamDefaultWriter(writer, stream).
        // Return writer.
        WritableStreamDefaultWriter::new(self)
    }
}
