/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::cmp::min;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::algorithms::AlgorithmContainer;
use crate::byteteeunderlyingsource::readable_byte_stream_tee;
use crate::error::{Error, ErrorResult, Fallible};
use crate::promise::Promise;
use crate::readablestream::{ReadableStream, ReadableStreamController, ReadableStreamState, ReaderType};
use crate::readablestreambyobreader::ReadIntoRequest;
use crate::readablestreambyobrequest::ReadableStreamBYOBRequest;
use crate::readablestreamdefaultreader::ReadRequest;
use crate::typedarray::{ArrayBuffer, ArrayBufferView, ArrayBufferViewType, copy_data_block_bytes};
use crate::underlyingsource::UnderlyingByteSource;

/// <https://streams.spec.whatwg.org/#readable-byte-stream-queue-entry>
struct ReadableByteStreamQueueEntry {
    /// <https://streams.spec.whatwg.org/#readable-byte-stream-queue-entry-buffer>
    buffer: ArrayBuffer,
    /// <https://streams.spec.whatwg.org/#readable-byte-stream-queue-entry-byte-offset>
    byte_offset: usize,
    /// <https://streams.spec.whatwg.org/#readable-byte-stream-queue-entry-byte-length>
    byte_length: usize,
}

/// <https://streams.spec.whatwg.org/#pull-into-descriptor-reader-type>
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PullIntoReaderType {
    Default,
    Byob,
    None,
}

/// <https://streams.spec.whatwg.org/#pull-into-descriptor>
#[derive(Clone)]
pub(crate) struct PullIntoDescriptor {
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-buffer>
    buffer: ArrayBuffer,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-buffer-byte-length>
    buffer_byte_length: usize,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-byte-offset>
    byte_offset: usize,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-byte-length>
    byte_length: usize,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-bytes-filled>
    bytes_filled: usize,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-minimum-fill>
    minimum_fill: usize,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-element-size>
    element_size: usize,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-view-constructor>
    view_constructor: ArrayBufferViewType,
    /// <https://streams.spec.whatwg.org/#pull-into-descriptor-reader-type>
    reader_type: PullIntoReaderType,
}

/// <https://streams.spec.whatwg.org/#readablebytestreamcontroller>
pub struct ReadableByteStreamController {
    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-autoallocatechunksize>
    auto_allocate_chunk_size: Option<u64>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-stream>
    stream: Weak<ReadableStream<ArrayBufferView>>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-byobrequest>
    byob_request: RefCell<Option<Rc<ReadableStreamBYOBRequest>>>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-closerequested>
    close_requested: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-pullagain>
    pull_again: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-pulling>
    pulling: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-started>
    started: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-queue>
    queue: RefCell<VecDeque<ReadableByteStreamQueueEntry>>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-queuetotalsize>
    queue_total_size: Cell<usize>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-strategyhwm>
    strategy_hwm: f64,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-pendingpullintos>
    pending_pull_intos: RefCell<VecDeque<PullIntoDescriptor>>,

    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-pullalgorithm>
    /// <https://streams.spec.whatwg.org/#readablebytestreamcontroller-cancelalgorithm>
    underlying_source: AlgorithmContainer<dyn UnderlyingByteSource>,
}

impl ReadableByteStreamController {
    /// <https://streams.spec.whatwg.org/#set-up-readable-byte-stream-controller-from-underlying-source>
    pub(crate) fn set_up_from_underlying_source(
        stream: &Rc<ReadableStream<ArrayBufferView>>,
        underlying_source: Box<dyn UnderlyingByteSource>,
        high_water_mark: f64,
    ) -> Fallible<Rc<ReadableByteStreamController>> {
        // Let autoAllocateChunkSize be underlyingSourceDict["autoAllocateChunkSize"], if it exists,
        // or undefined otherwise.
        let auto_allocate_chunk_size = underlying_source.auto_allocate_chunk_size();

        // If autoAllocateChunkSize is 0, then throw a TypeError exception.
        if auto_allocate_chunk_size == Some(0) {
            return Err(Error::Type("autoAllocateChunkSize cannot be 0".into()));
        }

        // Perform ? SetUpReadableByteStreamController(stream, controller, startAlgorithm,
        // pullAlgorithm, cancelAlgorithm, highWaterMark, autoAllocateChunkSize).
        ReadableByteStreamController::set_up(
            stream,
            underlying_source,
            high_water_mark,
            auto_allocate_chunk_size,
        )
    }

    /// <https://streams.spec.whatwg.org/#set-up-readable-byte-stream-controller>
    pub(crate) fn set_up(
        stream: &Rc<ReadableStream<ArrayBufferView>>,
        underlying_source: Box<dyn UnderlyingByteSource>,
        high_water_mark: f64,
        auto_allocate_chunk_size: Option<u64>,
    ) -> Fallible<Rc<ReadableByteStreamController>> {
        // Assert: stream.[[controller]] is undefined.
        stream.assert_no_controller();

        // If autoAllocateChunkSize is not undefined,
        // Assert: ! IsInteger(autoAllocateChunkSize) is true.
        // Assert: autoAllocateChunkSize is positive.
        assert_ne!(auto_allocate_chunk_size, Some(0));

        let controller = Rc::new(ReadableByteStreamController {
            auto_allocate_chunk_size,
            stream: Rc::downgrade(stream),
            byob_request: RefCell::new(None),
            close_requested: Cell::new(false),
            pull_again: Cell::new(false),
            pulling: Cell::new(false),
            started: Cell::new(false),
            queue: RefCell::new(VecDeque::new()),
            queue_total_size: Cell::new(0),
            strategy_hwm: high_water_mark,
            pending_pull_intos: RefCell::new(VecDeque::new()),
            underlying_source: AlgorithmContainer::new(underlying_source),
        });

        // Set stream.[[controller]] to controller.
        stream.set_controller(controller.clone());

        // Let startResult be the result of performing startAlgorithm.
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

                // Perform ! ReadableByteStreamControllerCallPullIfNeeded(controller).
                fulfillment_controller.call_pull_if_needed();
            },
            // Upon rejection of startPromise with reason r,
            move |error| {
                // Perform ! ReadableByteStreamControllerError(controller, r).
                rejection_controller.perform_error(error);
            },
        );

        Ok(controller)
    }

    pub(crate) fn stream(&self) -> Option<Rc<ReadableStream<ArrayBufferView>>> {
        self.stream.upgrade()
    }

    pub(crate) fn get_pending_pull_intos_size(&self) -> usize {
        self.pending_pull_intos.borrow().len()
    }

    fn stream_is_readable(&self) -> bool {
        self.stream().is_some_and(|stream| stream.is_readable())
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-should-call-pull>
    fn should_call_pull(&self) -> bool {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return false;
        };

        // If stream.[[state]] is not "readable", return false.
        if !stream.is_readable() {
            return false;
        }

        // If controller.[[closeRequested]] is true, return false.
        if self.close_requested.get() {
            return false;
        }

        // If controller.[[started]] is false, return false.
        if !self.started.get() {
            return false;
        }

        // If ! ReadableStreamHasDefaultReader(stream) is true
        // and ! ReadableStreamGetNumReadRequests(stream) > 0, return true.
        if stream.has_default_reader() && stream.get_num_read_requests() > 0 {
            return true;
        }

        // If ! ReadableStreamHasBYOBReader(stream) is true
        // and ! ReadableStreamGetNumReadIntoRequests(stream) > 0, return true.
        if stream.has_byob_reader() && stream.get_num_read_into_requests() > 0 {
            return true;
        }

        // Let desiredSize be ! ReadableByteStreamControllerGetDesiredSize(controller).
        // Assert: desiredSize is not null.
        let desired_size = self.get_desired_size().unwrap_or(0.0);

        // If desiredSize > 0, return true.
        // Return false.
        desired_size > 0.0
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-call-pull-if-needed>
    fn call_pull_if_needed(self: &Rc<Self>) {
        // Let shouldPull be ! ReadableByteStreamControllerShouldCallPull(controller).
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

                    // Perform ! ReadableByteStreamControllerCallPullIfNeeded(controller).
                    fulfillment_controller.call_pull_if_needed();
                }
            },
            // Upon rejection of pullPromise with reason e,
            move |error| {
                // Perform ! ReadableByteStreamControllerError(controller, e).
                rejection_controller.perform_error(error);
            },
        );
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-clear-algorithms>
    fn clear_algorithms(&self) {
        // Set controller.[[pullAlgorithm]] to undefined.
        // Set controller.[[cancelAlgorithm]] to undefined.
        self.underlying_source.clear();
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-clear-pending-pull-intos>
    fn clear_pending_pull_intos(&self) {
        // Perform ! ReadableByteStreamControllerInvalidateBYOBRequest(controller).
        self.invalidate_byob_request();

        // Set controller.[[pendingPullIntos]] to a new empty list.
        self.pending_pull_intos.borrow_mut().clear();
    }

    /// <https://streams.spec.whatwg.org/#reset-queue>
    fn reset_queue(&self) {
        // Set container.[[queue]] to a new empty list.
        self.queue.borrow_mut().clear();

        // Set container.[[queueTotalSize]] to 0.
        self.queue_total_size.set(0);
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-close>
    pub(crate) fn perform_close(&self) -> ErrorResult {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return Ok(());
        };

        // If controller.[[closeRequested]] is true or stream.[[state]] is not "readable", return.
        if self.close_requested.get() || !stream.is_readable() {
            return Ok(());
        }

        // If controller.[[queueTotalSize]] > 0,
        if self.queue_total_size.get() > 0 {
            // Set controller.[[closeRequested]] to true.
            self.close_requested.set(true);

            // Return.
            return Ok(());
        }

        // If controller.[[pendingPullIntos]] is not empty,
        // Let firstPendingPullInto be controller.[[pendingPullIntos]][0].
        // If the remainder after dividing firstPendingPullInto’s bytes filled by
        // firstPendingPullInto’s element size is not 0,
        let misaligned = self
            .pending_pull_intos
            .borrow()
            .front()
            .is_some_and(|first| first.bytes_filled % first.element_size != 0);
        if misaligned {
            // Let e be a new TypeError exception.
            let error = Error::Type("Insufficient bytes to fill elements in the given buffer".into());

            // Perform ! ReadableByteStreamControllerError(controller, e).
            self.perform_error(error.clone());

            // Throw e.
            return Err(error);
        }

        // Perform ! ReadableByteStreamControllerClearAlgorithms(controller).
        self.clear_algorithms();

        // Perform ! ReadableStreamClose(stream).
        stream.close();
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-enqueue>
    pub(crate) fn perform_enqueue(self: &Rc<Self>, chunk: ArrayBufferView) -> ErrorResult {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return Ok(());
        };

        // If controller.[[closeRequested]] is true or stream.[[state]] is not "readable", return.
        if self.close_requested.get() || !stream.is_readable() {
            return Ok(());
        }

        // Let buffer be chunk.[[ViewedArrayBuffer]].
        // Let byteOffset be chunk.[[ByteOffset]].
        // Let byteLength be chunk.[[ByteLength]].
        let buffer = chunk.buffer();
        let byte_offset = chunk.byte_offset();
        let byte_length = chunk.byte_length();

        // If ! IsDetachedBuffer(buffer) is true, throw a TypeError exception.
        if buffer.is_detached() {
            return Err(Error::Type("Chunk's buffer is detached".into()));
        }

        // Let transferredBuffer be ? TransferArrayBuffer(buffer).
        let transferred_buffer = buffer.transfer()?;

        // If controller.[[pendingPullIntos]] is not empty,
        let has_pending_pull_intos = !self.pending_pull_intos.borrow().is_empty();
        if has_pending_pull_intos {
            // Let firstPendingPullInto be controller.[[pendingPullIntos]][0].
            // If ! IsDetachedBuffer(firstPendingPullInto’s buffer) is true, throw a TypeError exception.
            let first_is_detached = self
                .pending_pull_intos
                .borrow()
                .front()
                .is_some_and(|first| first.buffer.is_detached());
            if first_is_detached {
                return Err(Error::Type("The BYOB request's buffer has been detached".into()));
            }

            // Perform ! ReadableByteStreamControllerInvalidateBYOBRequest(controller).
            self.invalidate_byob_request();

            // Set firstPendingPullInto’s buffer to ! TransferArrayBuffer(firstPendingPullInto’s buffer).
            let first_pending_pull_into = {
                let mut pending_pull_intos = self.pending_pull_intos.borrow_mut();
                let first = pending_pull_intos
                    .front_mut()
                    .expect("Pending pull-intos should not be empty");
                first.buffer = first.buffer.transfer()?;
                first.clone()
            };

            // If firstPendingPullInto’s reader type is "none",
            if first_pending_pull_into.reader_type == PullIntoReaderType::None {
                // perform ? ReadableByteStreamControllerEnqueueDetachedPullIntoToQueue(controller, firstPendingPullInto).
                self.enqueue_detached_pull_into_to_queue(&first_pending_pull_into)?;
            }
        }

        if stream.has_default_reader() {
            // If ! ReadableStreamHasDefaultReader(stream) is true,
            // Perform ! ReadableByteStreamControllerProcessReadRequestsUsingQueue(controller).
            self.process_read_requests_using_queue(&stream);

            // If ! ReadableStreamGetNumReadRequests(stream) is 0,
            if stream.get_num_read_requests() == 0 {
                // Assert: controller.[[pendingPullIntos]] is empty.
                assert!(self.pending_pull_intos.borrow().is_empty());

                // Perform ! ReadableByteStreamControllerEnqueueChunkToQueue(controller,
                // transferredBuffer, byteOffset, byteLength).
                self.enqueue_chunk_to_queue(transferred_buffer, byte_offset, byte_length);
            } else {
                // Otherwise,
                // Assert: controller.[[queue]] is empty.
                assert!(self.queue.borrow().is_empty());

                // If controller.[[pendingPullIntos]] is not empty,
                let has_pending_pull_intos = !self.pending_pull_intos.borrow().is_empty();
                if has_pending_pull_intos {
                    // Assert: controller.[[pendingPullIntos]][0]’s reader type is "default".
                    // Perform ! ReadableByteStreamControllerShiftPendingPullInto(controller).
                    let shifted = self.shift_pending_pull_into();
                    assert_eq!(shifted.reader_type, PullIntoReaderType::Default);
                }

                // Let transferredView be ! Construct(%Uint8Array%, « transferredBuffer, byteOffset, byteLength »).
                let transferred_view = ArrayBufferView::from_parts(
                    ArrayBufferViewType::Uint8Array,
                    transferred_buffer,
                    byte_offset,
                    byte_length,
                );

                // Perform ! ReadableStreamFulfillReadRequest(stream, transferredView, false).
                stream.fulfill_read_request(transferred_view, false);
            }
        } else if stream.has_byob_reader() {
            // Otherwise, if ! ReadableStreamHasBYOBReader(stream) is true,
            // Perform ! ReadableByteStreamControllerEnqueueChunkToQueue(controller,
            // transferredBuffer, byteOffset, byteLength).
            self.enqueue_chunk_to_queue(transferred_buffer, byte_offset, byte_length);

            // Let filledPullIntos be the result of performing
            // ! ReadableByteStreamControllerProcessPullIntoDescriptorsUsingQueue(controller).
            let filled_pull_intos = self.process_pull_into_descriptors_using_queue();

            // For each filledPullInto of filledPullIntos,
            for filled_pull_into in filled_pull_intos {
                // Perform ! ReadableByteStreamControllerCommitPullIntoDescriptor(stream, filledPullInto).
                commit_pull_into_descriptor(&stream, &filled_pull_into);
            }
        } else {
            // Otherwise,
            // Assert: ! IsReadableStreamLocked(stream) is false.
            assert!(!stream.locked());

            // Perform ! ReadableByteStreamControllerEnqueueChunkToQueue(controller,
            // transferredBuffer, byteOffset, byteLength).
            self.enqueue_chunk_to_queue(transferred_buffer, byte_offset, byte_length);
        }

        // Perform ! ReadableByteStreamControllerCallPullIfNeeded(controller).
        self.call_pull_if_needed();
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-enqueue-chunk-to-queue>
    fn enqueue_chunk_to_queue(&self, buffer: ArrayBuffer, byte_offset: usize, byte_length: usize) {
        // Append a new readable byte stream queue entry with buffer buffer, byte offset
        // byteOffset, and byte length byteLength to controller.[[queue]].
        self.queue.borrow_mut().push_back(ReadableByteStreamQueueEntry {
            buffer,
            byte_offset,
            byte_length,
        });

        // Set controller.[[queueTotalSize]] to controller.[[queueTotalSize]] + byteLength.
        self.queue_total_size
            .set(self.queue_total_size.get() + byte_length);
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamcontrollerenqueueclonedchunktoqueue>
    fn enqueue_cloned_chunk_to_queue(
        &self,
        buffer: &ArrayBuffer,
        byte_offset: usize,
        byte_length: usize,
    ) -> ErrorResult {
        // Let cloneResult be CloneArrayBuffer(buffer, byteOffset, byteLength, %ArrayBuffer%).
        match buffer.clone_range(byte_offset, byte_length) {
            Ok(clone) => {
                // Perform ! ReadableByteStreamControllerEnqueueChunkToQueue(controller,
                // cloneResult.[[Value]], 0, byteLength).
                self.enqueue_chunk_to_queue(clone, 0, byte_length);
                Ok(())
            },
            // If cloneResult is an abrupt completion,
            Err(error) => {
                // Perform ! ReadableByteStreamControllerError(controller, cloneResult.[[Value]]).
                self.perform_error(error.clone());

                // Return cloneResult.
                Err(error)
            },
        }
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamcontrollerenqueuedetachedpullintotoqueue>
    fn enqueue_detached_pull_into_to_queue(&self, pull_into_descriptor: &PullIntoDescriptor) -> ErrorResult {
        // Assert: pullIntoDescriptor’s reader type is "none".
        assert_eq!(pull_into_descriptor.reader_type, PullIntoReaderType::None);

        // If pullIntoDescriptor’s bytes filled > 0, perform ?
        // ReadableByteStreamControllerEnqueueClonedChunkToQueue(controller,
        // pullIntoDescriptor’s buffer, pullIntoDescriptor’s byte offset, pullIntoDescriptor’s bytes filled).
        if pull_into_descriptor.bytes_filled > 0 {
            self.enqueue_cloned_chunk_to_queue(
                &pull_into_descriptor.buffer,
                pull_into_descriptor.byte_offset,
                pull_into_descriptor.bytes_filled,
            )?;
        }

        // Perform ! ReadableByteStreamControllerShiftPendingPullInto(controller).
        self.shift_pending_pull_into();
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-error>
    pub(crate) fn perform_error(&self, error: Error) {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // If stream.[[state]] is not "readable", return.
        if !stream.is_readable() {
            return;
        }

        // Perform ! ReadableByteStreamControllerClearPendingPullIntos(controller).
        self.clear_pending_pull_intos();

        // Perform ! ResetQueue(controller).
        self.reset_queue();

        // Perform ! ReadableByteStreamControllerClearAlgorithms(controller).
        self.clear_algorithms();

        // Perform ! ReadableStreamError(stream, e).
        stream.error(error);
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-fill-head-pull-into-descriptor>
    fn fill_head_pull_into_descriptor(&self, size: usize, pull_into_descriptor: &mut PullIntoDescriptor) {
        // Assert: either controller.[[pendingPullIntos]] is empty,
        // or controller.[[pendingPullIntos]][0] is pullIntoDescriptor.
        // Assert: controller.[[byobRequest]] is null.
        assert!(self.byob_request.borrow().is_none());

        // Set pullIntoDescriptor’s bytes filled to bytes filled + size.
        pull_into_descriptor.bytes_filled += size;
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-fill-pull-into-descriptor-from-queue>
    fn fill_pull_into_descriptor_from_queue(&self, pull_into_descriptor: &mut PullIntoDescriptor) -> bool {
        // Let maxBytesToCopy be min(controller.[[queueTotalSize]],
        // pullIntoDescriptor’s byte length − pullIntoDescriptor’s bytes filled).
        let max_bytes_to_copy = min(
            self.queue_total_size.get(),
            pull_into_descriptor.byte_length - pull_into_descriptor.bytes_filled,
        );

        // Let maxBytesFilled be pullIntoDescriptor’s bytes filled + maxBytesToCopy.
        let max_bytes_filled = pull_into_descriptor.bytes_filled + max_bytes_to_copy;

        // Let totalBytesToCopyRemaining be maxBytesToCopy.
        let mut total_bytes_to_copy_remaining = max_bytes_to_copy;

        // Let ready be false.
        let mut ready = false;

        // Assert: ! IsDetachedBuffer(pullIntoDescriptor’s buffer) is false.
        assert!(!pull_into_descriptor.buffer.is_detached());

        // Assert: pullIntoDescriptor’s bytes filled < pullIntoDescriptor’s minimum fill.
        assert!(pull_into_descriptor.bytes_filled < pull_into_descriptor.minimum_fill);

        // Let remainderBytes be the remainder after dividing maxBytesFilled by pullIntoDescriptor’s element size.
        let remainder_bytes = max_bytes_filled % pull_into_descriptor.element_size;

        // Let maxAlignedBytes be maxBytesFilled − remainderBytes.
        let max_aligned_bytes = max_bytes_filled - remainder_bytes;

        // If maxAlignedBytes ≥ pullIntoDescriptor’s minimum fill,
        if max_aligned_bytes >= pull_into_descriptor.minimum_fill {
            // Set totalBytesToCopyRemaining to maxAlignedBytes − pullIntoDescriptor’s bytes filled.
            total_bytes_to_copy_remaining = max_aligned_bytes - pull_into_descriptor.bytes_filled;

            // Set ready to true.
            ready = true;
        }

        // Let queue be controller.[[queue]].
        let mut queue = self.queue.borrow_mut();

        // While totalBytesToCopyRemaining > 0,
        while total_bytes_to_copy_remaining > 0 {
            // Let headOfQueue be queue[0].
            let head_of_queue = queue
                .front_mut()
                .expect("Queue should hold the bytes that remain to be copied");

            // Let bytesToCopy be min(totalBytesToCopyRemaining, headOfQueue’s byte length).
            let bytes_to_copy = min(total_bytes_to_copy_remaining, head_of_queue.byte_length);

            // Let destStart be pullIntoDescriptor’s byte offset + pullIntoDescriptor’s bytes filled.
            let dest_start = pull_into_descriptor.byte_offset + pull_into_descriptor.bytes_filled;

            // Perform ! CopyDataBlockBytes(descriptorBuffer.[[ArrayBufferData]], destStart,
            // queueBuffer.[[ArrayBufferData]], queueByteOffset, bytesToCopy).
            copy_data_block_bytes(
                &pull_into_descriptor.buffer,
                dest_start,
                &head_of_queue.buffer,
                head_of_queue.byte_offset,
                bytes_to_copy,
            );

            if head_of_queue.byte_length == bytes_to_copy {
                // If headOfQueue’s byte length is bytesToCopy, remove queue[0].
                queue.pop_front();
            } else {
                // Otherwise,
                // Set headOfQueue’s byte offset to headOfQueue’s byte offset + bytesToCopy.
                head_of_queue.byte_offset += bytes_to_copy;

                // Set headOfQueue’s byte length to headOfQueue’s byte length − bytesToCopy.
                head_of_queue.byte_length -= bytes_to_copy;
            }

            // Set controller.[[queueTotalSize]] to controller.[[queueTotalSize]] − bytesToCopy.
            self.queue_total_size
                .set(self.queue_total_size.get() - bytes_to_copy);

            // Perform ! ReadableByteStreamControllerFillHeadPullIntoDescriptor(controller,
            // bytesToCopy, pullIntoDescriptor).
            self.fill_head_pull_into_descriptor(bytes_to_copy, pull_into_descriptor);

            // Set totalBytesToCopyRemaining to totalBytesToCopyRemaining − bytesToCopy.
            total_bytes_to_copy_remaining -= bytes_to_copy;
        }

        // If ready is false,
        if !ready {
            // Assert: controller.[[queueTotalSize]] is 0.
            assert_eq!(self.queue_total_size.get(), 0);

            // Assert: pullIntoDescriptor’s bytes filled > 0.
            assert!(pull_into_descriptor.bytes_filled > 0);

            // Assert: pullIntoDescriptor’s bytes filled < pullIntoDescriptor’s minimum fill.
            assert!(pull_into_descriptor.bytes_filled < pull_into_descriptor.minimum_fill);
        }

        // Return ready.
        ready
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamcontrollerfillreadrequestfromqueue>
    fn fill_read_request_from_queue(self: &Rc<Self>, read_request: ReadRequest<ArrayBufferView>) {
        // Assert: controller.[[queueTotalSize]] > 0.
        assert!(self.queue_total_size.get() > 0);

        // Let entry be controller.[[queue]][0].
        // Remove entry from controller.[[queue]].
        let entry = self
            .queue
            .borrow_mut()
            .pop_front()
            .expect("Queue should not be empty when its total size is positive");

        // Set controller.[[queueTotalSize]] to controller.[[queueTotalSize]] − entry’s byte length.
        self.queue_total_size
            .set(self.queue_total_size.get() - entry.byte_length);

        // Perform ! ReadableByteStreamControllerHandleQueueDrain(controller).
        self.handle_queue_drain();

        // Let view be ! Construct(%Uint8Array%, « entry’s buffer, entry’s byte offset, entry’s byte length »).
        let view = ArrayBufferView::from_parts(
            ArrayBufferViewType::Uint8Array,
            entry.buffer,
            entry.byte_offset,
            entry.byte_length,
        );

        // Perform readRequest’s chunk steps, given view.
        read_request.chunk_steps(view);
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamcontrollergetbyobrequest>
    pub(crate) fn get_byob_request(self: &Rc<Self>) -> Option<Rc<ReadableStreamBYOBRequest>> {
        // If controller.[[byobRequest]] is null and controller.[[pendingPullIntos]] is not empty,
        if self.byob_request.borrow().is_none() {
            // Let firstDescriptor be controller.[[pendingPullIntos]][0].
            // Let view be ! Construct(%Uint8Array%, « firstDescriptor’s buffer,
            // firstDescriptor’s byte offset + firstDescriptor’s bytes filled,
            // firstDescriptor’s byte length − firstDescriptor’s bytes filled »).
            let view = self.pending_pull_intos.borrow().front().map(|first| {
                ArrayBufferView::from_parts(
                    ArrayBufferViewType::Uint8Array,
                    first.buffer.clone(),
                    first.byte_offset + first.bytes_filled,
                    first.byte_length - first.bytes_filled,
                )
            });

            if let Some(view) = view {
                // Let byobRequest be a new ReadableStreamBYOBRequest.
                // Set byobRequest.[[controller]] to controller.
                // Set byobRequest.[[view]] to view.
                let byob_request = ReadableStreamBYOBRequest::new(self.clone(), view);

                // Set controller.[[byobRequest]] to byobRequest.
                *self.byob_request.borrow_mut() = Some(byob_request);
            }
        }

        // Return controller.[[byobRequest]].
        self.byob_request.borrow().clone()
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-get-desired-size>
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
                Some(self.strategy_hwm - self.queue_total_size.get() as f64)
            },
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-handle-queue-drain>
    fn handle_queue_drain(self: &Rc<Self>) {
        // Assert: controller.[[stream]].[[state]] is "readable".
        let Some(stream) = self.stream() else {
            return;
        };
        assert!(stream.is_readable());

        // If controller.[[queueTotalSize]] is 0 and controller.[[closeRequested]] is true,
        if self.queue_total_size.get() == 0 && self.close_requested.get() {
            // Perform ! ReadableByteStreamControllerClearAlgorithms(controller).
            self.clear_algorithms();

            // Perform ! ReadableStreamClose(controller.[[stream]]).
            stream.close();
        } else {
            // Otherwise,
            // Perform ! ReadableByteStreamControllerCallPullIfNeeded(controller).
            self.call_pull_if_needed();
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-invalidate-byob-request>
    fn invalidate_byob_request(&self) {
        // If controller.[[byobRequest]] is null, return.
        // Set controller.[[byobRequest]] to null.
        let byob_request = self.byob_request.borrow_mut().take();

        // Set controller.[[byobRequest]].[[controller]] to undefined.
        // Set controller.[[byobRequest]].[[view]] to null.
        if let Some(byob_request) = byob_request {
            byob_request.invalidate();
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-process-pull-into-descriptors-using-queue>
    fn process_pull_into_descriptors_using_queue(&self) -> Vec<PullIntoDescriptor> {
        // Assert: controller.[[closeRequested]] is false.
        assert!(!self.close_requested.get());

        // Let filledPullIntos be a new empty list.
        let mut filled_pull_intos = Vec::new();

        // While controller.[[pendingPullIntos]] is not empty,
        loop {
            // If controller.[[queueTotalSize]] is 0, then break.
            if self.queue_total_size.get() == 0 {
                break;
            }

            // Let pullIntoDescriptor be controller.[[pendingPullIntos]][0].
            // If ! ReadableByteStreamControllerFillPullIntoDescriptorFromQueue(controller,
            // pullIntoDescriptor) is true,
            let ready = {
                let mut pending_pull_intos = self.pending_pull_intos.borrow_mut();
                let Some(pull_into_descriptor) = pending_pull_intos.front_mut() else {
                    break;
                };
                self.fill_pull_into_descriptor_from_queue(pull_into_descriptor)
            };

            if ready {
                // Perform ! ReadableByteStreamControllerShiftPendingPullInto(controller).
                // Append pullIntoDescriptor to filledPullIntos.
                filled_pull_intos.push(self.shift_pending_pull_into());
            }
        }

        // Return filledPullIntos.
        filled_pull_intos
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamcontrollerprocessreadrequestsusingqueue>
    fn process_read_requests_using_queue(self: &Rc<Self>, stream: &ReadableStream<ArrayBufferView>) {
        // Let reader be controller.[[stream]].[[reader]].
        // Assert: reader implements ReadableStreamDefaultReader.
        let Some(ReaderType::Default(reader)) = stream.reader() else {
            unreachable!("Stream should be locked to a default reader.");
        };

        // While reader.[[readRequests]] is not empty,
        while reader.get_num_read_requests() > 0 {
            // If controller.[[queueTotalSize]] is 0, return.
            if self.queue_total_size.get() == 0 {
                return;
            }

            // Let readRequest be reader.[[readRequests]][0].
            // Remove readRequest from reader.[[readRequests]].
            let Some(read_request) = reader.remove_first_read_request() else {
                return;
            };

            // Perform ! ReadableByteStreamControllerFillReadRequestFromQueue(controller, readRequest).
            self.fill_read_request_from_queue(read_request);
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-pull-into>
    pub(crate) fn pull_into(
        self: &Rc<Self>,
        view: ArrayBufferView,
        min: usize,
        read_into_request: ReadIntoRequest,
    ) {
        // Let stream be controller.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // Let elementSize be 1.
        // Let ctor be %DataView%.
        // If view has a [[TypedArrayName]] internal slot (i.e., it is not a DataView),
        // Set elementSize to the element size specified in the typed array constructors table
        // for view.[[TypedArrayName]].
        // Set ctor to the constructor specified in the typed array constructors table
        // for view.[[TypedArrayName]].
        let element_size = view.element_size();
        let view_constructor = view.view_type();

        // Let minimumFill be min × elementSize.
        let minimum_fill = min * element_size;

        // Assert: minimumFill ≥ 0 and minimumFill ≤ view.[[ByteLength]].
        assert!(minimum_fill <= view.byte_length());

        // Assert: the remainder after dividing minimumFill by elementSize is 0.
        assert_eq!(minimum_fill % element_size, 0);

        // Let byteOffset be view.[[ByteOffset]].
        let byte_offset = view.byte_offset();

        // Let byteLength be view.[[ByteLength]].
        let byte_length = view.byte_length();

        // Let bufferResult be TransferArrayBuffer(view.[[ViewedArrayBuffer]]).
        let buffer = match view.buffer().transfer() {
            Ok(buffer) => buffer,
            // If bufferResult is an abrupt completion,
            Err(error) => {
                // Perform readIntoRequest’s error steps, given bufferResult.[[Value]].
                read_into_request.error_steps(error);

                // Return.
                return;
            },
        };

        // Let pullIntoDescriptor be a new pull-into descriptor with ...
        let mut pull_into_descriptor = PullIntoDescriptor {
            buffer_byte_length: buffer.byte_length(),
            buffer,
            byte_offset,
            byte_length,
            bytes_filled: 0,
            minimum_fill,
            element_size,
            view_constructor,
            reader_type: PullIntoReaderType::Byob,
        };

        // If controller.[[pendingPullIntos]] is not empty,
        let has_pending_pull_intos = !self.pending_pull_intos.borrow().is_empty();
        if has_pending_pull_intos {
            // Append pullIntoDescriptor to controller.[[pendingPullIntos]].
            self.pending_pull_intos
                .borrow_mut()
                .push_back(pull_into_descriptor);

            // Perform ! ReadableStreamAddReadIntoRequest(stream, readIntoRequest).
            stream.add_read_into_request(read_into_request);

            // Return.
            return;
        }

        // If stream.[[state]] is "closed",
        if stream.is_closed() {
            // Let emptyView be ! Construct(ctor, « pullIntoDescriptor’s buffer,
            // pullIntoDescriptor’s byte offset, 0 »).
            let empty_view = ArrayBufferView::from_parts(
                view_constructor,
                pull_into_descriptor.buffer,
                pull_into_descriptor.byte_offset,
                0,
            );

            // Perform readIntoRequest’s close steps, given emptyView.
            read_into_request.close_steps(Some(empty_view));

            // Return.
            return;
        }

        // If controller.[[queueTotalSize]] > 0,
        if self.queue_total_size.get() > 0 {
            // If ! ReadableByteStreamControllerFillPullIntoDescriptorFromQueue(controller,
            // pullIntoDescriptor) is true,
            if self.fill_pull_into_descriptor_from_queue(&mut pull_into_descriptor) {
                // Let filledView be ! ReadableByteStreamControllerConvertPullIntoDescriptor(pullIntoDescriptor).
                let filled_view = convert_pull_into_descriptor(&pull_into_descriptor);

                // Perform ! ReadableByteStreamControllerHandleQueueDrain(controller).
                self.handle_queue_drain();

                // Perform readIntoRequest’s chunk steps, given filledView.
                read_into_request.chunk_steps(filled_view);

                // Return.
                return;
            }

            // If controller.[[closeRequested]] is true,
            if self.close_requested.get() {
                // Let e be a TypeError exception.
                let error = Error::Type("Insufficient bytes to fill elements in the given buffer".into());

                // Perform ! ReadableByteStreamControllerError(controller, e).
                self.perform_error(error.clone());

                // Perform readIntoRequest’s error steps, given e.
                read_into_request.error_steps(error);

                // Return.
                return;
            }
        }

        // Append pullIntoDescriptor to controller.[[pendingPullIntos]].
        self.pending_pull_intos
            .borrow_mut()
            .push_back(pull_into_descriptor);

        // Perform ! ReadableStreamAddReadIntoRequest(stream, readIntoRequest).
        stream.add_read_into_request(read_into_request);

        // Perform ! ReadableByteStreamControllerCallPullIfNeeded(controller).
        self.call_pull_if_needed();
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-respond>
    pub(crate) fn respond(self: &Rc<Self>, bytes_written: usize) -> ErrorResult {
        let Some(stream) = self.stream() else {
            return Err(Error::Type("Stream no longer exists".into()));
        };

        // Assert: controller.[[pendingPullIntos]] is not empty.
        // Let firstDescriptor be controller.[[pendingPullIntos]][0].
        let (bytes_filled, byte_length) = {
            let pending_pull_intos = self.pending_pull_intos.borrow();
            let first_descriptor = pending_pull_intos
                .front()
                .expect("Pending pull-intos should not be empty");
            (first_descriptor.bytes_filled, first_descriptor.byte_length)
        };

        // Let state be controller.[[stream]].[[state]].
        if stream.is_closed() {
            // If state is "closed",
            // If bytesWritten is not 0, throw a TypeError exception.
            if bytes_written != 0 {
                return Err(Error::Type(
                    "bytesWritten must be 0 when calling respond() on a closed stream".into(),
                ));
            }
        } else {
            // Otherwise,
            // Assert: state is "readable".
            assert!(stream.is_readable());

            // If bytesWritten is 0, throw a TypeError exception.
            if bytes_written == 0 {
                return Err(Error::Type(
                    "bytesWritten must be greater than 0 when calling respond() on a readable stream"
                        .into(),
                ));
            }

            // If firstDescriptor’s bytes filled + bytesWritten > firstDescriptor’s byte length,
            // throw a RangeError exception.
            if bytes_filled + bytes_written > byte_length {
                return Err(Error::Range("bytesWritten out of range".into()));
            }
        }

        // Set firstDescriptor’s buffer to ! TransferArrayBuffer(firstDescriptor’s buffer).
        {
            let mut pending_pull_intos = self.pending_pull_intos.borrow_mut();
            let first_descriptor = pending_pull_intos
                .front_mut()
                .expect("Pending pull-intos should not be empty");
            first_descriptor.buffer = first_descriptor.buffer.transfer()?;
        }

        // Perform ? ReadableByteStreamControllerRespondInternal(controller, bytesWritten).
        self.respond_internal(bytes_written)
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-respond-in-closed-state>
    fn respond_in_closed_state(&self, stream: &ReadableStream<ArrayBufferView>) {
        let reader_type = {
            let pending_pull_intos = self.pending_pull_intos.borrow();
            let first_descriptor = pending_pull_intos
                .front()
                .expect("Pending pull-intos should not be empty");

            // Assert: the remainder after dividing firstDescriptor’s bytes filled
            // by firstDescriptor’s element size is 0.
            assert_eq!(first_descriptor.bytes_filled % first_descriptor.element_size, 0);
            first_descriptor.reader_type
        };

        // If firstDescriptor’s reader type is "none",
        // perform ! ReadableByteStreamControllerShiftPendingPullInto(controller).
        if reader_type == PullIntoReaderType::None {
            self.shift_pending_pull_into();
        }

        // If ! ReadableStreamHasBYOBReader(stream) is true,
        if stream.has_byob_reader() {
            // While ! ReadableStreamGetNumReadIntoRequests(stream) > 0,
            while stream.get_num_read_into_requests() > 0 {
                // Let pullIntoDescriptor be ! ReadableByteStreamControllerShiftPendingPullInto(controller).
                let pull_into_descriptor = self.shift_pending_pull_into();

                // Perform ! ReadableByteStreamControllerCommitPullIntoDescriptor(stream, pullIntoDescriptor).
                commit_pull_into_descriptor(stream, &pull_into_descriptor);
            }
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-respond-in-readable-state>
    fn respond_in_readable_state(
        &self,
        stream: &ReadableStream<ArrayBufferView>,
        bytes_written: usize,
    ) -> ErrorResult {
        let first_descriptor = {
            let mut pending_pull_intos = self.pending_pull_intos.borrow_mut();
            let pull_into_descriptor = pending_pull_intos
                .front_mut()
                .expect("Pending pull-intos should not be empty");

            // Assert: pullIntoDescriptor’s bytes filled + bytesWritten ≤ pullIntoDescriptor’s byte length.
            assert!(pull_into_descriptor.bytes_filled + bytes_written <= pull_into_descriptor.byte_length);

            // Perform ! ReadableByteStreamControllerFillHeadPullIntoDescriptor(controller,
            // bytesWritten, pullIntoDescriptor).
            self.fill_head_pull_into_descriptor(bytes_written, pull_into_descriptor);
            pull_into_descriptor.clone()
        };

        // If pullIntoDescriptor’s reader type is "none",
        if first_descriptor.reader_type == PullIntoReaderType::None {
            // Perform ? ReadableByteStreamControllerEnqueueDetachedPullIntoToQueue(controller, pullIntoDescriptor).
            self.enqueue_detached_pull_into_to_queue(&first_descriptor)?;

            // Let filledPullIntos be the result of performing
            // ! ReadableByteStreamControllerProcessPullIntoDescriptorsUsingQueue(controller).
            let filled_pull_intos = self.process_pull_into_descriptors_using_queue();

            // For each filledPullInto of filledPullIntos,
            for filled_pull_into in filled_pull_intos {
                // Perform ! ReadableByteStreamControllerCommitPullIntoDescriptor(controller.[[stream]], filledPullInto).
                commit_pull_into_descriptor(stream, &filled_pull_into);
            }

            // Return.
            return Ok(());
        }

        // If pullIntoDescriptor’s bytes filled < pullIntoDescriptor’s minimum fill, return.
        if first_descriptor.bytes_filled < first_descriptor.minimum_fill {
            return Ok(());
        }

        // Perform ! ReadableByteStreamControllerShiftPendingPullInto(controller).
        let mut pull_into_descriptor = self.shift_pending_pull_into();

        // Let remainderSize be the remainder after dividing pullIntoDescriptor’s bytes filled
        // by pullIntoDescriptor’s element size.
        let remainder_size = pull_into_descriptor.bytes_filled % pull_into_descriptor.element_size;

        // If remainderSize > 0,
        if remainder_size > 0 {
            // Let end be pullIntoDescriptor’s byte offset + pullIntoDescriptor’s bytes filled.
            let end = pull_into_descriptor.byte_offset + pull_into_descriptor.bytes_filled;

            // Perform ? ReadableByteStreamControllerEnqueueClonedChunkToQueue(controller,
            // pullIntoDescriptor’s buffer, end − remainderSize, remainderSize).
            self.enqueue_cloned_chunk_to_queue(
                &pull_into_descriptor.buffer,
                end - remainder_size,
                remainder_size,
            )?;
        }

        // Set pullIntoDescriptor’s bytes filled to pullIntoDescriptor’s bytes filled − remainderSize.
        pull_into_descriptor.bytes_filled -= remainder_size;

        // Let filledPullIntos be the result of performing
        // ! ReadableByteStreamControllerProcessPullIntoDescriptorsUsingQueue(controller).
        let filled_pull_intos = self.process_pull_into_descriptors_using_queue();

        // Perform ! ReadableByteStreamControllerCommitPullIntoDescriptor(controller.[[stream]], pullIntoDescriptor).
        commit_pull_into_descriptor(stream, &pull_into_descriptor);

        // For each filledPullInto of filledPullIntos,
        for filled_pull_into in filled_pull_intos {
            // Perform ! ReadableByteStreamControllerCommitPullIntoDescriptor(controller.[[stream]], filledPullInto).
            commit_pull_into_descriptor(stream, &filled_pull_into);
        }
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-respond-internal>
    fn respond_internal(self: &Rc<Self>, bytes_written: usize) -> ErrorResult {
        let Some(stream) = self.stream() else {
            return Ok(());
        };

        // Let firstDescriptor be controller.[[pendingPullIntos]][0].
        // Assert: ! CanTransferArrayBuffer(firstDescriptor’s buffer) is true.
        assert!(
            self.pending_pull_intos
                .borrow()
                .front()
                .is_some_and(|first| first.buffer.can_transfer())
        );

        // Perform ! ReadableByteStreamControllerInvalidateBYOBRequest(controller).
        self.invalidate_byob_request();

        // Let state be controller.[[stream]].[[state]].
        if stream.is_closed() {
            // If state is "closed",
            // Assert: bytesWritten is 0.
            assert_eq!(bytes_written, 0);

            // Perform ! ReadableByteStreamControllerRespondInClosedState(controller, firstDescriptor).
            self.respond_in_closed_state(&stream);
        } else {
            // Otherwise,
            // Assert: state is "readable".
            assert!(stream.is_readable());

            // Assert: bytesWritten > 0.
            assert!(bytes_written > 0);

            // Perform ? ReadableByteStreamControllerRespondInReadableState(controller,
            // bytesWritten, firstDescriptor).
            self.respond_in_readable_state(&stream, bytes_written)?;
        }

        // Perform ! ReadableByteStreamControllerCallPullIfNeeded(controller).
        self.call_pull_if_needed();
        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-respond-with-new-view>
    pub(crate) fn respond_with_new_view(self: &Rc<Self>, view: ArrayBufferView) -> ErrorResult {
        let Some(stream) = self.stream() else {
            return Err(Error::Type("Stream no longer exists".into()));
        };

        // Assert: controller.[[pendingPullIntos]] is not empty.
        // Assert: ! IsDetachedBuffer(view.[[ViewedArrayBuffer]]) is false.
        assert!(!view.buffer().is_detached());

        // Let firstDescriptor be controller.[[pendingPullIntos]][0].
        let (byte_offset, bytes_filled, byte_length, buffer_byte_length) = {
            let pending_pull_intos = self.pending_pull_intos.borrow();
            let first_descriptor = pending_pull_intos
                .front()
                .expect("Pending pull-intos should not be empty");
            (
                first_descriptor.byte_offset,
                first_descriptor.bytes_filled,
                first_descriptor.byte_length,
                first_descriptor.buffer_byte_length,
            )
        };

        // Let state be controller.[[stream]].[[state]].
        if stream.is_closed() {
            // If state is "closed",
            // If view.[[ByteLength]] is not 0, throw a TypeError exception.
            if view.byte_length() != 0 {
                return Err(Error::Type(
                    "The view's length must be 0 when calling respondWithNewView() on a closed stream"
                        .into(),
                ));
            }
        } else {
            // Otherwise,
            // Assert: state is "readable".
            assert!(stream.is_readable());

            // If view.[[ByteLength]] is 0, throw a TypeError exception.
            if view.byte_length() == 0 {
                return Err(Error::Type(
                    "The view's length must be greater than 0 when calling respondWithNewView() on a readable stream"
                        .into(),
                ));
            }
        }

        // If firstDescriptor’s byte offset + firstDescriptor’s bytes filled
        // is not view.[[ByteOffset]], throw a RangeError exception.
        if byte_offset + bytes_filled != view.byte_offset() {
            return Err(Error::Range(
                "The region specified by view does not match byobRequest".into(),
            ));
        }

        // If firstDescriptor’s buffer byte length is not view.[[ViewedArrayBuffer]].[[ByteLength]],
        // throw a RangeError exception.
        if buffer_byte_length != view.buffer().byte_length() {
            return Err(Error::Range(
                "The buffer of view has different capacity than byobRequest".into(),
            ));
        }

        // If firstDescriptor’s bytes filled + view.[[ByteLength]] > firstDescriptor’s byte length,
        // throw a RangeError exception.
        if bytes_filled + view.byte_length() > byte_length {
            return Err(Error::Range(
                "The region specified by view is larger than byobRequest".into(),
            ));
        }

        // Let viewByteLength be view.[[ByteLength]].
        let view_byte_length = view.byte_length();

        // Set firstDescriptor’s buffer to ? TransferArrayBuffer(view.[[ViewedArrayBuffer]]).
        let transferred = view.buffer().transfer()?;
        if let Some(first_descriptor) = self.pending_pull_intos.borrow_mut().front_mut() {
            first_descriptor.buffer = transferred;
        }

        // Perform ? ReadableByteStreamControllerRespondInternal(controller, viewByteLength).
        self.respond_internal(view_byte_length)
    }

    /// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-shift-pending-pull-into>
    fn shift_pending_pull_into(&self) -> PullIntoDescriptor {
        // Assert: controller.[[byobRequest]] is null.
        assert!(self.byob_request.borrow().is_none());

        // Let descriptor be controller.[[pendingPullIntos]][0].
        // Remove descriptor from controller.[[pendingPullIntos]].
        // Return descriptor.
        self.pending_pull_intos
            .borrow_mut()
            .pop_front()
            .expect("Pending pull-intos should not be empty")
    }

    /// <https://streams.spec.whatwg.org/#rbs-controller-byob-request>
    pub fn byob_request(self: &Rc<Self>) -> Option<Rc<ReadableStreamBYOBRequest>> {
        // Return ! ReadableByteStreamControllerGetBYOBRequest(this).
        self.get_byob_request()
    }

    /// <https://streams.spec.whatwg.org/#rbs-controller-desired-size>
    pub fn desired_size(&self) -> Option<f64> {
        // Return ! ReadableByteStreamControllerGetDesiredSize(this).
        self.get_desired_size()
    }

    /// <https://streams.spec.whatwg.org/#rbs-controller-close>
    pub fn close(&self) -> ErrorResult {
        // If this.[[closeRequested]] is true, throw a TypeError exception.
        if self.close_requested.get() {
            return Err(Error::Type("closeRequested is already true".into()));
        }

        // If this.[[stream]].[[state]] is not "readable", throw a TypeError exception.
        if !self.stream_is_readable() {
            return Err(Error::Type("Stream is not readable".into()));
        }

        // Perform ? ReadableByteStreamControllerClose(this).
        self.perform_close()
    }

    /// <https://streams.spec.whatwg.org/#rbs-controller-enqueue>
    pub fn enqueue(self: &Rc<Self>, chunk: ArrayBufferView) -> ErrorResult {
        // If chunk.[[ByteLength]] is 0, throw a TypeError exception.
        if chunk.byte_length() == 0 {
            return Err(Error::Type("chunk.byteLength must be greater than 0".into()));
        }

        // If chunk.[[ViewedArrayBuffer]].[[ByteLength]] is 0, throw a TypeError exception.
        if chunk.buffer().byte_length() == 0 {
            return Err(Error::Type("chunk's buffer byteLength must be greater than 0".into()));
        }

        // If this.[[closeRequested]] is true, throw a TypeError exception.
        if self.close_requested.get() {
            return Err(Error::Type("closeRequested is already true".into()));
        }

        // If this.[[stream]].[[state]] is not "readable", throw a TypeError exception.
        if !self.stream_is_readable() {
            return Err(Error::Type("Stream is not readable".into()));
        }

        // Return ? ReadableByteStreamControllerEnqueue(this, chunk).
        self.perform_enqueue(chunk)
    }

    /// <https://streams.spec.whatwg.org/#rbs-controller-error>
    pub fn error(&self, error: Error) {
        // Perform ! ReadableByteStreamControllerError(this, e).
        self.perform_error(error);
    }
}

/// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-commit-pull-into-descriptor>
fn commit_pull_into_descriptor(
    stream: &ReadableStream<ArrayBufferView>,
    pull_into_descriptor: &PullIntoDescriptor,
) {
    // Assert: stream.[[state]] is not "errored".
    assert!(!stream.is_errored());

    // Assert: pullIntoDescriptor.reader type is not "none".
    assert_ne!(pull_into_descriptor.reader_type, PullIntoReaderType::None);

    // Let done be false.
    let mut done = false;

    // If stream.[[state]] is "closed",
    if stream.is_closed() {
        // Assert: the remainder after dividing pullIntoDescriptor’s bytes filled
        // by pullIntoDescriptor’s element size is 0.
        assert_eq!(
            pull_into_descriptor.bytes_filled % pull_into_descriptor.element_size,
            0
        );

        // Set done to true.
        done = true;
    }

    // Let filledView be ! ReadableByteStreamControllerConvertPullIntoDescriptor(pullIntoDescriptor).
    let filled_view = convert_pull_into_descriptor(pull_into_descriptor);

    if pull_into_descriptor.reader_type == PullIntoReaderType::Default {
        // If pullIntoDescriptor’s reader type is "default",
        // Perform ! ReadableStreamFulfillReadRequest(stream, filledView, done).
        stream.fulfill_read_request(filled_view, done);
    } else {
        // Otherwise,
        // Assert: pullIntoDescriptor’s reader type is "byob".
        // Perform ! ReadableStreamFulfillReadIntoRequest(stream, filledView, done).
        stream.fulfill_read_into_request(filled_view, done);
    }
}

/// <https://streams.spec.whatwg.org/#readable-byte-stream-controller-convert-pull-into-descriptor>
fn convert_pull_into_descriptor(pull_into_descriptor: &PullIntoDescriptor) -> ArrayBufferView {
    // Let bytesFilled be pullIntoDescriptor’s bytes filled.
    let bytes_filled = pull_into_descriptor.bytes_filled;

    // Let elementSize be pullIntoDescriptor’s element size.
    let element_size = pull_into_descriptor.element_size;

    // Assert: bytesFilled ≤ pullIntoDescriptor’s byte length.
    assert!(bytes_filled <= pull_into_descriptor.byte_length);

    // Assert: the remainder after dividing bytesFilled by elementSize is 0.
    assert_eq!(bytes_filled % element_size, 0);

    // Let buffer be ! TransferArrayBuffer(pullIntoDescriptor’s buffer).
    let buffer = pull_into_descriptor
        .buffer
        .transfer()
        .expect("Pull-into descriptor's buffer should be transferable");

    // Return ! Construct(pullIntoDescriptor’s view constructor,
    // « buffer, pullIntoDescriptor’s byte offset, bytesFilled ÷ elementSize »).
    ArrayBufferView::from_parts(
        pull_into_descriptor.view_constructor,
        buffer,
        pull_into_descriptor.byte_offset,
        bytes_filled,
    )
}

impl ReadableStreamController<ArrayBufferView> for ReadableByteStreamController {
    /// <https://streams.spec.whatwg.org/#rbs-controller-private-cancel>
    fn cancel_steps(self: Rc<Self>, reason: Error) -> Promise<()> {
        // Perform ! ReadableByteStreamControllerClearPendingPullIntos(this).
        self.clear_pending_pull_intos();

        // Perform ! ResetQueue(this).
        self.reset_queue();

        // Let result be the result of performing this.[[cancelAlgorithm]], passing in reason.
        let result = self
            .underlying_source
            .call_promise_or_defer(|source| source.cancel(reason));

        // Perform ! ReadableByteStreamControllerClearAlgorithms(this).
        self.clear_algorithms();

        // Return result.
        result
    }

    /// <https://streams.spec.whatwg.org/#rbs-controller-private-pull>
    fn pull_steps(self: Rc<Self>, read_request: ReadRequest<ArrayBufferView>) {
        // Let stream be this.[[stream]].
        let Some(stream) = self.stream() else {
            return;
        };

        // Assert: ! ReadableStreamHasDefaultReader(stream) is true.
        assert!(stream.has_default_reader());

        // If this.[[queueTotalSize]] > 0,
        if self.queue_total_size.get() > 0 {
            // Assert: ! ReadableStreamGetNumReadRequests(stream) is 0.
            assert_eq!(stream.get_num_read_requests(), 0);

            // Perform ! ReadableByteStreamControllerFillReadRequestFromQueue(this, readRequest).
            self.fill_read_request_from_queue(read_request);

            // Return.
            return;
        }

        // Let autoAllocateChunkSize be this.[[autoAllocateChunkSize]].
        // If autoAllocateChunkSize is not undefined,
        if let Some(auto_allocate_chunk_size) = self.auto_allocate_chunk_size {
            let Ok(byte_length) = usize::try_from(auto_allocate_chunk_size) else {
                // If buffer is an abrupt completion,
                // Perform readRequest’s error steps, given buffer.[[Value]].
                read_request.error_steps(Error::Range("Array buffer allocation failed".into()));

                // Return.
                return;
            };

            // Let buffer be Construct(%ArrayBuffer%, « autoAllocateChunkSize »).
            let buffer = ArrayBuffer::new(byte_length);

            // Let pullIntoDescriptor be a new pull-into descriptor with ...
            let pull_into_descriptor = PullIntoDescriptor {
                buffer,
                buffer_byte_length: byte_length,
                byte_offset: 0,
                byte_length,
                bytes_filled: 0,
                minimum_fill: 1,
                element_size: 1,
                view_constructor: ArrayBufferViewType::Uint8Array,
                reader_type: PullIntoReaderType::Default,
            };

            // Append pullIntoDescriptor to this.[[pendingPullIntos]].
            self.pending_pull_intos
                .borrow_mut()
                .push_back(pull_into_descriptor);
        }

        // Perform ! ReadableStreamAddReadRequest(stream, readRequest).
        stream.add_read_request(read_request);

        // Perform ! ReadableByteStreamControllerCallPullIfNeeded(this).
        self.call_pull_if_needed();
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamcontroller-releasesteps>
    fn release_steps(self: Rc<Self>) {
        let mut pending_pull_intos = self.pending_pull_intos.borrow_mut();

        // If this.[[pendingPullIntos]] is not empty,
        if let Some(mut first_pending_pull_into) = pending_pull_intos.pop_front() {
            // Set firstPendingPullInto’s reader type to "none".
            first_pending_pull_into.reader_type = PullIntoReaderType::None;

            // Set this.[[pendingPullIntos]] to the list « firstPendingPullInto ».
            pending_pull_intos.clear();
            pending_pull_intos.push_back(first_pending_pull_into);
        }
    }

    fn tee(
        self: Rc<Self>,
    ) -> Fallible<(Rc<ReadableStream<ArrayBufferView>>, Rc<ReadableStream<ArrayBufferView>>)> {
        let Some(stream) = self.stream() else {
            unreachable!("Teeing a stream that no longer exists.");
        };
        readable_byte_stream_tee(&stream)
    }

    fn as_byte_controller(self: Rc<Self>) -> Option<Rc<ReadableByteStreamController>> {
        Some(self)
    }
}
