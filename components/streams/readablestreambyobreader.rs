/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use crate::error::{Error, Fallible};
use crate::promise::Promise;
use crate::readablestream::{ReadableStream, ReaderType};
use crate::readablestreamdefaultreader::ReadableStreamReadResult;
use crate::readablestreamgenericreader::ReadableStreamGenericReader;
use crate::typedarray::ArrayBufferView;

/// The steps of a read-into request issued from within the crate, such as by a byte tee.
pub(crate) trait ReadIntoRequestSteps {
    /// <https://streams.spec.whatwg.org/#read-into-request-chunk-steps>
    fn chunk_steps(&self, chunk: ArrayBufferView);
    /// <https://streams.spec.whatwg.org/#read-into-request-close-steps>
    fn close_steps(&self, chunk: Option<ArrayBufferView>);
    /// <https://streams.spec.whatwg.org/#read-into-request-error-steps>
    fn error_steps(&self, error: Error);
}

/// <https://streams.spec.whatwg.org/#read-into-request>
pub(crate) enum ReadIntoRequest {
    /// <https://streams.spec.whatwg.org/#byob-reader-read>
    Read(Promise<ReadableStreamReadResult<ArrayBufferView>>),
    Steps(Box<dyn ReadIntoRequestSteps>),
}

impl ReadIntoRequest {
    /// <https://streams.spec.whatwg.org/#read-into-request-chunk-steps>
    pub(crate) fn chunk_steps(&self, chunk: ArrayBufferView) {
        match self {
            // Resolve promise with «[ "value" → chunk, "done" → false ]».
            ReadIntoRequest::Read(promise) => {
                promise.resolve_native(ReadableStreamReadResult::chunk(chunk))
            },
            ReadIntoRequest::Steps(steps) => steps.chunk_steps(chunk),
        }
    }

    /// <https://streams.spec.whatwg.org/#read-into-request-close-steps>
    pub(crate) fn close_steps(&self, chunk: Option<ArrayBufferView>) {
        match self {
            // Resolve promise with «[ "value" → chunk, "done" → true ]».
            ReadIntoRequest::Read(promise) => promise.resolve_native(ReadableStreamReadResult {
                value: chunk,
                done: true,
            }),
            ReadIntoRequest::Steps(steps) => steps.close_steps(chunk),
        }
    }

    /// <https://streams.spec.whatwg.org/#read-into-request-error-steps>
    pub(crate) fn error_steps(&self, error: Error) {
        match self {
            // Reject promise with e.
            ReadIntoRequest::Read(promise) => promise.reject_error(error),
            ReadIntoRequest::Steps(steps) => steps.error_steps(error),
        }
    }
}

/// <https://streams.spec.whatwg.org/#readablestreambyobreader>
pub struct ReadableStreamBYOBReader {
    generic: ReadableStreamGenericReader<ArrayBufferView>,

    /// <https://streams.spec.whatwg.org/#readablestreambyobreader-readintorequests>
    read_into_requests: RefCell<VecDeque<ReadIntoRequest>>,
}

impl ReadableStreamBYOBReader {
    /// <https://streams.spec.whatwg.org/#byob-reader-constructor>
    pub fn new(
        stream: &Rc<ReadableStream<ArrayBufferView>>,
    ) -> Fallible<Rc<ReadableStreamBYOBReader>> {
        let reader = Rc::new(ReadableStreamBYOBReader {
            generic: ReadableStreamGenericReader::new(),
            read_into_requests: RefCell::new(VecDeque::new()),
        });

        // Perform ? SetUpReadableStreamBYOBReader(this, stream).
        reader.set_up(stream)?;
        Ok(reader)
    }

    /// <https://streams.spec.whatwg.org/#set-up-readable-stream-byob-reader>
    fn set_up(self: &Rc<Self>, stream: &Rc<ReadableStream<ArrayBufferView>>) -> Fallible<()> {
        // If ! IsReadableStreamLocked(stream) is true, throw a TypeError exception.
        if stream.locked() {
            return Err(Error::Type("stream is locked".into()));
        }

        // If stream.[[controller]] does not implement ReadableByteStreamController, throw a TypeError exception.
        if stream.byte_controller().is_none() {
            return Err(Error::Type(
                "Cannot get a BYOB reader for a stream that is not a byte stream".into(),
            ));
        }

        // Perform ! ReadableStreamReaderGenericInitialize(reader, stream).
        self.generic.generic_initialize(stream);
        stream.set_reader(Some(ReaderType::BYOB(self.clone())));

        // Set reader.[[readIntoRequests]] to a new empty list.
        self.read_into_requests.borrow_mut().clear();
        Ok(())
    }

    pub(crate) fn generic(&self) -> &ReadableStreamGenericReader<ArrayBufferView> {
        &self.generic
    }

    pub(crate) fn add_read_into_request(&self, read_into_request: ReadIntoRequest) {
        self.read_into_requests.borrow_mut().push_back(read_into_request);
    }

    pub(crate) fn get_num_read_into_requests(&self) -> usize {
        self.read_into_requests.borrow().len()
    }

    pub(crate) fn remove_first_read_into_request(&self) -> Option<ReadIntoRequest> {
        self.read_into_requests.borrow_mut().pop_front()
    }

    pub(crate) fn take_read_into_requests(&self) -> VecDeque<ReadIntoRequest> {
        mem::take(&mut *self.read_into_requests.borrow_mut())
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreambyobreadererrorreadintorequests>
    pub(crate) fn error_read_into_requests(&self, error: Error) {
        // Let readIntoRequests be reader.[[readIntoRequests]].
        // Set reader.[[readIntoRequests]] to a new empty list.
        let read_into_requests = self.take_read_into_requests();

        // For each readIntoRequest of readIntoRequests,
        for request in read_into_requests {
            // Perform readIntoRequest’s error steps, given e.
            request.error_steps(error.clone());
        }
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreambyobreaderrelease>
    pub(crate) fn release(&self) {
        // Perform ! ReadableStreamReaderGenericRelease(reader).
        self.generic.generic_release();

        // Let e be a new TypeError exception.
        let error = Error::Type("Reader is released".into());

        // Perform ! ReadableStreamBYOBReaderErrorReadIntoRequests(reader, e).
        self.error_read_into_requests(error);
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-byob-reader-read>
    pub(crate) fn read_with_request(
        &self,
        view: ArrayBufferView,
        min: usize,
        read_into_request: ReadIntoRequest,
    ) {
        // Let stream be reader.[[stream]].
        // Assert: stream is not undefined.
        let Some(stream) = self.generic.stream() else {
            unreachable!("Reading from a reader that has no stream.");
        };

        // Set stream.[[disturbed]] to true.
        stream.set_is_disturbed(true);

        // If stream.[[state]] is "errored", perform readIntoRequest’s error steps given stream.[[storedError]].
        if stream.is_errored() {
            read_into_request.error_steps(stream.get_stored_error());
            return;
        }

        // Otherwise, perform ! ReadableByteStreamControllerPullInto(stream.[[controller]], view, min, readIntoRequest).
        let Some(controller) = stream.byte_controller() else {
            unreachable!("A BYOB reader is always attached to a byte stream.");
        };
        controller.pull_into(view, min, read_into_request);
    }

    /// <https://streams.spec.whatwg.org/#byob-reader-read>
    pub fn read(&self, view: ArrayBufferView) -> Promise<ReadableStreamReadResult<ArrayBufferView>> {
        self.read_with_min(view, 1)
    }

    /// <https://streams.spec.whatwg.org/#byob-reader-read>, with `options["min"]`.
    pub fn read_with_min(
        &self,
        view: ArrayBufferView,
        min: usize,
    ) -> Promise<ReadableStreamReadResult<ArrayBufferView>> {
        // If view.[[ByteLength]] is 0, return a promise rejected with a TypeError exception.
        if view.byte_length() == 0 {
            return Promise::new_rejected(Error::Type("view byte length is 0".into()));
        }

        // If view.[[ViewedArrayBuffer]].[[ByteLength]] is 0,
        // return a promise rejected with a TypeError exception.
        if view.buffer().byte_length() == 0 {
            return Promise::new_rejected(Error::Type("view's buffer byte length is 0".into()));
        }

        // If ! IsDetachedBuffer(view.[[ViewedArrayBuffer]]) is true,
        // return a promise rejected with a TypeError exception.
        if view.buffer().is_detached() {
            return Promise::new_rejected(Error::Type("view's buffer is detached".into()));
        }

        // If options["min"] is 0, return a promise rejected with a TypeError exception.
        if min == 0 {
            return Promise::new_rejected(Error::Type("min must be greater than 0".into()));
        }

        if view.view_type().is_typed_array() {
            // If view has a [[TypedArrayName]] internal slot,
            // If options["min"] > view.[[ArrayLength]], return a promise rejected with a RangeError exception.
            if min > view.len() {
                return Promise::new_rejected(Error::Range(
                    "min must not exceed the view's length".into(),
                ));
            }
        } else if min > view.byte_length() {
            // Otherwise (i.e., it is a DataView),
            // If options["min"] > view.[[ByteLength]], return a promise rejected with a RangeError exception.
            return Promise::new_rejected(Error::Range(
                "min must not exceed the view's byte length".into(),
            ));
        }

        // If this.[[stream]] is undefined, return a promise rejected with a TypeError exception.
        if self.generic.stream().is_none() {
            return Promise::new_rejected(Error::Type("Reader has no stream".into()));
        }

        // Let promise be a new promise.
        let promise = Promise::new();

        // Let readIntoRequest be a new read-into request with the following items:
        // Perform ! ReadableStreamBYOBReaderRead(this, view, options["min"], readIntoRequest).
        self.read_with_request(view, min, ReadIntoRequest::Read(promise.clone()));

        // Return promise.
        promise
    }

    /// <https://streams.spec.whatwg.org/#byob-reader-release-lock>
    pub fn release_lock(&self) {
        // If this.[[stream]] is undefined, return.
        if self.generic.stream().is_none() {
            return;
        }

        // Perform ! ReadableStreamBYOBReaderRelease(this).
        self.release();
    }

    /// <https://streams.spec.whatwg.org/#generic-reader-closed>
    pub fn closed(&self) -> Promise<()> {
        self.generic.closed()
    }

    /// <https://streams.spec.whatwg.org/#generic-reader-cancel>
    pub fn cancel(&self, reason: Error) -> Promise<()> {
        self.generic.cancel(reason)
    }
}
