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
use crate::readablestreamgenericreader::ReadableStreamGenericReader;

/// The outcome of a read: a chunk, or `done` once the stream has closed.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadableStreamReadResult<T> {
    pub value: Option<T>,
    pub done: bool,
}

impl<T> ReadableStreamReadResult<T> {
    pub fn chunk(value: T) -> ReadableStreamReadResult<T> {
        ReadableStreamReadResult {
            value: Some(value),
            done: false,
        }
    }

    pub fn done() -> ReadableStreamReadResult<T> {
        ReadableStreamReadResult {
            value: None,
            done: true,
        }
    }
}

/// The steps of a read request issued from within the crate, such as by a tee or a pipe.
pub(crate) trait ReadRequestSteps<T> {
    /// <https://streams.spec.whatwg.org/#read-request-chunk-steps>
    fn chunk_steps(&self, chunk: T);
    /// <https://streams.spec.whatwg.org/#read-request-close-steps>
    fn close_steps(&self);
    /// <https://streams.spec.whatwg.org/#read-request-error-steps>
    fn error_steps(&self, error: Error);
}

/// <https://streams.spec.whatwg.org/#read-request>
pub(crate) enum ReadRequest<T> {
    /// <https://streams.spec.whatwg.org/#default-reader-read>
    Read(Promise<ReadableStreamReadResult<T>>),
    Steps(Box<dyn ReadRequestSteps<T>>),
}

impl<T: Clone + 'static> ReadRequest<T> {
    /// <https://streams.spec.whatwg.org/#read-request-chunk-steps>
    pub(crate) fn chunk_steps(&self, chunk: T) {
        match self {
            ReadRequest::Read(promise) => {
                // chunk steps, given chunk
                // Resolve promise with «[ "value" → chunk, "done" → false ]».
                promise.resolve_native(ReadableStreamReadResult::chunk(chunk));
            },
            ReadRequest::Steps(steps) => steps.chunk_steps(chunk),
        }
    }

    /// <https://streams.spec.whatwg.org/#read-request-close-steps>
    pub(crate) fn close_steps(&self) {
        match self {
            ReadRequest::Read(promise) => {
                // close steps
                // Resolve promise with «[ "value" → undefined, "done" → true ]».
                promise.resolve_native(ReadableStreamReadResult::done());
            },
            ReadRequest::Steps(steps) => steps.close_steps(),
        }
    }

    /// <https://streams.spec.whatwg.org/#read-request-error-steps>
    pub(crate) fn error_steps(&self, error: Error) {
        match self {
            ReadRequest::Read(promise) => {
                // error steps, given e
                // Reject promise with e.
                promise.reject_error(error);
            },
            ReadRequest::Steps(steps) => steps.error_steps(error),
        }
    }
}

/// <https://streams.spec.whatwg.org/#readablestreamdefaultreader>
pub struct ReadableStreamDefaultReader<T> {
    generic: ReadableStreamGenericReader<T>,

    /// <https://streams.spec.whatwg.org/#readablestreamdefaultreader-readrequests>
    read_requests: RefCell<VecDeque<ReadRequest<T>>>,
}

impl<T: Clone + 'static> ReadableStreamDefaultReader<T> {
    /// <https://streams.spec.whatwg.org/#default-reader-constructor>
    pub fn new(stream: &Rc<ReadableStream<T>>) -> Fallible<Rc<ReadableStreamDefaultReader<T>>> {
        let reader = Rc::new(ReadableStreamDefaultReader {
            generic: ReadableStreamGenericReader::new(),
            read_requests: RefCell::new(VecDeque::new()),
        });

        // Perform ? SetUpReadableStreamDefaultReader(this, stream).
        reader.set_up(stream)?;
        Ok(reader)
    }

    /// <https://streams.spec.whatwg.org/#set-up-readable-stream-default-reader>
    fn set_up(self: &Rc<Self>, stream: &Rc<ReadableStream<T>>) -> Fallible<()> {
        // If ! IsReadableStreamLocked(stream) is true, throw a TypeError exception.
        if stream.locked() {
            return Err(Error::Type("stream is locked".into()));
        }

        // Perform ! ReadableStreamReaderGenericInitialize(reader, stream).
        self.generic.generic_initialize(stream);
        stream.set_reader(Some(ReaderType::Default(self.clone())));

        // Set reader.[[readRequests]] to a new empty list.
        self.read_requests.borrow_mut().clear();
        Ok(())
    }

    pub(crate) fn generic(&self) -> &ReadableStreamGenericReader<T> {
        &self.generic
    }

    pub(crate) fn add_read_request(&self, read_request: ReadRequest<T>) {
        self.read_requests.borrow_mut().push_back(read_request);
    }

    pub(crate) fn get_num_read_requests(&self) -> usize {
        self.read_requests.borrow().len()
    }

    pub(crate) fn remove_first_read_request(&self) -> Option<ReadRequest<T>> {
        self.read_requests.borrow_mut().pop_front()
    }

    pub(crate) fn take_read_requests(&self) -> VecDeque<ReadRequest<T>> {
        mem::take(&mut *self.read_requests.borrow_mut())
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-reader-error-read-requests>
    pub(crate) fn error_read_requests(&self, error: Error) {
        // Let readRequests be reader.[[readRequests]].
        // Set reader.[[readRequests]] to a new empty list.
        let read_requests = self.take_read_requests();

        // For each readRequest of readRequests,
        for request in read_requests {
            // Perform readRequest’s error steps, given e.
            request.error_steps(error.clone());
        }
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamdefaultreaderrelease>
    pub(crate) fn release(&self) {
        // Perform ! ReadableStreamReaderGenericRelease(reader).
        self.generic.generic_release();

        // Let e be a new TypeError exception.
        let error = Error::Type("Reader is released".into());

        // Perform ! ReadableStreamDefaultReaderErrorReadRequests(reader, e).
        self.error_read_requests(error);
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-default-reader-read>
    pub(crate) fn read_with_request(&self, read_request: ReadRequest<T>) {
        // Let stream be reader.[[stream]].
        // Assert: stream is not undefined.
        let Some(stream) = self.generic.stream() else {
            unreachable!("Reading from a reader that has no stream.");
        };

        // Set stream.[[disturbed]] to true.
        stream.set_is_disturbed(true);

        if stream.is_closed() {
            // If stream.[[state]] is "closed", perform readRequest’s close steps.
            read_request.close_steps();
        } else if stream.is_errored() {
            // Otherwise, if stream.[[state]] is "errored",
            // perform readRequest’s error steps given stream.[[storedError]].
            read_request.error_steps(stream.get_stored_error());
        } else {
            // Otherwise,
            // Assert: stream.[[state]] is "readable".
            assert!(stream.is_readable());

            // Perform ! stream.[[controller]].[[PullSteps]](readRequest).
            stream.controller().pull_steps(read_request);
        }
    }

    /// <https://streams.spec.whatwg.org/#default-reader-read>
    pub fn read(&self) -> Promise<ReadableStreamReadResult<T>> {
        // If this.[[stream]] is undefined, return a promise rejected with a TypeError exception.
        if self.generic.stream().is_none() {
            return Promise::new_rejected(Error::Type("stream is undefined".into()));
        }

        // Let promise be a new promise.
        let promise = Promise::new();

        // Let readRequest be a new read request with the following items:
        // Perform ! ReadableStreamDefaultReaderRead(this, readRequest).
        self.read_with_request(ReadRequest::Read(promise.clone()));

        // Return promise.
        promise
    }

    /// <https://streams.spec.whatwg.org/#default-reader-release-lock>
    pub fn release_lock(&self) {
        // If this.[[stream]] is undefined, return.
        if self.generic.stream().is_none() {
            return;
        }

        // Perform ! ReadableStreamDefaultReaderRelease(this).
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
