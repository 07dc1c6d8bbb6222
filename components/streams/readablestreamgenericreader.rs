/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;
use crate::promise::Promise;
use crate::readablestream::{ReadableStream, ReadableStreamState};

/// <https://streams.spec.whatwg.org/#readablestreamgenericreader>
///
/// The slots and algorithms shared by default and BYOB readers.
pub(crate) struct ReadableStreamGenericReader<T> {
    /// <https://streams.spec.whatwg.org/#readablestreamgenericreader-closedpromise>
    closed_promise: RefCell<Promise<()>>,

    /// <https://streams.spec.whatwg.org/#readablestreamgenericreader-stream>
    stream: RefCell<Option<Rc<ReadableStream<T>>>>,
}

impl<T: Clone + 'static> ReadableStreamGenericReader<T> {
    pub(crate) fn new() -> ReadableStreamGenericReader<T> {
        ReadableStreamGenericReader {
            closed_promise: RefCell::new(Promise::new()),
            stream: RefCell::new(None),
        }
    }

    pub(crate) fn stream(&self) -> Option<Rc<ReadableStream<T>>> {
        self.stream.borrow().clone()
    }

    pub(crate) fn set_stream(&self, stream: Option<Rc<ReadableStream<T>>>) {
        *self.stream.borrow_mut() = stream;
    }

    pub(crate) fn closed_promise(&self) -> Promise<()> {
        self.closed_promise.borrow().clone()
    }

    pub(crate) fn resolve_closed_promise(&self) {
        self.closed_promise.borrow().resolve_native(());
    }

    /// Reject the closed promise with `error` and mark it as handled.
    pub(crate) fn reject_closed_promise(&self, error: Error) {
        let closed_promise = self.closed_promise();
        closed_promise.reject_error(error);
        closed_promise.set_promise_is_handled();
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-reader-generic-initialize>
    pub(crate) fn generic_initialize(&self, stream: &Rc<ReadableStream<T>>) {
        // Set reader.[[stream]] to stream.
        self.set_stream(Some(stream.clone()));

        // Set stream.[[reader]] to reader is done by the caller, which knows the reader type.

        let promise = match stream.state() {
            // If stream.[[state]] is "readable",
            // Set reader.[[closedPromise]] to a new promise.
            ReadableStreamState::Readable => Promise::new(),
            // Otherwise, if stream.[[state]] is "closed",
            // Set reader.[[closedPromise]] to a promise resolved with undefined.
            ReadableStreamState::Closed => Promise::resolved(),
            // Otherwise,
            ReadableStreamState::Errored => {
                // Set reader.[[closedPromise]] to a promise rejected with stream.[[storedError]].
                let promise = Promise::new_rejected(stream.get_stored_error());
                // Set reader.[[closedPromise]].[[PromiseIsHandled]] to true.
                promise.set_promise_is_handled();
                promise
            },
        };
        *self.closed_promise.borrow_mut() = promise;
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-reader-generic-release>
    pub(crate) fn generic_release(&self) {
        // Let stream be reader.[[stream]].
        // Assert: stream is not undefined.
        let Some(stream) = self.stream() else {
            unreachable!("Releasing a reader that has no stream.");
        };

        // Assert: stream.[[reader]] is reader.
        assert!(stream.locked());

        let error = Error::Type("Reader was released".into());
        if stream.is_readable() {
            // If stream.[[state]] is "readable", reject reader.[[closedPromise]] with a TypeError exception.
            self.closed_promise.borrow().reject_error(error);
        } else {
            // Otherwise, set reader.[[closedPromise]] to a promise rejected with a TypeError exception.
            *self.closed_promise.borrow_mut() = Promise::new_rejected(error);
        }

        // Set reader.[[closedPromise]].[[PromiseIsHandled]] to true.
        self.closed_promise.borrow().set_promise_is_handled();

        // Perform ! stream.[[controller]].[[ReleaseSteps]]().
        stream.controller().release_steps();

        // Set stream.[[reader]] to undefined.
        stream.set_reader(None);

        // Set reader.[[stream]] to undefined.
        self.set_stream(None);
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-reader-generic-cancel>
    pub(crate) fn generic_cancel(&self, reason: Error) -> Promise<()> {
        // Let stream be reader.[[stream]].
        // Assert: stream is not undefined.
        let Some(stream) = self.stream() else {
            unreachable!("Canceling through a reader that has no stream.");
        };

        // Return ! ReadableStreamCancel(stream, reason).
        stream.cancel_stream(reason)
    }

    /// <https://streams.spec.whatwg.org/#generic-reader-closed>
    pub(crate) fn closed(&self) -> Promise<()> {
        self.closed_promise()
    }

    /// <https://streams.spec.whatwg.org/#generic-reader-cancel>
    pub(crate) fn cancel(&self, reason: Error) -> Promise<()> {
        // If this.[[stream]] is undefined, return a promise rejected with a TypeError exception.
        if self.stream.borrow().is_none() {
            return Promise::new_rejected(Error::Type("Reader has no stream".into()));
        }

        // Return ! ReadableStreamReaderGenericCancel(this, reason).
        self.generic_cancel(reason)
    }
}
