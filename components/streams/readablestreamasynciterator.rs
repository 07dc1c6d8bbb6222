/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::Stream;

use crate::error::{Error, Fallible};
use crate::promise::Promise;
use crate::readablestreamdefaultreader::{
    ReadRequest, ReadRequestSteps, ReadableStreamDefaultReader,
};

/// The state shared between an iterator and the read requests it issues.
struct IteratorState<T> {
    reader: Rc<ReadableStreamDefaultReader<T>>,
    prevent_cancel: bool,
    /// <https://webidl.spec.whatwg.org/#default-asynchronous-iterator-object-ongoing-promise>
    ongoing_promise: RefCell<Option<Promise<Option<T>>>>,
    /// <https://webidl.spec.whatwg.org/#default-asynchronous-iterator-object-is-finished>
    is_finished: Cell<bool>,
}

/// The read request of
/// <https://streams.spec.whatwg.org/#ref-for-dfn-get-the-next-iteration-result>
struct IteratorReadRequest<T> {
    reader: Rc<ReadableStreamDefaultReader<T>>,
    promise: Promise<Option<T>>,
}

impl<T: Clone + 'static> ReadRequestSteps<T> for IteratorReadRequest<T> {
    fn chunk_steps(&self, chunk: T) {
        // Resolve promise with chunk.
        self.promise.resolve_native(Some(chunk));
    }

    fn close_steps(&self) {
        // Perform ! ReadableStreamDefaultReaderRelease(reader).
        self.reader.release();

        // Resolve promise with end of iteration.
        self.promise.resolve_native(None);
    }

    fn error_steps(&self, error: Error) {
        // Perform ! ReadableStreamDefaultReaderRelease(reader).
        self.reader.release();

        // Reject promise with e.
        self.promise.reject_error(error);
    }
}

impl<T: Clone + 'static> IteratorState<T> {
    /// <https://streams.spec.whatwg.org/#ref-for-dfn-get-the-next-iteration-result>
    fn next_iteration_result(self: &Rc<Self>) -> Promise<Option<T>> {
        if self.is_finished.get() {
            return Promise::new_resolved(None);
        }

        // Let reader be iterator’s reader.
        // Assert: reader.[[stream]] is not undefined.
        assert!(self.reader.generic().stream().is_some());

        // Let promise be a new promise.
        let promise = Promise::new();

        // Let readRequest be a new read request with the following items:
        let read_request = ReadRequest::Steps(Box::new(IteratorReadRequest {
            reader: self.reader.clone(),
            promise: promise.clone(),
        }));

        // Perform ! ReadableStreamDefaultReaderRead(this, readRequest).
        self.reader.read_with_request(read_request);

        // Finishing the iterator on "done" or an error.
        let state = self.clone();
        let finished = self.clone();
        promise.then(
            move |value: Option<T>| {
                if value.is_none() {
                    state.is_finished.set(true);
                }
                Ok(value)
            },
            move |error| {
                finished.is_finished.set(true);
                Err(error)
            },
        )
    }

    /// <https://webidl.spec.whatwg.org/#es-asynchronous-iterator-prototype-object>
    /// The `next` method, serialized behind the ongoing promise.
    fn next(self: &Rc<Self>) -> Promise<Option<T>> {
        let ongoing = self.ongoing_promise.borrow().clone();
        let promise = match ongoing {
            Some(ongoing) => {
                let state = self.clone();
                let result = Promise::new();
                let settled = result.clone();
                ongoing.upon_settlement(move || {
                    settled.resolve_with_promise(&state.next_iteration_result());
                });
                result
            },
            None => self.next_iteration_result(),
        };
        *self.ongoing_promise.borrow_mut() = Some(promise.clone());
        promise
    }

    /// <https://streams.spec.whatwg.org/#ref-for-asynchronous-iterator-return>
    fn return_steps(&self, reason: Error) -> Promise<()> {
        if self.is_finished.replace(true) {
            return Promise::resolved();
        }

        // Let reader be iterator’s reader.
        // Assert: reader.[[stream]] is not undefined.
        // Assert: reader.[[readRequests]] is empty, as the async iterator machinery guarantees
        // that any previous calls to next() have settled before this is called.
        if self.reader.generic().stream().is_none() {
            return Promise::resolved();
        }

        // If iterator’s prevent cancel is false:
        if !self.prevent_cancel {
            // Let result be ! ReadableStreamReaderGenericCancel(reader, arg).
            let result = self.reader.generic().generic_cancel(reason);

            // Perform ! ReadableStreamDefaultReaderRelease(reader).
            self.reader.release();

            // Return result.
            return result;
        }

        // Perform ! ReadableStreamDefaultReaderRelease(reader).
        self.reader.release();

        // Return a promise resolved with undefined.
        Promise::resolved()
    }
}

/// <https://streams.spec.whatwg.org/#rs-asynciterator>
///
/// Yields the chunks of a stream through a default reader it keeps locked until the
/// stream closes or errors, or until [`ReadableStreamAsyncIterator::return_`] is called.
pub struct ReadableStreamAsyncIterator<T> {
    state: Rc<IteratorState<T>>,
    /// The promise polled by the [`Stream`] implementation.
    pending: Option<Promise<Option<T>>>,
}

impl<T: Clone + 'static> ReadableStreamAsyncIterator<T> {
    pub(crate) fn new(
        reader: Rc<ReadableStreamDefaultReader<T>>,
        prevent_cancel: bool,
    ) -> ReadableStreamAsyncIterator<T> {
        ReadableStreamAsyncIterator {
            state: Rc::new(IteratorState {
                reader,
                prevent_cancel,
                ongoing_promise: RefCell::new(None),
                is_finished: Cell::new(false),
            }),
            pending: None,
        }
    }

    /// Resolves with the next chunk, or with `None` once the stream has closed.
    pub fn next(&self) -> Promise<Option<T>> {
        self.state.next()
    }

    /// Stops iterating, cancelling the stream unless `preventCancel` was set.
    pub fn return_(&self, reason: Error) -> Promise<()> {
        let ongoing = self.state.ongoing_promise.borrow().clone();
        match ongoing {
            Some(ongoing) => {
                let state = self.state.clone();
                let result = Promise::new();
                let settled = result.clone();
                ongoing.upon_settlement(move || {
                    settled.resolve_with_promise(&state.return_steps(reason));
                });
                result
            },
            None => self.state.return_steps(reason),
        }
    }
}

impl<T: Clone + 'static> Stream for ReadableStreamAsyncIterator<T> {
    type Item = Fallible<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.pending.is_none() && this.state.is_finished.get() {
            return Poll::Ready(None);
        }
        let state = &this.state;
        let promise = this.pending.get_or_insert_with(|| state.next());
        match Pin::new(promise).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                this.pending = None;
                Poll::Ready(result.transpose())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::microtask::block_on;
    use crate::readablestream::ReadableStream;

    #[test]
    fn collects_every_chunk() {
        let stream = ReadableStream::from_iterable(vec![1, 2, 3]);
        let iterator = stream.values(false).unwrap();
        let chunks: Vec<_> = block_on(iterator.collect::<Vec<_>>()).unwrap();
        assert_eq!(chunks, vec![Ok(1), Ok(2), Ok(3)]);
        assert!(!stream.locked());
    }

    #[test]
    fn return_cancels_unless_prevented() {
        let stream = ReadableStream::from_iterable(vec!["a", "b"]);
        let iterator = stream.values(false).unwrap();
        assert_eq!(block_on(iterator.next()), Some(Ok(Some("a"))));
        assert_eq!(block_on(iterator.return_(Error::Undefined)), Some(Ok(())));
        assert!(stream.is_closed());
        assert!(!stream.locked());

        let stream = ReadableStream::from_iterable(vec!["a", "b"]);
        let iterator = stream.values(true).unwrap();
        assert_eq!(block_on(iterator.return_(Error::Undefined)), Some(Ok(())));
        assert!(stream.is_readable());
        assert!(!stream.locked());
    }

    #[test]
    fn values_locks_the_stream() {
        let stream = ReadableStream::from_iterable(vec![1]);
        let _iterator = stream.values(false).unwrap();
        assert!(stream.locked());
        assert!(matches!(stream.values(false), Err(Error::Type(_))));
    }
}
