/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::algorithms::AlgorithmResult;
use crate::error::{Error, Fallible};
use crate::pipeto::{StreamPipeOptions, readable_stream_pipe_to};
use crate::promise::Promise;
use crate::queuingstrategy::{
    QueuingStrategy, QueuingStrategySize, extract_high_water_mark, extract_size_algorithm,
};
use crate::readablebytestreamcontroller::ReadableByteStreamController;
use crate::readablestreamasynciterator::ReadableStreamAsyncIterator;
use crate::readablestreambyobreader::{ReadIntoRequest, ReadableStreamBYOBReader};
use crate::readablestreamdefaultcontroller::ReadableStreamDefaultController;
use crate::readablestreamdefaultreader::{ReadRequest, ReadableStreamDefaultReader};
use crate::transformstream::TransformStream;
use crate::typedarray::ArrayBufferView;
use crate::underlyingsource::{UnderlyingByteSource, UnderlyingSource};
use crate::writablestream::WritableStream;

/// <https://streams.spec.whatwg.org/#readablestream-state>
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum ReadableStreamState {
    #[default]
    Readable,
    Closed,
    Errored,
}

/// The internal methods a readable stream calls on its controller, which is either a
/// [`ReadableStreamDefaultController`] or a [`ReadableByteStreamController`].
pub(crate) trait ReadableStreamController<T> {
    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamcontroller-cancelsteps>
    fn cancel_steps(self: Rc<Self>, reason: Error) -> Promise<()>;

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamcontroller-pullsteps>
    fn pull_steps(self: Rc<Self>, read_request: ReadRequest<T>);

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamcontroller-releasesteps>
    fn release_steps(self: Rc<Self>);

    /// <https://streams.spec.whatwg.org/#readable-stream-tee>
    ///
    /// Byte streams are teed with ReadableByteStreamTee, all others with
    /// ReadableStreamDefaultTee.
    fn tee(self: Rc<Self>) -> Fallible<(Rc<ReadableStream<T>>, Rc<ReadableStream<T>>)>;

    fn as_byte_controller(self: Rc<Self>) -> Option<Rc<ReadableByteStreamController>>;
}

/// <https://streams.spec.whatwg.org/#readablestream-reader>
pub(crate) enum ReaderType<T> {
    /// <https://streams.spec.whatwg.org/#readablestreamdefaultreader>
    Default(Rc<ReadableStreamDefaultReader<T>>),
    /// <https://streams.spec.whatwg.org/#readablestreambyobreader>
    BYOB(Rc<ReadableStreamBYOBReader>),
}

impl<T> Clone for ReaderType<T> {
    fn clone(&self) -> Self {
        match self {
            ReaderType::Default(reader) => ReaderType::Default(reader.clone()),
            ReaderType::BYOB(reader) => ReaderType::BYOB(reader.clone()),
        }
    }
}

/// <https://streams.spec.whatwg.org/#dictdef-readablewritablepair>
pub struct ReadableWritablePair<I, O> {
    pub readable: Rc<ReadableStream<O>>,
    pub writable: Rc<WritableStream<I>>,
}

impl<I: Clone + 'static, O: Clone + 'static> From<&TransformStream<I, O>>
    for ReadableWritablePair<I, O>
{
    fn from(transform: &TransformStream<I, O>) -> ReadableWritablePair<I, O> {
        ReadableWritablePair {
            readable: transform.readable(),
            writable: transform.writable(),
        }
    }
}

/// <https://streams.spec.whatwg.org/#rs-class>
pub struct ReadableStream<T> {
    /// <https://streams.spec.whatwg.org/#readablestream-controller>
    controller: RefCell<Option<Rc<dyn ReadableStreamController<T>>>>,

    /// <https://streams.spec.whatwg.org/#readablestream-storederror>
    stored_error: RefCell<Option<Error>>,

    /// <https://streams.spec.whatwg.org/#readablestream-disturbed>
    disturbed: Cell<bool>,

    /// <https://streams.spec.whatwg.org/#readablestream-reader>
    reader: RefCell<Option<ReaderType<T>>>,

    /// <https://streams.spec.whatwg.org/#readablestream-state>
    state: Cell<ReadableStreamState>,
}

impl<T: Clone + 'static> ReadableStream<T> {
    /// <https://streams.spec.whatwg.org/#initialize-readable-stream>
    fn new_inherited() -> Rc<ReadableStream<T>> {
        Rc::new(ReadableStream {
            controller: Default::default(),
            stored_error: Default::default(),
            disturbed: Default::default(),
            reader: Default::default(),
            state: Default::default(),
        })
    }

    /// <https://streams.spec.whatwg.org/#rs-constructor>
    pub fn new(
        underlying_source: impl UnderlyingSource<T> + 'static,
        strategy: QueuingStrategy<T>,
    ) -> Fallible<Rc<ReadableStream<T>>> {
        // Let sizeAlgorithm be ! ExtractSizeAlgorithm(strategy).
        let size_algorithm = extract_size_algorithm(&strategy);

        // Let highWaterMark be ? ExtractHighWaterMark(strategy, 1).
        let high_water_mark = extract_high_water_mark(&strategy, 1.0)?;

        // Perform ! InitializeReadableStream(this).
        let stream = ReadableStream::new_inherited();

        // Perform ? SetUpReadableStreamDefaultControllerFromUnderlyingSource
        ReadableStreamDefaultController::set_up(
            &stream,
            Box::new(underlying_source),
            high_water_mark,
            size_algorithm,
        )?;
        Ok(stream)
    }

    /// <https://streams.spec.whatwg.org/#create-readable-stream>
    pub(crate) fn create(
        underlying_source: Box<dyn UnderlyingSource<T>>,
        high_water_mark: f64,
        size_algorithm: QueuingStrategySize<T>,
    ) -> Fallible<Rc<ReadableStream<T>>> {
        // Assert: ! IsNonNegativeNumber(highWaterMark) is true.
        assert!(high_water_mark >= 0.0);

        // Let stream be a new ReadableStream.
        // Perform ! InitializeReadableStream(stream).
        let stream = ReadableStream::new_inherited();

        // Let controller be a new ReadableStreamDefaultController.
        // Perform ? SetUpReadableStreamDefaultController(stream, controller, startAlgorithm,
        // pullAlgorithm, cancelAlgorithm, highWaterMark, sizeAlgorithm).
        ReadableStreamDefaultController::set_up(
            &stream,
            underlying_source,
            high_water_mark,
            size_algorithm,
        )?;

        // Return stream.
        Ok(stream)
    }

    /// <https://streams.spec.whatwg.org/#rs-from>, for synchronous iterables.
    ///
    /// <https://streams.spec.whatwg.org/#readable-stream-from-iterable>
    pub fn from_iterable<I>(iterable: I) -> Rc<ReadableStream<T>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        // Let iteratorRecord be ? GetIterator(asyncIterable, async).
        let source = IterableUnderlyingSource {
            iterator: Some(iterable.into_iter()),
        };

        // Set stream to ! CreateReadableStream(startAlgorithm, pullAlgorithm, cancelAlgorithm, 0).
        match ReadableStream::create(Box::new(source), 0.0, Rc::new(|_: &T| Ok(1.0))) {
            Ok(stream) => stream,
            Err(_) => unreachable!("An iterable source has no start algorithm that could throw."),
        }
    }

    pub(crate) fn assert_no_controller(&self) {
        assert!(self.controller.borrow().is_none());
    }

    pub(crate) fn set_controller(&self, controller: Rc<dyn ReadableStreamController<T>>) {
        *self.controller.borrow_mut() = Some(controller);
    }

    pub(crate) fn controller(&self) -> Rc<dyn ReadableStreamController<T>> {
        let Some(controller) = self.controller.borrow().clone() else {
            unreachable!("Stream should have a controller.");
        };
        controller
    }

    pub(crate) fn set_reader(&self, new_reader: Option<ReaderType<T>>) {
        *self.reader.borrow_mut() = new_reader;
    }

    pub(crate) fn reader(&self) -> Option<ReaderType<T>> {
        self.reader.borrow().clone()
    }

    fn default_reader(&self) -> Rc<ReadableStreamDefaultReader<T>> {
        match self.reader() {
            Some(ReaderType::Default(reader)) => reader,
            _ => unreachable!("Stream should be locked to a default reader."),
        }
    }

    fn byob_reader(&self) -> Rc<ReadableStreamBYOBReader> {
        match self.reader() {
            Some(ReaderType::BYOB(reader)) => reader,
            _ => unreachable!("Stream should be locked to a BYOB reader."),
        }
    }

    pub fn state(&self) -> ReadableStreamState {
        self.state.get()
    }

    pub fn is_readable(&self) -> bool {
        self.state.get() == ReadableStreamState::Readable
    }

    pub fn is_closed(&self) -> bool {
        self.state.get() == ReadableStreamState::Closed
    }

    pub fn is_errored(&self) -> bool {
        self.state.get() == ReadableStreamState::Errored
    }

    /// <https://streams.spec.whatwg.org/#is-readable-stream-disturbed>
    pub fn is_disturbed(&self) -> bool {
        self.disturbed.get()
    }

    pub(crate) fn set_is_disturbed(&self, disturbed: bool) {
        self.disturbed.set(disturbed);
    }

    /// <https://streams.spec.whatwg.org/#readablestream-storederror>
    pub fn stored_error(&self) -> Option<Error> {
        self.stored_error.borrow().clone()
    }

    pub(crate) fn get_stored_error(&self) -> Error {
        self.stored_error().unwrap_or(Error::Undefined)
    }

    /// <https://streams.spec.whatwg.org/#rs-locked>
    /// <https://streams.spec.whatwg.org/#is-readable-stream-locked>
    pub fn locked(&self) -> bool {
        self.reader.borrow().is_some()
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-has-default-reader>
    pub(crate) fn has_default_reader(&self) -> bool {
        matches!(*self.reader.borrow(), Some(ReaderType::Default(_)))
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-has-byob-reader>
    pub(crate) fn has_byob_reader(&self) -> bool {
        matches!(*self.reader.borrow(), Some(ReaderType::BYOB(_)))
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-get-num-read-requests>
    pub(crate) fn get_num_read_requests(&self) -> usize {
        assert!(self.has_default_reader());
        self.default_reader().get_num_read_requests()
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-get-num-read-into-requests>
    pub(crate) fn get_num_read_into_requests(&self) -> usize {
        assert!(self.has_byob_reader());
        self.byob_reader().get_num_read_into_requests()
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-add-read-request>
    pub(crate) fn add_read_request(&self, read_request: ReadRequest<T>) {
        // Assert: stream.[[reader]] implements ReadableStreamDefaultReader.
        // Assert: stream.[[state]] is "readable".
        assert!(self.is_readable());

        // Append readRequest to stream.[[reader]].[[readRequests]].
        self.default_reader().add_read_request(read_request);
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-fulfill-read-request>
    pub(crate) fn fulfill_read_request(&self, chunk: T, done: bool) {
        // Assert: ! ReadableStreamHasDefaultReader(stream) is true.
        // Let reader be stream.[[reader]].
        let reader = self.default_reader();

        // Assert: reader.[[readRequests]] is not empty.
        // Let readRequest be reader.[[readRequests]][0].
        // Remove readRequest from reader.[[readRequests]].
        let Some(read_request) = reader.remove_first_read_request() else {
            unreachable!("Reader should have a pending read request.");
        };

        if done {
            // If done is true, perform readRequest’s close steps.
            read_request.close_steps();
        } else {
            // Otherwise, perform readRequest’s chunk steps, given chunk.
            read_request.chunk_steps(chunk);
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-close>
    pub(crate) fn close(&self) {
        // Assert: stream.[[state]] is "readable".
        assert!(self.is_readable());

        // Set stream.[[state]] to "closed".
        self.state.set(ReadableStreamState::Closed);
        debug!("Readable stream closed");

        // Let reader be stream.[[reader]].
        match self.reader() {
            // If reader is undefined, return.
            None => {},
            Some(ReaderType::Default(reader)) => {
                // Resolve reader.[[closedPromise]] with undefined.
                reader.generic().resolve_closed_promise();

                // If reader implements ReadableStreamDefaultReader,
                // Let readRequests be reader.[[readRequests]].
                // Set reader.[[readRequests]] to an empty list.
                // For each readRequest of readRequests,
                for read_request in reader.take_read_requests() {
                    // Perform readRequest’s close steps.
                    read_request.close_steps();
                }
            },
            Some(ReaderType::BYOB(reader)) => {
                // Resolve reader.[[closedPromise]] with undefined.
                reader.generic().resolve_closed_promise();
            },
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-error>
    pub(crate) fn error(&self, error: Error) {
        // Assert: stream.[[state]] is "readable".
        assert!(self.is_readable());

        // Set stream.[[state]] to "errored".
        self.state.set(ReadableStreamState::Errored);

        // Set stream.[[storedError]] to e.
        *self.stored_error.borrow_mut() = Some(error.clone());
        debug!("Readable stream errored with {error}");

        // Let reader be stream.[[reader]].
        match self.reader() {
            // If reader is undefined, return.
            None => {},
            Some(ReaderType::Default(reader)) => {
                // Reject reader.[[closedPromise]] with e.
                // Set reader.[[closedPromise]].[[PromiseIsHandled]] to true.
                reader.generic().reject_closed_promise(error.clone());

                // Perform ! ReadableStreamDefaultReaderErrorReadRequests(reader, e).
                reader.error_read_requests(error);
            },
            Some(ReaderType::BYOB(reader)) => {
                reader.generic().reject_closed_promise(error.clone());

                // Perform ! ReadableStreamBYOBReaderErrorReadIntoRequests(reader, e).
                reader.error_read_into_requests(error);
            },
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-cancel>
    pub(crate) fn cancel_stream(&self, reason: Error) -> Promise<()> {
        // Set stream.[[disturbed]] to true.
        self.disturbed.set(true);

        match self.state.get() {
            // If stream.[[state]] is "closed", return a promise resolved with undefined.
            ReadableStreamState::Closed => return Promise::resolved(),
            // If stream.[[state]] is "errored", return a promise rejected with stream.[[storedError]].
            ReadableStreamState::Errored => return Promise::new_rejected(self.get_stored_error()),
            ReadableStreamState::Readable => {},
        }

        // Perform ! ReadableStreamClose(stream).
        self.close();

        // Let reader be stream.[[reader]].
        // If reader is not undefined and reader implements ReadableStreamBYOBReader,
        if let Some(ReaderType::BYOB(reader)) = self.reader() {
            // Let readIntoRequests be reader.[[readIntoRequests]].
            // Set reader.[[readIntoRequests]] to an empty list.
            // For each readIntoRequest of readIntoRequests,
            for read_into_request in reader.take_read_into_requests() {
                // Perform readIntoRequest’s close steps, given undefined.
                read_into_request.close_steps(None);
            }
        }

        // Let sourceCancelPromise be ! stream.[[controller]].[[CancelSteps]](reason).
        let source_cancel_promise = self.controller().cancel_steps(reason);

        // Return the result of reacting to sourceCancelPromise
        // with a fulfillment step that returns undefined.
        source_cancel_promise.then(|()| Ok(()), Err)
    }

    /// <https://streams.spec.whatwg.org/#rs-cancel>
    pub fn cancel(&self, reason: Error) -> Promise<()> {
        // If ! IsReadableStreamLocked(this) is true,
        // return a promise rejected with a TypeError exception.
        if self.locked() {
            return Promise::new_rejected(Error::Type("Cannot cancel a locked stream".into()));
        }

        // Return ! ReadableStreamCancel(this, reason).
        self.cancel_stream(reason)
    }

    /// <https://streams.spec.whatwg.org/#rs-get-reader>
    /// <https://streams.spec.whatwg.org/#acquire-readable-stream-reader>
    pub fn get_reader(self: &Rc<Self>) -> Fallible<Rc<ReadableStreamDefaultReader<T>>> {
        ReadableStreamDefaultReader::new(self)
    }

    /// <https://streams.spec.whatwg.org/#rs-tee>
    pub fn tee(&self) -> Fallible<(Rc<ReadableStream<T>>, Rc<ReadableStream<T>>)> {
        // Return ? ReadableStreamTee(this, false).
        self.controller().tee()
    }

    /// <https://streams.spec.whatwg.org/#rs-pipe-to>
    pub fn pipe_to(
        self: &Rc<Self>,
        destination: &Rc<WritableStream<T>>,
        options: StreamPipeOptions,
    ) -> Promise<()> {
        // If ! IsReadableStreamLocked(this) is true,
        // return a promise rejected with a TypeError exception.
        if self.locked() {
            return Promise::new_rejected(Error::Type("Source stream is locked".into()));
        }

        // If ! IsWritableStreamLocked(destination) is true,
        // return a promise rejected with a TypeError exception.
        if destination.locked() {
            return Promise::new_rejected(Error::Type("Destination stream is locked".into()));
        }

        // Return ! ReadableStreamPipeTo(this, destination, preventClose, preventAbort, preventCancel, signal).
        readable_stream_pipe_to(self, destination, options)
    }

    /// <https://streams.spec.whatwg.org/#rs-pipe-through>
    pub fn pipe_through<O: Clone + 'static>(
        self: &Rc<Self>,
        transform: &ReadableWritablePair<T, O>,
        options: StreamPipeOptions,
    ) -> Fallible<Rc<ReadableStream<O>>> {
        // If ! IsReadableStreamLocked(this) is true, throw a TypeError exception.
        if self.locked() {
            return Err(Error::Type("Source stream is locked".into()));
        }

        // If ! IsWritableStreamLocked(transform["writable"]) is true, throw a TypeError exception.
        if transform.writable.locked() {
            return Err(Error::Type("Destination stream is locked".into()));
        }

        // Let promise be ! ReadableStreamPipeTo(this, transform["writable"],
        // options["preventClose"], options["preventAbort"], options["preventCancel"], signal).
        let promise = readable_stream_pipe_to(self, &transform.writable, options);

        // Set promise.[[PromiseIsHandled]] to true.
        promise.set_promise_is_handled();

        // Return transform["readable"].
        Ok(transform.readable.clone())
    }

    /// <https://streams.spec.whatwg.org/#rs-asynciterator>
    pub fn values(self: &Rc<Self>, prevent_cancel: bool) -> Fallible<ReadableStreamAsyncIterator<T>> {
        // Let reader be ? AcquireReadableStreamDefaultReader(stream).
        let reader = self.get_reader()?;

        // Set iterator’s reader to reader.
        // Let preventCancel be args[0]["preventCancel"].
        // Set iterator’s prevent cancel to preventCancel.
        Ok(ReadableStreamAsyncIterator::new(reader, prevent_cancel))
    }
}

impl ReadableStream<ArrayBufferView> {
    /// <https://streams.spec.whatwg.org/#rs-constructor>, for an underlying source of
    /// `type: "bytes"`.
    pub fn new_bytes(
        underlying_source: impl UnderlyingByteSource + 'static,
        strategy: QueuingStrategy<ArrayBufferView>,
    ) -> Fallible<Rc<ReadableStream<ArrayBufferView>>> {
        // If strategy["size"] exists, throw a RangeError exception.
        if strategy.size.is_some() {
            return Err(Error::Range(
                "The strategy for a byte stream cannot have a size function".into(),
            ));
        }

        // Let highWaterMark be ? ExtractHighWaterMark(strategy, 0).
        let high_water_mark = extract_high_water_mark(&strategy, 0.0)?;

        // Perform ! InitializeReadableStream(this).
        let stream = ReadableStream::new_inherited();

        // Perform ? SetUpReadableByteStreamControllerFromUnderlyingSource(this,
        // underlyingSource, underlyingSourceDict, highWaterMark).
        ReadableByteStreamController::set_up_from_underlying_source(
            &stream,
            Box::new(underlying_source),
            high_water_mark,
        )?;
        Ok(stream)
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-createreadablebytestream>
    pub(crate) fn create_byte_stream(
        underlying_source: Box<dyn UnderlyingByteSource>,
    ) -> Fallible<Rc<ReadableStream<ArrayBufferView>>> {
        // Let stream be a new ReadableStream.
        // Perform ! InitializeReadableStream(stream).
        let stream = ReadableStream::new_inherited();

        // Let controller be a new ReadableByteStreamController.
        // Perform ? SetUpReadableByteStreamController(stream, controller, startAlgorithm,
        // pullAlgorithm, cancelAlgorithm, 0, undefined).
        ReadableByteStreamController::set_up(&stream, underlying_source, 0.0, None)?;

        // Return stream.
        Ok(stream)
    }

    /// <https://streams.spec.whatwg.org/#rs-get-reader>, with `mode: "byob"`.
    pub fn get_byob_reader(self: &Rc<Self>) -> Fallible<Rc<ReadableStreamBYOBReader>> {
        ReadableStreamBYOBReader::new(self)
    }

    pub(crate) fn byte_controller(&self) -> Option<Rc<ReadableByteStreamController>> {
        self.controller().as_byte_controller()
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-add-read-into-request>
    pub(crate) fn add_read_into_request(&self, read_into_request: ReadIntoRequest) {
        // Assert: stream.[[reader]] implements ReadableStreamBYOBReader.
        // Assert: stream.[[state]] is "readable" or "closed".
        assert!(self.is_readable() || self.is_closed());

        // Append readRequest to stream.[[reader]].[[readIntoRequests]].
        self.byob_reader().add_read_into_request(read_into_request);
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-fulfill-read-into-request>
    pub(crate) fn fulfill_read_into_request(&self, chunk: ArrayBufferView, done: bool) {
        // Assert: ! ReadableStreamHasBYOBReader(stream) is true.
        // Let reader be stream.[[reader]].
        let reader = self.byob_reader();

        // Assert: reader.[[readIntoRequests]] is not empty.
        // Let readIntoRequest be reader.[[readIntoRequests]][0].
        // Remove readIntoRequest from reader.[[readIntoRequests]].
        let Some(read_into_request) = reader.remove_first_read_into_request() else {
            unreachable!("Reader should have a pending read-into request.");
        };

        if done {
            // If done is true, perform readIntoRequest’s close steps, given chunk.
            read_into_request.close_steps(Some(chunk));
        } else {
            // Otherwise, perform readIntoRequest’s chunk steps, given chunk.
            read_into_request.chunk_steps(chunk);
        }
    }
}

/// The underlying source of a stream created by [`ReadableStream::from_iterable`].
struct IterableUnderlyingSource<I> {
    iterator: Option<I>,
}

impl<T, I> UnderlyingSource<T> for IterableUnderlyingSource<I>
where
    T: Clone + 'static,
    I: Iterator<Item = T>,
{
    fn pull(&mut self, controller: &Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult {
        // Let nextResult be IteratorNext(iteratorRecord).
        match self.iterator.as_mut().and_then(Iterator::next) {
            // If done is true: Perform ! ReadableStreamDefaultControllerClose(stream.[[controller]]).
            None => {
                self.iterator = None;
                controller.perform_close();
            },
            // Perform ! ReadableStreamDefaultControllerEnqueue(stream.[[controller]], value).
            Some(chunk) => controller.perform_enqueue(chunk)?,
        }
        Ok(None)
    }

    fn cancel(&mut self, _reason: Error) -> AlgorithmResult {
        // Let returnMethod be GetMethod(iterator, "return").
        // Dropping the iterator is the only way to return it.
        self.iterator = None;
        Ok(None)
    }
}
