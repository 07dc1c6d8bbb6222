/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::debug;

use crate::algorithms::AlgorithmResult;
use crate::byteteereadintorequest::ByteTeeReadIntoRequest;
use crate::byteteereadrequest::ByteTeeReadRequest;
use crate::error::{Error, Fallible};
use crate::promise::Promise;
use crate::readablebytestreamcontroller::ReadableByteStreamController;
use crate::readablestream::{ReadableStream, ReaderType};
use crate::readablestreambyobreader::{ReadIntoRequest, ReadableStreamBYOBReader};
use crate::readablestreamdefaultreader::ReadRequest;
use crate::typedarray::ArrayBufferView;
use crate::underlyingsource::UnderlyingByteSource;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ByteTeePullAlgorithm {
    Pull1Algorithm,
    Pull2Algorithm,
}

/// The variables shared by the algorithms of
/// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamtee>
pub(crate) struct ByteTee {
    stream: Rc<ReadableStream<ArrayBufferView>>,
    reader: RefCell<ReaderType<ArrayBufferView>>,
    branch_1: RefCell<Weak<ReadableByteStreamController>>,
    branch_2: RefCell<Weak<ReadableByteStreamController>>,
    reading: Cell<bool>,
    read_again_for_branch_1: Cell<bool>,
    read_again_for_branch_2: Cell<bool>,
    canceled_1: Cell<bool>,
    canceled_2: Cell<bool>,
    reason_1: RefCell<Option<Error>>,
    reason_2: RefCell<Option<Error>>,
    cancel_promise: Promise<()>,
}

impl ByteTee {
    pub(crate) fn stream(&self) -> &Rc<ReadableStream<ArrayBufferView>> {
        &self.stream
    }

    pub(crate) fn branch_1(&self) -> Option<Rc<ReadableByteStreamController>> {
        self.branch_1.borrow().upgrade()
    }

    pub(crate) fn branch_2(&self) -> Option<Rc<ReadableByteStreamController>> {
        self.branch_2.borrow().upgrade()
    }

    pub(crate) fn canceled_1(&self) -> bool {
        self.canceled_1.get()
    }

    pub(crate) fn canceled_2(&self) -> bool {
        self.canceled_2.get()
    }

    pub(crate) fn set_reading(&self, reading: bool) {
        self.reading.set(reading);
    }

    pub(crate) fn read_again_for_branch_1(&self) -> bool {
        self.read_again_for_branch_1.get()
    }

    pub(crate) fn read_again_for_branch_2(&self) -> bool {
        self.read_again_for_branch_2.get()
    }

    pub(crate) fn clear_read_again(&self) {
        self.read_again_for_branch_1.set(false);
        self.read_again_for_branch_2.set(false);
    }

    pub(crate) fn cancel_promise(&self) -> &Promise<()> {
        &self.cancel_promise
    }

    /// Error both branches, as done when the reader errors or a chunk cannot be cloned.
    pub(crate) fn error_branches(&self, error: Error) {
        // Perform ! ReadableByteStreamControllerError(branch1.[[controller]], r).
        if let Some(branch_1) = self.branch_1() {
            branch_1.perform_error(error.clone());
        }

        // Perform ! ReadableByteStreamControllerError(branch2.[[controller]], r).
        if let Some(branch_2) = self.branch_2() {
            branch_2.perform_error(error);
        }
    }

    fn is_current_reader(&self, reader: &ReaderType<ArrayBufferView>) -> bool {
        match (&*self.reader.borrow(), reader) {
            (ReaderType::Default(current), ReaderType::Default(other)) => Rc::ptr_eq(current, other),
            (ReaderType::BYOB(current), ReaderType::BYOB(other)) => Rc::ptr_eq(current, other),
            _ => false,
        }
    }

    /// Let forwardReaderError be the following steps, taking a thisReader argument:
    fn forward_reader_error(self: &Rc<Self>, this_reader: ReaderType<ArrayBufferView>) {
        let closed_promise = match &this_reader {
            ReaderType::Default(reader) => reader.closed(),
            ReaderType::BYOB(reader) => reader.closed(),
        };

        let tee = self.clone();

        // Upon rejection of thisReader.[[closedPromise]] with reason r,
        closed_promise.append_native_handler(
            |()| {},
            move |error| {
                // If thisReader is not reader, return.
                if !tee.is_current_reader(&this_reader) {
                    return;
                }

                tee.error_branches(error);

                // If canceled1 is false or canceled2 is false, resolve cancelPromise with undefined.
                if !tee.canceled_1() || !tee.canceled_2() {
                    tee.cancel_promise.resolve_native(());
                }
            },
        );
    }

    /// Let pullWithDefaultReader be the following steps:
    fn pull_with_default_reader(self: &Rc<Self>) {
        // If reader implements ReadableStreamBYOBReader,
        let current_reader = self.reader.borrow().clone();
        if let ReaderType::BYOB(byob_reader) = current_reader {
            // Assert: reader.[[readIntoRequests]] is empty.
            assert_eq!(byob_reader.get_num_read_into_requests(), 0);

            // Perform ! ReadableStreamBYOBReaderRelease(reader).
            byob_reader.release();

            // Set reader to ! AcquireReadableStreamDefaultReader(stream).
            let default_reader = self
                .stream
                .get_reader()
                .expect("Stream should be unlocked after releasing the BYOB reader");
            *self.reader.borrow_mut() = ReaderType::Default(default_reader.clone());

            // Perform forwardReaderError, given reader.
            self.forward_reader_error(ReaderType::Default(default_reader));
        }

        let ReaderType::Default(reader) = self.reader.borrow().clone() else {
            unreachable!("The tee should hold a default reader.");
        };

        // Let readRequest be a read request with the following items:
        let read_request = ReadRequest::Steps(Box::new(ByteTeeReadRequest::new(self.clone())));

        // Perform ! ReadableStreamDefaultReaderRead(reader, readRequest).
        reader.read_with_request(read_request);
    }

    /// Let pullWithBYOBReader be the following steps, given view and forBranch2:
    fn pull_with_byob_reader(self: &Rc<Self>, view: ArrayBufferView, for_branch_2: bool) {
        // If reader implements ReadableStreamDefaultReader,
        let current_reader = self.reader.borrow().clone();
        if let ReaderType::Default(default_reader) = current_reader {
            // Assert: reader.[[readRequests]] is empty.
            assert_eq!(default_reader.get_num_read_requests(), 0);

            // Perform ! ReadableStreamDefaultReaderRelease(reader).
            default_reader.release();

            // Set reader to ! AcquireReadableStreamBYOBReader(stream).
            let byob_reader = ReadableStreamBYOBReader::new(&self.stream)
                .expect("Stream should be unlocked after releasing the default reader");
            *self.reader.borrow_mut() = ReaderType::BYOB(byob_reader.clone());

            // Perform forwardReaderError, given reader.
            self.forward_reader_error(ReaderType::BYOB(byob_reader));
        }

        let ReaderType::BYOB(reader) = self.reader.borrow().clone() else {
            unreachable!("The tee should hold a BYOB reader.");
        };

        // Let readIntoRequest be a read-into request with the following items:
        let read_into_request = ReadIntoRequest::Steps(Box::new(ByteTeeReadIntoRequest::new(
            self.clone(),
            for_branch_2,
        )));

        // Perform ! ReadableStreamBYOBReaderRead(reader, view, 1, readIntoRequest).
        reader.read_with_request(view, 1, read_into_request);
    }

    /// Let pull1Algorithm and pull2Algorithm be the following steps:
    pub(crate) fn pull_algorithm(self: &Rc<Self>, which: ByteTeePullAlgorithm) -> Promise<()> {
        // If reading is true,
        if self.reading.get() {
            // Set readAgainForBranch1 (or readAgainForBranch2) to true.
            match which {
                ByteTeePullAlgorithm::Pull1Algorithm => self.read_again_for_branch_1.set(true),
                ByteTeePullAlgorithm::Pull2Algorithm => self.read_again_for_branch_2.set(true),
            }

            // Return a promise resolved with undefined.
            return Promise::resolved();
        }

        // Set reading to true.
        self.reading.set(true);

        // Let byobRequest be ! ReadableByteStreamControllerGetBYOBRequest(branch.[[controller]]).
        let branch = match which {
            ByteTeePullAlgorithm::Pull1Algorithm => self.branch_1(),
            ByteTeePullAlgorithm::Pull2Algorithm => self.branch_2(),
        };
        let view = branch
            .and_then(|controller| controller.get_byob_request())
            .and_then(|byob_request| byob_request.view());

        match view {
            // If byobRequest is null, perform pullWithDefaultReader.
            None => self.pull_with_default_reader(),
            // Otherwise, perform pullWithBYOBReader, given byobRequest.[[view]] and forBranch2.
            Some(view) => {
                self.pull_with_byob_reader(view, which == ByteTeePullAlgorithm::Pull2Algorithm)
            },
        }

        // Return a promise resolved with undefined.
        Promise::resolved()
    }

    /// Let cancel1Algorithm and cancel2Algorithm be the following steps, taking a reason argument:
    fn cancel_algorithm(&self, which: ByteTeePullAlgorithm, reason: Error) -> Promise<()> {
        let other_canceled = match which {
            ByteTeePullAlgorithm::Pull1Algorithm => {
                // Set canceled1 to true.
                self.canceled_1.set(true);

                // Set reason1 to reason.
                *self.reason_1.borrow_mut() = Some(reason);

                self.canceled_2.get()
            },
            ByteTeePullAlgorithm::Pull2Algorithm => {
                // Set canceled2 to true.
                self.canceled_2.set(true);

                // Set reason2 to reason.
                *self.reason_2.borrow_mut() = Some(reason);

                self.canceled_1.get()
            },
        };

        // If canceled2 (or canceled1) is true,
        if other_canceled {
            // Let compositeReason be ! CreateArrayFromList(« reason1, reason2 »).
            let composite_reason = Error::Composite(vec![
                self.reason_1.borrow().clone().unwrap_or(Error::Undefined),
                self.reason_2.borrow().clone().unwrap_or(Error::Undefined),
            ]);
            debug!("Both branches of a byte stream tee were canceled");

            // Let cancelResult be ! ReadableStreamCancel(stream, compositeReason).
            let cancel_result = self.stream.cancel_stream(composite_reason);

            // Resolve cancelPromise with cancelResult.
            self.cancel_promise.resolve_with_promise(&cancel_result);
        }

        // Return cancelPromise.
        self.cancel_promise.clone()
    }
}

/// The underlying byte source of either branch of a byte stream tee.
pub(crate) struct ByteTeeUnderlyingSource {
    tee: Rc<ByteTee>,
    which: ByteTeePullAlgorithm,
}

impl UnderlyingByteSource for ByteTeeUnderlyingSource {
    fn start(&mut self, controller: &Rc<ReadableByteStreamController>) -> AlgorithmResult {
        // Let startAlgorithm be an algorithm that returns undefined.
        let branch = match self.which {
            ByteTeePullAlgorithm::Pull1Algorithm => &self.tee.branch_1,
            ByteTeePullAlgorithm::Pull2Algorithm => &self.tee.branch_2,
        };
        *branch.borrow_mut() = Rc::downgrade(controller);
        Ok(None)
    }

    fn pull(&mut self, _controller: &Rc<ReadableByteStreamController>) -> AlgorithmResult {
        Ok(Some(self.tee.pull_algorithm(self.which)))
    }

    fn cancel(&mut self, reason: Error) -> AlgorithmResult {
        Ok(Some(self.tee.cancel_algorithm(self.which, reason)))
    }
}

/// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamtee>
pub(crate) fn readable_byte_stream_tee(
    stream: &Rc<ReadableStream<ArrayBufferView>>,
) -> Fallible<(
    Rc<ReadableStream<ArrayBufferView>>,
    Rc<ReadableStream<ArrayBufferView>>,
)> {
    // Assert: stream.[[controller]] implements ReadableByteStreamController.
    assert!(stream.byte_controller().is_some());

    // Let reader be ? AcquireReadableStreamDefaultReader(stream).
    let reader = stream.get_reader()?;

    let tee = Rc::new(ByteTee {
        stream: stream.clone(),
        reader: RefCell::new(ReaderType::Default(reader.clone())),
        branch_1: RefCell::new(Weak::new()),
        branch_2: RefCell::new(Weak::new()),
        reading: Cell::new(false),
        read_again_for_branch_1: Cell::new(false),
        read_again_for_branch_2: Cell::new(false),
        canceled_1: Cell::new(false),
        canceled_2: Cell::new(false),
        reason_1: RefCell::new(None),
        reason_2: RefCell::new(None),
        cancel_promise: Promise::new(),
    });

    // Set branch1 to ! CreateReadableByteStream(startAlgorithm, pull1Algorithm, cancel1Algorithm).
    let branch_1 = ReadableStream::create_byte_stream(Box::new(ByteTeeUnderlyingSource {
        tee: tee.clone(),
        which: ByteTeePullAlgorithm::Pull1Algorithm,
    }))?;

    // Set branch2 to ! CreateReadableByteStream(startAlgorithm, pull2Algorithm, cancel2Algorithm).
    let branch_2 = ReadableStream::create_byte_stream(Box::new(ByteTeeUnderlyingSource {
        tee: tee.clone(),
        which: ByteTeePullAlgorithm::Pull2Algorithm,
    }))?;

    // Perform forwardReaderError, given reader.
    tee.forward_reader_error(ReaderType::Default(reader));

    // Return « branch1, branch2 ».
    Ok((branch_1, branch_2))
}
