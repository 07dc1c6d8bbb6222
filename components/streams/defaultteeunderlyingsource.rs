/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::debug;

use crate::algorithms::AlgorithmResult;
use crate::defaultteereadrequest::DefaultTeeReadRequest;
use crate::error::{Error, Fallible};
use crate::promise::Promise;
use crate::readablestream::ReadableStream;
use crate::readablestreamdefaultcontroller::ReadableStreamDefaultController;
use crate::readablestreamdefaultreader::{ReadRequest, ReadableStreamDefaultReader};
use crate::underlyingsource::UnderlyingSource;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TeeCancelAlgorithm {
    Cancel1Algorithm,
    Cancel2Algorithm,
}

/// The variables shared by the algorithms of
/// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamdefaulttee>
pub(crate) struct DefaultTee<T> {
    stream: Rc<ReadableStream<T>>,
    reader: Rc<ReadableStreamDefaultReader<T>>,
    branch_1: RefCell<Weak<ReadableStreamDefaultController<T>>>,
    branch_2: RefCell<Weak<ReadableStreamDefaultController<T>>>,
    reading: Cell<bool>,
    read_again: Cell<bool>,
    canceled_1: Cell<bool>,
    canceled_2: Cell<bool>,
    reason_1: RefCell<Option<Error>>,
    reason_2: RefCell<Option<Error>>,
    cancel_promise: Promise<()>,
}

impl<T: Clone + 'static> DefaultTee<T> {
    pub(crate) fn branch_1(&self) -> Option<Rc<ReadableStreamDefaultController<T>>> {
        self.branch_1.borrow().upgrade()
    }

    pub(crate) fn branch_2(&self) -> Option<Rc<ReadableStreamDefaultController<T>>> {
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

    pub(crate) fn read_again(&self) -> bool {
        self.read_again.get()
    }

    pub(crate) fn set_read_again(&self, read_again: bool) {
        self.read_again.set(read_again);
    }

    pub(crate) fn cancel_promise(&self) -> &Promise<()> {
        &self.cancel_promise
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamdefaulttee>
    /// Let pullAlgorithm be the following steps:
    pub(crate) fn pull_algorithm(self: &Rc<Self>) -> Promise<()> {
        // If reading is true,
        if self.reading.get() {
            // Set readAgain to true.
            self.read_again.set(true);

            // Return a promise resolved with undefined.
            return Promise::resolved();
        }

        // Set reading to true.
        self.reading.set(true);

        // Let readRequest be a read request with the following items:
        let read_request = ReadRequest::Steps(Box::new(DefaultTeeReadRequest::new(self.clone())));

        // Perform ! ReadableStreamDefaultReaderRead(reader, readRequest).
        self.reader.read_with_request(read_request);

        // Return a promise resolved with undefined.
        Promise::resolved()
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamdefaulttee>
    /// Let cancel1Algorithm and cancel2Algorithm be the following steps, taking a reason argument:
    fn cancel_algorithm(&self, which: TeeCancelAlgorithm, reason: Error) -> Promise<()> {
        let other_canceled = match which {
            TeeCancelAlgorithm::Cancel1Algorithm => {
                // Set canceled1 to true.
                self.canceled_1.set(true);

                // Set reason1 to reason.
                *self.reason_1.borrow_mut() = Some(reason);

                self.canceled_2.get()
            },
            TeeCancelAlgorithm::Cancel2Algorithm => {
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
            debug!("Both branches of a tee were canceled");

            // Let cancelResult be ! ReadableStreamCancel(stream, compositeReason).
            let cancel_result = self.stream.cancel_stream(composite_reason);

            // Resolve cancelPromise with cancelResult.
            self.cancel_promise.resolve_with_promise(&cancel_result);
        }

        // Return cancelPromise.
        self.cancel_promise.clone()
    }
}

/// The underlying source of either branch of a default tee.
pub(crate) struct DefaultTeeUnderlyingSource<T> {
    tee: Rc<DefaultTee<T>>,
    which: TeeCancelAlgorithm,
}

impl<T: Clone + 'static> UnderlyingSource<T> for DefaultTeeUnderlyingSource<T> {
    fn start(&mut self, controller: &Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult {
        // Let startAlgorithm be an algorithm that returns undefined.
        let branch = match self.which {
            TeeCancelAlgorithm::Cancel1Algorithm => &self.tee.branch_1,
            TeeCancelAlgorithm::Cancel2Algorithm => &self.tee.branch_2,
        };
        *branch.borrow_mut() = Rc::downgrade(controller);
        Ok(None)
    }

    fn pull(&mut self, _controller: &Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult {
        Ok(Some(self.tee.pull_algorithm()))
    }

    fn cancel(&mut self, reason: Error) -> AlgorithmResult {
        Ok(Some(self.tee.cancel_algorithm(self.which, reason)))
    }
}

/// <https://streams.spec.whatwg.org/#abstract-opdef-readablestreamdefaulttee>
pub(crate) fn readable_stream_default_tee<T: Clone + 'static>(
    stream: &Rc<ReadableStream<T>>,
) -> Fallible<(Rc<ReadableStream<T>>, Rc<ReadableStream<T>>)> {
    // Let reader be ? AcquireReadableStreamDefaultReader(stream).
    let reader = stream.get_reader()?;

    // Let reading be false.
    // Let readAgain be false.
    // Let canceled1 be false.
    // Let canceled2 be false.
    // Let reason1 be undefined.
    // Let reason2 be undefined.
    // Let branch1 be undefined.
    // Let branch2 be undefined.
    // Let cancelPromise be a new promise.
    let tee = Rc::new(DefaultTee {
        stream: stream.clone(),
        reader: reader.clone(),
        branch_1: RefCell::new(Weak::new()),
        branch_2: RefCell::new(Weak::new()),
        reading: Cell::new(false),
        read_again: Cell::new(false),
        canceled_1: Cell::new(false),
        canceled_2: Cell::new(false),
        reason_1: RefCell::new(None),
        reason_2: RefCell::new(None),
        cancel_promise: Promise::new(),
    });

    // Set branch1 to ! CreateReadableStream(startAlgorithm, pullAlgorithm, cancel1Algorithm).
    let branch_1 = ReadableStream::create(
        Box::new(DefaultTeeUnderlyingSource {
            tee: tee.clone(),
            which: TeeCancelAlgorithm::Cancel1Algorithm,
        }),
        1.0,
        Rc::new(|_: &T| Ok(1.0)),
    )?;

    // Set branch2 to ! CreateReadableStream(startAlgorithm, pullAlgorithm, cancel2Algorithm).
    let branch_2 = ReadableStream::create(
        Box::new(DefaultTeeUnderlyingSource {
            tee: tee.clone(),
            which: TeeCancelAlgorithm::Cancel2Algorithm,
        }),
        1.0,
        Rc::new(|_: &T| Ok(1.0)),
    )?;

    // Upon rejection of reader.[[closedPromise]] with reason r,
    reader.closed().append_native_handler(
        |()| {},
        move |error| {
            // Perform ! ReadableStreamDefaultControllerError(branch1.[[controller]], r).
            if let Some(branch_1) = tee.branch_1() {
                branch_1.perform_error(error.clone());
            }

            // Perform ! ReadableStreamDefaultControllerError(branch2.[[controller]], r).
            if let Some(branch_2) = tee.branch_2() {
                branch_2.perform_error(error);
            }

            // If canceled1 is false or canceled2 is false, resolve cancelPromise with undefined.
            if !tee.canceled_1() || !tee.canceled_2() {
                tee.cancel_promise().resolve_native(());
            }
        },
    );

    // Return « branch1, branch2 ».
    Ok((branch_1, branch_2))
}
