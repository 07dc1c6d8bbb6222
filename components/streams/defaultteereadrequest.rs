/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use crate::defaultteeunderlyingsource::DefaultTee;
use crate::error::Error;
use crate::microtask::enqueue_microtask;
use crate::readablestreamdefaultreader::ReadRequestSteps;

/// <https://streams.spec.whatwg.org/#ref-for-read-request%E2%91%A2>
pub(crate) struct DefaultTeeReadRequest<T> {
    tee: Rc<DefaultTee<T>>,
}

impl<T: Clone + 'static> DefaultTeeReadRequest<T> {
    pub(crate) fn new(tee: Rc<DefaultTee<T>>) -> DefaultTeeReadRequest<T> {
        DefaultTeeReadRequest { tee }
    }
}

/// <https://streams.spec.whatwg.org/#ref-for-read-request-chunk-steps%E2%91%A2>
fn chunk_steps<T: Clone + 'static>(tee: &Rc<DefaultTee<T>>, chunk: T) {
    // Set readAgain to false.
    tee.set_read_again(false);

    // Let chunk1 and chunk2 be chunk.
    let chunk_1 = chunk.clone();
    let chunk_2 = chunk;

    // If canceled1 is false, perform ! ReadableStreamDefaultControllerEnqueue(branch1.[[controller]], chunk1).
    if !tee.canceled_1() {
        if let Some(branch_1) = tee.branch_1() {
            branch_1
                .perform_enqueue(chunk_1)
                .expect("enqueue failed for stream controller in DefaultTeeReadRequest");
        }
    }

    // If canceled2 is false, perform ! ReadableStreamDefaultControllerEnqueue(branch2.[[controller]], chunk2).
    if !tee.canceled_2() {
        if let Some(branch_2) = tee.branch_2() {
            branch_2
                .perform_enqueue(chunk_2)
                .expect("enqueue failed for stream controller in DefaultTeeReadRequest");
        }
    }

    // Set reading to false.
    tee.set_reading(false);

    // If readAgain is true, perform pullAlgorithm.
    if tee.read_again() {
        tee.pull_algorithm();
    }
}

impl<T: Clone + 'static> ReadRequestSteps<T> for DefaultTeeReadRequest<T> {
    /// <https://streams.spec.whatwg.org/#ref-for-read-request-chunk-steps%E2%91%A2>
    fn chunk_steps(&self, chunk: T) {
        // Queue a microtask to perform the following steps:
        let tee = self.tee.clone();
        enqueue_microtask(move || chunk_steps(&tee, chunk));
    }

    /// <https://streams.spec.whatwg.org/#read-request-close-steps>
    fn close_steps(&self) {
        // Set reading to false.
        self.tee.set_reading(false);

        // If canceled1 is false, perform ! ReadableStreamDefaultControllerClose(branch1.[[controller]]).
        if !self.tee.canceled_1() {
            if let Some(branch_1) = self.tee.branch_1() {
                branch_1.perform_close();
            }
        }

        // If canceled2 is false, perform ! ReadableStreamDefaultControllerClose(branch2.[[controller]]).
        if !self.tee.canceled_2() {
            if let Some(branch_2) = self.tee.branch_2() {
                branch_2.perform_close();
            }
        }

        // If canceled1 is false or canceled2 is false, resolve cancelPromise with undefined.
        if !self.tee.canceled_1() || !self.tee.canceled_2() {
            self.tee.cancel_promise().resolve_native(());
        }
    }

    /// <https://streams.spec.whatwg.org/#read-request-error-steps>
    fn error_steps(&self, _error: Error) {
        // Set reading to false.
        self.tee.set_reading(false);
    }
}
