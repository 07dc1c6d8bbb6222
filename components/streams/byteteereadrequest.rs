/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use log::warn;

use crate::byteteeunderlyingsource::{ByteTee, ByteTeePullAlgorithm};
use crate::error::{Error, ErrorResult};
use crate::microtask::enqueue_microtask;
use crate::readablestreamdefaultreader::ReadRequestSteps;
use crate::typedarray::ArrayBufferView;

/// The read request used by a byte stream tee while it holds a default reader.
/// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamtee>
pub(crate) struct ByteTeeReadRequest {
    tee: Rc<ByteTee>,
}

impl ByteTeeReadRequest {
    pub(crate) fn new(tee: Rc<ByteTee>) -> ByteTeeReadRequest {
        ByteTeeReadRequest { tee }
    }
}

fn chunk_steps(tee: &Rc<ByteTee>, chunk: ArrayBufferView) -> ErrorResult {
    // Set readAgainForBranch1 to false.
    // Set readAgainForBranch2 to false.
    tee.clear_read_again();

    // Let chunk1 and chunk2 be chunk.
    let chunk_1 = chunk;
    let mut chunk_2 = chunk_1.clone();

    // If canceled1 is false and canceled2 is false,
    if !tee.canceled_1() && !tee.canceled_2() {
        // Let cloneResult be CloneAsUint8Array(chunk).
        match chunk_1.clone_as_uint8_array() {
            // Otherwise, set chunk2 to cloneResult.[[Value]].
            Ok(cloned) => chunk_2 = cloned,
            // If cloneResult is an abrupt completion,
            Err(error) => {
                // Perform ! ReadableByteStreamControllerError(branch1.[[controller]], cloneResult.[[Value]]).
                // Perform ! ReadableByteStreamControllerError(branch2.[[controller]], cloneResult.[[Value]]).
                tee.error_branches(error.clone());

                // Resolve cancelPromise with ! ReadableStreamCancel(stream, cloneResult.[[Value]]).
                let cancel_result = tee.stream().cancel_stream(error);
                tee.cancel_promise().resolve_with_promise(&cancel_result);

                // Return.
                return Ok(());
            },
        }
    }

    // If canceled1 is false, perform ! ReadableByteStreamControllerEnqueue(branch1.[[controller]], chunk1).
    if !tee.canceled_1() {
        if let Some(branch_1) = tee.branch_1() {
            branch_1.perform_enqueue(chunk_1)?;
        }
    }

    // If canceled2 is false, perform ! ReadableByteStreamControllerEnqueue(branch2.[[controller]], chunk2).
    if !tee.canceled_2() {
        if let Some(branch_2) = tee.branch_2() {
            branch_2.perform_enqueue(chunk_2)?;
        }
    }

    // Set reading to false.
    tee.set_reading(false);

    // If readAgainForBranch1 is true, perform pull1Algorithm.
    // Otherwise, if readAgainForBranch2 is true, perform pull2Algorithm.
    if tee.read_again_for_branch_1() {
        tee.pull_algorithm(ByteTeePullAlgorithm::Pull1Algorithm);
    } else if tee.read_again_for_branch_2() {
        tee.pull_algorithm(ByteTeePullAlgorithm::Pull2Algorithm);
    }
    Ok(())
}

fn close_steps(tee: &Rc<ByteTee>) -> ErrorResult {
    // Set reading to false.
    tee.set_reading(false);

    let branch_1 = tee.branch_1();
    let branch_2 = tee.branch_2();

    // If canceled1 is false, perform ! ReadableByteStreamControllerClose(branch1.[[controller]]).
    if !tee.canceled_1() {
        if let Some(branch_1) = &branch_1 {
            branch_1.perform_close()?;
        }
    }

    // If canceled2 is false, perform ! ReadableByteStreamControllerClose(branch2.[[controller]]).
    if !tee.canceled_2() {
        if let Some(branch_2) = &branch_2 {
            branch_2.perform_close()?;
        }
    }

    // If branch1.[[controller]].[[pendingPullIntos]] is not empty,
    // perform ! ReadableByteStreamControllerRespond(branch1.[[controller]], 0).
    if let Some(branch_1) = &branch_1 {
        if branch_1.get_pending_pull_intos_size() > 0 {
            branch_1.respond(0)?;
        }
    }

    // If branch2.[[controller]].[[pendingPullIntos]] is not empty,
    // perform ! ReadableByteStreamControllerRespond(branch2.[[controller]], 0).
    if let Some(branch_2) = &branch_2 {
        if branch_2.get_pending_pull_intos_size() > 0 {
            branch_2.respond(0)?;
        }
    }

    // If canceled1 is false or canceled2 is false, resolve cancelPromise with undefined.
    if !tee.canceled_1() || !tee.canceled_2() {
        tee.cancel_promise().resolve_native(());
    }
    Ok(())
}

impl ReadRequestSteps<ArrayBufferView> for ByteTeeReadRequest {
    /// <https://streams.spec.whatwg.org/#read-request-chunk-steps>
    fn chunk_steps(&self, chunk: ArrayBufferView) {
        // Queue a microtask to perform the following steps:
        let tee = self.tee.clone();
        enqueue_microtask(move || {
            if let Err(error) = chunk_steps(&tee, chunk) {
                warn!("Byte tee failed to forward a chunk to its branches: {error}");
            }
        });
    }

    /// <https://streams.spec.whatwg.org/#read-request-close-steps>
    fn close_steps(&self) {
        if let Err(error) = close_steps(&self.tee) {
            warn!("Byte tee failed to close its branches: {error}");
        }
    }

    /// <https://streams.spec.whatwg.org/#read-request-error-steps>
    fn error_steps(&self, _error: Error) {
        // Set reading to false.
        self.tee.set_reading(false);
    }
}
