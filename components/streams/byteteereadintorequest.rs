/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use log::warn;

use crate::byteteeunderlyingsource::{ByteTee, ByteTeePullAlgorithm};
use crate::error::{Error, ErrorResult};
use crate::microtask::enqueue_microtask;
use crate::readablebytestreamcontroller::ReadableByteStreamController;
use crate::readablestreambyobreader::ReadIntoRequestSteps;
use crate::typedarray::ArrayBufferView;

/// The read-into request used by a byte stream tee while it holds a BYOB reader.
/// <https://streams.spec.whatwg.org/#abstract-opdef-readablebytestreamtee>
pub(crate) struct ByteTeeReadIntoRequest {
    tee: Rc<ByteTee>,
    for_branch_2: bool,
}

impl ByteTeeReadIntoRequest {
    pub(crate) fn new(tee: Rc<ByteTee>, for_branch_2: bool) -> ByteTeeReadIntoRequest {
        ByteTeeReadIntoRequest { tee, for_branch_2 }
    }

    /// Let byobBranch be branch2 if forBranch2 is true, and branch1 otherwise.
    /// Let otherBranch be branch2 if forBranch2 is false, and branch1 otherwise.
    fn branches(
        &self,
    ) -> (
        Option<Rc<ReadableByteStreamController>>,
        Option<Rc<ReadableByteStreamController>>,
    ) {
        if self.for_branch_2 {
            (self.tee.branch_2(), self.tee.branch_1())
        } else {
            (self.tee.branch_1(), self.tee.branch_2())
        }
    }

    /// Let byobCanceled be canceled2 if forBranch2 is true, and canceled1 otherwise.
    /// Let otherCanceled be canceled2 if forBranch2 is false, and canceled1 otherwise.
    fn canceled(&self) -> (bool, bool) {
        if self.for_branch_2 {
            (self.tee.canceled_2(), self.tee.canceled_1())
        } else {
            (self.tee.canceled_1(), self.tee.canceled_2())
        }
    }

    fn chunk_steps_impl(&self, chunk: ArrayBufferView) -> ErrorResult {
        // Set readAgainForBranch1 to false.
        // Set readAgainForBranch2 to false.
        self.tee.clear_read_again();

        let (byob_branch, other_branch) = self.branches();
        let (byob_canceled, other_canceled) = self.canceled();

        // If otherCanceled is false,
        if !other_canceled {
            // Let cloneResult be CloneAsUint8Array(chunk).
            let cloned_chunk = match chunk.clone_as_uint8_array() {
                Ok(cloned_chunk) => cloned_chunk,
                // If cloneResult is an abrupt completion,
                Err(error) => {
                    // Perform ! ReadableByteStreamControllerError(byobBranch.[[controller]], cloneResult.[[Value]]).
                    // Perform ! ReadableByteStreamControllerError(otherBranch.[[controller]], cloneResult.[[Value]]).
                    self.tee.error_branches(error.clone());

                    // Resolve cancelPromise with ! ReadableStreamCancel(stream, cloneResult.[[Value]]).
                    let cancel_result = self.tee.stream().cancel_stream(error);
                    self.tee.cancel_promise().resolve_with_promise(&cancel_result);

                    // Return.
                    return Ok(());
                },
            };

            // If byobCanceled is false, perform !
            // ReadableByteStreamControllerRespondWithNewView(byobBranch.[[controller]], chunk).
            if !byob_canceled {
                if let Some(byob_branch) = &byob_branch {
                    byob_branch.respond_with_new_view(chunk)?;
                }
            }

            // Perform ! ReadableByteStreamControllerEnqueue(otherBranch.[[controller]], clonedChunk).
            if let Some(other_branch) = &other_branch {
                other_branch.perform_enqueue(cloned_chunk)?;
            }
        } else if !byob_canceled {
            // Otherwise, if byobCanceled is false, perform
            // ! ReadableByteStreamControllerRespondWithNewView(byobBranch.[[controller]], chunk).
            if let Some(byob_branch) = &byob_branch {
                byob_branch.respond_with_new_view(chunk)?;
            }
        }

        // Set reading to false.
        self.tee.set_reading(false);

        // If readAgainForBranch1 is true, perform pull1Algorithm.
        // Otherwise, if readAgainForBranch2 is true, perform pull2Algorithm.
        if self.tee.read_again_for_branch_1() {
            self.tee.pull_algorithm(ByteTeePullAlgorithm::Pull1Algorithm);
        } else if self.tee.read_again_for_branch_2() {
            self.tee.pull_algorithm(ByteTeePullAlgorithm::Pull2Algorithm);
        }
        Ok(())
    }

    fn close_steps_impl(&self, chunk: Option<ArrayBufferView>) -> ErrorResult {
        // Set reading to false.
        self.tee.set_reading(false);

        let (byob_branch, other_branch) = self.branches();
        let (byob_canceled, other_canceled) = self.canceled();

        // If byobCanceled is false, perform ! ReadableByteStreamControllerClose(byobBranch.[[controller]]).
        if !byob_canceled {
            if let Some(byob_branch) = &byob_branch {
                byob_branch.perform_close()?;
            }
        }

        // If otherCanceled is false, perform ! ReadableByteStreamControllerClose(otherBranch.[[controller]]).
        if !other_canceled {
            if let Some(other_branch) = &other_branch {
                other_branch.perform_close()?;
            }
        }

        // If chunk is not undefined,
        if let Some(chunk) = chunk {
            // Assert: chunk.[[ByteLength]] is 0.
            assert_eq!(chunk.byte_length(), 0);

            // If byobCanceled is false, perform
            // ! ReadableByteStreamControllerRespondWithNewView(byobBranch.[[controller]], chunk).
            if !byob_canceled {
                if let Some(byob_branch) = &byob_branch {
                    byob_branch.respond_with_new_view(chunk)?;
                }
            }

            // If otherCanceled is false and otherBranch.[[controller]].[[pendingPullIntos]] is not empty,
            // perform ! ReadableByteStreamControllerRespond(otherBranch.[[controller]], 0).
            if !other_canceled {
                if let Some(other_branch) = &other_branch {
                    if other_branch.get_pending_pull_intos_size() > 0 {
                        other_branch.respond(0)?;
                    }
                }
            }
        }

        // If byobCanceled is false or otherCanceled is false, resolve cancelPromise with undefined.
        if !byob_canceled || !other_canceled {
            self.tee.cancel_promise().resolve_native(());
        }
        Ok(())
    }
}

impl ReadIntoRequestSteps for ByteTeeReadIntoRequest {
    /// <https://streams.spec.whatwg.org/#read-into-request-chunk-steps>
    fn chunk_steps(&self, chunk: ArrayBufferView) {
        // Queue a microtask to perform the following steps:
        let request = ByteTeeReadIntoRequest::new(self.tee.clone(), self.for_branch_2);
        enqueue_microtask(move || {
            if let Err(error) = request.chunk_steps_impl(chunk) {
                warn!("Byte tee failed to forward a chunk to its branches: {error}");
            }
        });
    }

    /// <https://streams.spec.whatwg.org/#read-into-request-close-steps>
    fn close_steps(&self, chunk: Option<ArrayBufferView>) {
        if let Err(error) = self.close_steps_impl(chunk) {
            warn!("Byte tee failed to close its branches: {error}");
        }
    }

    /// <https://streams.spec.whatwg.org/#read-into-request-error-steps>
    fn error_steps(&self, _error: Error) {
        // Set reading to false.
        self.tee.set_reading(false);
    }
}
