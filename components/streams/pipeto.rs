/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::abortsignal::{AbortAlgorithmId, AbortSignal};
use crate::error::Error;
use crate::promise::{Promise, wait_for_all};
use crate::readablestream::ReadableStream;
use crate::readablestreamdefaultreader::{
    ReadRequest, ReadRequestSteps, ReadableStreamDefaultReader,
};
use crate::writablestream::WritableStream;
use crate::writablestreamdefaultwriter::WritableStreamDefaultWriter;

/// <https://streams.spec.whatwg.org/#dictdef-streampipeoptions>
#[derive(Clone, Default)]
pub struct StreamPipeOptions {
    pub prevent_abort: bool,
    pub prevent_cancel: bool,
    pub prevent_close: bool,
    pub signal: Option<Rc<AbortSignal>>,
}

impl fmt::Debug for StreamPipeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPipeOptions")
            .field("prevent_abort", &self.prevent_abort)
            .field("prevent_cancel", &self.prevent_cancel)
            .field("prevent_close", &self.prevent_close)
            .field("signal", &self.signal.as_ref().map(|signal| signal.aborted()))
            .finish()
    }
}

/// The state of one running pipe, shared by the read request, the watchers on the
/// reader and writer, and the abort algorithm.
struct PipeTo<T> {
    source: Rc<ReadableStream<T>>,
    dest: Rc<WritableStream<T>>,
    reader: Rc<ReadableStreamDefaultReader<T>>,
    writer: Rc<WritableStreamDefaultWriter<T>>,
    prevent_abort: bool,
    prevent_cancel: bool,
    prevent_close: bool,
    signal: Option<Rc<AbortSignal>>,
    abort_algorithm: Cell<Option<AbortAlgorithmId>>,

    /// Once set, no further reads or writes are issued.
    shutting_down: Cell<bool>,

    /// The promise of the last chunk handed to the writer. Writes complete in order,
    /// so once it settles every chunk read so far has been written.
    current_write: RefCell<Option<Promise<()>>>,

    /// The promise returned by `pipeTo`.
    result: Promise<()>,
}

/// The read request issued by the pipe loop.
struct PipeReadRequest<T> {
    pipe: Rc<PipeTo<T>>,
}

impl<T: Clone + 'static> ReadRequestSteps<T> for PipeReadRequest<T> {
    fn chunk_steps(&self, chunk: T) {
        // A chunk read before shutdown began is still written; shutdown waits for it.
        let write = self.pipe.writer.write_chunk(chunk);
        write.set_promise_is_handled();
        *self.pipe.current_write.borrow_mut() = Some(write);

        self.pipe.pipe_step();
    }

    // Closing and erroring are observed through the reader's closed promise.
    fn close_steps(&self) {}

    fn error_steps(&self, _error: Error) {}
}

impl<T: Clone + 'static> PipeTo<T> {
    /// Wait for the destination to be ready, then read the next chunk.
    fn pipe_step(self: &Rc<Self>) {
        if self.shutting_down.get() {
            return;
        }

        let pipe = self.clone();
        self.writer.ready().append_native_handler(
            move |()| pipe.read_chunk(),
            // A rejected ready promise means the destination is erroring; the writer's
            // closed promise drives the shutdown.
            |_| {},
        );
    }

    fn read_chunk(self: &Rc<Self>) {
        if self.shutting_down.get() {
            return;
        }

        let request = PipeReadRequest { pipe: self.clone() };
        self.reader
            .read_with_request(ReadRequest::Steps(Box::new(request)));
    }

    /// Check the four propagation conditions, in order, against the current states
    /// of both streams. Returns whether a shutdown has begun.
    fn check_states(self: &Rc<Self>) -> bool {
        // Errors must be propagated forward:
        // if source.[[state]] is or becomes "errored", then
        if self.source.is_errored() {
            self.on_source_errored(self.source.get_stored_error());
            return true;
        }

        // Errors must be propagated backward:
        // if dest.[[state]] is or becomes "errored", then
        if self.dest.is_errored() {
            self.on_dest_errored(self.dest.get_stored_error());
            return true;
        }

        // Closing must be propagated forward:
        // if source.[[state]] is or becomes "closed", then
        if self.source.is_closed() {
            self.on_source_closed();
            return true;
        }

        // Closing must be propagated backward:
        // if ! WritableStreamCloseQueuedOrInFlight(dest) is true or dest.[[state]] is "closed", then
        if self.dest.close_queued_or_in_flight() || self.dest.is_closed() {
            // Assert: no chunks have been read or written.
            assert!(self.current_write.borrow().is_none());

            // Let destClosed be a new TypeError.
            let dest_closed = Error::Type("Destination stream is closed".into());

            // If preventCancel is false, shutdown with an action of
            // ! ReadableStreamCancel(source, destClosed) and with destClosed.
            if !self.prevent_cancel {
                let source = self.source.clone();
                let reason = dest_closed.clone();
                self.shutdown_with_action(move || source.cancel_stream(reason), Some(dest_closed));
            } else {
                // Otherwise, shutdown with destClosed.
                self.shutdown(Some(dest_closed));
            }
            return true;
        }

        false
    }

    fn on_source_errored(self: &Rc<Self>, error: Error) {
        // If preventAbort is false, shutdown with an action of
        // ! WritableStreamAbort(dest, source.[[storedError]]) and with source.[[storedError]].
        if !self.prevent_abort {
            let dest = self.dest.clone();
            let reason = error.clone();
            self.shutdown_with_action(move || dest.abort_stream(reason), Some(error));
        } else {
            // Otherwise, shutdown with source.[[storedError]].
            self.shutdown(Some(error));
        }
    }

    fn on_dest_errored(self: &Rc<Self>, error: Error) {
        // If preventCancel is false, shutdown with an action of
        // ! ReadableStreamCancel(source, dest.[[storedError]]) and with dest.[[storedError]].
        if !self.prevent_cancel {
            let source = self.source.clone();
            let reason = error.clone();
            self.shutdown_with_action(move || source.cancel_stream(reason), Some(error));
        } else {
            // Otherwise, shutdown with dest.[[storedError]].
            self.shutdown(Some(error));
        }
    }

    fn on_source_closed(self: &Rc<Self>) {
        // If preventClose is false, shutdown with an action of
        // ! WritableStreamDefaultWriterCloseWithErrorPropagation(writer).
        if !self.prevent_close {
            let writer = self.writer.clone();
            self.shutdown_with_action(move || writer.close_with_error_propagation(), None);
        } else {
            // Otherwise, shutdown.
            self.shutdown(None);
        }
    }

    /// Watch the reader and writer closed promises for the states that arise while
    /// the pipe is running.
    fn watch_streams(self: &Rc<Self>) {
        let (on_close, on_error) = (self.clone(), self.clone());
        self.reader.closed().append_native_handler(
            move |()| {
                if !on_close.shutting_down.get() {
                    on_close.on_source_closed();
                }
            },
            move |error| {
                if !on_error.shutting_down.get() {
                    on_error.on_source_errored(error);
                }
            },
        );

        let on_error = self.clone();
        self.writer.closed().append_native_handler(
            |()| {},
            move |error| {
                if !on_error.shutting_down.get() {
                    on_error.on_dest_errored(error);
                }
            },
        );
    }

    /// Run `steps` once every chunk read so far has been written, including chunks
    /// whose read completes while waiting.
    fn wait_for_writes_to_finish<F>(self: &Rc<Self>, steps: F)
    where
        F: FnOnce() + 'static,
    {
        let old_current_write = self
            .current_write
            .borrow()
            .clone()
            .unwrap_or_else(Promise::resolved);
        let pipe = self.clone();
        old_current_write.clone().upon_settlement(move || {
            let changed = pipe
                .current_write
                .borrow()
                .as_ref()
                .is_some_and(|current_write| !current_write.ptr_eq(&old_current_write));
            if changed {
                pipe.wait_for_writes_to_finish(steps);
            } else {
                steps();
            }
        });
    }

    /// <https://streams.spec.whatwg.org/#rs-pipeTo-shutdown-with-action>
    fn shutdown_with_action<A>(self: &Rc<Self>, action: A, original_error: Option<Error>)
    where
        A: FnOnce() -> Promise<()> + 'static,
    {
        // If shuttingDown is true, abort these substeps.
        if self.shutting_down.get() {
            return;
        }

        // Set shuttingDown to true.
        self.shutting_down.set(true);

        let pipe = self.clone();
        let run_action = move || {
            // Let p be the result of performing action.
            let promise = action();

            // Upon fulfillment of p, finalize, passing along originalError if it was given.
            // Upon rejection of p with reason newError, finalize with newError.
            let (fulfilled, rejected) = (pipe.clone(), pipe);
            promise.append_native_handler(
                move |()| fulfilled.finalize(original_error),
                move |error| rejected.finalize(Some(error)),
            );
        };

        // If dest.[[state]] is "writable" and ! WritableStreamCloseQueuedOrInFlight(dest) is false,
        // wait until every chunk that has been read has been written.
        if self.dest.is_writable() && !self.dest.close_queued_or_in_flight() {
            self.wait_for_writes_to_finish(run_action);
        } else {
            run_action();
        }
    }

    /// <https://streams.spec.whatwg.org/#rs-pipeTo-shutdown>
    fn shutdown(self: &Rc<Self>, error: Option<Error>) {
        // If shuttingDown is true, abort these substeps.
        if self.shutting_down.get() {
            return;
        }

        // Set shuttingDown to true.
        self.shutting_down.set(true);

        // If dest.[[state]] is "writable" and ! WritableStreamCloseQueuedOrInFlight(dest) is false,
        // wait until every chunk that has been read has been written.
        if self.dest.is_writable() && !self.dest.close_queued_or_in_flight() {
            let pipe = self.clone();
            self.wait_for_writes_to_finish(move || pipe.finalize(error));
        } else {
            // Finalize, passing along error if it was given.
            self.finalize(error);
        }
    }

    /// <https://streams.spec.whatwg.org/#rs-pipeTo-finalize>
    fn finalize(&self, error: Option<Error>) {
        debug!("Finalizing pipe{}", match &error {
            Some(error) => format!(" with {error}"),
            None => String::new(),
        });

        // Perform ! WritableStreamDefaultWriterRelease(writer).
        self.writer.release();

        // If reader implements ReadableStreamBYOBReader, perform ! ReadableStreamBYOBReaderRelease(reader).
        // Otherwise, perform ! ReadableStreamDefaultReaderRelease(reader).
        self.reader.release();

        // If signal is not undefined, remove abortAlgorithm from signal.
        if let (Some(signal), Some(id)) = (&self.signal, self.abort_algorithm.take()) {
            signal.remove_abort_algorithm(id);
        }

        match error {
            // If error was given, reject promise with error.
            Some(error) => self.result.reject_error(error),
            // Otherwise, resolve promise with undefined.
            None => self.result.resolve_native(()),
        }
    }

    /// <https://streams.spec.whatwg.org/#readable-stream-pipe-to> step 14.1
    fn abort_algorithm(self: &Rc<Self>) {
        // Let error be signal’s abort reason.
        let error = self
            .signal
            .as_ref()
            .and_then(|signal| signal.reason())
            .unwrap_or(Error::Abort);

        let (dest, source) = (self.dest.clone(), self.source.clone());
        let (prevent_abort, prevent_cancel) = (self.prevent_abort, self.prevent_cancel);
        let reason = error.clone();

        // Let actions be an empty ordered set.
        // If preventAbort is false, append the following action to actions:
        // if dest.[[state]] is "writable", return ! WritableStreamAbort(dest, error).
        // If preventCancel is false, append the following action to actions:
        // if source.[[state]] is "readable", return ! ReadableStreamCancel(source, error).
        // Shutdown with an action consisting of getting a promise to wait for all of the
        // actions in actions, and with error.
        let actions = move || {
            let mut promises = vec![];
            if !prevent_abort && dest.is_writable() {
                promises.push(dest.abort_stream(reason.clone()));
            }
            if !prevent_cancel && source.is_readable() {
                promises.push(source.cancel_stream(reason));
            }
            wait_for_all(promises)
        };
        self.shutdown_with_action(actions, Some(error));
    }
}

/// <https://streams.spec.whatwg.org/#readable-stream-pipe-to>
pub(crate) fn readable_stream_pipe_to<T: Clone + 'static>(
    source: &Rc<ReadableStream<T>>,
    dest: &Rc<WritableStream<T>>,
    options: StreamPipeOptions,
) -> Promise<()> {
    // Let reader be ! AcquireReadableStreamDefaultReader(source).
    let reader = match source.get_reader() {
        Ok(reader) => reader,
        Err(error) => return Promise::new_rejected(error),
    };

    // Let writer be ! AcquireWritableStreamDefaultWriter(dest).
    let writer = match dest.get_writer() {
        Ok(writer) => writer,
        Err(error) => {
            reader.release();
            return Promise::new_rejected(error);
        },
    };

    // Set source.[[disturbed]] to true.
    source.set_is_disturbed(true);

    debug!("Starting pipe with {options:?}");

    // Let shuttingDown be false.
    // Let promise be a new promise.
    let StreamPipeOptions {
        prevent_abort,
        prevent_cancel,
        prevent_close,
        signal,
    } = options;
    let pipe = Rc::new(PipeTo {
        source: source.clone(),
        dest: dest.clone(),
        reader,
        writer,
        prevent_abort,
        prevent_cancel,
        prevent_close,
        signal,
        abort_algorithm: Cell::new(None),
        shutting_down: Cell::new(false),
        current_write: RefCell::new(None),
        result: Promise::new(),
    });
    let result = pipe.result.clone();

    // If signal is not undefined,
    if let Some(signal) = pipe.signal.clone() {
        // If signal is aborted, perform abortAlgorithm and return promise.
        if signal.aborted() {
            pipe.abort_algorithm();
            return result;
        }

        // Add abortAlgorithm to signal.
        let algorithm_pipe = pipe.clone();
        let id = signal.add_abort_algorithm(move || algorithm_pipe.abort_algorithm());
        pipe.abort_algorithm.set(Some(id));
    }

    // In parallel but not really; see https://github.com/whatwg/streams/issues/1243
    if !pipe.check_states() {
        pipe.watch_streams();
        pipe.pipe_step();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::AlgorithmResult;
    use crate::microtask::perform_a_microtask_checkpoint;
    use crate::queuingstrategy::QueuingStrategy;
    use crate::underlyingsink::UnderlyingSink;
    use crate::writablestreamdefaultcontroller::WritableStreamDefaultController;

    struct Collect(Rc<RefCell<Vec<u32>>>);

    impl UnderlyingSink<u32> for Collect {
        fn write(
            &mut self,
            chunk: u32,
            _controller: &Rc<WritableStreamDefaultController<u32>>,
        ) -> AlgorithmResult {
            self.0.borrow_mut().push(chunk);
            Ok(None)
        }
    }

    #[test]
    fn pipes_every_chunk_then_closes() {
        let written = Rc::new(RefCell::new(vec![]));
        let source = ReadableStream::from_iterable(vec![1, 2, 3]);
        let dest = WritableStream::new(Collect(written.clone()), QueuingStrategy::default()).unwrap();

        let promise = source.pipe_to(&dest, StreamPipeOptions::default());
        perform_a_microtask_checkpoint();

        assert!(promise.is_fulfilled());
        assert_eq!(*written.borrow(), vec![1, 2, 3]);
        assert!(dest.is_closed());
        assert!(!source.locked());
        assert!(!dest.locked());
    }

    #[test]
    fn aborted_signal_rejects_immediately() {
        let source = ReadableStream::from_iterable(vec![1]);
        let dest = WritableStream::new(
            Collect(Rc::new(RefCell::new(vec![]))),
            QueuingStrategy::default(),
        )
        .unwrap();
        let options = StreamPipeOptions {
            signal: Some(AbortSignal::abort(None)),
            ..Default::default()
        };

        let promise = source.pipe_to(&dest, options);
        perform_a_microtask_checkpoint();

        assert_eq!(promise.result(), Some(Err(Error::Abort)));
        assert!(dest.is_errored());
        assert!(source.is_closed());
    }
}
