/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use streams::{
    AbortController, Error, QueuingStrategy, ReadableStream, ReadableStreamState,
    StreamPipeOptions, WritableStreamState, perform_a_microtask_checkpoint,
};

use crate::common::{
    SinkEvent, WriteBehavior, controlled_stream, init_logging, recording_stream,
};

#[test]
fn pipes_every_chunk_and_closes_the_destination() {
    init_logging();
    let source = ReadableStream::from_iterable(vec!["a", "b", "c"]);
    let (dest, sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Complete);

    let pipe = source.pipe_to(&dest, StreamPipeOptions::default());
    assert!(source.locked());
    assert!(dest.locked());

    perform_a_microtask_checkpoint();
    assert!(pipe.is_fulfilled());
    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::Write("a"),
            SinkEvent::Write("b"),
            SinkEvent::Write("c"),
            SinkEvent::Close
        ]
    );
    assert_eq!(dest.state(), WritableStreamState::Closed);
    assert!(!source.locked());
    assert!(!dest.locked());
}

#[test]
fn prevent_close_leaves_the_destination_writable() {
    init_logging();
    let source = ReadableStream::from_iterable(vec![1, 2]);
    let (dest, sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Complete);
    let options = StreamPipeOptions {
        prevent_close: true,
        ..Default::default()
    };

    let pipe = source.pipe_to(&dest, options);
    perform_a_microtask_checkpoint();

    assert!(pipe.is_fulfilled());
    assert_eq!(sink.events(), vec![SinkEvent::Write(1), SinkEvent::Write(2)]);
    assert_eq!(dest.state(), WritableStreamState::Writable);
    assert!(!dest.locked());
}

#[test]
fn locked_streams_cannot_be_piped() {
    init_logging();
    let source = ReadableStream::from_iterable(vec![1]);
    let (dest, _sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Complete);

    let _writer = dest.get_writer().unwrap();
    let pipe = source.pipe_to(&dest, StreamPipeOptions::default());
    assert!(matches!(pipe.result(), Some(Err(Error::Type(_)))));
    assert!(!source.locked());
    assert!(!source.is_disturbed());
}

#[test]
fn source_errors_abort_the_destination() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Complete);

    let pipe = source.pipe_to(&dest, StreamPipeOptions::default());
    perform_a_microtask_checkpoint();
    assert!(pipe.is_pending());

    let failure = Error::custom("source failure");
    controller.controller().error(failure.clone());
    perform_a_microtask_checkpoint();

    assert_eq!(pipe.result(), Some(Err(failure.clone())));
    assert_eq!(sink.events(), vec![SinkEvent::Abort(failure.clone())]);
    assert_eq!(dest.state(), WritableStreamState::Errored);
    assert_eq!(dest.stored_error(), Some(failure));
}

#[test]
fn prevent_abort_keeps_the_destination_writable() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Complete);
    let options = StreamPipeOptions {
        prevent_abort: true,
        ..Default::default()
    };

    let pipe = source.pipe_to(&dest, options);
    perform_a_microtask_checkpoint();

    let failure = Error::custom("source failure");
    controller.controller().error(failure.clone());
    perform_a_microtask_checkpoint();

    assert_eq!(pipe.result(), Some(Err(failure)));
    assert!(sink.events().is_empty());
    assert_eq!(dest.state(), WritableStreamState::Writable);
    assert!(!dest.locked());
}

#[test]
fn destination_errors_cancel_the_source() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, _sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Fail);

    let pipe = source.pipe_to(&dest, StreamPipeOptions::default());
    perform_a_microtask_checkpoint();
    controller.controller().enqueue(1).unwrap();
    perform_a_microtask_checkpoint();

    let failure = Error::custom("sink failure");
    assert_eq!(pipe.result(), Some(Err(failure.clone())));
    assert_eq!(controller.cancel_reasons(), vec![failure]);
    assert_eq!(source.state(), ReadableStreamState::Closed);
}

#[test]
fn prevent_cancel_leaves_the_source_readable() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, _sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Fail);
    let options = StreamPipeOptions {
        prevent_cancel: true,
        ..Default::default()
    };

    let pipe = source.pipe_to(&dest, options);
    perform_a_microtask_checkpoint();
    controller.controller().enqueue(1).unwrap();
    perform_a_microtask_checkpoint();

    assert_eq!(pipe.result(), Some(Err(Error::custom("sink failure"))));
    assert!(controller.cancel_reasons().is_empty());
    assert_eq!(source.state(), ReadableStreamState::Readable);
    assert!(!source.locked());
}

#[test]
fn closed_destination_cancels_the_source() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, _sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Complete);
    let _ = dest.close();

    let pipe = source.pipe_to(&dest, StreamPipeOptions::default());
    perform_a_microtask_checkpoint();

    assert!(matches!(pipe.result(), Some(Err(Error::Type(_)))));
    assert!(matches!(controller.cancel_reasons().as_slice(), [Error::Type(_)]));
    assert_eq!(source.state(), ReadableStreamState::Closed);
}

#[test]
fn abort_signal_stops_the_pipe() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Complete);
    let abort_controller = AbortController::new();
    let options = StreamPipeOptions {
        signal: Some(abort_controller.signal()),
        ..Default::default()
    };

    let pipe = source.pipe_to(&dest, options);
    perform_a_microtask_checkpoint();
    controller.controller().enqueue(1).unwrap();
    perform_a_microtask_checkpoint();
    assert_eq!(sink.events(), vec![SinkEvent::Write(1)]);

    let reason = Error::custom("user cancelled");
    abort_controller.abort(Some(reason.clone()));
    perform_a_microtask_checkpoint();

    assert_eq!(pipe.result(), Some(Err(reason.clone())));
    assert_eq!(
        sink.events(),
        vec![SinkEvent::Write(1), SinkEvent::Abort(reason.clone())]
    );
    assert_eq!(controller.cancel_reasons(), vec![reason]);
    assert!(!source.locked());
    assert!(!dest.locked());
}

#[test]
fn pipe_respects_destination_backpressure() {
    init_logging();
    let source = ReadableStream::from_iterable(0..10);
    let (dest, sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Hold);

    let pipe = source.pipe_to(&dest, StreamPipeOptions::default());
    perform_a_microtask_checkpoint();
    assert_eq!(sink.events(), vec![SinkEvent::Write(0)]);

    sink.finish_write();
    perform_a_microtask_checkpoint();
    assert_eq!(sink.events(), vec![SinkEvent::Write(0), SinkEvent::Write(1)]);
    assert!(pipe.is_pending());
}

#[test]
fn pipe_waits_for_the_pending_write_before_settling() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Hold);
    let options = StreamPipeOptions {
        prevent_abort: true,
        ..Default::default()
    };

    let pipe = source.pipe_to(&dest, options);
    perform_a_microtask_checkpoint();
    controller.controller().enqueue(1).unwrap();
    perform_a_microtask_checkpoint();
    assert_eq!(sink.events(), vec![SinkEvent::Write(1)]);

    controller.controller().error(Error::custom("late failure"));
    perform_a_microtask_checkpoint();
    assert!(pipe.is_pending(), "the pipe waits for the write in flight");
    assert!(dest.locked());

    sink.finish_write();
    perform_a_microtask_checkpoint();
    assert_eq!(pipe.result(), Some(Err(Error::custom("late failure"))));
    assert!(!dest.locked());
}

#[test]
fn chunks_read_while_shutting_down_are_still_written() {
    init_logging();
    let (source, controller) = controlled_stream::<u32>(QueuingStrategy::default());
    let (dest, sink) = recording_stream(QueuingStrategy::default(), WriteBehavior::Complete);
    let abort_controller = AbortController::new();
    let options = StreamPipeOptions {
        prevent_abort: true,
        prevent_cancel: true,
        signal: Some(abort_controller.signal()),
        ..Default::default()
    };

    let pipe = source.pipe_to(&dest, options);
    perform_a_microtask_checkpoint();

    // The pipe has a read pending, which this chunk fulfills after shutdown began.
    let reason = Error::custom("stop");
    abort_controller.abort(Some(reason.clone()));
    controller.controller().enqueue(7).unwrap();
    perform_a_microtask_checkpoint();

    assert_eq!(pipe.result(), Some(Err(reason)));
    assert_eq!(sink.events(), vec![SinkEvent::Write(7)]);
    assert_eq!(dest.state(), WritableStreamState::Writable);
    assert!(!dest.locked());
    assert!(!source.locked());
}
