/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use streams::{
    ByteLengthQueuingStrategy, Error, QueuingStrategy, QueuingStrategyInit, WritableStreamState,
    perform_a_microtask_checkpoint,
};

use crate::common::{SinkEvent, WriteBehavior, init_logging, recording_stream};

#[test]
fn writes_reach_the_sink_in_order_before_close() {
    init_logging();
    let (stream, sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Complete);
    let writer = stream.get_writer().unwrap();

    let first = writer.write(1);
    let second = writer.write(2);
    let close = writer.close();
    assert_eq!(stream.state(), WritableStreamState::Closing);

    perform_a_microtask_checkpoint();
    assert_eq!(
        sink.events(),
        vec![SinkEvent::Write(1), SinkEvent::Write(2), SinkEvent::Close]
    );
    assert!(first.is_fulfilled());
    assert!(second.is_fulfilled());
    assert!(close.is_fulfilled());
    assert!(writer.closed().is_fulfilled());
    assert_eq!(stream.state(), WritableStreamState::Closed);
}

#[test]
fn desired_size_and_ready_follow_the_queue() {
    init_logging();
    let (stream, sink) =
        recording_stream::<&'static str>(QueuingStrategy::with_high_water_mark(2.0), WriteBehavior::Hold);
    let writer = stream.get_writer().unwrap();
    assert_eq!(writer.desired_size(), Ok(Some(2.0)));
    assert!(writer.ready().is_fulfilled());

    let _ = writer.write("a");
    assert_eq!(writer.desired_size(), Ok(Some(1.0)));
    let _ = writer.write("b");
    assert_eq!(writer.desired_size(), Ok(Some(0.0)));
    let ready = writer.ready();
    assert!(ready.is_pending());

    // The chunk being written still counts against the high water mark.
    perform_a_microtask_checkpoint();
    assert_eq!(sink.events(), vec![SinkEvent::Write("a")]);
    assert!(ready.is_pending());

    sink.finish_write();
    perform_a_microtask_checkpoint();
    assert!(ready.is_fulfilled());
    assert_eq!(writer.desired_size(), Ok(Some(1.0)));
    assert_eq!(sink.events(), vec![SinkEvent::Write("a"), SinkEvent::Write("b")]);
}

#[test]
fn byte_length_strategy_measures_chunks() {
    init_logging();
    let strategy = ByteLengthQueuingStrategy::new(QueuingStrategyInit {
        high_water_mark: 16.0,
    })
    .into_strategy::<Vec<u8>>();
    let (stream, _sink) = recording_stream(strategy, WriteBehavior::Hold);
    let writer = stream.get_writer().unwrap();

    let _ = writer.write(vec![0; 10]);
    assert_eq!(writer.desired_size(), Ok(Some(6.0)));
}

#[test]
fn abort_waits_for_the_write_in_flight() {
    init_logging();
    let (stream, sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Hold);
    let writer = stream.get_writer().unwrap();

    let first = writer.write(1);
    let second = writer.write(2);
    perform_a_microtask_checkpoint();
    assert_eq!(sink.events(), vec![SinkEvent::Write(1)]);

    let reason = Error::custom("stop");
    let abort = writer.abort(reason.clone());
    assert_eq!(stream.state(), WritableStreamState::Erroring);
    assert!(sink.controller().signal().aborted());
    assert_eq!(sink.controller().signal().reason(), Some(reason.clone()));

    perform_a_microtask_checkpoint();
    assert!(abort.is_pending());

    sink.finish_write();
    perform_a_microtask_checkpoint();
    assert!(first.is_fulfilled());
    assert_eq!(second.result(), Some(Err(reason.clone())));
    assert!(abort.is_fulfilled());
    assert_eq!(
        sink.events(),
        vec![SinkEvent::Write(1), SinkEvent::Abort(reason.clone())]
    );
    assert_eq!(stream.state(), WritableStreamState::Errored);
    assert_eq!(writer.closed().result(), Some(Err(reason)));
}

#[test]
fn abort_before_start_completes() {
    init_logging();
    let (stream, sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Complete);

    let abort = stream.abort(Error::Undefined);
    perform_a_microtask_checkpoint();

    assert!(abort.is_fulfilled());
    assert_eq!(sink.events(), vec![SinkEvent::Abort(Error::Undefined)]);
    assert_eq!(stream.state(), WritableStreamState::Errored);
}

#[test]
fn failing_write_errors_the_stream() {
    init_logging();
    let (stream, sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Fail);
    let writer = stream.get_writer().unwrap();

    let write = writer.write(1);
    perform_a_microtask_checkpoint();

    let failure = Error::custom("sink failure");
    assert_eq!(write.result(), Some(Err(failure.clone())));
    assert_eq!(writer.closed().result(), Some(Err(failure.clone())));
    assert_eq!(stream.state(), WritableStreamState::Errored);
    assert_eq!(stream.stored_error(), Some(failure.clone()));
    assert_eq!(sink.events(), vec![SinkEvent::Write(1)]);

    // Later writes are rejected without reaching the sink.
    assert_eq!(writer.write(2).result(), Some(Err(failure)));
    perform_a_microtask_checkpoint();
    assert_eq!(sink.events(), vec![SinkEvent::Write(1)]);
}

#[test]
fn controller_error_errors_the_stream() {
    init_logging();
    let (stream, sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Complete);
    let writer = stream.get_writer().unwrap();
    perform_a_microtask_checkpoint();

    sink.controller().error(Error::custom("from the sink"));
    assert_eq!(stream.state(), WritableStreamState::Errored);
    assert_eq!(writer.closed().result(), Some(Err(Error::custom("from the sink"))));
    assert!(writer.desired_size().is_ok_and(|size| size.is_none()));
}

#[test]
fn closing_twice_is_a_type_error() {
    init_logging();
    let (stream, _sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Complete);
    let writer = stream.get_writer().unwrap();

    let close = writer.close();
    assert!(matches!(writer.close().result(), Some(Err(Error::Type(_)))));
    assert!(matches!(writer.write(1).result(), Some(Err(Error::Type(_)))));

    perform_a_microtask_checkpoint();
    assert!(close.is_fulfilled());
    assert_eq!(writer.desired_size(), Ok(Some(0.0)));
}

#[test]
fn released_writer_cannot_write() {
    init_logging();
    let (stream, _sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Complete);
    let writer = stream.get_writer().unwrap();
    assert!(stream.locked());
    assert!(matches!(stream.get_writer(), Err(Error::Type(_))));

    writer.release_lock();
    assert!(!stream.locked());
    assert!(matches!(writer.write(1).result(), Some(Err(Error::Type(_)))));
    assert!(matches!(writer.closed().result(), Some(Err(Error::Type(_)))));
    assert!(matches!(writer.desired_size(), Err(Error::Type(_))));

    assert!(stream.get_writer().is_ok());
}

#[test]
fn closing_an_unlocked_stream() {
    init_logging();
    let (stream, sink) = recording_stream::<u32>(QueuingStrategy::default(), WriteBehavior::Complete);

    let close = stream.close();
    perform_a_microtask_checkpoint();
    assert!(close.is_fulfilled());
    assert_eq!(sink.events(), vec![SinkEvent::Close]);
    assert_eq!(stream.state(), WritableStreamState::Closed);

    assert!(matches!(stream.close().result(), Some(Err(Error::Type(_)))));
}
