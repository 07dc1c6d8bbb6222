/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use futures::StreamExt;
use streams::{
    CountQueuingStrategy, Error, Promise, QueuingStrategy, QueuingStrategyInit, ReadableStream,
    ReadableStreamDefaultController, ReadableStreamReadResult, ReadableStreamState, block_on,
    perform_a_microtask_checkpoint,
};

use crate::common::{controlled_stream, controlled_stream_with_pull, init_logging};

#[test]
fn reads_enqueued_chunks_in_order_then_done() {
    init_logging();
    let (stream, source) = controlled_stream::<u32>(QueuingStrategy::default());
    let controller = source.controller();
    controller.enqueue(1).unwrap();
    controller.enqueue(2).unwrap();
    controller.close().unwrap();

    // Closing waits until the queued chunks have been read.
    assert_eq!(stream.state(), ReadableStreamState::Readable);

    let reader = stream.get_reader().unwrap();
    assert_eq!(reader.read().result(), Some(Ok(ReadableStreamReadResult::chunk(1))));
    assert_eq!(reader.read().result(), Some(Ok(ReadableStreamReadResult::chunk(2))));
    assert_eq!(reader.read().result(), Some(Ok(ReadableStreamReadResult::done())));
    assert_eq!(stream.state(), ReadableStreamState::Closed);

    perform_a_microtask_checkpoint();
    assert!(reader.closed().is_fulfilled());
}

#[test]
fn pending_read_is_fulfilled_by_enqueue() {
    init_logging();
    let (stream, source) = controlled_stream::<&'static str>(QueuingStrategy::default());
    let reader = stream.get_reader().unwrap();

    let read = reader.read();
    assert!(read.is_pending());

    source.controller().enqueue("chunk").unwrap();
    assert_eq!(read.result(), Some(Ok(ReadableStreamReadResult::chunk("chunk"))));
}

#[test]
fn pulls_until_the_high_water_mark_is_reached() {
    init_logging();
    let (stream, source) = controlled_stream_with_pull::<u32>(
        QueuingStrategy::with_high_water_mark(2.0),
        Some(Box::new(|controller: &Rc<ReadableStreamDefaultController<u32>>| {
            controller.enqueue(7)?;
            Ok(None)
        })),
    );
    assert_eq!(source.pulls(), 0);

    perform_a_microtask_checkpoint();
    assert_eq!(source.pulls(), 2);
    assert_eq!(source.controller().desired_size(), Some(0.0));

    // Reading makes room in the queue, which triggers another pull.
    let reader = stream.get_reader().unwrap();
    assert_eq!(reader.read().result(), Some(Ok(ReadableStreamReadResult::chunk(7))));
    perform_a_microtask_checkpoint();
    assert_eq!(source.pulls(), 3);
    assert_eq!(source.controller().desired_size(), Some(0.0));
}

#[test]
fn desired_size_uses_the_strategy_size() {
    init_logging();
    let strategy = QueuingStrategy::with_size(10.0, |chunk: &String| Ok(chunk.len() as f64));
    let (_stream, source) = controlled_stream(strategy);
    let controller = source.controller();

    controller.enqueue("four".to_owned()).unwrap();
    assert_eq!(controller.desired_size(), Some(6.0));
    controller.enqueue("sixsix".to_owned()).unwrap();
    assert_eq!(controller.desired_size(), Some(0.0));
}

#[test]
fn failing_size_function_errors_the_stream() {
    init_logging();
    let strategy = QueuingStrategy::with_size(1.0, |_: &u32| Err(Error::custom("bad size")));
    let (stream, source) = controlled_stream(strategy);

    assert_eq!(source.controller().enqueue(1), Err(Error::custom("bad size")));
    assert_eq!(stream.state(), ReadableStreamState::Errored);
    assert_eq!(stream.stored_error(), Some(Error::custom("bad size")));
}

#[test]
fn invalid_high_water_mark_is_a_range_error() {
    init_logging();
    let result = ReadableStream::new(
        common::NullSource,
        QueuingStrategy::<u32>::with_high_water_mark(-1.0),
    );
    assert!(matches!(result, Err(Error::Range(_))));

    let result = ReadableStream::new(
        common::NullSource,
        QueuingStrategy::<u32>::with_high_water_mark(f64::NAN),
    );
    assert!(matches!(result, Err(Error::Range(_))));
}

#[test]
fn count_strategy_counts_chunks() {
    init_logging();
    let strategy = CountQueuingStrategy::new(QueuingStrategyInit {
        high_water_mark: 3.0,
    })
    .into_strategy::<Vec<u8>>();
    let (_stream, source) = controlled_stream(strategy);
    let controller = source.controller();

    controller.enqueue(vec![1, 2, 3, 4]).unwrap();
    assert_eq!(controller.desired_size(), Some(2.0));
}

#[test]
fn cancel_reaches_the_source_and_closes_the_stream() {
    init_logging();
    let (stream, source) = controlled_stream::<u32>(QueuingStrategy::default());
    let reader = stream.get_reader().unwrap();
    let read = reader.read();

    let cancel = reader.cancel(Error::custom("not interested"));
    assert_eq!(stream.state(), ReadableStreamState::Closed);
    assert_eq!(read.result(), Some(Ok(ReadableStreamReadResult::done())));

    perform_a_microtask_checkpoint();
    assert!(cancel.is_fulfilled());
    assert_eq!(source.cancel_reasons(), vec![Error::custom("not interested")]);

    // Once closed, enqueueing is a TypeError.
    assert!(matches!(source.controller().enqueue(1), Err(Error::Type(_))));
}

#[test]
fn cancel_discards_queued_chunks() {
    init_logging();
    let (stream, source) = controlled_stream::<u32>(QueuingStrategy::with_high_water_mark(4.0));
    source.controller().enqueue(1).unwrap();
    source.controller().enqueue(2).unwrap();

    let _ = stream.cancel(Error::Undefined);
    let reader = stream.get_reader().unwrap();
    assert_eq!(reader.read().result(), Some(Ok(ReadableStreamReadResult::done())));
}

#[test]
fn error_rejects_pending_reads_and_closed() {
    init_logging();
    let (stream, source) = controlled_stream::<u32>(QueuingStrategy::default());
    let reader = stream.get_reader().unwrap();
    let read = reader.read();

    source.controller().error(Error::custom("boom"));

    assert_eq!(read.result(), Some(Err(Error::custom("boom"))));
    assert_eq!(reader.closed().result(), Some(Err(Error::custom("boom"))));
    assert_eq!(stream.state(), ReadableStreamState::Errored);
    assert_eq!(
        reader.read().result(),
        Some(Err(Error::custom("boom"))),
        "reads after an error reject with the stored error"
    );
}

#[test]
fn only_one_reader_at_a_time() {
    init_logging();
    let stream = ReadableStream::from_iterable(vec![1, 2]);
    let reader = stream.get_reader().unwrap();
    assert!(stream.locked());
    assert!(matches!(stream.get_reader(), Err(Error::Type(_))));

    reader.release_lock();
    assert!(!stream.locked());
    assert!(stream.get_reader().is_ok());
}

#[test]
fn releasing_a_reader_rejects_its_pending_reads() {
    init_logging();
    let (stream, _source) = controlled_stream::<u32>(QueuingStrategy::default());
    let reader = stream.get_reader().unwrap();
    let read = reader.read();

    reader.release_lock();
    assert!(matches!(read.result(), Some(Err(Error::Type(_)))));
    assert!(matches!(reader.closed().result(), Some(Err(Error::Type(_)))));
}

#[test]
fn from_iterable_yields_every_item() {
    init_logging();
    let stream = ReadableStream::from_iterable(1..=5);
    let chunks = block_on(stream.values(false).unwrap().collect::<Vec<_>>())
        .expect("the stream runs to completion");
    let chunks: Vec<u32> = chunks.into_iter().map(Result::unwrap).collect();
    assert_eq!(chunks, vec![1, 2, 3, 4, 5]);
    assert!(stream.is_closed());
    assert!(stream.is_disturbed());
    assert!(!stream.locked());
}

#[test]
fn awaiting_a_read() {
    init_logging();
    let stream = ReadableStream::from_iterable(vec!["a", "b"]);
    let reader = stream.get_reader().unwrap();
    let result = block_on(async {
        let first = reader.read().await?;
        let second = reader.read().await?;
        let third = reader.read().await?;
        Ok::<_, Error>((first, second, third))
    });
    assert_eq!(
        result,
        Some(Ok((
            ReadableStreamReadResult::chunk("a"),
            ReadableStreamReadResult::chunk("b"),
            ReadableStreamReadResult::done(),
        )))
    );
}

#[test]
fn cancel_from_inside_pull_reaches_the_source() {
    init_logging();
    let cancelled_stream: Rc<RefCell<Option<Rc<ReadableStream<u32>>>>> = Default::default();
    let stream_in_pull = cancelled_stream.clone();
    let cancel: Rc<RefCell<Option<Promise<()>>>> = Default::default();
    let cancel_in_pull = cancel.clone();
    let (stream, source) = controlled_stream_with_pull::<u32>(
        QueuingStrategy::default(),
        Some(Box::new(move |_controller: &Rc<ReadableStreamDefaultController<u32>>| {
            let stream = stream_in_pull.borrow_mut().take();
            if let Some(stream) = stream {
                *cancel_in_pull.borrow_mut() = Some(stream.cancel(Error::custom("from pull")));
            }
            Ok(None)
        })),
    );
    *cancelled_stream.borrow_mut() = Some(stream.clone());

    perform_a_microtask_checkpoint();

    assert_eq!(stream.state(), ReadableStreamState::Closed);
    assert_eq!(source.cancel_reasons(), vec![Error::custom("from pull")]);
    let cancel = cancel.borrow().clone().expect("pull ran");
    assert!(cancel.is_fulfilled());
}
