/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use futures::StreamExt;
use streams::{
    AlgorithmResult, Error, QueuingStrategy, ReadableStream, ReadableStreamReadResult,
    ReadableStreamState, ReadableWritablePair, StreamPipeOptions, TransformStream,
    TransformStreamDefaultController, Transformer, WritableStreamState, block_on,
    perform_a_microtask_checkpoint,
};

use crate::common::init_logging;

/// Doubles numbers into strings, and appends a trailer when flushed.
#[derive(Default)]
struct Doubler {
    cancel_reasons: Rc<RefCell<Vec<Error>>>,
}

impl Transformer<u32, String> for Doubler {
    fn transform(
        &mut self,
        chunk: u32,
        controller: &Rc<TransformStreamDefaultController<u32, String>>,
    ) -> AlgorithmResult {
        controller.enqueue((chunk * 2).to_string())?;
        Ok(None)
    }

    fn flush(
        &mut self,
        controller: &Rc<TransformStreamDefaultController<u32, String>>,
    ) -> AlgorithmResult {
        controller.enqueue("end".to_owned())?;
        Ok(None)
    }

    fn cancel(&mut self, reason: Error) -> AlgorithmResult {
        self.cancel_reasons.borrow_mut().push(reason);
        Ok(None)
    }
}

struct Failing;

impl Transformer<u32, u32> for Failing {
    fn transform(
        &mut self,
        _chunk: u32,
        _controller: &Rc<TransformStreamDefaultController<u32, u32>>,
    ) -> AlgorithmResult {
        Err(Error::custom("bad chunk"))
    }
}

/// Passes the first chunk through, then terminates.
struct TakeOne;

impl Transformer<u32, u32> for TakeOne {
    fn transform(
        &mut self,
        chunk: u32,
        controller: &Rc<TransformStreamDefaultController<u32, u32>>,
    ) -> AlgorithmResult {
        controller.enqueue(chunk)?;
        controller.terminate();
        Ok(None)
    }
}

#[test]
fn identity_transform_passes_chunks_through() {
    init_logging();
    let transform =
        TransformStream::<u32, u32>::new_identity(QueuingStrategy::default(), QueuingStrategy::default())
            .unwrap();
    let reader = transform.readable().get_reader().unwrap();
    let writer = transform.writable().get_writer().unwrap();

    let reads = [reader.read(), reader.read(), reader.read()];
    let first = writer.write(1);
    let second = writer.write(2);
    let close = writer.close();
    perform_a_microtask_checkpoint();

    assert_eq!(reads[0].result(), Some(Ok(ReadableStreamReadResult::chunk(1))));
    assert_eq!(reads[1].result(), Some(Ok(ReadableStreamReadResult::chunk(2))));
    assert_eq!(reads[2].result(), Some(Ok(ReadableStreamReadResult::done())));
    assert!(first.is_fulfilled());
    assert!(second.is_fulfilled());
    assert!(close.is_fulfilled());
    assert_eq!(transform.readable().state(), ReadableStreamState::Closed);
    assert_eq!(transform.writable().state(), WritableStreamState::Closed);
}

#[test]
fn writes_wait_for_the_readable_side_to_pull() {
    init_logging();
    let transform =
        TransformStream::<u32, u32>::new_identity(QueuingStrategy::default(), QueuingStrategy::default())
            .unwrap();
    let reader = transform.readable().get_reader().unwrap();
    let writer = transform.writable().get_writer().unwrap();

    let write = writer.write(1);
    perform_a_microtask_checkpoint();
    assert!(write.is_pending());
    assert_eq!(writer.desired_size(), Ok(Some(0.0)));

    let read = reader.read();
    perform_a_microtask_checkpoint();
    assert_eq!(read.result(), Some(Ok(ReadableStreamReadResult::chunk(1))));
    assert!(write.is_fulfilled());
}

#[test]
fn transformer_maps_and_flushes() {
    init_logging();
    let transform = TransformStream::new(
        Doubler::default(),
        QueuingStrategy::default(),
        QueuingStrategy::default(),
    )
    .unwrap();
    let pair = ReadableWritablePair::from(&*transform);

    let readable = ReadableStream::from_iterable(vec![1, 2, 3])
        .pipe_through(&pair, StreamPipeOptions::default())
        .unwrap();
    let chunks = block_on(readable.values(false).unwrap().collect::<Vec<_>>())
        .expect("the pipe runs to completion");
    let chunks: Vec<String> = chunks.into_iter().map(Result::unwrap).collect();

    assert_eq!(chunks, vec!["2", "4", "6", "end"]);
}

#[test]
fn failing_transform_errors_both_sides() {
    init_logging();
    let transform =
        TransformStream::new(Failing, QueuingStrategy::default(), QueuingStrategy::default())
            .unwrap();
    let reader = transform.readable().get_reader().unwrap();
    let writer = transform.writable().get_writer().unwrap();

    let read = reader.read();
    let write = writer.write(1);
    perform_a_microtask_checkpoint();

    let failure = Error::custom("bad chunk");
    assert_eq!(read.result(), Some(Err(failure.clone())));
    assert_eq!(write.result(), Some(Err(failure.clone())));
    assert_eq!(transform.readable().stored_error(), Some(failure.clone()));
    assert_eq!(transform.writable().state(), WritableStreamState::Errored);
    assert_eq!(transform.writable().stored_error(), Some(failure));
}

#[test]
fn terminate_closes_the_readable_and_errors_the_writable() {
    init_logging();
    let transform =
        TransformStream::new(TakeOne, QueuingStrategy::default(), QueuingStrategy::default())
            .unwrap();
    let reader = transform.readable().get_reader().unwrap();
    let writer = transform.writable().get_writer().unwrap();

    let reads = [reader.read(), reader.read()];
    let write = writer.write(1);
    perform_a_microtask_checkpoint();

    assert_eq!(reads[0].result(), Some(Ok(ReadableStreamReadResult::chunk(1))));
    assert_eq!(reads[1].result(), Some(Ok(ReadableStreamReadResult::done())));
    assert!(write.is_fulfilled());
    assert_eq!(transform.writable().state(), WritableStreamState::Errored);
    assert!(matches!(writer.write(2).result(), Some(Err(Error::Type(_)))));
}

#[test]
fn cancelling_the_readable_side_errors_the_writable_side() {
    init_logging();
    let transformer = Doubler::default();
    let cancel_reasons = transformer.cancel_reasons.clone();
    let transform =
        TransformStream::new(transformer, QueuingStrategy::default(), QueuingStrategy::default())
            .unwrap();
    perform_a_microtask_checkpoint();

    let reason = Error::custom("done reading");
    let cancel = transform.readable().cancel(reason.clone());
    perform_a_microtask_checkpoint();

    assert!(cancel.is_fulfilled());
    assert_eq!(*cancel_reasons.borrow(), vec![reason.clone()]);
    assert_eq!(transform.readable().state(), ReadableStreamState::Closed);
    assert_eq!(transform.writable().state(), WritableStreamState::Errored);
    assert_eq!(transform.writable().stored_error(), Some(reason));
}

#[test]
fn aborting_the_writable_side_errors_the_readable_side() {
    init_logging();
    let transformer = Doubler::default();
    let cancel_reasons = transformer.cancel_reasons.clone();
    let transform =
        TransformStream::new(transformer, QueuingStrategy::default(), QueuingStrategy::default())
            .unwrap();
    perform_a_microtask_checkpoint();

    let reason = Error::custom("done writing");
    let abort = transform.writable().abort(reason.clone());
    perform_a_microtask_checkpoint();

    assert!(abort.is_fulfilled());
    assert_eq!(*cancel_reasons.borrow(), vec![reason.clone()]);
    assert_eq!(transform.writable().state(), WritableStreamState::Errored);
    assert_eq!(transform.readable().state(), ReadableStreamState::Errored);
    assert_eq!(transform.readable().stored_error(), Some(reason));
}

#[test]
fn readable_strategy_buffers_transformed_chunks() {
    init_logging();
    let transform = TransformStream::<u32, u32>::new_identity(
        QueuingStrategy::default(),
        QueuingStrategy::with_high_water_mark(2.0),
    )
    .unwrap();
    let writer = transform.writable().get_writer().unwrap();

    // With room on the readable side, writes complete without anyone reading.
    let first = writer.write(1);
    let second = writer.write(2);
    perform_a_microtask_checkpoint();
    assert!(first.is_fulfilled());
    assert!(second.is_fulfilled());

    // The readable side is full now, so the next write waits.
    let third = writer.write(3);
    perform_a_microtask_checkpoint();
    assert!(third.is_pending());

    let reader = transform.readable().get_reader().unwrap();
    assert_eq!(reader.read().result(), Some(Ok(ReadableStreamReadResult::chunk(1))));
    perform_a_microtask_checkpoint();
    assert!(third.is_fulfilled());
}
