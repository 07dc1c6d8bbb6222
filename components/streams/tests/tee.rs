/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use futures::StreamExt;
use streams::{
    Error, QueuingStrategy, ReadableStream, ReadableStreamReadResult, ReadableStreamState,
    block_on, perform_a_microtask_checkpoint,
};

use crate::common::{controlled_stream, init_logging};

fn collect<T: Clone + 'static>(stream: &std::rc::Rc<ReadableStream<T>>) -> Vec<T> {
    block_on(stream.values(false).unwrap().collect::<Vec<_>>())
        .expect("the branch runs to completion")
        .into_iter()
        .map(Result::unwrap)
        .collect()
}

#[test]
fn both_branches_see_every_chunk() {
    init_logging();
    let source = ReadableStream::from_iterable(vec!["x", "y", "z"]);
    let (branch_1, branch_2) = source.tee().unwrap();
    assert!(source.locked());

    assert_eq!(collect(&branch_1), vec!["x", "y", "z"]);
    assert_eq!(collect(&branch_2), vec!["x", "y", "z"]);
    assert_eq!(source.state(), ReadableStreamState::Closed);
}

#[test]
fn a_locked_stream_cannot_be_teed() {
    init_logging();
    let source = ReadableStream::from_iterable(vec![1]);
    let _reader = source.get_reader().unwrap();
    assert!(matches!(source.tee(), Err(Error::Type(_))));
}

#[test]
fn cancelling_one_branch_keeps_the_other_flowing() {
    init_logging();
    let (source, handle) = controlled_stream::<u32>(QueuingStrategy::default());
    let (branch_1, branch_2) = source.tee().unwrap();
    let reader_2 = branch_2.get_reader().unwrap();

    let cancel_1 = branch_1.cancel(Error::custom("first"));
    perform_a_microtask_checkpoint();
    assert!(cancel_1.is_pending(), "the source is only cancelled once both branches are");
    assert!(handle.cancel_reasons().is_empty());

    let read = reader_2.read();
    perform_a_microtask_checkpoint();
    handle.controller().enqueue(5).unwrap();
    perform_a_microtask_checkpoint();
    assert_eq!(read.result(), Some(Ok(ReadableStreamReadResult::chunk(5))));
}

#[test]
fn cancelling_both_branches_cancels_the_source_with_both_reasons() {
    init_logging();
    let (source, handle) = controlled_stream::<u32>(QueuingStrategy::default());
    let (branch_1, branch_2) = source.tee().unwrap();

    let cancel_1 = branch_1.cancel(Error::custom("first"));
    let cancel_2 = branch_2.cancel(Error::custom("second"));
    perform_a_microtask_checkpoint();

    assert_eq!(
        handle.cancel_reasons(),
        vec![Error::Composite(vec![
            Error::custom("first"),
            Error::custom("second")
        ])]
    );
    assert!(cancel_1.is_fulfilled());
    assert!(cancel_2.is_fulfilled());
    assert_eq!(source.state(), ReadableStreamState::Closed);
}

#[test]
fn source_errors_reach_both_branches() {
    init_logging();
    let (source, handle) = controlled_stream::<u32>(QueuingStrategy::default());
    let (branch_1, branch_2) = source.tee().unwrap();
    let reader_1 = branch_1.get_reader().unwrap();
    let reader_2 = branch_2.get_reader().unwrap();

    let read_1 = reader_1.read();
    let read_2 = reader_2.read();
    perform_a_microtask_checkpoint();

    let failure = Error::custom("source failure");
    handle.controller().error(failure.clone());
    perform_a_microtask_checkpoint();

    assert_eq!(read_1.result(), Some(Err(failure.clone())));
    assert_eq!(read_2.result(), Some(Err(failure.clone())));
    assert_eq!(branch_1.stored_error(), Some(failure.clone()));
    assert_eq!(branch_2.stored_error(), Some(failure));
}

#[test]
fn source_close_closes_both_branches() {
    init_logging();
    let (source, handle) = controlled_stream::<u32>(QueuingStrategy::default());
    let (branch_1, branch_2) = source.tee().unwrap();
    let reader_1 = branch_1.get_reader().unwrap();

    let read = reader_1.read();
    perform_a_microtask_checkpoint();
    handle.controller().close().unwrap();
    perform_a_microtask_checkpoint();

    assert_eq!(read.result(), Some(Ok(ReadableStreamReadResult::done())));
    assert_eq!(branch_1.state(), ReadableStreamState::Closed);
    assert_eq!(branch_2.state(), ReadableStreamState::Closed);
}
