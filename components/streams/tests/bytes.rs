/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use futures::StreamExt;
use streams::{
    AlgorithmResult, ArrayBuffer, ArrayBufferView, ArrayBufferViewType, Error, Promise,
    QueuingStrategy, ReadableByteStreamController, ReadableStream, ReadableStreamReadResult,
    ReadableStreamState, UnderlyingByteSource, block_on, perform_a_microtask_checkpoint,
};

use crate::common::init_logging;

/// Serves `pieces` one per pull, answering the BYOB request when there is one, and
/// closes once it runs out.
struct PieceSource {
    pieces: VecDeque<Vec<u8>>,
    auto_allocate_chunk_size: Option<u64>,
    controller: Rc<RefCell<Option<Rc<ReadableByteStreamController>>>>,
    pulls: Rc<Cell<usize>>,
}

impl UnderlyingByteSource for PieceSource {
    fn start(&mut self, controller: &Rc<ReadableByteStreamController>) -> AlgorithmResult {
        *self.controller.borrow_mut() = Some(controller.clone());
        Ok(None)
    }

    fn pull(&mut self, controller: &Rc<ReadableByteStreamController>) -> AlgorithmResult {
        self.pulls.set(self.pulls.get() + 1);
        let Some(piece) = self.pieces.pop_front() else {
            controller.close()?;
            if let Some(request) = controller.byob_request() {
                request.respond(0)?;
            }
            return Ok(None);
        };
        match controller.byob_request() {
            Some(request) => {
                let view = request.view().expect("a live request has a view");
                let written = view.write_bytes(&piece);
                request.respond(written)?;
            },
            None => controller.enqueue(ArrayBufferView::from_bytes(piece))?,
        }
        Ok(None)
    }

    fn auto_allocate_chunk_size(&self) -> Option<u64> {
        self.auto_allocate_chunk_size
    }
}

struct Handle {
    controller: Rc<RefCell<Option<Rc<ReadableByteStreamController>>>>,
    pulls: Rc<Cell<usize>>,
}

impl Handle {
    fn controller(&self) -> Rc<ReadableByteStreamController> {
        self.controller
            .borrow()
            .clone()
            .expect("start stores the controller")
    }
}

fn byte_stream(
    pieces: Vec<Vec<u8>>,
    auto_allocate_chunk_size: Option<u64>,
) -> (Rc<ReadableStream<ArrayBufferView>>, Handle) {
    let handle = Handle {
        controller: Default::default(),
        pulls: Default::default(),
    };
    let source = PieceSource {
        pieces: pieces.into(),
        auto_allocate_chunk_size,
        controller: handle.controller.clone(),
        pulls: handle.pulls.clone(),
    };
    let stream = ReadableStream::new_bytes(source, QueuingStrategy::default()).unwrap();
    perform_a_microtask_checkpoint();
    (stream, handle)
}

/// A byte source that leaves every BYOB request for the test to answer.
struct IdleSource {
    controller: Rc<RefCell<Option<Rc<ReadableByteStreamController>>>>,
}

impl UnderlyingByteSource for IdleSource {
    fn start(&mut self, controller: &Rc<ReadableByteStreamController>) -> AlgorithmResult {
        *self.controller.borrow_mut() = Some(controller.clone());
        Ok(None)
    }
}

/// A pending BYOB read of up to four bytes into an eight byte buffer.
fn pending_byob_read() -> (
    Rc<ReadableStream<ArrayBufferView>>,
    Rc<ReadableByteStreamController>,
    Promise<ReadableStreamReadResult<ArrayBufferView>>,
) {
    let controller: Rc<RefCell<Option<Rc<ReadableByteStreamController>>>> = Default::default();
    let source = IdleSource {
        controller: controller.clone(),
    };
    let stream = ReadableStream::new_bytes(source, QueuingStrategy::default()).unwrap();
    perform_a_microtask_checkpoint();

    let reader = stream.get_byob_reader().unwrap();
    let read = reader.read(ArrayBufferView::new_uint8(ArrayBuffer::new(8), 0, 4).unwrap());
    perform_a_microtask_checkpoint();

    let controller = controller.borrow().clone().expect("start stores the controller");
    (stream, controller, read)
}

fn bytes_of(stream: &Rc<ReadableStream<ArrayBufferView>>) -> Vec<ArrayBufferView> {
    block_on(stream.values(false).unwrap().collect::<Vec<_>>())
        .expect("the stream runs to completion")
        .into_iter()
        .map(Result::unwrap)
        .collect()
}

#[test]
fn byob_reads_fill_the_given_buffer_without_copying() {
    init_logging();
    let (stream, _handle) = byte_stream(vec![vec![1, 2, 3]], None);
    let reader = stream.get_byob_reader().unwrap();

    let view = ArrayBufferView::zeroed(ArrayBufferViewType::Uint8Array, 8);
    let original = view.buffer().clone();
    let address = original.as_ptr();

    let read = reader.read(view);
    assert!(original.is_detached(), "reading transfers the buffer to the stream");
    perform_a_microtask_checkpoint();

    let result = read.result().unwrap().unwrap();
    assert!(!result.done);
    let chunk = result.value.unwrap();
    assert_eq!(chunk.to_vec(), vec![1, 2, 3]);
    assert_eq!(chunk.buffer().byte_length(), 8);
    assert_eq!(chunk.buffer().as_ptr(), address);
}

#[test]
fn byob_read_waits_for_the_minimum() {
    init_logging();
    let (stream, handle) = byte_stream(vec![vec![1, 2], vec![3, 4]], None);
    let reader = stream.get_byob_reader().unwrap();

    let read = reader.read_with_min(ArrayBufferView::zeroed(ArrayBufferViewType::Uint8Array, 4), 4);
    perform_a_microtask_checkpoint();

    let chunk = read.result().unwrap().unwrap().value.unwrap();
    assert_eq!(chunk.to_vec(), vec![1, 2, 3, 4]);
    assert_eq!(handle.pulls.get(), 2);
}

#[test]
fn byob_read_rejects_bad_views() {
    init_logging();
    let (stream, _handle) = byte_stream(vec![], None);
    let reader = stream.get_byob_reader().unwrap();

    let empty = reader.read(ArrayBufferView::zeroed(ArrayBufferViewType::Uint8Array, 0));
    assert!(matches!(empty.result(), Some(Err(Error::Type(_)))));

    let too_few = ArrayBufferView::zeroed(ArrayBufferViewType::Uint16Array, 2);
    let min_too_large = reader.read_with_min(too_few, 3);
    assert!(matches!(min_too_large.result(), Some(Err(Error::Range(_)))));
}

#[test]
fn byob_read_after_close_is_done() {
    init_logging();
    let (stream, _handle) = byte_stream(vec![], None);
    let reader = stream.get_byob_reader().unwrap();

    let read = reader.read(ArrayBufferView::zeroed(ArrayBufferViewType::Uint8Array, 4));
    perform_a_microtask_checkpoint();

    let result = read.result().unwrap().unwrap();
    assert!(result.done);
    assert_eq!(result.value.map(|view| view.byte_length()), Some(0));
    assert_eq!(stream.state(), ReadableStreamState::Closed);
}

#[test]
fn enqueue_transfers_the_chunk() {
    init_logging();
    let (stream, handle) = byte_stream(vec![], None);

    let chunk = ArrayBufferView::from_bytes(vec![7, 8]);
    let original = chunk.buffer().clone();
    handle.controller().enqueue(chunk).unwrap();
    assert!(original.is_detached());
    assert_eq!(handle.controller().desired_size(), Some(-2.0));

    let reader = stream.get_reader().unwrap();
    let read = reader.read();
    let chunk = read.result().unwrap().unwrap().value.unwrap();
    assert_eq!(chunk.to_vec(), vec![7, 8]);
    assert_eq!(handle.controller().desired_size(), Some(0.0));
}

#[test]
fn empty_chunks_cannot_be_enqueued() {
    init_logging();
    let (_stream, handle) = byte_stream(vec![], None);
    let result = handle.controller().enqueue(ArrayBufferView::from_bytes(vec![]));
    assert!(matches!(result, Err(Error::Type(_))));
}

#[test]
fn auto_allocation_serves_default_readers() {
    init_logging();
    let (stream, _handle) = byte_stream(vec![vec![9, 9]], Some(4));
    let reader = stream.get_reader().unwrap();

    let read = reader.read();
    perform_a_microtask_checkpoint();

    let chunk = read.result().unwrap().unwrap().value.unwrap();
    assert_eq!(chunk.to_vec(), vec![9, 9]);
    assert_eq!(chunk.buffer().byte_length(), 4);
}

#[test]
fn zero_auto_allocate_chunk_size_is_rejected() {
    init_logging();
    let source = PieceSource {
        pieces: VecDeque::new(),
        auto_allocate_chunk_size: Some(0),
        controller: Default::default(),
        pulls: Default::default(),
    };
    let result = ReadableStream::new_bytes(source, QueuingStrategy::default());
    assert!(matches!(result, Err(Error::Type(_))));
}

#[test]
fn size_functions_are_rejected() {
    init_logging();
    let source = PieceSource {
        pieces: VecDeque::new(),
        auto_allocate_chunk_size: None,
        controller: Default::default(),
        pulls: Default::default(),
    };
    let strategy = QueuingStrategy::with_size(1.0, |chunk: &ArrayBufferView| {
        Ok(chunk.byte_length() as f64)
    });
    let result = ReadableStream::new_bytes(source, strategy);
    assert!(matches!(result, Err(Error::Range(_))));
}

#[test]
fn default_streams_have_no_byob_reader() {
    init_logging();
    let stream = ReadableStream::from_iterable(vec![ArrayBufferView::from_bytes(vec![1])]);
    assert!(matches!(stream.get_byob_reader(), Err(Error::Type(_))));
}

#[test]
fn byte_tee_gives_each_branch_its_own_copy() {
    init_logging();
    let (stream, _handle) = byte_stream(vec![vec![1, 2, 3], vec![4]], None);
    let (branch_1, branch_2) = stream.tee().unwrap();

    let chunks_1 = bytes_of(&branch_1);
    let chunks_2 = bytes_of(&branch_2);

    let contents = |chunks: &[ArrayBufferView]| {
        chunks
            .iter()
            .map(ArrayBufferView::to_vec)
            .collect::<Vec<_>>()
    };
    assert_eq!(contents(&chunks_1), vec![vec![1, 2, 3], vec![4]]);
    assert_eq!(contents(&chunks_2), vec![vec![1, 2, 3], vec![4]]);
    for (chunk_1, chunk_2) in chunks_1.iter().zip(&chunks_2) {
        assert!(!chunk_1.buffer().same_buffer(chunk_2.buffer()));
    }
}

#[test]
fn respond_with_new_view_fills_the_pending_read() {
    init_logging();
    let (_stream, controller, read) = pending_byob_read();
    let request = controller.byob_request().expect("a read is pending");
    let view = request.view().unwrap();
    assert_eq!(view.byte_length(), 4);

    view.write_bytes(&[5, 6]);
    let answer = ArrayBufferView::new_uint8(view.buffer().clone(), 0, 2).unwrap();
    request.respond_with_new_view(answer).unwrap();
    perform_a_microtask_checkpoint();

    let chunk = read.result().unwrap().unwrap().value.unwrap();
    assert_eq!(chunk.to_vec(), vec![5, 6]);
    assert_eq!(chunk.buffer().byte_length(), 8);
    assert!(controller.byob_request().is_none());
}

#[test]
fn respond_with_new_view_rejects_views_that_do_not_match_the_request() {
    init_logging();
    let (_stream, controller, read) = pending_byob_read();
    let request = controller.byob_request().expect("a read is pending");
    let buffer = request.view().unwrap().buffer().clone();

    let shifted = ArrayBufferView::new_uint8(buffer.clone(), 1, 2).unwrap();
    assert!(matches!(request.respond_with_new_view(shifted), Err(Error::Range(_))));

    let other_buffer = ArrayBufferView::new_uint8(ArrayBuffer::new(16), 0, 2).unwrap();
    assert!(matches!(request.respond_with_new_view(other_buffer), Err(Error::Range(_))));

    let too_long = ArrayBufferView::new_uint8(buffer.clone(), 0, 6).unwrap();
    assert!(matches!(request.respond_with_new_view(too_long), Err(Error::Range(_))));

    let empty = ArrayBufferView::new_uint8(buffer, 0, 0).unwrap();
    assert!(matches!(request.respond_with_new_view(empty), Err(Error::Type(_))));

    // None of the rejected views took the buffer.
    assert!(read.is_pending());
    assert!(!request.view().unwrap().buffer().is_detached());
}

#[test]
fn respond_with_new_view_after_close_takes_an_empty_view() {
    init_logging();
    let (stream, controller, read) = pending_byob_read();
    let request = controller.byob_request().expect("a read is pending");
    controller.close().unwrap();
    assert_eq!(stream.state(), ReadableStreamState::Closed);
    let buffer = request.view().unwrap().buffer().clone();

    let non_empty = ArrayBufferView::new_uint8(buffer.clone(), 0, 1).unwrap();
    assert!(matches!(request.respond_with_new_view(non_empty), Err(Error::Type(_))));

    let empty = ArrayBufferView::new_uint8(buffer, 0, 0).unwrap();
    request.respond_with_new_view(empty).unwrap();
    perform_a_microtask_checkpoint();

    let result = read.result().unwrap().unwrap();
    assert!(result.done);
    assert_eq!(result.value.map(|view| view.byte_length()), Some(0));
}
