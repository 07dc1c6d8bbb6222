/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use streams::{
    AlgorithmResult, Error, Promise, QueuingStrategy, ReadableStream,
    ReadableStreamDefaultController, UnderlyingSink, UnderlyingSource, WritableStream,
    WritableStreamDefaultController,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What a test source observed of its stream.
pub struct SourceHandle<T> {
    controller: Rc<RefCell<Option<Rc<ReadableStreamDefaultController<T>>>>>,
    pulls: Rc<Cell<usize>>,
    cancel_reasons: Rc<RefCell<Vec<Error>>>,
}

impl<T> SourceHandle<T> {
    pub fn controller(&self) -> Rc<ReadableStreamDefaultController<T>> {
        self.controller
            .borrow()
            .clone()
            .expect("start stores the controller")
    }

    pub fn pulls(&self) -> usize {
        self.pulls.get()
    }

    pub fn cancel_reasons(&self) -> Vec<Error> {
        self.cancel_reasons.borrow().clone()
    }
}

type PullSteps<T> = Box<dyn FnMut(&Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult>;

/// A source that hands its controller to the test, counts pulls and records cancel reasons.
struct ControlledSource<T> {
    controller: Rc<RefCell<Option<Rc<ReadableStreamDefaultController<T>>>>>,
    pulls: Rc<Cell<usize>>,
    cancel_reasons: Rc<RefCell<Vec<Error>>>,
    on_pull: Option<PullSteps<T>>,
}

impl<T> UnderlyingSource<T> for ControlledSource<T> {
    fn start(&mut self, controller: &Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult {
        *self.controller.borrow_mut() = Some(controller.clone());
        Ok(None)
    }

    fn pull(&mut self, controller: &Rc<ReadableStreamDefaultController<T>>) -> AlgorithmResult {
        self.pulls.set(self.pulls.get() + 1);
        match self.on_pull.as_mut() {
            Some(on_pull) => on_pull(controller),
            None => Ok(None),
        }
    }

    fn cancel(&mut self, reason: Error) -> AlgorithmResult {
        self.cancel_reasons.borrow_mut().push(reason);
        Ok(None)
    }
}

pub fn controlled_stream<T: Clone + 'static>(
    strategy: QueuingStrategy<T>,
) -> (Rc<ReadableStream<T>>, SourceHandle<T>) {
    controlled_stream_with_pull(strategy, None)
}

pub fn controlled_stream_with_pull<T: Clone + 'static>(
    strategy: QueuingStrategy<T>,
    on_pull: Option<PullSteps<T>>,
) -> (Rc<ReadableStream<T>>, SourceHandle<T>) {
    let handle = SourceHandle {
        controller: Default::default(),
        pulls: Default::default(),
        cancel_reasons: Default::default(),
    };
    let source = ControlledSource {
        controller: handle.controller.clone(),
        pulls: handle.pulls.clone(),
        cancel_reasons: handle.cancel_reasons.clone(),
        on_pull,
    };
    let stream = ReadableStream::new(source, strategy).expect("valid strategy");
    (stream, handle)
}

#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent<T> {
    Write(T),
    Close,
    Abort(Error),
}

/// What a test sink observed, and the writes it is holding back.
pub struct SinkHandle<T> {
    events: Rc<RefCell<Vec<SinkEvent<T>>>>,
    held_writes: Rc<RefCell<VecDeque<Promise<()>>>>,
    controller: Rc<RefCell<Option<Rc<WritableStreamDefaultController<T>>>>>,
}

impl<T: Clone> SinkHandle<T> {
    pub fn events(&self) -> Vec<SinkEvent<T>> {
        self.events.borrow().clone()
    }

    pub fn controller(&self) -> Rc<WritableStreamDefaultController<T>> {
        self.controller
            .borrow()
            .clone()
            .expect("start stores the controller")
    }

    /// Complete the oldest write the sink is holding back.
    pub fn finish_write(&self) {
        let promise = self
            .held_writes
            .borrow_mut()
            .pop_front()
            .expect("a write is being held");
        promise.resolve_native(());
    }
}

/// How a recording sink completes writes.
#[derive(Clone, Copy, PartialEq)]
pub enum WriteBehavior {
    Complete,
    Hold,
    Fail,
}

struct RecordingSink<T> {
    events: Rc<RefCell<Vec<SinkEvent<T>>>>,
    held_writes: Rc<RefCell<VecDeque<Promise<()>>>>,
    controller: Rc<RefCell<Option<Rc<WritableStreamDefaultController<T>>>>>,
    behavior: WriteBehavior,
}

impl<T: Clone + 'static> UnderlyingSink<T> for RecordingSink<T> {
    fn start(&mut self, controller: &Rc<WritableStreamDefaultController<T>>) -> AlgorithmResult {
        *self.controller.borrow_mut() = Some(controller.clone());
        Ok(None)
    }

    fn write(
        &mut self,
        chunk: T,
        _controller: &Rc<WritableStreamDefaultController<T>>,
    ) -> AlgorithmResult {
        self.events.borrow_mut().push(SinkEvent::Write(chunk));
        match self.behavior {
            WriteBehavior::Complete => Ok(None),
            WriteBehavior::Hold => {
                let promise = Promise::new();
                self.held_writes.borrow_mut().push_back(promise.clone());
                Ok(Some(promise))
            },
            WriteBehavior::Fail => Err(Error::custom("sink failure")),
        }
    }

    fn close(&mut self) -> AlgorithmResult {
        self.events.borrow_mut().push(SinkEvent::Close);
        Ok(None)
    }

    fn abort(&mut self, reason: Error) -> AlgorithmResult {
        self.events.borrow_mut().push(SinkEvent::Abort(reason));
        Ok(None)
    }
}

pub fn recording_stream<T: Clone + 'static>(
    strategy: QueuingStrategy<T>,
    behavior: WriteBehavior,
) -> (Rc<WritableStream<T>>, SinkHandle<T>) {
    let handle = SinkHandle {
        events: Default::default(),
        held_writes: Default::default(),
        controller: Default::default(),
    };
    let sink = RecordingSink {
        events: handle.events.clone(),
        held_writes: handle.held_writes.clone(),
        controller: handle.controller.clone(),
        behavior,
    };
    let stream = WritableStream::new(sink, strategy).expect("valid strategy");
    (stream, handle)
}

/// A source with none of the optional algorithms.
pub struct NullSource;

impl<T> UnderlyingSource<T> for NullSource {}
