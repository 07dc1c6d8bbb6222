/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Implementation of [microtasks](https://html.spec.whatwg.org/multipage/#microtask) and
//! the microtask queue of the current thread. Promise reactions are always queued here,
//! and it is up to the embedder to perform checkpoints at appropriate times.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use log::trace;

/// A job scheduled to run during the next microtask checkpoint.
pub type Microtask = Box<dyn FnOnce()>;

/// A collection of microtasks in FIFO order.
#[derive(Default)]
pub struct MicrotaskQueue {
    /// The list of enqueued microtasks that will be invoked at the next microtask checkpoint.
    microtask_queue: RefCell<VecDeque<Microtask>>,
    /// <https://html.spec.whatwg.org/multipage/#performing-a-microtask-checkpoint>
    performing_a_microtask_checkpoint: Cell<bool>,
}

thread_local! {
    static MICROTASK_QUEUE: MicrotaskQueue = MicrotaskQueue::default();
}

impl MicrotaskQueue {
    /// Add a new microtask to this queue. It will be invoked as part of the next
    /// microtask checkpoint.
    pub fn enqueue(&self, job: Microtask) {
        self.microtask_queue.borrow_mut().push_back(job);
    }

    /// <https://html.spec.whatwg.org/multipage/#perform-a-microtask-checkpoint>
    /// Perform a microtask checkpoint, executing all queued microtasks until the queue is empty.
    pub fn checkpoint(&self) {
        if self.performing_a_microtask_checkpoint.get() {
            return;
        }

        // Step 1
        self.performing_a_microtask_checkpoint.set(true);
        trace!("Now performing a microtask checkpoint");

        // Step 2
        let mut ran = 0usize;
        loop {
            let Some(job) = self.microtask_queue.borrow_mut().pop_front() else {
                break;
            };
            job();
            ran += 1;
        }

        trace!("Microtask checkpoint ran {ran} jobs");

        // Step 8
        self.performing_a_microtask_checkpoint.set(false);
    }

    pub fn is_performing_a_checkpoint(&self) -> bool {
        self.performing_a_microtask_checkpoint.get()
    }

    pub fn empty(&self) -> bool {
        self.microtask_queue.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.microtask_queue.borrow_mut().clear();
    }
}

/// Queue `job` on the microtask queue of the current thread.
pub fn enqueue_microtask(job: impl FnOnce() + 'static) {
    MICROTASK_QUEUE.with(|queue| queue.enqueue(Box::new(job)));
}

/// Run every microtask queued on the current thread, including the ones queued
/// while doing so.
pub fn perform_a_microtask_checkpoint() {
    MICROTASK_QUEUE.with(|queue| queue.checkpoint());
}

/// Whether the microtask queue of the current thread is empty.
pub fn microtask_queue_is_empty() -> bool {
    MICROTASK_QUEUE.with(|queue| queue.empty())
}

/// Drop every pending microtask of the current thread without running it.
pub fn discard_pending_microtasks() {
    MICROTASK_QUEUE.with(|queue| queue.clear());
}

/// Drive `future` to completion by alternating polls with microtask checkpoints.
///
/// Everything a stream does happens in promise reactions, so once the microtask queue
/// runs dry nothing can make progress anymore. In that case `None` is returned, as it
/// is when called from a microtask, since checkpoints do not nest.
pub fn block_on<F: Future>(future: F) -> Option<F::Output> {
    let mut future = pin!(future);
    let mut context = Context::from_waker(noop_waker_ref());
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut context) {
            return Some(output);
        }
        let stalled = MICROTASK_QUEUE
            .with(|queue| queue.empty() || queue.is_performing_a_checkpoint());
        if stalled {
            return None;
        }
        perform_a_microtask_checkpoint();
    }
}
