/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Native promises.
//!
//! A [`Promise`] is a shared, single-threaded slot that is settled at most once. Code
//! interested in the outcome registers reactions with
//! [`Promise::append_native_handler`]; reactions never run synchronously with the
//! settlement, they are queued on the microtask queue of the current thread. Promises
//! also implement [`Future`], which is how embedders usually consume them.

use std::cell::RefCell;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use log::debug;

use crate::error::Error;
use crate::microtask::enqueue_microtask;

/// <https://tc39.es/ecma262/#sec-properties-of-promise-instances>
#[derive(Clone, Debug, PartialEq)]
pub enum PromiseState<T> {
    Pending,
    Fulfilled(T),
    Rejected(Error),
}

type PromiseReaction<T> = Box<dyn FnOnce(Result<T, Error>)>;

struct PromiseInner<T> {
    state: PromiseState<T>,
    reactions: Vec<PromiseReaction<T>>,
    wakers: Vec<Waker>,
    /// <https://tc39.es/ecma262/#sec-properties-of-promise-instances>
    is_handled: bool,
}

impl<T> Drop for PromiseInner<T> {
    fn drop(&mut self) {
        if let PromiseState::Rejected(error) = &self.state {
            if !self.is_handled {
                debug!("Dropping a rejected promise nobody handled: {error}");
            }
        }
    }
}

pub struct Promise<T> {
    inner: Rc<RefCell<PromiseInner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.inner.borrow().state {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl<T: Clone + 'static> Default for Promise<T> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<T: Clone + 'static> Promise<T> {
    pub fn new() -> Promise<T> {
        Promise {
            inner: Rc::new(RefCell::new(PromiseInner {
                state: PromiseState::Pending,
                reactions: vec![],
                wakers: vec![],
                is_handled: false,
            })),
        }
    }

    /// <https://webidl.spec.whatwg.org/#a-promise-resolved-with>
    pub fn new_resolved(value: T) -> Promise<T> {
        let promise = Promise::new();
        promise.resolve_native(value);
        promise
    }

    /// <https://webidl.spec.whatwg.org/#a-promise-rejected-with>
    pub fn new_rejected(error: Error) -> Promise<T> {
        let promise = Promise::new();
        promise.reject_error(error);
        promise
    }

    /// <https://webidl.spec.whatwg.org/#resolve>
    /// Settling an already settled promise does nothing.
    pub fn resolve_native(&self, value: T) {
        self.settle(Ok(value));
    }

    /// <https://webidl.spec.whatwg.org/#reject>
    /// Settling an already settled promise does nothing.
    pub fn reject_error(&self, error: Error) {
        self.settle(Err(error));
    }

    fn settle(&self, result: Result<T, Error>) {
        let (reactions, wakers) = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, PromiseState::Pending) {
                return;
            }
            inner.state = match &result {
                Ok(value) => PromiseState::Fulfilled(value.clone()),
                Err(error) => PromiseState::Rejected(error.clone()),
            };
            (
                mem::take(&mut inner.reactions),
                mem::take(&mut inner.wakers),
            )
        };
        for reaction in reactions {
            let result = result.clone();
            enqueue_microtask(move || reaction(result));
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Make this promise settle the same way `other` does.
    pub fn resolve_with_promise(&self, other: &Promise<T>) {
        if self.ptr_eq(other) {
            self.reject_error(Error::Type("Chaining cycle detected for promise".into()));
            return;
        }
        let (fulfilled, rejected) = (self.clone(), self.clone());
        other.append_native_handler(
            move |value| fulfilled.resolve_native(value),
            move |error| rejected.reject_error(error),
        );
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Rejected(_))
    }

    pub fn state(&self) -> PromiseState<T> {
        self.inner.borrow().state.clone()
    }

    /// The outcome of this promise, if it has settled.
    pub fn result(&self) -> Option<Result<T, Error>> {
        match &self.inner.borrow().state {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// <https://webidl.spec.whatwg.org/#mark-a-promise-as-handled>
    pub fn set_promise_is_handled(&self) {
        self.inner.borrow_mut().is_handled = true;
    }

    pub fn promise_is_handled(&self) -> bool {
        self.inner.borrow().is_handled
    }

    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// <https://webidl.spec.whatwg.org/#upon-fulfillment> and
    /// <https://webidl.spec.whatwg.org/#upon-rejection>
    ///
    /// Exactly one of the two handlers runs, from a microtask, once the promise settles.
    pub fn append_native_handler<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(Error) + 'static,
    {
        let reaction: PromiseReaction<T> = Box::new(move |result| match result {
            Ok(value) => on_fulfilled(value),
            Err(error) => on_rejected(error),
        });

        let settled = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            inner.is_handled = true;
            match &inner.state {
                PromiseState::Pending => {
                    inner.reactions.push(reaction);
                    return;
                },
                PromiseState::Fulfilled(value) => Ok(value.clone()),
                PromiseState::Rejected(error) => Err(error.clone()),
            }
        };
        enqueue_microtask(move || reaction(settled));
    }

    /// <https://webidl.spec.whatwg.org/#dfn-perform-steps-once-promise-is-settled>
    pub fn upon_settlement<F>(&self, steps: F)
    where
        F: FnOnce() + 'static,
    {
        let steps = Rc::new(RefCell::new(Some(steps)));
        let on_rejected = steps.clone();
        self.append_native_handler(
            move |_| {
                let steps = steps.borrow_mut().take();
                if let Some(steps) = steps {
                    steps();
                }
            },
            move |_| {
                let steps = on_rejected.borrow_mut().take();
                if let Some(steps) = steps {
                    steps();
                }
            },
        );
    }

    /// <https://webidl.spec.whatwg.org/#dfn-perform-steps-once-promise-is-settled>
    /// with a transformation, as in "the result of reacting to".
    ///
    /// Returns a new promise settled with the outcome of whichever handler runs.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, Error> + 'static,
        R: FnOnce(Error) -> Result<U, Error> + 'static,
    {
        let promise = Promise::new();
        let (fulfilled, rejected) = (promise.clone(), promise.clone());
        self.append_native_handler(
            move |value| match on_fulfilled(value) {
                Ok(value) => fulfilled.resolve_native(value),
                Err(error) => fulfilled.reject_error(error),
            },
            move |error| match on_rejected(error) {
                Ok(value) => rejected.resolve_native(value),
                Err(error) => rejected.reject_error(error),
            },
        );
        promise
    }
}

impl Promise<()> {
    /// A promise already fulfilled with `()`.
    pub fn resolved() -> Promise<()> {
        Promise::new_resolved(())
    }
}

/// <https://webidl.spec.whatwg.org/#wait-for-all>
///
/// The returned promise fulfills once all of `promises` fulfill, or rejects with the
/// first rejection.
pub fn wait_for_all(promises: Vec<Promise<()>>) -> Promise<()> {
    let result = Promise::new();
    if promises.is_empty() {
        result.resolve_native(());
        return result;
    }
    let remaining = Rc::new(std::cell::Cell::new(promises.len()));
    for promise in promises {
        let (fulfilled, rejected) = (result.clone(), result.clone());
        let remaining = remaining.clone();
        promise.append_native_handler(
            move |()| {
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    fulfilled.resolve_native(());
                }
            },
            move |error| rejected.reject_error(error),
        );
    }
    result
}

impl<T: Clone + 'static> Future for Promise<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.is_handled = true;
        match &inner.state {
            PromiseState::Pending => {
                if !inner.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            },
            PromiseState::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            PromiseState::Rejected(error) => Poll::Ready(Err(error.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::microtask::{block_on, enqueue_microtask, perform_a_microtask_checkpoint};

    #[test]
    fn reactions_run_from_microtasks_in_order() {
        let log = Rc::new(RefCell::new(vec![]));
        let promise = Promise::new();
        for index in 0..3 {
            let log = log.clone();
            promise.append_native_handler(
                move |value: u32| log.borrow_mut().push(value + index),
                |_| {},
            );
        }
        promise.resolve_native(10);
        assert!(log.borrow().is_empty());
        perform_a_microtask_checkpoint();
        assert_eq!(*log.borrow(), vec![10, 11, 12]);
    }

    #[test]
    fn settles_only_once() {
        let promise = Promise::new();
        promise.resolve_native(1);
        promise.reject_error(Error::custom("late"));
        promise.resolve_native(2);
        assert_eq!(promise.result(), Some(Ok(1)));
    }

    #[test]
    fn then_chains_and_maps_rejections() {
        let promise: Promise<u32> = Promise::new_rejected(Error::custom("boom"));
        let recovered = promise.then(|value| Ok(value * 2), |error| Ok(format!("{error}").len() as u32));
        assert_eq!(block_on(recovered), Some(Ok(4)));
    }

    #[test]
    fn wait_for_all_rejects_on_first_failure() {
        let first = Promise::new();
        let second = Promise::new();
        let all = wait_for_all(vec![first.clone(), second.clone()]);
        second.reject_error(Error::custom("second"));
        first.resolve_native(());
        perform_a_microtask_checkpoint();
        assert_eq!(all.result(), Some(Err(Error::custom("second"))));
    }

    #[test]
    fn block_on_gives_up_when_nothing_can_settle() {
        let promise: Promise<()> = Promise::new();
        assert_eq!(block_on(promise), None);
    }

    #[test]
    fn block_on_inside_a_microtask_does_not_spin() {
        let outcome = Rc::new(RefCell::new(None));
        let outcome_in_task = outcome.clone();
        enqueue_microtask(move || {
            // The reaction would need the running checkpoint to finish first.
            let promise = Promise::new_resolved(1u32).then(|value| Ok(value + 1), Err);
            *outcome_in_task.borrow_mut() = Some(block_on(promise));
        });
        perform_a_microtask_checkpoint();
        assert_eq!(*outcome.borrow(), Some(None));
    }
}
