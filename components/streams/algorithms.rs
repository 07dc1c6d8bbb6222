/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Storage for the algorithms a controller was set up with.
//!
//! The algorithms of an underlying source, sink or transformer are frozen when the
//! controller is set up, and cleared once the stream can no longer call them. User
//! algorithms routinely call back into their own controller, which may clear the very
//! algorithms that are running, so the container hands out the algorithms by taking
//! them for the duration of a call and only puts them back if nothing cleared them in
//! the meantime. Calls that must not be lost, such as cancellation, are deferred
//! until the running call hands the algorithms back.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::error::Fallible;
use crate::promise::Promise;

/// What a user-provided algorithm returns.
///
/// `Ok(None)` completes synchronously, `Ok(Some(promise))` completes once `promise`
/// settles, and `Err` is thrown synchronously.
pub type AlgorithmResult = Fallible<Option<Promise<()>>>;

/// <https://webidl.spec.whatwg.org/#a-promise-resolved-with>, for the result of an algorithm.
pub(crate) fn promise_from_algorithm_result(result: AlgorithmResult) -> Promise<()> {
    match result {
        Ok(None) => Promise::resolved(),
        Ok(Some(promise)) => promise,
        Err(error) => Promise::new_rejected(error),
    }
}

type DeferredCall<S> = Box<dyn FnOnce(&mut S)>;

pub(crate) struct AlgorithmContainer<S: ?Sized> {
    algorithms: RefCell<Option<Box<S>>>,
    /// Set while the algorithms are lent out to a running call.
    in_use: Cell<bool>,
    /// Calls that arrived while the algorithms were lent out.
    deferred: RefCell<VecDeque<DeferredCall<S>>>,
    cleared: Cell<bool>,
}

impl<S: ?Sized> AlgorithmContainer<S> {
    pub(crate) fn new(algorithms: Box<S>) -> AlgorithmContainer<S> {
        AlgorithmContainer {
            algorithms: RefCell::new(Some(algorithms)),
            in_use: Cell::new(false),
            deferred: RefCell::new(VecDeque::new()),
            cleared: Cell::new(false),
        }
    }

    /// Run `steps` with the algorithms, or return `None` if they have been cleared.
    pub(crate) fn call<R>(&self, steps: impl FnOnce(&mut S) -> R) -> Option<R> {
        let mut algorithms = self.algorithms.borrow_mut().take()?;
        self.in_use.set(true);
        let result = steps(&mut algorithms);

        // Deferred calls run before a clear that happened meanwhile drops the algorithms.
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            let Some(next) = next else {
                break;
            };
            next(&mut algorithms);
        }
        self.in_use.set(false);

        if !self.cleared.get() {
            *self.algorithms.borrow_mut() = Some(algorithms);
        }
        Some(result)
    }

    /// Run a promise-returning algorithm. Cleared algorithms behave as if they
    /// were never provided.
    pub(crate) fn call_promise(&self, steps: impl FnOnce(&mut S) -> AlgorithmResult) -> Promise<()> {
        match self.call(steps) {
            Some(result) => promise_from_algorithm_result(result),
            None => Promise::resolved(),
        }
    }

    /// Like `call_promise`, but when the algorithms are lent out to a running call,
    /// run `steps` as soon as that call returns instead of skipping them.
    pub(crate) fn call_promise_or_defer<F>(&self, steps: F) -> Promise<()>
    where
        F: FnOnce(&mut S) -> AlgorithmResult + 'static,
    {
        if !self.in_use.get() || self.cleared.get() {
            return self.call_promise(steps);
        }

        let promise = Promise::new();
        let deferred_promise = promise.clone();
        self.deferred
            .borrow_mut()
            .push_back(Box::new(move |algorithms: &mut S| {
                let result = promise_from_algorithm_result(steps(algorithms));
                deferred_promise.resolve_with_promise(&result);
            }));
        promise
    }

    /// Drop the algorithms, so that they can be garbage collected even while the
    /// stream itself is still referenced. Algorithms lent out to a running call are
    /// dropped once it returns.
    pub(crate) fn clear(&self) {
        self.cleared.set(true);
        let algorithms = self.algorithms.borrow_mut().take();
        drop(algorithms);
    }

    pub(crate) fn is_cleared(&self) -> bool {
        self.cleared.get()
    }
}
