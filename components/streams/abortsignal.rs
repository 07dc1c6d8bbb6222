/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

use log::debug;

use crate::error::{Error, ErrorResult};

/// Steps to run when a signal is aborted.
pub type AbortAlgorithm = Box<dyn FnOnce()>;

/// Identifies an algorithm added to a signal, so it can be removed again.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AbortAlgorithmId(usize);

/// <https://dom.spec.whatwg.org/#interface-AbortSignal>
#[derive(Default)]
pub struct AbortSignal {
    /// <https://dom.spec.whatwg.org/#abortsignal-abort-reason>
    reason: RefCell<Option<Error>>,
    /// <https://dom.spec.whatwg.org/#abortsignal-abort-algorithms>
    abort_algorithms: RefCell<Vec<(AbortAlgorithmId, AbortAlgorithm)>>,
    next_algorithm_id: Cell<usize>,
}

impl AbortSignal {
    pub fn new() -> Rc<AbortSignal> {
        Rc::new(AbortSignal::default())
    }

    /// <https://dom.spec.whatwg.org/#dom-abortsignal-abort>
    pub fn abort(reason: Option<Error>) -> Rc<AbortSignal> {
        let signal = AbortSignal::new();
        signal.signal_abort(reason);
        signal
    }

    /// <https://dom.spec.whatwg.org/#abortsignal-add>
    pub fn add_abort_algorithm(&self, algorithm: impl FnOnce() + 'static) -> AbortAlgorithmId {
        let id = AbortAlgorithmId(self.next_algorithm_id.get());
        self.next_algorithm_id.set(id.0 + 1);

        // If signal is aborted, then return.
        if self.aborted() {
            return id;
        }

        // Append algorithm to signal’s abort algorithms.
        self.abort_algorithms
            .borrow_mut()
            .push((id, Box::new(algorithm)));
        id
    }

    /// <https://dom.spec.whatwg.org/#abortsignal-remove>
    pub fn remove_abort_algorithm(&self, id: AbortAlgorithmId) {
        self.abort_algorithms
            .borrow_mut()
            .retain(|(algorithm_id, _)| *algorithm_id != id);
    }

    /// <https://dom.spec.whatwg.org/#abortsignal-signal-abort>
    pub fn signal_abort(&self, reason: Option<Error>) {
        // 1. If signal is aborted, then return.
        if self.aborted() {
            return;
        }

        // 2. Set signal’s abort reason to reason if it is given; otherwise to a new "AbortError" DOMException.
        let reason = match reason {
            Some(Error::Undefined) | None => Error::Abort,
            Some(reason) => reason,
        };
        debug!("Signalling abort with {reason}");
        *self.reason.borrow_mut() = Some(reason);

        // 3. For each algorithm of signal’s abort algorithms: run algorithm.
        // 4. Empty signal’s abort algorithms.
        let algorithms = mem::take(&mut *self.abort_algorithms.borrow_mut());
        for (_, algorithm) in algorithms {
            algorithm();
        }
    }

    /// <https://dom.spec.whatwg.org/#dom-abortsignal-aborted>
    pub fn aborted(&self) -> bool {
        self.reason.borrow().is_some()
    }

    /// <https://dom.spec.whatwg.org/#dom-abortsignal-reason>
    pub fn reason(&self) -> Option<Error> {
        self.reason.borrow().clone()
    }

    /// <https://dom.spec.whatwg.org/#dom-abortsignal-throwifaborted>
    pub fn throw_if_aborted(&self) -> ErrorResult {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithms_run_once_and_can_be_removed() {
        let signal = AbortSignal::new();
        let ran = Rc::new(Cell::new(0));
        let first = {
            let ran = ran.clone();
            signal.add_abort_algorithm(move || ran.set(ran.get() + 1))
        };
        {
            let ran = ran.clone();
            signal.add_abort_algorithm(move || ran.set(ran.get() + 10));
        }
        signal.remove_abort_algorithm(first);
        signal.signal_abort(None);
        signal.signal_abort(Some(Error::custom("again")));
        assert_eq!(ran.get(), 10);
        assert_eq!(signal.reason(), Some(Error::Abort));
        assert_eq!(signal.throw_if_aborted(), Err(Error::Abort));
    }
}
