/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;

use crate::abortsignal::AbortSignal;
use crate::error::Error;

/// <https://dom.spec.whatwg.org/#interface-abortcontroller>
#[derive(Default)]
pub struct AbortController {
    signal: Rc<AbortSignal>,
}

impl AbortController {
    /// <https://dom.spec.whatwg.org/#dom-abortcontroller-abortcontroller>
    pub fn new() -> AbortController {
        Default::default()
    }

    /// <https://dom.spec.whatwg.org/#dom-abortcontroller-signal>
    pub fn signal(&self) -> Rc<AbortSignal> {
        self.signal.clone()
    }

    /// <https://dom.spec.whatwg.org/#dom-abortcontroller-abort>
    pub fn abort(&self, reason: Option<Error>) {
        // The abort(reason) method steps are
        // to signal abort on this with reason if it is given.
        self.signal.signal_abort(reason);
    }
}
