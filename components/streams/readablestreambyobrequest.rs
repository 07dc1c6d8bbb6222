/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, ErrorResult};
use crate::readablebytestreamcontroller::ReadableByteStreamController;
use crate::typedarray::ArrayBufferView;

/// <https://streams.spec.whatwg.org/#readablestreambyobrequest>
pub struct ReadableStreamBYOBRequest {
    /// <https://streams.spec.whatwg.org/#readablestreambyobrequest-controller>
    controller: RefCell<Option<Rc<ReadableByteStreamController>>>,
    /// <https://streams.spec.whatwg.org/#readablestreambyobrequest-view>
    view: RefCell<Option<ArrayBufferView>>,
}

impl ReadableStreamBYOBRequest {
    pub(crate) fn new(
        controller: Rc<ReadableByteStreamController>,
        view: ArrayBufferView,
    ) -> Rc<ReadableStreamBYOBRequest> {
        Rc::new(ReadableStreamBYOBRequest {
            controller: RefCell::new(Some(controller)),
            view: RefCell::new(Some(view)),
        })
    }

    /// Detach this request from its controller, once the controller no longer
    /// waits for it.
    pub(crate) fn invalidate(&self) {
        self.controller.borrow_mut().take();
        self.view.borrow_mut().take();
    }

    /// <https://streams.spec.whatwg.org/#rs-byob-request-view>
    pub fn view(&self) -> Option<ArrayBufferView> {
        // Return this.[[view]].
        self.view.borrow().clone()
    }

    /// <https://streams.spec.whatwg.org/#rs-byob-request-respond>
    pub fn respond(&self, bytes_written: usize) -> ErrorResult {
        // If this.[[controller]] is undefined, throw a TypeError exception.
        let Some(controller) = self.controller.borrow().clone() else {
            return Err(Error::Type("This BYOB request has been invalidated".into()));
        };

        // If ! IsDetachedBuffer(this.[[view]].[[ArrayBuffer]]) is true, throw a TypeError exception.
        let Some(view) = self.view() else {
            return Err(Error::Type("This BYOB request has been invalidated".into()));
        };
        if view.buffer().is_detached() {
            return Err(Error::Type("The BYOB request's buffer has been detached".into()));
        }

        // Assert: this.[[view]].[[ByteLength]] > 0.
        // Assert: this.[[view]].[[ViewedArrayBuffer]].[[ByteLength]] > 0.
        assert!(view.byte_length() > 0);
        assert!(view.buffer().byte_length() > 0);

        // Perform ? ReadableByteStreamControllerRespond(this.[[controller]], bytesWritten).
        controller.respond(bytes_written)
    }

    /// <https://streams.spec.whatwg.org/#rs-byob-request-respond-with-new-view>
    pub fn respond_with_new_view(&self, view: ArrayBufferView) -> ErrorResult {
        // If this.[[controller]] is undefined, throw a TypeError exception.
        let Some(controller) = self.controller.borrow().clone() else {
            return Err(Error::Type("This BYOB request has been invalidated".into()));
        };

        // If ! IsDetachedBuffer(view.[[ViewedArrayBuffer]]) is true, throw a TypeError exception.
        if view.buffer().is_detached() {
            return Err(Error::Type("The given view's buffer has been detached".into()));
        }

        // Return ? ReadableByteStreamControllerRespondWithNewView(this.[[controller]], view).
        controller.respond_with_new_view(view)
    }
}
