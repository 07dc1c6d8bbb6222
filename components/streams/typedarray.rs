/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Byte storage for byte streams.
//!
//! An [`ArrayBuffer`] is shared, mutable byte storage that can be detached. Transferring
//! a buffer moves its backing allocation into a new buffer and detaches the old one,
//! which is how byte streams hand memory between a consumer and a source without
//! copying. An [`ArrayBufferView`] is a typed window onto a buffer.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Fallible};

struct ArrayBufferData {
    bytes: RefCell<Vec<u8>>,
    detached: Cell<bool>,
}

/// <https://tc39.es/ecma262/#sec-arraybuffer-objects>
#[derive(Clone)]
pub struct ArrayBuffer {
    data: Rc<ArrayBufferData>,
}

impl fmt::Debug for ArrayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayBuffer")
            .field("byte_length", &self.byte_length())
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl ArrayBuffer {
    /// A zero-filled buffer of `byte_length` bytes.
    pub fn new(byte_length: usize) -> ArrayBuffer {
        ArrayBuffer::from_vec(vec![0; byte_length])
    }

    pub fn from_vec(bytes: Vec<u8>) -> ArrayBuffer {
        ArrayBuffer {
            data: Rc::new(ArrayBufferData {
                bytes: RefCell::new(bytes),
                detached: Cell::new(false),
            }),
        }
    }

    /// The length of the buffer, zero once detached.
    pub fn byte_length(&self) -> usize {
        self.data.bytes.borrow().len()
    }

    /// <https://tc39.es/ecma262/#sec-isdetachedbuffer>
    pub fn is_detached(&self) -> bool {
        self.data.detached.get()
    }

    /// The address of the backing allocation, to observe that transfers do not copy.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.bytes.borrow().as_ptr()
    }

    pub fn same_buffer(&self, other: &ArrayBuffer) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// <https://streams.spec.whatwg.org/#transfer-array-buffer>
    pub fn transfer(&self) -> Fallible<ArrayBuffer> {
        // Assert: ! IsDetachedBuffer(O) is false.
        if self.is_detached() {
            return Err(Error::Type("Cannot transfer a detached ArrayBuffer".into()));
        }
        // Let arrayBufferData be O.[[ArrayBufferData]].
        let bytes = std::mem::take(&mut *self.data.bytes.borrow_mut());

        // Perform ? DetachArrayBuffer(O).
        self.data.detached.set(true);

        // Return a new ArrayBuffer object whose [[ArrayBufferData]] is arrayBufferData.
        Ok(ArrayBuffer::from_vec(bytes))
    }

    /// <https://streams.spec.whatwg.org/#can-transfer-array-buffer>
    pub fn can_transfer(&self) -> bool {
        !self.is_detached()
    }

    /// <https://tc39.es/ecma262/#sec-clonearraybuffer>
    pub fn clone_range(&self, byte_offset: usize, byte_length: usize) -> Fallible<ArrayBuffer> {
        if self.is_detached() {
            return Err(Error::Type("Cannot clone a detached ArrayBuffer".into()));
        }
        let bytes = self.data.bytes.borrow();
        let range = byte_offset
            .checked_add(byte_length)
            .and_then(|end| bytes.get(byte_offset..end));
        let Some(range) = range else {
            return Err(Error::Range("Clone range is out of bounds".into()));
        };
        Ok(ArrayBuffer::from_vec(range.to_vec()))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.bytes.borrow().clone()
    }

    /// Run `f` over the bytes of this buffer.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.data.bytes.borrow())
    }

    /// Run `f` over the bytes of this buffer, mutably.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data.bytes.borrow_mut())
    }
}

/// <https://tc39.es/ecma262/#sec-copydatablockbytes>
pub(crate) fn copy_data_block_bytes(
    to_buffer: &ArrayBuffer,
    to_index: usize,
    from_buffer: &ArrayBuffer,
    from_index: usize,
    count: usize,
) {
    if count == 0 {
        return;
    }
    if to_buffer.same_buffer(from_buffer) {
        to_buffer.with_bytes_mut(|bytes| {
            bytes.copy_within(from_index..from_index + count, to_index);
        });
        return;
    }
    let from = from_buffer.data.bytes.borrow();
    let mut to = to_buffer.data.bytes.borrow_mut();
    to[to_index..to_index + count].copy_from_slice(&from[from_index..from_index + count]);
}

/// The constructor of a typed array or a `DataView`.
///
/// <https://tc39.es/ecma262/#table-the-typedarray-constructors>
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum ArrayBufferViewType {
    Int8Array,
    #[default]
    Uint8Array,
    Uint8ClampedArray,
    Int16Array,
    Uint16Array,
    Int32Array,
    Uint32Array,
    Float32Array,
    Float64Array,
    BigInt64Array,
    BigUint64Array,
    DataView,
}

impl ArrayBufferViewType {
    /// The element size of this view type. `DataView` is treated as a view of bytes.
    pub fn element_size(self) -> usize {
        match self {
            ArrayBufferViewType::Int8Array |
            ArrayBufferViewType::Uint8Array |
            ArrayBufferViewType::Uint8ClampedArray |
            ArrayBufferViewType::DataView => 1,
            ArrayBufferViewType::Int16Array | ArrayBufferViewType::Uint16Array => 2,
            ArrayBufferViewType::Int32Array |
            ArrayBufferViewType::Uint32Array |
            ArrayBufferViewType::Float32Array => 4,
            ArrayBufferViewType::Float64Array |
            ArrayBufferViewType::BigInt64Array |
            ArrayBufferViewType::BigUint64Array => 8,
        }
    }

    /// Whether this is a typed array, as opposed to a `DataView`.
    pub fn is_typed_array(self) -> bool {
        self != ArrayBufferViewType::DataView
    }
}

/// <https://webidl.spec.whatwg.org/#ArrayBufferView>
#[derive(Clone, Debug)]
pub struct ArrayBufferView {
    view_type: ArrayBufferViewType,
    buffer: ArrayBuffer,
    byte_offset: usize,
    byte_length: usize,
}

impl ArrayBufferView {
    /// Construct a view of `length` elements of `view_type` over `buffer`, starting at
    /// `byte_offset`, as the typed array constructors do.
    pub fn new(
        view_type: ArrayBufferViewType,
        buffer: ArrayBuffer,
        byte_offset: usize,
        length: usize,
    ) -> Fallible<ArrayBufferView> {
        if buffer.is_detached() {
            return Err(Error::Type("Cannot create a view on a detached ArrayBuffer".into()));
        }
        let element_size = view_type.element_size();
        if byte_offset % element_size != 0 {
            return Err(Error::Range(format!(
                "Start offset of {view_type:?} should be a multiple of {element_size}"
            )));
        }
        let Some(byte_length) = length.checked_mul(element_size) else {
            return Err(Error::Range(format!("Invalid {view_type:?} length {length}")));
        };
        if byte_offset
            .checked_add(byte_length)
            .is_none_or(|end| end > buffer.byte_length())
        {
            return Err(Error::Range("View extends past the end of its buffer".into()));
        }
        Ok(ArrayBufferView {
            view_type,
            buffer,
            byte_offset,
            byte_length,
        })
    }

    /// A `Uint8Array` over `byte_length` bytes of `buffer` at `byte_offset`.
    pub fn new_uint8(
        buffer: ArrayBuffer,
        byte_offset: usize,
        byte_length: usize,
    ) -> Fallible<ArrayBufferView> {
        ArrayBufferView::new(
            ArrayBufferViewType::Uint8Array,
            buffer,
            byte_offset,
            byte_length,
        )
    }

    /// A view over `byte_length` bytes of `buffer`, whose bounds and alignment the caller
    /// has already checked.
    pub(crate) fn from_parts(
        view_type: ArrayBufferViewType,
        buffer: ArrayBuffer,
        byte_offset: usize,
        byte_length: usize,
    ) -> ArrayBufferView {
        debug_assert_eq!(byte_offset % view_type.element_size(), 0);
        ArrayBufferView {
            view_type,
            buffer,
            byte_offset,
            byte_length,
        }
    }

    /// A `Uint8Array` owning `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> ArrayBufferView {
        let byte_length = bytes.len();
        ArrayBufferView {
            view_type: ArrayBufferViewType::Uint8Array,
            buffer: ArrayBuffer::from_vec(bytes),
            byte_offset: 0,
            byte_length,
        }
    }

    /// A zero-filled `view_type` array of `length` elements over a new buffer.
    pub fn zeroed(view_type: ArrayBufferViewType, length: usize) -> ArrayBufferView {
        ArrayBufferView {
            view_type,
            buffer: ArrayBuffer::new(length * view_type.element_size()),
            byte_offset: 0,
            byte_length: length * view_type.element_size(),
        }
    }

    pub fn view_type(&self) -> ArrayBufferViewType {
        self.view_type
    }

    pub fn element_size(&self) -> usize {
        self.view_type.element_size()
    }

    pub fn buffer(&self) -> &ArrayBuffer {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        if self.buffer.is_detached() {
            return 0;
        }
        self.byte_offset
    }

    /// The length in bytes, zero once the underlying buffer is detached.
    pub fn byte_length(&self) -> usize {
        if self.buffer.is_detached() {
            return 0;
        }
        self.byte_length
    }

    /// The length in elements.
    pub fn len(&self) -> usize {
        self.byte_length() / self.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_length() == 0
    }

    /// Copy the bytes this view covers.
    pub fn to_vec(&self) -> Vec<u8> {
        if self.buffer.is_detached() {
            return vec![];
        }
        self.buffer
            .with_bytes(|bytes| bytes[self.byte_offset..self.byte_offset + self.byte_length].to_vec())
    }

    /// Overwrite the start of this view with `source`, returning the number of bytes written.
    pub fn write_bytes(&self, source: &[u8]) -> usize {
        let count = source.len().min(self.byte_length());
        if count == 0 {
            return 0;
        }
        self.buffer.with_bytes_mut(|bytes| {
            bytes[self.byte_offset..self.byte_offset + count].copy_from_slice(&source[..count]);
        });
        count
    }

    /// <https://streams.spec.whatwg.org/#abstract-opdef-cloneasuint8array>
    pub fn clone_as_uint8_array(&self) -> Fallible<ArrayBufferView> {
        // Assert: O is an Object.
        // Assert: O has an [[ViewedArrayBuffer]] internal slot.
        // Assert: ! IsDetachedBuffer(O.[[ViewedArrayBuffer]]) is false.
        if self.buffer.is_detached() {
            return Err(Error::Type("Cannot clone a view on a detached ArrayBuffer".into()));
        }

        // Let buffer be ? CloneArrayBuffer(O.[[ViewedArrayBuffer]], O.[[ByteOffset]],
        // O.[[ByteLength]], %ArrayBuffer%).
        let buffer = self.buffer.clone_range(self.byte_offset, self.byte_length)?;

        // Let array be ! Construct(%Uint8Array%, « buffer »).
        ArrayBufferView::new_uint8(buffer, 0, self.byte_length)
    }
}

impl From<Vec<u8>> for ArrayBufferView {
    fn from(bytes: Vec<u8>) -> ArrayBufferView {
        ArrayBufferView::from_bytes(bytes)
    }
}

impl From<&[u8]> for ArrayBufferView {
    fn from(bytes: &[u8]) -> ArrayBufferView {
        ArrayBufferView::from_bytes(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_moves_the_allocation() {
        let buffer = ArrayBuffer::from_vec(vec![1, 2, 3]);
        let ptr = buffer.as_ptr();
        let transferred = buffer.transfer().unwrap();
        assert!(buffer.is_detached());
        assert_eq!(buffer.byte_length(), 0);
        assert_eq!(transferred.as_ptr(), ptr);
        assert_eq!(transferred.to_vec(), vec![1, 2, 3]);
        assert!(matches!(buffer.transfer(), Err(Error::Type(_))));
    }

    #[test]
    fn detached_and_zero_length_are_distinct() {
        let empty = ArrayBuffer::new(0);
        assert!(!empty.is_detached());
        assert_eq!(empty.byte_length(), 0);
        let transferred = empty.transfer().unwrap();
        assert!(empty.is_detached());
        assert!(!transferred.is_detached());
    }

    #[test]
    fn views_check_alignment_and_bounds() {
        let buffer = ArrayBuffer::new(8);
        assert!(ArrayBufferView::new(ArrayBufferViewType::Uint16Array, buffer.clone(), 1, 1).is_err());
        assert!(ArrayBufferView::new(ArrayBufferViewType::Uint32Array, buffer.clone(), 4, 2).is_err());
        let view = ArrayBufferView::new(ArrayBufferViewType::Uint16Array, buffer, 2, 3).unwrap();
        assert_eq!(view.byte_length(), 6);
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn oversized_views_and_ranges_are_range_errors() {
        let buffer = ArrayBuffer::new(8);
        let view = ArrayBufferView::new(
            ArrayBufferViewType::Float64Array,
            buffer.clone(),
            0,
            usize::MAX,
        );
        assert!(matches!(view, Err(Error::Range(_))));
        let view =
            ArrayBufferView::new(ArrayBufferViewType::Uint8Array, buffer.clone(), usize::MAX, 1);
        assert!(matches!(view, Err(Error::Range(_))));
        assert!(matches!(buffer.clone_range(4, usize::MAX), Err(Error::Range(_))));
    }

    #[test]
    fn overlapping_copies_within_a_buffer() {
        let buffer = ArrayBuffer::from_vec(vec![1, 2, 3, 4, 5]);
        copy_data_block_bytes(&buffer, 1, &buffer, 0, 3);
        assert_eq!(buffer.to_vec(), vec![1, 1, 2, 3, 5]);
    }
}
