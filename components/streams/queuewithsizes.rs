/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::VecDeque;

use crate::error::{Error, ErrorResult};

/// <https://streams.spec.whatwg.org/#value-with-size>
#[derive(Clone, Debug, PartialEq)]
pub struct ValueWithSize<T> {
    /// <https://streams.spec.whatwg.org/#value-with-size-value>
    pub value: T,
    /// <https://streams.spec.whatwg.org/#value-with-size-size>
    pub size: f64,
}

/// <https://streams.spec.whatwg.org/#queue-with-sizes>
#[derive(Debug)]
pub struct QueueWithSizes<T> {
    queue: VecDeque<ValueWithSize<T>>,
    /// <https://streams.spec.whatwg.org/#readablestreamdefaultcontroller-queuetotalsize>
    total_size: f64,
}

impl<T> Default for QueueWithSizes<T> {
    fn default() -> Self {
        QueueWithSizes {
            queue: VecDeque::new(),
            total_size: 0.,
        }
    }
}

impl<T> QueueWithSizes<T> {
    pub fn new() -> QueueWithSizes<T> {
        Default::default()
    }

    /// <https://streams.spec.whatwg.org/#dequeue-value>
    pub fn dequeue_value(&mut self) -> T {
        // Assert: container.[[queue]] is not empty.
        // Let valueWithSize be container.[[queue]][0].
        // Remove valueWithSize from container.[[queue]].
        let value_with_size = self
            .queue
            .pop_front()
            .expect("Buffer cannot be empty when dequeue value is called into.");

        // Set container.[[queueTotalSize]] to container.[[queueTotalSize]] − valueWithSize’s size.
        self.total_size -= value_with_size.size;

        // If container.[[queueTotalSize]] < 0, set container.[[queueTotalSize]] to 0.
        // (This can occur due to rounding errors.)
        if self.total_size < 0. {
            self.total_size = 0.;
        }

        // Return valueWithSize’s value.
        value_with_size.value
    }

    /// <https://streams.spec.whatwg.org/#enqueue-value-with-size>
    pub fn enqueue_value_with_size(&mut self, value: T, size: f64) -> ErrorResult {
        // If ! IsNonNegativeNumber(size) is false, throw a RangeError exception.
        if size.is_nan() || size < 0. {
            return Err(Error::Range("Chunk size must be a non-negative number".into()));
        }

        // If size is +∞, throw a RangeError exception.
        if size.is_infinite() {
            return Err(Error::Range("Chunk size must be finite".into()));
        }

        // Append a new value-with-size with value value and size size to container.[[queue]].
        self.queue.push_back(ValueWithSize { value, size });

        // Set container.[[queueTotalSize]] to container.[[queueTotalSize]] + size.
        self.total_size += size;

        Ok(())
    }

    /// <https://streams.spec.whatwg.org/#peek-queue-value>
    pub fn peek_queue_value(&self) -> Option<&T> {
        self.queue.front().map(|value_with_size| &value_with_size.value)
    }

    /// <https://streams.spec.whatwg.org/#reset-queue>
    pub fn reset(&mut self) {
        self.queue.clear();
        self.total_size = 0.;
    }

    pub fn total_size(&self) -> f64 {
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_size_tracks_contents() {
        let mut queue = QueueWithSizes::new();
        queue.enqueue_value_with_size("a", 1.5).unwrap();
        queue.enqueue_value_with_size("b", 2.).unwrap();
        assert_eq!(queue.total_size(), 3.5);
        assert_eq!(queue.peek_queue_value(), Some(&"a"));
        assert_eq!(queue.dequeue_value(), "a");
        assert_eq!(queue.total_size(), 2.);
        assert_eq!(queue.len(), 1);
        queue.reset();
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 0.);
    }

    #[test]
    fn rejects_invalid_sizes() {
        let mut queue = QueueWithSizes::new();
        for size in [-1., f64::NAN, f64::INFINITY] {
            assert!(matches!(
                queue.enqueue_value_with_size((), size),
                Err(Error::Range(_))
            ));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 0.);
    }

    #[test]
    fn rounding_never_makes_the_total_negative() {
        let mut queue = QueueWithSizes::new();
        queue.enqueue_value_with_size(1, 0.1).unwrap();
        queue.enqueue_value_with_size(2, 0.2).unwrap();
        queue.dequeue_value();
        queue.dequeue_value();
        assert!(queue.total_size() >= 0.);
    }

    #[test]
    #[should_panic(expected = "Buffer cannot be empty")]
    fn dequeue_from_an_empty_queue_is_an_invariant_violation() {
        let mut queue: QueueWithSizes<()> = QueueWithSizes::new();
        queue.dequeue_value();
    }
}
