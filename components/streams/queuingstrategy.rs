/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Fallible};
use crate::typedarray::ArrayBufferView;

/// <https://streams.spec.whatwg.org/#dictdef-queuingstrategy>
pub type QueuingStrategySize<T> = Rc<dyn Fn(&T) -> Fallible<f64>>;

/// <https://streams.spec.whatwg.org/#qs-api>
pub struct QueuingStrategy<T> {
    pub high_water_mark: Option<f64>,
    pub size: Option<QueuingStrategySize<T>>,
}

impl<T> Default for QueuingStrategy<T> {
    fn default() -> Self {
        QueuingStrategy {
            high_water_mark: None,
            size: None,
        }
    }
}

impl<T> Clone for QueuingStrategy<T> {
    fn clone(&self) -> Self {
        QueuingStrategy {
            high_water_mark: self.high_water_mark,
            size: self.size.clone(),
        }
    }
}

impl<T> fmt::Debug for QueuingStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuingStrategy")
            .field("high_water_mark", &self.high_water_mark)
            .field("size", &self.size.as_ref().map(|_| "Fn"))
            .finish()
    }
}

impl<T> QueuingStrategy<T> {
    pub fn with_high_water_mark(high_water_mark: f64) -> QueuingStrategy<T> {
        QueuingStrategy {
            high_water_mark: Some(high_water_mark),
            size: None,
        }
    }

    pub fn with_size(
        high_water_mark: f64,
        size: impl Fn(&T) -> Fallible<f64> + 'static,
    ) -> QueuingStrategy<T> {
        QueuingStrategy {
            high_water_mark: Some(high_water_mark),
            size: Some(Rc::new(size)),
        }
    }
}

/// <https://streams.spec.whatwg.org/#dictdef-queuingstrategyinit>
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct QueuingStrategyInit {
    pub high_water_mark: f64,
}

/// Chunks whose size can be measured in bytes.
pub trait ByteLength {
    fn byte_length(&self) -> usize;
}

impl ByteLength for ArrayBufferView {
    fn byte_length(&self) -> usize {
        ArrayBufferView::byte_length(self)
    }
}

impl ByteLength for Vec<u8> {
    fn byte_length(&self) -> usize {
        self.len()
    }
}

impl ByteLength for String {
    fn byte_length(&self) -> usize {
        self.len()
    }
}

impl<B: ByteLength + ?Sized> ByteLength for Rc<B> {
    fn byte_length(&self) -> usize {
        (**self).byte_length()
    }
}

/// Extract the high water mark from a QueuingStrategy.
/// If the high water mark is not set, return the default value.
///
/// <https://streams.spec.whatwg.org/#validate-and-normalize-high-water-mark>
pub fn extract_high_water_mark<T>(
    strategy: &QueuingStrategy<T>,
    default_hwm: f64,
) -> Fallible<f64> {
    let Some(high_water_mark) = strategy.high_water_mark else {
        return Ok(default_hwm);
    };

    if high_water_mark.is_nan() || high_water_mark < 0.0 {
        return Err(Error::Range(
            "High water mark must be a non-negative number.".to_string(),
        ));
    }

    Ok(high_water_mark)
}

/// Extract the size algorithm from a QueuingStrategy.
/// If the size algorithm is not set, return a fallback function which always returns 1.
///
/// <https://streams.spec.whatwg.org/#make-size-algorithm-from-size-function>
pub fn extract_size_algorithm<T: 'static>(strategy: &QueuingStrategy<T>) -> QueuingStrategySize<T> {
    match &strategy.size {
        Some(size) => size.clone(),
        None => Rc::new(|_: &T| Ok(1.)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_water_mark_defaults_and_validation() {
        let strategy: QueuingStrategy<()> = QueuingStrategy::default();
        assert_eq!(extract_high_water_mark(&strategy, 1.), Ok(1.));

        let strategy: QueuingStrategy<()> = QueuingStrategy::with_high_water_mark(0.);
        assert_eq!(extract_high_water_mark(&strategy, 1.), Ok(0.));

        let strategy: QueuingStrategy<()> = QueuingStrategy::with_high_water_mark(f64::INFINITY);
        assert_eq!(extract_high_water_mark(&strategy, 1.), Ok(f64::INFINITY));

        for invalid in [-1., f64::NAN] {
            let strategy: QueuingStrategy<()> = QueuingStrategy::with_high_water_mark(invalid);
            assert!(matches!(
                extract_high_water_mark(&strategy, 1.),
                Err(Error::Range(_))
            ));
        }
    }

    #[test]
    fn size_algorithm_defaults_to_one() {
        let size = extract_size_algorithm(&QueuingStrategy::<String>::default());
        assert_eq!(size(&"anything".to_owned()), Ok(1.));

        let strategy = QueuingStrategy::with_size(16., |chunk: &String| Ok(chunk.len() as f64));
        let size = extract_size_algorithm(&strategy);
        assert_eq!(size(&"four".to_owned()), Ok(4.));
    }
}
