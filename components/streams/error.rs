/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Errors and reasons that flow through streams.
//!
//! Streams store, propagate and reject promises with arbitrary values: the
//! exceptions the engine itself raises, and whatever error or reason user code
//! hands to `error()`, `cancel()` or `abort()`. Both are represented by
//! [`Error`].

use std::fmt;

/// An error raised by the engine, or a reason supplied by user code.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A `TypeError`: misuse of a stream, reader, writer or controller.
    Type(String),
    /// A `RangeError`: an invalid high-water mark, chunk size or view.
    Range(String),
    /// An `AbortError` `DOMException`, used when a signal is aborted without a reason.
    Abort,
    /// An error or reason supplied by user code.
    Custom(String),
    /// The combined reasons handed to a teed stream's source once both
    /// branches have been cancelled.
    Composite(Vec<Error>),
    /// No reason was given.
    Undefined,
}

impl Error {
    pub fn custom(message: impl Into<String>) -> Error {
        Error::Custom(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Type(message) => write!(f, "TypeError: {message}"),
            Error::Range(message) => write!(f, "RangeError: {message}"),
            Error::Abort => f.write_str("AbortError: The operation was aborted."),
            Error::Custom(message) => f.write_str(message),
            Error::Composite(reasons) => {
                f.write_str("[")?;
                for (index, reason) in reasons.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{reason}")?;
                }
                f.write_str("]")
            },
            Error::Undefined => f.write_str("undefined"),
        }
    }
}

impl std::error::Error for Error {}

/// The return type for operations that may throw.
pub type Fallible<T> = Result<T, Error>;

/// The return type for operations that may throw and return nothing.
pub type ErrorResult = Fallible<()>;
