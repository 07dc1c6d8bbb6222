/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! An implementation of the [Streams Standard](https://streams.spec.whatwg.org/):
//! readable, writable and transform streams, their controllers, readers and writers,
//! queuing strategies, teeing, and piping.
//!
//! Streams are single-threaded. Every promise settles through the thread-local
//! microtask queue in [`microtask`], so a host drives streams forward by calling
//! [`perform_a_microtask_checkpoint`] after each task, or by awaiting promises with
//! [`block_on`].

#![deny(unsafe_code)]
#![crate_name = "streams"]
#![crate_type = "rlib"]

mod abortcontroller;
mod abortsignal;
mod algorithms;
mod bytelengthqueuingstrategy;
mod byteteereadintorequest;
mod byteteereadrequest;
mod byteteeunderlyingsource;
mod countqueuingstrategy;
mod defaultteereadrequest;
mod defaultteeunderlyingsource;
mod error;
pub mod microtask;
mod pipeto;
mod promise;
mod queuewithsizes;
mod queuingstrategy;
mod readablebytestreamcontroller;
mod readablestream;
mod readablestreamasynciterator;
mod readablestreambyobreader;
mod readablestreambyobrequest;
mod readablestreamdefaultcontroller;
mod readablestreamdefaultreader;
mod readablestreamgenericreader;
mod transformer;
mod transformstream;
mod transformstreamdefaultcontroller;
mod typedarray;
mod underlyingsink;
mod underlyingsource;
mod writablestream;
mod writablestreamdefaultcontroller;
mod writablestreamdefaultwriter;

pub use crate::abortcontroller::AbortController;
pub use crate::abortsignal::{AbortAlgorithm, AbortAlgorithmId, AbortSignal};
pub use crate::algorithms::AlgorithmResult;
pub use crate::bytelengthqueuingstrategy::ByteLengthQueuingStrategy;
pub use crate::countqueuingstrategy::CountQueuingStrategy;
pub use crate::error::{Error, ErrorResult, Fallible};
pub use crate::microtask::{
    block_on, discard_pending_microtasks, enqueue_microtask, microtask_queue_is_empty,
    perform_a_microtask_checkpoint,
};
pub use crate::pipeto::StreamPipeOptions;
pub use crate::promise::{Promise, PromiseState, wait_for_all};
pub use crate::queuewithsizes::{QueueWithSizes, ValueWithSize};
pub use crate::queuingstrategy::{
    ByteLength, QueuingStrategy, QueuingStrategyInit, QueuingStrategySize,
    extract_high_water_mark, extract_size_algorithm,
};
pub use crate::readablebytestreamcontroller::ReadableByteStreamController;
pub use crate::readablestream::{ReadableStream, ReadableStreamState, ReadableWritablePair};
pub use crate::readablestreamasynciterator::ReadableStreamAsyncIterator;
pub use crate::readablestreambyobreader::ReadableStreamBYOBReader;
pub use crate::readablestreambyobrequest::ReadableStreamBYOBRequest;
pub use crate::readablestreamdefaultcontroller::ReadableStreamDefaultController;
pub use crate::readablestreamdefaultreader::{
    ReadableStreamDefaultReader, ReadableStreamReadResult,
};
pub use crate::transformer::{IdentityTransformer, Transformer};
pub use crate::transformstream::TransformStream;
pub use crate::transformstreamdefaultcontroller::TransformStreamDefaultController;
pub use crate::typedarray::{ArrayBuffer, ArrayBufferView, ArrayBufferViewType};
pub use crate::underlyingsink::UnderlyingSink;
pub use crate::underlyingsource::{UnderlyingByteSource, UnderlyingSource};
pub use crate::writablestream::{WritableStream, WritableStreamState};
pub use crate::writablestreamdefaultcontroller::WritableStreamDefaultController;
pub use crate::writablestreamdefaultwriter::WritableStreamDefaultWriter;
