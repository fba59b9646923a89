// blobstream
// Copyright (c) 2026 The blobstream Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `error` module defines the typed error taxonomy surfaced by [`crate::PositionedStream`]
//! and [`crate::RangeSource`].

use std::io;

/// Every distinct kind of failure a [`crate::PositionedStream`] can surface to a caller.
///
/// Errors raised from the optimised full-file/tail-block refill paths are recovered locally (the
/// cursor snapshot is restored and the one-block strategy is retried); only errors from the
/// one-block path, and `NotFound` unconditionally, ever reach the caller. See
/// `PositionedStream::read` for the propagation policy.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// An operation was attempted on a stream that has already been closed.
    #[error("stream is closed")]
    StreamClosed,

    /// `read`'s `off`/`len` arguments do not fit within the destination slice.
    #[error("read arguments out of bounds: off={off} len={len} dst_len={dst_len}")]
    IndexOutOfBounds { off: usize, len: usize, dst_len: usize },

    /// `seek`/`skip` was asked to move to a negative position.
    #[error("cannot seek to a negative position")]
    NegativeSeek,

    /// `seek`/`skip` was asked to move past the end of the object.
    #[error("cannot seek past end of stream (requested {requested}, length {content_length})")]
    PastEOF { requested: i64, content_length: u64 },

    /// The remote object no longer exists (HTTP 404 or equivalent).
    #[error("object not found: {path}")]
    NotFound { path: String },

    /// Any other transport or protocol failure from the `RangeSource`.
    #[error("I/O error reading range: {0}")]
    IoError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// `mark`/`reset` are not supported by this stream.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl StreamError {
    /// Construct an [`StreamError::IoError`] from any boxable error.
    pub fn io<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        StreamError::IoError(Box::new(err))
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        StreamError::IoError(Box::new(err))
    }
}

#[cfg(feature = "blocking-http")]
impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(404) {
            StreamError::NotFound { path: err.url().map(|u| u.to_string()).unwrap_or_default() }
        }
        else {
            StreamError::IoError(Box::new(err))
        }
    }
}

/// Converts a [`StreamError`] into a [`std::io::Error`] so `PositionedStream` can implement
/// `std::io::Read`/`std::io::Seek`. Ordinary end-of-stream is *not* represented here: the
/// buffered-read contract communicates EOF with a sentinel return value, not an error, and it is
/// mapped to `Ok(0)` by the `std::io::Read` adapter before this conversion would ever run.
impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match &err {
            StreamError::StreamClosed => io::ErrorKind::NotConnected,
            StreamError::IndexOutOfBounds { .. } => io::ErrorKind::InvalidInput,
            StreamError::NegativeSeek => io::ErrorKind::InvalidInput,
            StreamError::PastEOF { .. } => io::ErrorKind::InvalidInput,
            StreamError::NotFound { .. } => io::ErrorKind::NotFound,
            StreamError::IoError(_) => io::ErrorKind::Other,
            StreamError::Unsupported(_) => io::ErrorKind::Unsupported,
        };
        io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
