// blobstream
// Copyright (c) 2026 The blobstream Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `blobstream` is a positioned, buffered, read-only byte stream over an immutable remote
//! object whose size is known at open time. It is built for the random-access read patterns of
//! columnar analytics formats (Parquet, ORC): sequential scans, footer-first probes, and
//! random seeks into medium-to-large files, minimising round-trips via sequential read-ahead
//! prefetch, whole-file inlining for small objects, and tail-block inlining for footer-driven
//! formats.
//!
//! The three collaborating pieces, leaf-first: [`RangeSource`] (one positioned range read),
//! [`ReadAheadPool`] (the process-wide prefetch coordinator), and [`PositionedStream`] (the
//! per-open consumer-facing stream). Everything outside of those three (the REST client,
//! authentication, retry policy, metrics collection) is the embedding application's
//! responsibility, reached only through the [`RangeSource`] trait boundary.

pub mod config;
pub mod error;
pub mod pool;
pub mod range_source;
pub mod stream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{ReadAheadPoolConfig, StreamConfig};
pub use error::{Result, StreamError};
pub use pool::{ReadAheadPool, StreamId};
pub use range_source::RangeSource;
pub use stream::{PositionedStream, StreamState};

#[cfg(feature = "blocking-http")]
pub use range_source::HttpRangeSource;

/// Size, in bytes, of the trailing region of an object the tail-block strategy inlines on a
/// first read when footer optimisation is enabled. Fixed for wire compatibility with
/// Parquet/ORC-style consumers, which always probe this exact footer size.
pub const FOOTER_SIZE: usize = 16384;

/// Maximum number of direct read attempts an optimised (full-file or tail-block) refill will
/// make before giving up and falling back to the one-block strategy.
pub const MAX_OPTIMIZED_READ_ATTEMPTS: u32 = 2;
