// blobstream
// Copyright (c) 2026 The blobstream Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Construction parameters for [`crate::PositionedStream`] and [`crate::ReadAheadPool`].
//!
//! There is no file or environment-variable configuration layer here: every knob arrives as an
//! explicit value supplied by the embedding application, via a plain struct with a `Default`
//! impl rather than a parsed config file.

/// Options controlling a single [`crate::PositionedStream`]'s buffering and optimisation
/// behaviour.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum number of bytes the in-memory window may hold. Must be `> 0`.
    pub buffer_size: usize,

    /// If `true`, a first read of a file whose `content_length <= buffer_size` reads the entire
    /// object in one shot.
    pub small_files_complete: bool,

    /// If `true`, a first read that lands in the trailing `FOOTER_SIZE` region of the object
    /// pulls in the whole tail block (up to `buffer_size` bytes) in one shot.
    pub footer_opt: bool,

    /// If `true`, re-reads use a wildcard ETag (`"*"`) instead of the ETag captured at open,
    /// tolerating concurrent out-of-band appends to the object.
    pub tolerate_oob_appends: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            buffer_size: 4 * 1024 * 1024,
            small_files_complete: true,
            footer_opt: true,
            tolerate_oob_appends: false,
        }
    }
}

/// Options controlling the process-wide [`crate::ReadAheadPool`] singleton.
#[derive(Debug, Clone)]
pub struct ReadAheadPoolConfig {
    /// Number of concurrent background fetch slots. `None` defaults to
    /// `std::thread::available_parallelism()`.
    pub queue_depth: Option<usize>,

    /// Maximum number of completed prefetch buffers retained in the pool's cache before LRU
    /// eviction kicks in.
    pub max_cached_buffers: usize,
}

impl Default for ReadAheadPoolConfig {
    fn default() -> Self {
        ReadAheadPoolConfig { queue_depth: None, max_cached_buffers: 64 }
    }
}

impl ReadAheadPoolConfig {
    pub(crate) fn resolved_queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        })
    }
}
