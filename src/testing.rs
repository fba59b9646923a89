// blobstream
// Copyright (c) 2026 The blobstream Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An in-process [`RangeSource`] backed by an in-memory buffer, for exercising
//! [`crate::PositionedStream`]'s state machine without a network. Grounded in the
//! call-counting `MockReader` pattern used elsewhere in the ecosystem for testing
//! range-read trait implementations.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, StreamError};
use crate::range_source::RangeSource;

/// A [`RangeSource`] over a fixed in-memory object, with call counting and injectable
/// short-reads/failures so tests can exercise the optimised-refill fallback path.
pub struct MockRangeSource {
    data: Vec<u8>,
    calls: AtomicUsize,
    short_reads_remaining: AtomicUsize,
    short_read_len: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl MockRangeSource {
    /// Wraps `data` as the backing object.
    pub fn new(data: Vec<u8>) -> MockRangeSource {
        MockRangeSource {
            data,
            calls: AtomicUsize::new(0),
            short_reads_remaining: AtomicUsize::new(0),
            short_read_len: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
        }
    }

    /// Number of `read_range` calls observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resets the call counter to zero, useful between independently-asserted phases of a test.
    pub fn reset_call_count(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Makes the next `n` calls return at most `len` bytes regardless of the requested length,
    /// simulating a server that short-reads.
    pub fn truncate_next_n_calls(&self, n: usize, len: usize) {
        self.short_reads_remaining.store(n, Ordering::SeqCst);
        self.short_read_len.store(len, Ordering::SeqCst);
    }

    /// Makes the next `n` calls fail with a transport error, simulating a flaky upstream.
    pub fn fail_next_n_calls(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }
}

impl RangeSource for MockRangeSource {
    fn read_range(
        &self,
        _path: &str,
        position: u64,
        dst: &mut [u8],
        dst_offset: usize,
        length: usize,
        _etag_or_star: &str,
    ) -> Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { None })
            .is_ok()
        {
            return Err(StreamError::io(MockTransportError));
        }

        let pos = position as usize;
        if pos >= self.data.len() {
            return Ok(-1);
        }

        let mut want = length.min(self.data.len() - pos);

        if self
            .short_reads_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { None })
            .is_ok()
        {
            want = want.min(self.short_read_len.load(Ordering::SeqCst));
        }

        dst[dst_offset..dst_offset + want].copy_from_slice(&self.data[pos..pos + want]);
        Ok(want as i64)
    }
}

#[derive(Debug)]
struct MockTransportError;

impl std::fmt::Display for MockTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "simulated transport failure")
    }
}
impl std::error::Error for MockTransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_exact_range() {
        let source = MockRangeSource::new((0u8..100).collect());
        let mut dst = [0u8; 10];
        let n = source.read_range("obj", 20, &mut dst, 0, 10, "*").unwrap();
        assert_eq!(n, 10);
        assert_eq!(&dst[..], &(20u8..30).collect::<Vec<u8>>()[..]);
        assert_eq!(source.call_count(), 1);
    }

    #[test]
    fn reports_eof_past_end() {
        let source = MockRangeSource::new(vec![1u8; 10]);
        let mut dst = [0u8; 4];
        assert_eq!(source.read_range("obj", 10, &mut dst, 0, 4, "*").unwrap(), -1);
    }

    #[test]
    fn truncates_next_n_calls() {
        let source = MockRangeSource::new(vec![9u8; 1000]);
        source.truncate_next_n_calls(1, 5);
        let mut dst = [0u8; 100];
        assert_eq!(source.read_range("obj", 0, &mut dst, 0, 100, "*").unwrap(), 5);
        assert_eq!(source.read_range("obj", 5, &mut dst, 0, 100, "*").unwrap(), 100);
    }

    #[test]
    fn fails_next_n_calls() {
        let source = MockRangeSource::new(vec![9u8; 1000]);
        source.fail_next_n_calls(1);
        let mut dst = [0u8; 10];
        assert!(source.read_range("obj", 0, &mut dst, 0, 10, "*").is_err());
        assert!(source.read_range("obj", 0, &mut dst, 0, 10, "*").is_ok());
    }
}
