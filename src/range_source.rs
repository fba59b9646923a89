// blobstream
// Copyright (c) 2026 The blobstream Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `RangeSource` is the single external collaborator `blobstream` depends on: a positioned range
//! read over some remote object. No retries happen here; the upstream client's retry policy is
//! authoritative.

use crate::error::{Result, StreamError};

/// Issues a single positioned range read against a remote object.
///
/// Implementors must be `Send + Sync`: the [`crate::ReadAheadPool`] calls into a `RangeSource`
/// from worker threads concurrently with the owning [`crate::PositionedStream`]'s direct reads.
pub trait RangeSource: Send + Sync {
    /// Reads up to `length` bytes starting at `position` into `dst[dst_offset..dst_offset +
    /// length)`.
    ///
    /// Returns the number of bytes actually received, or `-1` if `position >= content_length`
    /// (end of object). `etag_or_star` is either the stream's captured ETag or the literal `"*"`
    /// when out-of-band append tolerance is enabled.
    ///
    /// # Preconditions
    /// `position >= 0`, `length >= 0`, `dst_offset + length <= dst.len()`. Violating these is a
    /// programming error in `blobstream` itself, not a reportable condition, so implementations
    /// may panic or debug_assert rather than return an error.
    fn read_range(
        &self,
        path: &str,
        position: u64,
        dst: &mut [u8],
        dst_offset: usize,
        length: usize,
        etag_or_star: &str,
    ) -> Result<i64>;
}

#[cfg(feature = "blocking-http")]
mod http {
    use super::*;
    use std::time::Duration;

    /// A [`RangeSource`] backed by [`reqwest::blocking::Client`], issuing one `GET` with a
    /// `Range` header per call. Grounded in the `reqwest::blocking` range-read pattern used by
    /// in-process Parquet/ORC HTTP readers elsewhere in the ecosystem: a single client is reused
    /// across calls (connection pooling), and `If-Match`/`If-None-Match` is not sent unless the
    /// caller has a non-empty ETag, matching the out-of-band-append-tolerant `"*"` convention.
    pub struct HttpRangeSource {
        client: reqwest::blocking::Client,
        base_url: String,
    }

    impl HttpRangeSource {
        /// Build a source against `base_url`, where `path` arguments passed to `read_range` are
        /// joined onto it (e.g. `base_url` is a bucket/container root and `path` is an object
        /// key).
        pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .pool_max_idle_per_host(32)
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_nodelay(true)
                .build()?;
            Ok(HttpRangeSource { client, base_url: base_url.into() })
        }

        /// Issues a `HEAD` request to discover `content_length` and `etag` ahead of opening a
        /// [`crate::PositionedStream`]. This is ambient convenience for callers, not part of the
        /// `RangeSource` trait contract itself.
        pub fn stat(&self, path: &str) -> Result<(u64, String)> {
            let url = self.object_url(path);
            let resp = self.client.head(&url).send().map_err(StreamError::from)?;
            if resp.status().as_u16() == 404 {
                return Err(StreamError::NotFound { path: path.to_string() });
            }
            if !resp.status().is_success() {
                return Err(StreamError::io(HttpStatusError(resp.status().as_u16())));
            }
            let content_length = resp
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| StreamError::io(MissingHeaderError("Content-Length")))?;
            let etag = resp
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok((content_length, etag))
        }

        fn object_url(&self, path: &str) -> String {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
        }
    }

    impl RangeSource for HttpRangeSource {
        fn read_range(
            &self,
            path: &str,
            position: u64,
            dst: &mut [u8],
            dst_offset: usize,
            length: usize,
            etag_or_star: &str,
        ) -> Result<i64> {
            debug_assert!(dst_offset + length <= dst.len());

            if length == 0 {
                return Ok(0);
            }

            let url = self.object_url(path);
            let range = format!("bytes={}-{}", position, position + length as u64 - 1);

            let mut req = self.client.get(&url).header(reqwest::header::RANGE, range);
            if etag_or_star != "*" && !etag_or_star.is_empty() {
                req = req.header(reqwest::header::IF_MATCH, etag_or_star);
            }

            let resp = req.send().map_err(StreamError::from)?;

            if resp.status().as_u16() == 404 {
                return Err(StreamError::NotFound { path: path.to_string() });
            }
            if resp.status().as_u16() == 416 {
                // Requested range starts at or past the end of the object.
                return Ok(-1);
            }
            if !(resp.status().is_success() || resp.status().as_u16() == 206) {
                return Err(StreamError::io(HttpStatusError(resp.status().as_u16())));
            }

            let bytes = resp.bytes().map_err(StreamError::from)?;
            if bytes.len() > isize::MAX as usize {
                return Err(StreamError::io(ResponseTooLargeError(bytes.len())));
            }

            let n = bytes.len().min(length);
            dst[dst_offset..dst_offset + n].copy_from_slice(&bytes[..n]);
            Ok(n as i64)
        }
    }

    #[derive(Debug)]
    struct HttpStatusError(u16);

    impl std::fmt::Display for HttpStatusError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "unexpected HTTP status {}", self.0)
        }
    }
    impl std::error::Error for HttpStatusError {}

    #[derive(Debug)]
    struct MissingHeaderError(&'static str);

    impl std::fmt::Display for MissingHeaderError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for MissingHeaderError {}

    #[derive(Debug)]
    struct ResponseTooLargeError(usize);

    impl std::fmt::Display for ResponseTooLargeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "response of {} bytes exceeds maximum addressable length", self.0)
        }
    }
    impl std::error::Error for ResponseTooLargeError {}
}

#[cfg(feature = "blocking-http")]
pub use http::HttpRangeSource;
