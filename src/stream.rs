// blobstream
// Copyright (c) 2026 The blobstream Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `PositionedStream` is the consumer-facing, per-open byte stream: a single in-memory window
//! over an immutable remote object, a cursor set, and the full-file/tail-block/one-block
//! strategy state machine that decides how to refill that window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::pool::{ReadAheadPool, StreamHandle, StreamId};
use crate::range_source::RangeSource;
use crate::{FOOTER_SIZE, MAX_OPTIMIZED_READ_ATTEMPTS};

/// A FIFO mutual-exclusion gate. `std::sync::Mutex` does not guarantee that waiters are woken in
/// arrival order; a caller making two concurrent calls that both block would otherwise have no
/// guarantee about which proceeds first. `Fifo` hands out strictly increasing tickets and only
/// lets the next ticket in line through.
struct Fifo {
    next_ticket: AtomicU64,
    now_serving: Mutex<u64>,
    cond: Condvar,
}

impl Fifo {
    fn new() -> Fifo {
        Fifo { next_ticket: AtomicU64::new(0), now_serving: Mutex::new(0), cond: Condvar::new() }
    }

    fn acquire(&self) -> FifoGuard<'_> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut serving = self.now_serving.lock().unwrap();
        while *serving != ticket {
            serving = self.cond.wait(serving).unwrap();
        }
        drop(serving);
        FifoGuard { fifo: self }
    }
}

struct FifoGuard<'a> {
    fifo: &'a Fifo,
}

impl Drop for FifoGuard<'_> {
    fn drop(&mut self) {
        let mut serving = self.fifo.now_serving.lock().unwrap();
        *serving += 1;
        self.fifo.cond.notify_all();
    }
}

/// A snapshot of the four cursor fields, taken before an optimised refill and restored if that
/// refill needs to fall back to the one-block strategy.
#[derive(Clone, Copy)]
struct Snapshot {
    limit: usize,
    f_cursor: u64,
    f_cursor_after_last_read: i64,
    b_cursor: usize,
}

impl Snapshot {
    fn capture(state: &State) -> Snapshot {
        Snapshot {
            limit: state.limit,
            f_cursor: state.f_cursor,
            f_cursor_after_last_read: state.f_cursor_after_last_read,
            b_cursor: state.b_cursor,
        }
    }

    fn restore(self, state: &mut State) {
        state.limit = self.limit;
        state.f_cursor = self.f_cursor;
        state.f_cursor_after_last_read = self.f_cursor_after_last_read;
        state.b_cursor = self.b_cursor;
    }
}

/// The mutable part of a stream's state: the window buffer and the cursor set. Immutable
/// construction parameters (`content_length`, `etag`, ...) live directly on `PositionedStream`.
struct State {
    buffer: Option<Box<[u8]>>,
    f_cursor: u64,
    limit: usize,
    b_cursor: usize,
    f_cursor_after_last_read: i64,
    first_read: bool,
    closed: bool,
}

/// A derived view of a stream's lifecycle, exposed for assertions and tests. `blobstream` tracks
/// the underlying `first_read`/`closed` booleans directly; this enum never drives behaviour
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Fresh,
    Buffered,
    Closed,
}

/// A positioned, buffered, read-only stream over one remote object.
///
/// All externally observable operations (`read`, `seek`, `skip`, `get_pos`, `available`, `close`)
/// are mutually excluded with FIFO fairness, so a `PositionedStream` may safely be shared behind
/// an `Arc` across threads, though it remains logically single-consumer: concurrent callers are
/// serialised, not parallelised.
pub struct PositionedStream {
    id: StreamId,
    path: Arc<str>,
    etag: Arc<str>,
    tolerate_oob: bool,
    content_length: u64,
    buffer_size: usize,
    small_files_complete: bool,
    footer_opt: bool,
    queue_depth: usize,
    source: Arc<dyn RangeSource>,
    pool: Arc<ReadAheadPool>,
    fifo: Fifo,
    state: Mutex<State>,
}

impl PositionedStream {
    /// Opens a stream over `path`, whose size and ETag were already discovered by the caller
    /// (e.g. via `HttpRangeSource::stat`). Registers with the process-wide [`ReadAheadPool`].
    ///
    /// `read_ahead_queue_depth` is the per-refill prefetch fan-out, not the pool's own
    /// worker-slot count; `None` defaults to `std::thread::available_parallelism()`.
    pub fn open(
        path: impl Into<Arc<str>>,
        content_length: u64,
        etag: impl Into<Arc<str>>,
        source: Arc<dyn RangeSource>,
        config: StreamConfig,
        read_ahead_queue_depth: Option<usize>,
    ) -> PositionedStream {
        let path = path.into();
        let etag = etag.into();
        let id = StreamId::next();
        let pool = ReadAheadPool::global();
        let queue_depth = read_ahead_queue_depth
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
            .max(1);

        pool.register(
            id,
            StreamHandle {
                source: source.clone(),
                path: path.clone(),
                etag: etag.clone(),
                tolerate_oob: config.tolerate_oob_appends,
            },
        );

        log::trace!(
            "blobstream: opened stream {id:?} path={path:?} content_length={content_length} \
             buffer_size={}",
            config.buffer_size
        );

        PositionedStream {
            id,
            path,
            etag,
            tolerate_oob: config.tolerate_oob_appends,
            content_length,
            buffer_size: config.buffer_size,
            small_files_complete: config.small_files_complete,
            footer_opt: config.footer_opt,
            queue_depth,
            source,
            pool,
            fifo: Fifo::new(),
            state: Mutex::new(State {
                buffer: None,
                f_cursor: 0,
                limit: 0,
                b_cursor: 0,
                f_cursor_after_last_read: -1,
                first_read: true,
                closed: false,
            }),
        }
    }

    /// Total size of the underlying object, fixed at open time.
    pub fn content_length(&self) -> Result<u64> {
        let _ticket = self.fifo.acquire();
        let state = self.state.lock().unwrap();
        self.check_open(&state)?;
        Ok(self.content_length)
    }

    /// Reads up to `len` bytes into `dst[off..off + len)`. Returns the number of bytes copied,
    /// `0` if `len == 0`, or `-1` at end of stream.
    pub fn read(&self, dst: &mut [u8], off: usize, len: usize) -> Result<i64> {
        let _ticket = self.fifo.acquire();
        let mut state = self.state.lock().unwrap();
        self.check_open(&state)?;

        if off.checked_add(len).map_or(true, |end| end > dst.len()) {
            return Err(StreamError::IndexOutOfBounds { off, len, dst_len: dst.len() });
        }
        if len == 0 {
            return Ok(0);
        }
        if self.get_pos_locked(&state) >= self.content_length {
            return Ok(-1);
        }

        let mut total: i64 = 0;
        let mut off = off;
        let mut remaining = len;

        loop {
            let n = if state.first_read
                && self.small_files_complete
                && self.content_length <= self.buffer_size as u64
            {
                self.full_file_strategy(&mut state, dst, off, remaining)?
            }
            else if state.first_read
                && self.footer_opt
                && state.f_cursor >= self.content_length.saturating_sub(FOOTER_SIZE as u64)
            {
                self.tail_block_strategy(&mut state, dst, off, remaining)?
            }
            else {
                self.one_block_strategy(&mut state, dst, off, remaining)?
            };

            if n <= 0 {
                if total == 0 {
                    return Ok(n);
                }
                break;
            }

            total += n;
            off += n as usize;
            remaining -= n as usize;

            if remaining == 0 {
                break;
            }
        }

        Ok(total)
    }

    /// Reads a single byte via the buffered path. Returns `0..=255` or `-1` at end of stream.
    pub fn read_byte(&self) -> Result<i32> {
        let mut buf = [0u8; 1];
        let n = self.read(&mut buf, 0, 1)?;
        if n <= 0 { Ok(-1) } else { Ok(buf[0] as i32) }
    }

    /// Moves the stream's position to `n`. Rejects negative positions and positions past the end
    /// of the object; reuses the in-memory window when `n` already lies within it.
    pub fn seek(&self, n: i64) -> Result<()> {
        let _ticket = self.fifo.acquire();
        let mut state = self.state.lock().unwrap();
        self.check_open(&state)?;
        self.seek_locked(&mut state, n)
    }

    /// Moves the position by `n` bytes, clamped to `[0, content_length]`, and returns the delta
    /// actually applied.
    pub fn skip(&self, n: i64) -> Result<i64> {
        let _ticket = self.fifo.acquire();
        let mut state = self.state.lock().unwrap();
        self.check_open(&state)?;

        let pos = self.get_pos_locked(&state) as i64;
        if pos >= self.content_length as i64 && n > 0 {
            return Err(StreamError::PastEOF { requested: pos + n, content_length: self.content_length });
        }

        let target = (pos + n).clamp(0, self.content_length as i64);
        let delta = target - pos;
        self.seek_locked(&mut state, target)?;
        Ok(delta)
    }

    /// Returns the current position (`f_cursor - limit + b_cursor`).
    pub fn get_pos(&self) -> Result<u64> {
        let _ticket = self.fifo.acquire();
        let state = self.state.lock().unwrap();
        self.check_open(&state)?;
        Ok(self.get_pos_locked(&state))
    }

    /// Returns `min(content_length - get_pos(), i32::MAX)`, matching the 32-bit `int` contract of
    /// the upstream driver this crate's strategy logic mirrors.
    pub fn available(&self) -> Result<u64> {
        let _ticket = self.fifo.acquire();
        let state = self.state.lock().unwrap();
        self.check_open(&state)?;
        let pos = self.get_pos_locked(&state);
        Ok(self.content_length.saturating_sub(pos).min(i32::MAX as u64))
    }

    /// Idempotent. Releases the window buffer and evicts this stream's entries from the
    /// read-ahead pool. Every operation other than `close` itself signals `StreamClosed`
    /// afterwards.
    pub fn close(&self) {
        let _ticket = self.fifo.acquire();
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        state.buffer = None;
        self.pool.evict(self.id);
        log::trace!("blobstream: closed stream {:?}", self.id);
    }

    /// A derived view of the lifecycle state for assertions/tests; see [`StreamState`].
    pub fn state(&self) -> StreamState {
        let _ticket = self.fifo.acquire();
        let state = self.state.lock().unwrap();
        if state.closed {
            StreamState::Closed
        }
        else if state.first_read {
            StreamState::Fresh
        }
        else {
            StreamState::Buffered
        }
    }

    /// Always unsupported: this stream has no repositionable mark.
    pub fn mark(&self, _read_limit: usize) -> Result<()> {
        Err(StreamError::Unsupported("mark"))
    }

    /// Always unsupported.
    pub fn reset(&self) -> Result<()> {
        Err(StreamError::Unsupported("reset"))
    }

    /// Always returns `false`: this stream never supports rebinding to a different source.
    pub fn seek_to_new_source(&self, _target_pos: u64) -> bool {
        false
    }

    fn check_open(&self, state: &State) -> Result<()> {
        if state.closed { Err(StreamError::StreamClosed) } else { Ok(()) }
    }

    fn get_pos_locked(&self, state: &State) -> u64 {
        state.f_cursor - state.limit as u64 + state.b_cursor as u64
    }

    fn seek_locked(&self, state: &mut State, n: i64) -> Result<()> {
        if n < 0 {
            return Err(StreamError::NegativeSeek);
        }
        let n = n as u64;
        if n > self.content_length {
            return Err(StreamError::PastEOF { requested: n as i64, content_length: self.content_length });
        }

        let window_start = state.f_cursor - state.limit as u64;
        if n >= window_start && n <= state.f_cursor {
            state.b_cursor = (n - window_start) as usize;
        }
        else {
            state.f_cursor = n;
            state.limit = 0;
            state.b_cursor = 0;
        }
        Ok(())
    }

    fn etag_or_star(&self) -> &str {
        if self.tolerate_oob { "*" } else { &self.etag }
    }

    fn copy_from_window(&self, state: &mut State, dst: &mut [u8], off: usize, len: usize) -> i64 {
        let available = state.limit - state.b_cursor;
        let n = available.min(len);
        if n > 0 {
            let buffer = state.buffer.as_ref().expect("window buffer allocated before copy");
            dst[off..off + n].copy_from_slice(&buffer[state.b_cursor..state.b_cursor + n]);
            state.b_cursor += n;
        }
        n as i64
    }

    /// If the window has data left, copy from it. Otherwise refill once (direct or via
    /// read-ahead, per the sequentiality test) and copy.
    fn one_block_strategy(&self, state: &mut State, dst: &mut [u8], off: usize, len: usize) -> Result<i64> {
        if state.b_cursor < state.limit {
            return Ok(self.copy_from_window(state, dst, off, len));
        }

        if state.f_cursor >= self.content_length {
            return Ok(-1);
        }

        state.b_cursor = 0;
        state.limit = 0;
        if state.buffer.is_none() {
            state.buffer = Some(vec![0u8; self.buffer_size].into_boxed_slice());
        }

        let sequential = state.f_cursor_after_last_read == -1
            || state.f_cursor as i64 == state.f_cursor_after_last_read
            || len >= self.buffer_size;

        let bytes_read = if sequential {
            self.refill_with_read_ahead(state)?
        }
        else {
            let want = self.buffer_size.min(len);
            let position = state.f_cursor;
            let buffer = state.buffer.as_mut().expect("window buffer allocated above");
            self.source.read_range(&self.path, position, buffer, 0, want, self.etag_or_star())?
        };

        if bytes_read < 0 {
            return Ok(-1);
        }

        state.limit += bytes_read as usize;
        state.f_cursor += bytes_read as u64;
        state.f_cursor_after_last_read = state.f_cursor as i64;
        state.first_read = false;

        Ok(self.copy_from_window(state, dst, off, len))
    }

    /// Enqueues sequential prefetches, tries the pool cache, then falls back to a direct read.
    /// Always targets the stream's own window buffer at offset 0. The fetch/lookup length is the
    /// same whole-block size the enqueue loop below prefetches with (not the caller's requested
    /// length), so a `try_serve` here can actually land on the matching `CacheKey` that an earlier
    /// sequential refill's read-ahead populated.
    fn refill_with_read_ahead(&self, state: &mut State) -> Result<i64> {
        let position = state.f_cursor;
        let length = self.buffer_size.min((self.content_length - position) as usize);

        let mut next_offset = position;
        for _ in 0..self.queue_depth {
            if next_offset >= self.content_length {
                break;
            }
            let prefetch_len = self.buffer_size.min((self.content_length - next_offset) as usize);
            self.pool.enqueue(self.id, next_offset, prefetch_len);
            next_offset += prefetch_len as u64;
        }

        // Invariant: the destination is always this window's own buffer
        // starting at offset 0 (one-block sequential refills are the only caller).
        debug_assert_eq!(state.limit, 0, "read-ahead refill must target an empty window");
        let buffer = state.buffer.as_mut().expect("window buffer allocated above");
        let served = self.pool.try_serve(self.id, position, length, &mut buffer[..length]);
        if served > 0 {
            return Ok(served as i64);
        }

        self.source.read_range(&self.path, position, buffer, 0, length, self.etag_or_star())
    }

    /// First read, `content_length <= buffer_size`: inline the whole object.
    fn full_file_strategy(&self, state: &mut State, dst: &mut [u8], off: usize, len: usize) -> Result<i64> {
        debug_assert!(state.f_cursor <= self.content_length && self.content_length <= self.buffer_size as u64);
        let snapshot = Snapshot::capture(state);
        state.b_cursor = state.f_cursor as usize;
        self.optimised_refill(state, dst, off, len, 0, self.content_length as usize, snapshot)
    }

    /// First read, inside the footer region: inline the trailing block.
    fn tail_block_strategy(&self, state: &mut State, dst: &mut [u8], off: usize, len: usize) -> Result<i64> {
        let last_block_start = self.content_length.saturating_sub(self.buffer_size as u64);
        let actual_len = self.buffer_size.min(self.content_length as usize);
        let snapshot = Snapshot::capture(state);
        state.b_cursor = (state.f_cursor - last_block_start) as usize;
        self.optimised_refill(state, dst, off, len, last_block_start, actual_len, snapshot)
    }

    /// Shared by the two strategies above. Up to `MAX_OPTIMIZED_READ_ATTEMPTS` direct
    /// reads into a fresh buffer; any I/O failure or an unsatisfiable result rolls back to the
    /// snapshot and falls through to the one-block strategy. `NotFound` is never recovered.
    fn optimised_refill(
        &self,
        state: &mut State,
        dst: &mut [u8],
        off: usize,
        len: usize,
        read_from: u64,
        actual_len: usize,
        snapshot: Snapshot,
    ) -> Result<i64> {
        state.f_cursor = read_from;
        state.limit = 0;
        state.buffer = Some(vec![0u8; self.buffer_size].into_boxed_slice());

        let mut attempts = 0u32;
        let mut io_failed = false;
        let mut not_found: Option<StreamError> = None;

        while attempts < MAX_OPTIMIZED_READ_ATTEMPTS
            && state.f_cursor < self.content_length
            && state.limit < actual_len
        {
            attempts += 1;
            let want = actual_len - state.limit;
            let dst_offset = state.limit;
            let position = state.f_cursor;
            let buffer = state.buffer.as_mut().expect("just allocated");

            match self.source.read_range(&self.path, position, buffer, dst_offset, want, self.etag_or_star()) {
                Ok(n) if n > 0 => {
                    state.limit += n as usize;
                    state.f_cursor += n as u64;
                    state.f_cursor_after_last_read = state.f_cursor as i64;
                }
                Ok(_) => break,
                Err(err @ StreamError::NotFound { .. }) => {
                    not_found = Some(err);
                    break;
                }
                Err(_) => {
                    io_failed = true;
                    break;
                }
            }
        }

        state.first_read = false;

        if let Some(err) = not_found {
            log::debug!("blobstream: optimised refill for stream {:?} hit NotFound", self.id);
            snapshot.restore(state);
            return Err(err);
        }

        if io_failed {
            log::debug!(
                "blobstream: optimised refill failed for stream {:?}, falling back to one-block",
                self.id
            );
            snapshot.restore(state);
            return self.one_block_strategy(state, dst, off, len);
        }

        if state.limit < 1 {
            snapshot.restore(state);
            return Ok(-1);
        }

        if state.f_cursor < self.content_length && state.b_cursor > state.limit {
            log::debug!(
                "blobstream: optimised refill under-fetched for stream {:?}, falling back to one-block",
                self.id
            );
            snapshot.restore(state);
            return self.one_block_strategy(state, dst, off, len);
        }

        Ok(self.copy_from_window(state, dst, off, len))
    }
}

impl std::io::Read for PositionedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = PositionedStream::read(self, buf, 0, buf.len())?;
        Ok(n.max(0) as usize)
    }
}

impl std::io::Seek for PositionedStream {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            std::io::SeekFrom::Start(n) => n as i64,
            std::io::SeekFrom::End(delta) => self.content_length as i64 + delta,
            std::io::SeekFrom::Current(delta) => self.get_pos()? as i64 + delta,
        };
        PositionedStream::seek(self, target)?;
        Ok(self.get_pos()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRangeSource;

    fn open(
        data: Vec<u8>,
        buffer_size: usize,
        small_files_complete: bool,
        footer_opt: bool,
    ) -> (PositionedStream, Arc<MockRangeSource>) {
        let content_length = data.len() as u64;
        let source = Arc::new(MockRangeSource::new(data));
        let config = StreamConfig { buffer_size, small_files_complete, footer_opt, tolerate_oob_appends: false };
        let stream = PositionedStream::open(
            "obj",
            content_length,
            "etag-1",
            source.clone() as Arc<dyn RangeSource>,
            config,
            Some(2),
        );
        (stream, source)
    }

    #[test]
    fn small_file_full_read() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let (stream, source) = open(data.clone(), 4 * 1024 * 1024, true, true);

        stream.seek(0).unwrap();
        let mut dst = vec![0u8; 4096];
        let n = stream.read(&mut dst, 0, 4096).unwrap();

        assert_eq!(n, 4096);
        assert_eq!(dst, data);
        assert_eq!(source.call_count(), 1);
        assert_eq!(stream.get_pos().unwrap(), 4096);
    }

    #[test]
    fn footer_probe_reads_tail_block_once() {
        let size = 3 * 1024 * 1024;
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let (stream, source) = open(data.clone(), 4 * 1024 * 1024, false, true);

        let probe_at = size as i64 - 1024;
        stream.seek(probe_at).unwrap();
        let mut dst = vec![0u8; 1024];
        let n = stream.read(&mut dst, 0, 1024).unwrap();

        assert_eq!(n, 1024);
        assert_eq!(&dst[..], &data[probe_at as usize..probe_at as usize + 1024]);
        assert_eq!(source.call_count(), 1);
        assert_eq!(stream.get_pos().unwrap(), size as u64);
    }

    #[test]
    fn sequential_stream_covers_whole_object() {
        let size = 10 * 1024 * 1024usize;
        let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        let (stream, _source) = open(data.clone(), 1024 * 1024, false, false);

        let mut out = Vec::with_capacity(size);
        let mut chunk = vec![0u8; 100 * 1024];
        let mut last_pos = 0u64;
        loop {
            let n = stream.read(&mut chunk, 0, chunk.len()).unwrap();
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n as usize]);
            let pos = stream.get_pos().unwrap();
            assert_eq!(pos, last_pos + n as u64);
            last_pos = pos;
        }

        assert_eq!(out, data);
        assert_eq!(last_pos, size as u64);
    }

    #[test]
    fn random_short_reads_each_hit_the_source_once() {
        let size = 2 * 1024 * 1024usize;
        let data: Vec<u8> = (0..size).map(|i| (i * 7 % 256) as u8).collect();
        let (stream, source) = open(data.clone(), 256 * 1024, false, false);

        // Prime with one sequential read so the stream leaves the Fresh state.
        let mut warm = vec![0u8; 1024];
        stream.read(&mut warm, 0, 1024).unwrap();

        let positions = [500_000u64, 10_000, 1_999_000, 777_777, 42];
        for &p in &positions {
            source.reset_call_count();
            stream.seek(p as i64).unwrap();
            let mut dst = [0u8; 512];
            let n = stream.read(&mut dst, 0, 512).unwrap();
            assert_eq!(n, 512);
            assert_eq!(&dst[..], &data[p as usize..p as usize + 512]);
            assert_eq!(source.call_count(), 1, "random access at {p} should need exactly one call");
        }
    }

    #[test]
    fn optimised_fallback_recovers_full_content() {
        let fs = 65536usize;
        let data: Vec<u8> = (0..fs).map(|i| (i % 256) as u8).collect();
        let source = Arc::new(MockRangeSource::new(data.clone()));
        source.truncate_next_n_calls(2, 10);

        let config =
            StreamConfig { buffer_size: 4 * 1024 * 1024, small_files_complete: true, footer_opt: true, tolerate_oob_appends: false };
        let stream = PositionedStream::open(
            "obj",
            fs as u64,
            "etag-1",
            source.clone() as Arc<dyn RangeSource>,
            config,
            Some(2),
        );

        stream.seek((fs / 2) as i64).unwrap();
        let want = fs / 4;
        let mut dst = vec![0u8; want];
        let mut total = 0usize;
        while total < want {
            let n = stream.read(&mut dst[total..], 0, want - total).unwrap();
            if n <= 0 {
                break;
            }
            total += n as usize;
        }

        assert_eq!(total, want);
        assert_eq!(&dst[..], &data[fs / 2..fs / 2 + want]);
    }

    #[test]
    fn eof_semantics() {
        let data = vec![1u8; 1024];
        let (stream, _source) = open(data, 4096, false, false);

        stream.seek(1024).unwrap();
        let mut dst = [0u8; 8];
        assert_eq!(stream.read(&mut dst, 0, 8).unwrap(), -1);

        assert!(matches!(stream.skip(1), Err(StreamError::PastEOF { .. })));
        assert!(stream.seek(1024).is_ok());
        assert!(matches!(stream.seek(1025), Err(StreamError::PastEOF { .. })));
    }

    #[test]
    fn closed_stream_rejects_operations() {
        let (stream, _source) = open(vec![1u8; 16], 4096, false, false);
        stream.close();
        stream.close(); // idempotent

        let mut dst = [0u8; 1];
        assert!(matches!(stream.read(&mut dst, 0, 1), Err(StreamError::StreamClosed)));
        assert!(matches!(stream.seek(0), Err(StreamError::StreamClosed)));
        assert!(matches!(stream.get_pos(), Err(StreamError::StreamClosed)));
        assert!(matches!(stream.content_length(), Err(StreamError::StreamClosed)));
    }

    #[test]
    fn seek_to_current_position_is_a_no_op() {
        let data: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let (stream, _source) = open(data, 1024, false, false);

        let mut dst = [0u8; 100];
        stream.read(&mut dst, 0, 100).unwrap();
        let pos = stream.get_pos().unwrap();
        stream.seek(pos as i64).unwrap();
        assert_eq!(stream.get_pos().unwrap(), pos);
    }

    #[test]
    fn seek_within_window_reuses_buffer_without_a_server_call() {
        let data: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let (stream, source) = open(data.clone(), 1024, false, false);

        let mut dst = [0u8; 200];
        stream.read(&mut dst, 0, 200).unwrap();

        // Still inside the window [0, 1024): must not trigger another fetch.
        stream.seek(50).unwrap();
        source.reset_call_count();
        let mut dst2 = [0u8; 100];
        let n = stream.read(&mut dst2, 0, 100).unwrap();
        assert_eq!(n, 100);
        assert_eq!(&dst2[..], &data[50..150]);
        assert_eq!(source.call_count(), 0);
    }

    #[test]
    fn zero_length_read_returns_zero_even_at_eof() {
        let data = vec![1u8; 16];
        let (stream, _source) = open(data, 4096, false, false);

        stream.seek(16).unwrap();
        let mut dst = [0u8; 0];
        assert_eq!(stream.read(&mut dst, 0, 0).unwrap(), 0);
    }

    #[test]
    fn read_arguments_out_of_bounds_are_rejected() {
        let (stream, _source) = open(vec![1u8; 16], 4096, false, false);
        let mut dst = [0u8; 4];
        assert!(matches!(
            stream.read(&mut dst, 2, 4),
            Err(StreamError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn skip_with_zero_delta_at_eof_does_not_error() {
        let (stream, _source) = open(vec![1u8; 16], 4096, false, false);
        stream.seek(16).unwrap();
        assert_eq!(stream.skip(0).unwrap(), 0);
    }
}
