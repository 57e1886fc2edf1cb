//! Backing store seam
//!
//! Every chunk handle reads and writes through one shared, random-access
//! byte stream. The stream is never owned by a chunk: callers pass it into
//! each operation as `&mut dyn Storage`.
//!
//! # Thread safety
//!
//! The physical cursor of the store is shared mutable state across all chunk
//! handles of a container. Nothing here locks. Callers must serialize all
//! access to a given store; interleaving operations on one container from
//! several threads is unsupported.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// A seekable byte source/sink that chunks can be laid out on.
pub trait Storage: Read + Write + Seek {}

impl<T: Read + Write + Seek + ?Sized> Storage for T {}

/// Move the physical cursor to `expected`, seeking only when it is elsewhere.
///
/// Returns `true` when a seek was issued.
pub fn sync_cursor(store: &mut dyn Storage, expected: u64) -> io::Result<bool> {
    if store.stream_position()? == expected {
        return Ok(false);
    }
    store.seek(SeekFrom::Start(expected))?;
    Ok(true)
}

/// Write `count` zero bytes at the current position.
pub fn write_zeros(store: &mut dyn Storage, count: u64) -> io::Result<()> {
    const ZEROS: [u8; 512] = [0; 512];
    let mut remaining = count;
    while remaining > 0 {
        let n = remaining.min(ZEROS.len() as u64) as usize;
        store.write_all(&ZEROS[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

/// Read until `buf` is full or the store reports end of data.
pub fn read_up_to(store: &mut dyn Storage, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match store.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read at most `limit` bytes at the current position.
///
/// The buffer grows with the data actually read, so a size field larger
/// than the store never turns into a huge allocation.
pub fn read_limited(store: &mut dyn Storage, limit: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    (&mut *store).take(limit).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Physical I/O counters collected by [`InstrumentedStore`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoCounters {
    pub reads: usize,
    pub writes: usize,
    pub bytes_written: u64,
    pub seeks: usize,
    pub flushes: usize,
}

/// Store wrapper that counts every physical operation passed through it.
///
/// Useful for checking that lazy header tracking really avoids I/O.
#[derive(Debug)]
pub struct InstrumentedStore<S> {
    inner: S,
    counters: IoCounters,
}

impl<S> InstrumentedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counters: IoCounters::default(),
        }
    }

    pub fn counters(&self) -> IoCounters {
        self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = IoCounters::default();
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read> Read for InstrumentedStore<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.counters.reads += 1;
        self.inner.read(buf)
    }
}

impl<S: Write> Write for InstrumentedStore<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.counters.writes += 1;
        self.counters.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.counters.flushes += 1;
        self.inner.flush()
    }
}

impl<S: Seek> Seek for InstrumentedStore<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.counters.seeks += 1;
        self.inner.seek(pos)
    }

    // Position queries are not physical moves.
    fn stream_position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }
}
