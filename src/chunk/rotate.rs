//! In-place byte rotation on a backing store
//!
//! Relocating a chunk inside its parent is an array rotation over a byte
//! range of the store. The rotation is done window by window with at most
//! two `window`-sized buffers, never by loading the whole range.
//!
//! When either side of the rotation fits in one window it is buffered and
//! the other side is slid over with an overlapping move. Otherwise equal
//! blocks are swapped (Gries-Mills) until one side does fit.

use std::io::{self, SeekFrom};

use crate::io::{read_up_to, Storage};

/// Default copy window used by relocation
pub const DEFAULT_WINDOW: usize = 64 * 1024;

/// Rotate `[start, start + len)` right by `shift` bytes: the last `shift`
/// bytes move to the front.
pub fn rotate_right(
    store: &mut dyn Storage,
    start: u64,
    len: u64,
    shift: u64,
    window: usize,
) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }
    let shift = shift % len;
    rotate_left(store, start, len, len - shift, window)
}

/// Rotate `[start, start + len)` left by `mid` bytes: the first `mid` bytes
/// move to the back.
pub fn rotate_left(
    store: &mut dyn Storage,
    start: u64,
    len: u64,
    mid: u64,
    window: usize,
) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }
    let window = window.max(1);
    let w = window as u64;
    let mid = mid % len;

    let (mut base, mut left, mut right) = (start, mid, len - mid);
    while left > 0 && right > 0 {
        if left <= w {
            let saved = read_block(store, base, left)?;
            move_block(store, base + left, base, right, window)?;
            write_block(store, base + right, &saved)?;
            return Ok(());
        }
        if right <= w {
            let saved = read_block(store, base + left, right)?;
            move_block(store, base, base + right, left, window)?;
            write_block(store, base, &saved)?;
            return Ok(());
        }
        if left <= right {
            // L R1 R2 -> R1 L R2, then rotate L R2
            swap_blocks(store, base, base + left, left, window)?;
            base += left;
            right -= left;
        } else {
            // L1 L2 R -> R L2 L1, then rotate L2 L1
            swap_blocks(store, base, base + left, right, window)?;
            base += right;
            left -= right;
        }
    }
    Ok(())
}

/// Read `len` bytes at `at`. Bytes past the end of the store read as zero.
fn read_block(store: &mut dyn Storage, at: u64, len: u64) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    store.seek(SeekFrom::Start(at))?;
    read_up_to(store, &mut buf)?;
    Ok(buf)
}

fn write_block(store: &mut dyn Storage, at: u64, buf: &[u8]) -> io::Result<()> {
    store.seek(SeekFrom::Start(at))?;
    store.write_all(buf)
}

/// Copy `len` bytes from `src` to `dst`; the ranges may overlap
fn move_block(
    store: &mut dyn Storage,
    src: u64,
    dst: u64,
    len: u64,
    window: usize,
) -> io::Result<()> {
    if src == dst || len == 0 {
        return Ok(());
    }
    let w = window as u64;
    if dst < src {
        let mut offset = 0;
        while offset < len {
            let n = w.min(len - offset);
            let buf = read_block(store, src + offset, n)?;
            write_block(store, dst + offset, &buf)?;
            offset += n;
        }
    } else {
        let mut remaining = len;
        while remaining > 0 {
            let n = w.min(remaining);
            remaining -= n;
            let buf = read_block(store, src + remaining, n)?;
            write_block(store, dst + remaining, &buf)?;
        }
    }
    Ok(())
}

/// Exchange two non-overlapping blocks of `len` bytes
fn swap_blocks(
    store: &mut dyn Storage,
    a: u64,
    b: u64,
    len: u64,
    window: usize,
) -> io::Result<()> {
    let w = window as u64;
    let mut offset = 0;
    while offset < len {
        let n = w.min(len - offset);
        let first = read_block(store, a + offset, n)?;
        let second = read_block(store, b + offset, n)?;
        write_block(store, a + offset, &second)?;
        write_block(store, b + offset, &first)?;
        offset += n;
    }
    Ok(())
}
