// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Walks a scatter-gather list as a sequence of blocks.
//!
//! Fragments are not required to be multiples of `block_size`; the
//! cursor treats the concatenation of all fragments as one logical
//! byte stream and advances through it strictly forward, which is all
//! the bulk and stream engines ever need (spec: blocks are always
//! processed in ascending order).

use crate::error::{DifError, InvalidArgument};
use crate::pi::PiFormat;

/// Widest PI tuple size in bytes; used to size the stack-local staging
/// buffer for a PI read/write that straddles a fragment boundary.
const MAX_PI_SIZE: usize = 16;

/// Forward-only cursor over an immutable scatter-gather list.
pub(crate) struct SgCursor<'a> {
    fragments: &'a [&'a [u8]],
    frag_idx: usize,
    frag_off: usize,
}

impl<'a> SgCursor<'a> {
    pub(crate) fn new(fragments: &'a [&'a [u8]]) -> Self {
        Self {
            fragments,
            frag_idx: 0,
            frag_off: 0,
        }
    }

    fn advance_to_nonempty_fragment(&mut self) {
        while let Some(frag) = self.fragments.get(self.frag_idx) {
            if self.frag_off < frag.len() {
                break;
            }
            self.frag_idx += 1;
            self.frag_off = 0;
        }
    }

    /// Fold `len` bytes starting at the cursor through `f`, advancing
    /// the cursor by `len` bytes.
    pub(crate) fn fold(
        &mut self,
        mut len: u32,
        mut f: impl FnMut(&[u8]),
    ) -> Result<(), DifError> {
        while len > 0 {
            self.advance_to_nonempty_fragment();
            let frag = *self
                .fragments
                .get(self.frag_idx)
                .ok_or(InvalidArgument::PayloadTooShort)?;
            let avail = frag.len() - self.frag_off;
            let take = avail.min(len as usize);
            f(&frag[self.frag_off..self.frag_off + take]);
            self.frag_off += take;
            len -= take as u32;
        }
        Ok(())
    }

    /// Read exactly `dst.len()` bytes from the cursor into `dst`.
    pub(crate) fn read_exact(&mut self, dst: &mut [u8]) -> Result<(), DifError> {
        let mut pos = 0;
        self.fold(dst.len() as u32, |chunk| {
            dst[pos..pos + chunk.len()].copy_from_slice(chunk);
            pos += chunk.len();
        })
    }

    /// Skip `len` bytes without reading them.
    pub(crate) fn skip(&mut self, len: u32) -> Result<(), DifError> {
        self.fold(len, |_| {})
    }

    /// Snapshot the current position so it can be restored with
    /// [`Self::seek`].
    pub(crate) fn position(&self) -> (usize, usize) {
        (self.frag_idx, self.frag_off)
    }

    /// Restore a position previously returned by [`Self::position`].
    pub(crate) fn seek(&mut self, pos: (usize, usize)) {
        (self.frag_idx, self.frag_off) = pos;
    }
}

/// Forward-only cursor over a mutable scatter-gather list.
pub(crate) struct SgCursorMut<'a, 'b: 'a> {
    fragments: &'a mut [&'b mut [u8]],
    frag_idx: usize,
    frag_off: usize,
}

impl<'a, 'b: 'a> SgCursorMut<'a, 'b> {
    pub(crate) fn new(fragments: &'a mut [&'b mut [u8]]) -> Self {
        Self {
            fragments,
            frag_idx: 0,
            frag_off: 0,
        }
    }

    fn advance_to_nonempty_fragment(&mut self) {
        while let Some(frag) = self.fragments.get(self.frag_idx) {
            if self.frag_off < frag.len() {
                break;
            }
            self.frag_idx += 1;
            self.frag_off = 0;
        }
    }

    /// Fold `len` bytes starting at the cursor through `f` (read-only
    /// access), advancing the cursor by `len` bytes.
    pub(crate) fn fold(
        &mut self,
        mut len: u32,
        mut f: impl FnMut(&[u8]),
    ) -> Result<(), DifError> {
        while len > 0 {
            self.advance_to_nonempty_fragment();
            let frag: &[u8] = self
                .fragments
                .get(self.frag_idx)
                .ok_or(InvalidArgument::PayloadTooShort)?;
            let avail = frag.len() - self.frag_off;
            let take = avail.min(len as usize);
            f(&frag[self.frag_off..self.frag_off + take]);
            self.frag_off += take;
            len -= take as u32;
        }
        Ok(())
    }

    /// Read exactly `dst.len()` bytes from the cursor into `dst`.
    pub(crate) fn read_exact(&mut self, dst: &mut [u8]) -> Result<(), DifError> {
        let mut pos = 0;
        self.fold(dst.len() as u32, |chunk| {
            dst[pos..pos + chunk.len()].copy_from_slice(chunk);
            pos += chunk.len();
        })
    }

    /// Write all of `src` starting at the cursor, advancing by
    /// `src.len()` bytes.
    pub(crate) fn write_exact(&mut self, src: &[u8]) -> Result<(), DifError> {
        let mut pos = 0;
        while pos < src.len() {
            self.advance_to_nonempty_fragment();
            let frag: &mut &mut [u8] = self
                .fragments
                .get_mut(self.frag_idx)
                .ok_or(InvalidArgument::PayloadTooShort)?;
            let avail = frag.len() - self.frag_off;
            let take = avail.min(src.len() - pos);
            frag[self.frag_off..self.frag_off + take]
                .copy_from_slice(&src[pos..pos + take]);
            self.frag_off += take;
            pos += take;
        }
        Ok(())
    }

    /// Flip a single bit at byte offset `byte_in_region` (relative to
    /// the cursor's current position) within the next `region_len`
    /// bytes, without otherwise moving the cursor. Used by fault
    /// injection, which flips one byte inside a region it has already
    /// durably located.
    pub(crate) fn flip_bit_at(
        &mut self,
        byte_in_region: u32,
        bit: u8,
    ) -> Result<(), DifError> {
        let saved = self.position();
        self.skip(byte_in_region)?;
        self.advance_to_nonempty_fragment();
        let frag: &mut &mut [u8] = self
            .fragments
            .get_mut(self.frag_idx)
            .ok_or(InvalidArgument::PayloadTooShort)?;
        frag[self.frag_off] ^= 1 << bit;
        self.seek(saved);
        Ok(())
    }

    pub(crate) fn skip(&mut self, len: u32) -> Result<(), DifError> {
        self.fold(len, |_| {})
    }

    /// Snapshot the current position so it can be restored with
    /// [`Self::seek`].
    pub(crate) fn position(&self) -> (usize, usize) {
        (self.frag_idx, self.frag_off)
    }

    /// Restore a position previously returned by [`Self::position`].
    pub(crate) fn seek(&mut self, pos: (usize, usize)) {
        (self.frag_idx, self.frag_off) = pos;
    }
}

/// Read a PI tuple located at `pi_offset` bytes into the block
/// currently at the cursor, using `staging` (sized to
/// `format.size()`) if the tuple straddles a fragment boundary.
///
/// `cursor` must be positioned at the start of the block; this
/// function consumes exactly `pi_offset + format.size()` bytes.
pub(crate) fn read_pi_at(
    cursor: &mut SgCursorMut<'_, '_>,
    pi_offset: u32,
    format: PiFormat,
) -> Result<crate::pi::PiTuple, DifError> {
    cursor.skip(pi_offset)?;
    let mut staging = [0u8; MAX_PI_SIZE];
    let size = format.size() as usize;
    cursor.read_exact(&mut staging[..size])?;
    Ok(crate::pi::PiTuple::read(format, &staging[..size]))
}

/// Write a PI tuple at `pi_offset` bytes into the block currently at
/// the cursor. Preserves any bytes the format doesn't define (e.g. the
/// 32-bit format's storage tag) by reading the existing bytes first.
pub(crate) fn write_pi_at(
    cursor: &mut SgCursorMut<'_, '_>,
    pi_offset: u32,
    format: PiFormat,
    tuple: &crate::pi::PiTuple,
) -> Result<(), DifError> {
    // Re-derive the cursor position: skip, then snapshot position so
    // we can read-modify-write the staging buffer and write it back
    // to the same spot.
    cursor.skip(pi_offset)?;
    let size = format.size() as usize;
    let mut staging = [0u8; MAX_PI_SIZE];
    let saved = cursor.position();
    cursor.read_exact(&mut staging[..size])?;
    cursor.seek(saved);

    tuple.write(format, &mut staging[..size]);
    cursor.write_exact(&staging[..size])
}

/// Copy `len` bytes from `src` into `dst`, calling `f` with each chunk
/// in source order as it's copied. Used by the copy paths, which fold
/// the guard over the data while moving it between a data-only list
/// and an extended one, without an intermediate buffer.
pub(crate) fn copy_fold(
    src: &mut SgCursor<'_>,
    dst: &mut SgCursorMut<'_, '_>,
    mut len: u32,
    mut f: impl FnMut(&[u8]),
) -> Result<(), DifError> {
    while len > 0 {
        src.advance_to_nonempty_fragment();
        dst.advance_to_nonempty_fragment();
        let src_frag: &[u8] = src
            .fragments
            .get(src.frag_idx)
            .ok_or(InvalidArgument::PayloadTooShort)?;
        let src_avail = src_frag.len() - src.frag_off;
        let dst_frag: &mut &mut [u8] = dst
            .fragments
            .get_mut(dst.frag_idx)
            .ok_or(InvalidArgument::PayloadTooShort)?;
        let dst_avail = dst_frag.len() - dst.frag_off;
        let take = src_avail.min(dst_avail).min(len as usize);

        let chunk_start = src.frag_off;
        dst_frag[dst.frag_off..dst.frag_off + take]
            .copy_from_slice(&src_frag[chunk_start..chunk_start + take]);
        f(&src_frag[chunk_start..chunk_start + take]);

        src.frag_off += take;
        dst.frag_off += take;
        len -= take as u32;
    }
    Ok(())
}

/// Fill the next `len` bytes at the cursor with `byte`.
pub(crate) fn fill_with(dst: &mut SgCursorMut<'_, '_>, mut len: u32, byte: u8) -> Result<(), DifError> {
    const CHUNK: usize = 64;
    let buf = [byte; CHUNK];
    while len > 0 {
        let take = (len as usize).min(CHUNK);
        dst.write_exact(&buf[..take])?;
        len -= take as u32;
    }
    Ok(())
}
