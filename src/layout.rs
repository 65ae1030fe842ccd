// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pure arithmetic converting between data-only and extended
//! (metadata-interleaved) offsets and lengths.

use crate::context::DifContext;
use crate::error::{DifError, InvalidArgument};

/// Walk `data_len` data bytes starting `position_in_block` bytes into
/// a block, returning the number of extended (data + metadata) bytes
/// they occupy, always counting every touched block's trailer. Used by
/// [`length_with_md`]; [`range_with_md`] has its own variant that only
/// counts a trailer when the range reaches a block boundary.
fn extended_len(ctx: &DifContext, mut position_in_block: u32, mut data_len: u32) -> u32 {
    let guard_interval = ctx.guard_interval();
    let mut extended = 0u32;
    while data_len > 0 {
        let take = data_len.min(guard_interval - position_in_block);
        // Every block touched needs its metadata trailer, whether or
        // not the block's own data portion is fully covered by this
        // range: the trailer isn't padding, it's the PI.
        extended += take + ctx.md_size();
        data_len -= take;
        position_in_block = 0;
    }
    extended
}

/// Length, in bytes, of the extended payload needed to hold `data_len`
/// data-only bytes starting at the beginning of a block.
///
/// The final, possibly partial, block is not padded out to a full
/// `block_size`: only its actual data bytes plus one `md_size` trailer
/// are counted.
pub fn length_with_md(ctx: &DifContext, data_len: u32) -> u32 {
    extended_len(ctx, 0, data_len)
}

/// Map a data-only byte range onto the equivalent extended-payload
/// range, returning `(buf_offset, buf_len)`.
///
/// Unlike [`length_with_md`], a metadata trailer is only added when the
/// range actually reaches a block boundary: a sub-range that starts and
/// ends inside one block (never touching its metadata) maps to data
/// bytes alone.
pub fn range_with_md(ctx: &DifContext, data_offset: u32, data_len: u32) -> (u32, u32) {
    let guard_interval = ctx.guard_interval();
    let block_index = data_offset / guard_interval;
    let mut position_in_block = data_offset % guard_interval;
    let buf_offset = block_index * ctx.block_size() + position_in_block;

    let mut remaining = data_len;
    let mut buf_len = 0u32;
    while remaining > 0 {
        let take = remaining.min(guard_interval - position_in_block);
        buf_len += take;
        if position_in_block + take == guard_interval {
            buf_len += ctx.md_size();
        }
        remaining -= take;
        position_in_block = 0;
    }
    (buf_offset, buf_len)
}

/// Split `backing` into data-only fragments that skip over each
/// block's metadata region, covering the data-only range
/// `[data_offset, data_offset + data_len)`.
///
/// Entries are written into `out` starting at index 0; the returned
/// `usize` is how many were used. Returns [`DifError::BufferTooSmall`]
/// if `out` runs out of room, or [`InvalidArgument::PayloadTooShort`]
/// if `backing` ends before the requested range does.
pub fn set_md_interleave_iovs<'a>(
    ctx: &DifContext,
    backing: &'a mut [u8],
    data_offset: u32,
    data_len: u32,
    out: &mut [&'a mut [u8]],
) -> Result<(usize, u32), DifError> {
    let guard_interval = ctx.guard_interval();
    let block_index = data_offset / guard_interval;
    let mut position_in_block = data_offset % guard_interval;
    let buf_start = (block_index * ctx.block_size() + position_in_block) as usize;

    let mut rest = backing
        .get_mut(buf_start..)
        .ok_or(InvalidArgument::PayloadTooShort)?;

    let mut remaining = data_len;
    let mut mapped_len = 0u32;
    let mut count = 0usize;

    while remaining > 0 {
        if count >= out.len() {
            return Err(DifError::BufferTooSmall);
        }

        let take = remaining.min(guard_interval - position_in_block);
        let take_usize = take as usize;
        if take_usize > rest.len() {
            return Err(InvalidArgument::PayloadTooShort.into());
        }
        let (chunk, after_chunk) = rest.split_at_mut(take_usize);
        out[count] = chunk;
        count += 1;
        mapped_len += take;

        let block_done = position_in_block + take == guard_interval;
        rest = if block_done {
            let skip = ctx.md_size() as usize;
            after_chunk
                .get_mut(skip..)
                .ok_or(InvalidArgument::PayloadTooShort)?
        } else {
            after_chunk
        };

        remaining -= take;
        position_in_block = if block_done { 0 } else { position_in_block + take };
    }

    Ok((count, mapped_len))
}
