// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Incremental generate/verify/CRC driven by arbitrary, non-block-
//! aligned slices of a data-only stream.
//!
//! Each call advances `ctx.data_offset` and, for a block left
//! mid-way through, leaves the running guard in `ctx.last_guard` so
//! the next call can resume it. PI for a block is only produced or
//! checked once that block's data has fully arrived; it lives in a
//! caller-owned metadata buffer indexed by how many blocks this call
//! has completed, not by the block's position in the logical I/O.

use crate::block_iter::SgCursor;
use crate::context::{DifContext, DifFlags};
use crate::crc_algo::{crc32c_fold, GuardDigest};
use crate::engine;
use crate::error::DifError;
use crate::pi::PiTuple;

/// Feed `data_len` bytes of a data-only stream through `ctx`, writing
/// PI into `md` for every block the stream completes during this call.
///
/// `md` must hold one `md_size`-byte slot per block this call could
/// possibly complete, i.e. at least
/// `ceil((position_in_block + data_len) / guard_interval) * md_size`.
///
/// # Panics
///
/// Panics if `md` is too small for the blocks this call completes.
pub fn generate_stream(
    ctx: &mut DifContext,
    data: &[&[u8]],
    md: &mut [u8],
    data_len: u32,
) -> Result<(), DifError> {
    let mut cursor = SgCursor::new(data);
    let mut remaining = data_len;
    let mut blocks_completed = 0u32;

    while remaining > 0 {
        let p = ctx.position_in_block();
        let take = remaining.min(ctx.guard_interval() - p);

        let seed = if p > 0 { ctx.last_guard() } else { ctx.guard_seed() };
        let mut digest = GuardDigest::new(ctx.pi_format(), seed);
        cursor.fold(take, |chunk| digest.update(chunk))?;
        let guard = digest.finalize();

        if p + take == ctx.guard_interval() {
            let block_index = ctx.current_block_index();
            let pi_off = (blocks_completed * ctx.md_size() + ctx.local_pi_slot()) as usize;
            let size = ctx.pi_format().size() as usize;

            let existing_app_tag = if !ctx.flags().contains(DifFlags::APPTAG_CHECK) {
                PiTuple::read(ctx.pi_format(), &md[pi_off..pi_off + size]).app_tag
            } else {
                0
            };
            let tuple = engine::generate_tuple(ctx, block_index, guard, existing_app_tag);
            tuple.write(ctx.pi_format(), &mut md[pi_off..pi_off + size]);

            ctx.set_last_guard(ctx.guard_seed());
            blocks_completed += 1;
        } else {
            ctx.set_last_guard(guard);
        }

        ctx.advance_data_offset(take);
        remaining -= take;
    }
    Ok(())
}

/// Feed `data_len` bytes of a data-only stream through `ctx`, checking
/// each completed block's data against the PI already present in `md`.
///
/// # Panics
///
/// Panics if `md` is too small for the blocks this call completes.
pub fn verify_stream(
    ctx: &mut DifContext,
    data: &[&[u8]],
    md: &[u8],
    data_len: u32,
) -> Result<(), DifError> {
    let mut cursor = SgCursor::new(data);
    let mut remaining = data_len;
    let mut blocks_completed = 0u32;

    while remaining > 0 {
        let p = ctx.position_in_block();
        let take = remaining.min(ctx.guard_interval() - p);

        let seed = if p > 0 { ctx.last_guard() } else { ctx.guard_seed() };
        let mut digest = GuardDigest::new(ctx.pi_format(), seed);
        cursor.fold(take, |chunk| digest.update(chunk))?;
        let guard = digest.finalize();

        if p + take == ctx.guard_interval() {
            let block_index = ctx.current_block_index();
            let pi_off = (blocks_completed * ctx.md_size() + ctx.local_pi_slot()) as usize;
            let size = ctx.pi_format().size() as usize;

            let tuple = PiTuple::read(ctx.pi_format(), &md[pi_off..pi_off + size]);
            engine::verify_tuple(ctx, block_index, &tuple, guard, false)?;

            ctx.set_last_guard(ctx.guard_seed());
            blocks_completed += 1;
        } else {
            ctx.set_last_guard(guard);
        }

        ctx.advance_data_offset(take);
        remaining -= take;
    }
    Ok(())
}

/// Chain CRC-32C over `data_len` bytes of a data-only stream,
/// continuing from `*crc32c`. Block boundaries are tracked the same
/// way as [`generate_stream`], but no PI is ever read or written: the
/// context's `last_guard` is untouched, matching the bulk
/// [`crate::bulk::update_crc32c`]'s independence from `dif_pi_format`.
pub fn update_crc32c_stream(
    ctx: &mut DifContext,
    data: &[&[u8]],
    data_len: u32,
    crc32c: &mut u32,
) -> Result<(), DifError> {
    let mut cursor = SgCursor::new(data);
    let mut remaining = data_len;
    let mut value = *crc32c;

    while remaining > 0 {
        let p = ctx.position_in_block();
        let take = remaining.min(ctx.guard_interval() - p);

        cursor.fold(take, |chunk| value = crc32c_fold(value, chunk))?;
        ctx.advance_data_offset(take);
        remaining -= take;
    }

    *crc32c = value;
    Ok(())
}
