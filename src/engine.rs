// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-block generate/verify/remap, operating on one block's worth of
//! bytes already located by [`crate::block_iter`].

use crate::context::{DifContext, DifFlags, DifType};
use crate::error::{CheckError, CheckErrorKind, DifError};
use crate::pi::{PiFormat, PiTuple};

/// Compute the PI tuple to write for block `block_index`, honoring
/// which checks are enabled and TYPE3's reference-tag sentinel.
pub(crate) fn generate_tuple(
    ctx: &DifContext,
    block_index: u32,
    guard: u64,
    existing_app_tag: u16,
) -> PiTuple {
    let flags = ctx.flags();

    let guard = if flags.contains(DifFlags::GUARD_CHECK) {
        guard
    } else {
        0
    };

    let app_tag = if flags.contains(DifFlags::APPTAG_CHECK) {
        ctx.app_tag()
    } else {
        existing_app_tag
    };

    let ref_tag = if flags.contains(DifFlags::REFTAG_CHECK) {
        if ctx.dif_type() == DifType::Type3 {
            ctx.reftag_sentinel()
        } else {
            ctx.expected_ref_tag(block_index, false)
        }
    } else {
        0
    };

    PiTuple {
        guard,
        app_tag,
        ref_tag,
    }
}

/// Verify a decoded PI tuple against what's expected for
/// `block_index`, in the fixed order GUARD -> APPTAG -> REFTAG,
/// stopping at the first failure. `guard` is the guard recomputed
/// from the block's data bytes.
pub(crate) fn verify_tuple(
    ctx: &DifContext,
    block_index: u32,
    tuple: &PiTuple,
    computed_guard: u64,
    use_remapped_ref_tag: bool,
) -> Result<(), DifError> {
    if tuple.is_ignored(ctx.dif_type()) {
        return Ok(());
    }

    let flags = ctx.flags();

    if flags.contains(DifFlags::GUARD_CHECK) && computed_guard != tuple.guard {
        return Err(CheckError {
            kind: CheckErrorKind::Guard,
            expected: tuple.guard,
            actual: computed_guard,
            block_index,
        }
        .into());
    }

    if flags.contains(DifFlags::APPTAG_CHECK) {
        let mask = ctx.apptag_mask();
        if (tuple.app_tag & mask) != (ctx.app_tag() & mask) {
            return Err(CheckError {
                kind: CheckErrorKind::AppTag,
                expected: u64::from(ctx.app_tag() & mask),
                actual: u64::from(tuple.app_tag & mask),
                block_index,
            }
            .into());
        }
    }

    if flags.contains(DifFlags::REFTAG_CHECK) {
        let reftag_checked = match ctx.dif_type() {
            DifType::Type3 => (tuple.ref_tag & crate::pi::REFTAG_IGNORE) != crate::pi::REFTAG_IGNORE,
            _ => true,
        };
        if reftag_checked {
            let expected = ctx.expected_ref_tag(block_index, use_remapped_ref_tag);
            if expected != tuple.ref_tag {
                return Err(CheckError {
                    kind: CheckErrorKind::RefTag,
                    expected,
                    actual: tuple.ref_tag,
                    block_index,
                }
                .into());
            }
        }
    }

    Ok(())
}

/// Synthesize a PRACT bounce-side metadata region: fill non-PI bytes
/// with `0xFF`, then overwrite the PI slot with `tuple`.
pub(crate) fn pract_fill_metadata(md: &mut [u8], pi_offset: u32, format: PiFormat, tuple: &PiTuple) {
    md.fill(0xFF);
    let pi_offset = pi_offset as usize;
    let size = format.size() as usize;
    tuple.write(format, &mut md[pi_offset..pi_offset + size]);
}
