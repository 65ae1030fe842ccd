// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The DIF context: the parameters and mutable cursor state shared by
//! every operation in this crate.

use crate::error::{DifError, InvalidArgument};
use crate::pi::{PiFormat, PiLocation, REFTAG_IGNORE};
use bitflags::bitflags;

/// Which reference-tag semantics a block's metadata follows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DifType {
    /// No protection information is generated or checked.
    Disable = 0,
    /// Reference tag increments per block; no ignore sentinel.
    Type1 = 1,
    /// Reference tag increments per block; app tag carries extra
    /// context but reference-tag semantics match TYPE1.
    Type2 = 2,
    /// Reference-tag checking is suppressed whenever the stored
    /// reference tag is the all-ones sentinel.
    Type3 = 3,
}

bitflags! {
    /// Which subchecks a DIF context performs, plus the PRACT mode bit.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct DifFlags: u32 {
        /// Verify (and generate) the reference tag.
        const REFTAG_CHECK = 1 << 26;
        /// Verify (and generate) the application tag.
        const APPTAG_CHECK = 1 << 27;
        /// Verify (and generate) the guard.
        const GUARD_CHECK  = 1 << 28;
        /// Synthesize/strip metadata on the copy paths (NVMe PRACT).
        const PRACT        = 1 << 29;
    }
}

bitflags! {
    /// Which part of a block's PI/data to corrupt in
    /// [`crate::bulk::inject_error`].
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct InjectFlags: u32 {
        const REFTAG = 0x1;
        const APPTAG = 0x2;
        const GUARD  = 0x4;
        const DATA   = 0x8;
    }
}

/// Immutable (except for the stream cursor fields) parameters shared
/// by every block of a single I/O.
///
/// A `DifContext` is owned by exactly one caller at a time: the
/// streaming APIs take `&mut self` because they mutate `last_guard`
/// and `data_offset`; the bulk APIs take `&self` and are safe to call
/// concurrently against distinct contexts and payloads.
#[derive(Clone, Copy, Debug)]
pub struct DifContext {
    block_size: u32,
    md_size: u32,
    md_interleave: bool,
    pi_location: PiLocation,
    guard_interval: u32,
    dif_type: DifType,
    pi_format: PiFormat,
    flags: DifFlags,
    init_ref_tag: u64,
    app_tag: u16,
    apptag_mask: u16,
    data_offset: u32,
    ref_tag_offset: u32,
    remapped_init_ref_tag: u64,
    last_guard: u64,
    guard_seed: u64,
}

impl DifContext {
    /// Construct a new context, validating the invariants in the
    /// spec's data model (block size vs. metadata size, metadata size
    /// vs. PI size when checks are enabled).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        block_size: u32,
        md_size: u32,
        md_interleave: bool,
        pi_location: PiLocation,
        dif_type: DifType,
        pi_format: PiFormat,
        flags: DifFlags,
        init_ref_tag: u64,
        app_tag: u16,
        apptag_mask: u16,
        data_offset: u32,
        guard_seed: u64,
    ) -> Result<Self, DifError> {
        if block_size <= md_size {
            return Err(InvalidArgument::BlockSizeTooSmall.into());
        }
        let checks_enabled = !flags.is_empty();
        if checks_enabled && md_size < pi_format.size() {
            return Err(InvalidArgument::MetadataTooSmall.into());
        }

        let guard_interval = if md_size == 0 {
            block_size
        } else {
            block_size - md_size
        };
        if guard_interval == 0 {
            return Err(InvalidArgument::BlockSizeTooSmall.into());
        }

        let ref_tag_offset = data_offset / guard_interval;

        Ok(Self {
            block_size,
            md_size,
            md_interleave,
            pi_location,
            guard_interval,
            dif_type,
            pi_format,
            flags,
            init_ref_tag,
            app_tag,
            apptag_mask,
            data_offset,
            ref_tag_offset,
            remapped_init_ref_tag: init_ref_tag,
            last_guard: guard_seed,
            guard_seed,
        })
    }

    /// Update the byte offset of the first byte of the current payload
    /// within the logical I/O, recomputing `ref_tag_offset`.
    pub fn set_data_offset(&mut self, data_offset: u32) {
        self.data_offset = data_offset;
        self.ref_tag_offset = data_offset / self.guard_interval;
    }

    /// Set the replacement initial reference tag used by
    /// [`crate::bulk::remap_ref_tag`].
    pub fn set_remapped_init_ref_tag(&mut self, remapped_init_ref_tag: u64) {
        self.remapped_init_ref_tag = remapped_init_ref_tag;
    }

    pub(crate) fn block_size(&self) -> u32 {
        self.block_size
    }

    pub(crate) fn md_size(&self) -> u32 {
        self.md_size
    }

    pub(crate) fn md_interleave(&self) -> bool {
        self.md_interleave
    }

    pub(crate) fn guard_interval(&self) -> u32 {
        self.guard_interval
    }

    pub(crate) fn dif_type(&self) -> DifType {
        self.dif_type
    }

    pub(crate) fn pi_format(&self) -> PiFormat {
        self.pi_format
    }

    pub(crate) fn flags(&self) -> DifFlags {
        self.flags
    }

    pub(crate) fn app_tag(&self) -> u16 {
        self.app_tag
    }

    pub(crate) fn apptag_mask(&self) -> u16 {
        self.apptag_mask
    }

    pub(crate) fn guard_seed(&self) -> u64 {
        self.guard_seed
    }

    pub(crate) fn data_offset(&self) -> u32 {
        self.data_offset
    }

    pub(crate) fn last_guard(&self) -> u64 {
        self.last_guard
    }

    pub(crate) fn set_last_guard(&mut self, guard: u64) {
        self.last_guard = guard;
    }

    /// Index of the block `data_offset` currently points into, relative
    /// to `ref_tag_offset` (i.e. the same numbering [`crate::bulk`]'s
    /// functions use for the first block of a payload).
    pub(crate) fn current_block_index(&self) -> u32 {
        self.data_offset / self.guard_interval - self.ref_tag_offset
    }

    /// Byte position within the current block that `data_offset` points
    /// into.
    pub(crate) fn position_in_block(&self) -> u32 {
        self.data_offset % self.guard_interval
    }

    /// Advance `data_offset` by `by` bytes without touching
    /// `ref_tag_offset`, which stays fixed for the lifetime of the
    /// logical I/O a stream session belongs to.
    pub(crate) fn advance_data_offset(&mut self, by: u32) {
        self.data_offset += by;
    }

    /// Byte offset of the PI tuple within one `block_size`-byte
    /// (interleaved) or `md_size`-byte (DIX) metadata-bearing region.
    pub(crate) fn pi_offset(&self) -> u32 {
        let slot = self.local_pi_slot();
        if self.md_interleave {
            self.guard_interval + slot
        } else {
            slot
        }
    }

    /// Byte offset of the PI tuple within the metadata region itself
    /// (i.e. relative to the first metadata byte, not the block).
    pub(crate) fn local_pi_slot(&self) -> u32 {
        self.pi_location.slot(self.md_size, self.pi_format.size())
    }

    /// Metadata bytes following the PI tuple, before the next block's
    /// data begins (zero unless `md_size` exceeds the PI size and the
    /// PI sits at the head of the metadata region).
    pub(crate) fn trailing_md_bytes(&self) -> u32 {
        self.md_size - self.local_pi_slot() - self.pi_format.size()
    }

    /// Expected reference tag for `block_index`, using either the
    /// original or remapped initial reference tag.
    pub(crate) fn expected_ref_tag(&self, block_index: u32, remapped: bool) -> u64 {
        let base = if remapped {
            self.remapped_init_ref_tag
        } else {
            self.init_ref_tag
        };
        let tag = base
            .wrapping_add(u64::from(self.ref_tag_offset))
            .wrapping_add(u64::from(block_index));
        tag & self.ref_tag_width_mask()
    }

    /// Mask selecting the significant bits of a reference tag for this
    /// context's type and PI format (spec invariant: TYPE1/TYPE3 use
    /// the low 32 bits even in the 64-bit format; TYPE2 uses the full
    /// width of the format's reference-tag area).
    fn ref_tag_width_mask(&self) -> u64 {
        match self.dif_type {
            DifType::Type1 | DifType::Type3 | DifType::Disable => 0xFFFF_FFFF,
            DifType::Type2 => match self.pi_format {
                PiFormat::Crc16 => 0xFFFF_FFFF,
                PiFormat::Crc32 | PiFormat::Crc64 => 0xFFFF_FFFF_FFFF,
            },
        }
    }

    /// Reference tag sentinel used for TYPE3 generation (spec's fixed
    /// contract: all-ones in the low 32 bits, regardless of format).
    pub(crate) fn reftag_sentinel(&self) -> u64 {
        REFTAG_IGNORE
    }

    /// Number of blocks covered by `data_len` data bytes, rounded up.
    pub(crate) fn blocks_for_data_len(&self, data_len: u32) -> u32 {
        data_len.div_ceil(self.guard_interval)
    }
}
