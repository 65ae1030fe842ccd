// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The three guard checksums used by the PI formats.
//!
//! These are defined as explicit [`crc::Algorithm`] constants rather
//! than by name from the crate's built-in catalog, since the
//! polynomials and seeds are the contract (see the spec this codec
//! implements), not whatever names a particular `crc` crate version
//! happens to ship.

use crate::pi::PiFormat;
use crc::{Algorithm, Crc, Digest};

/// CRC-16/T10-DIF, used by the 16-bit PI format's guard field.
pub(crate) const CRC16_T10_DIF: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x8bb7,
    init: 0x0000,
    refin: false,
    refout: false,
    xorout: 0x0000,
    check: 0xd0db,
    residue: 0x0000,
};

/// CRC-32C (Castagnoli), used by the 32-bit PI format's guard field
/// and by the standalone `update_crc32c` operations.
pub(crate) const CRC32C: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x1edc_6f41,
    init: 0xffff_ffff,
    refin: true,
    refout: true,
    xorout: 0xffff_ffff,
    check: 0xe306_9283,
    residue: 0xb798_b438,
};

/// CRC-64/NVME, used by the 64-bit PI format's guard field.
pub(crate) const CRC64_NVME: Algorithm<u64> = Algorithm {
    width: 64,
    poly: 0xad93_d235_94c9_3659,
    init: 0xffff_ffff_ffff_ffff,
    refin: true,
    refout: true,
    xorout: 0xffff_ffff_ffff_ffff,
    check: 0xae8b_1486_0a79_9888,
    residue: 0x0000_0000_0000_0000,
};

/// A running guard checksum, tagged by PI format.
///
/// Folding data through this type is how [`crate::block_iter`] computes
/// a block's guard in a single pass even when the block straddles
/// multiple scatter-gather fragments.
pub(crate) enum GuardDigest {
    Crc16(Digest<'static, u16>),
    Crc32(Digest<'static, u32>),
    Crc64(Digest<'static, u64>),
}

impl GuardDigest {
    /// Start a new digest for `format`, seeded with `seed`.
    ///
    /// `seed` is truncated to the algorithm's width; callers pass the
    /// context's `guard_seed` (or an interim value carried across
    /// stream calls) verbatim.
    pub(crate) fn new(format: PiFormat, seed: u64) -> Self {
        match format {
            PiFormat::Crc16 => {
                const CRC: Crc<u16> = Crc::<u16>::new(&CRC16_T10_DIF);
                Self::Crc16(CRC.digest_with_initial(seed as u16))
            }
            PiFormat::Crc32 => {
                const CRC: Crc<u32> = Crc::<u32>::new(&CRC32C);
                Self::Crc32(CRC.digest_with_initial(seed as u32))
            }
            PiFormat::Crc64 => {
                const CRC: Crc<u64> = Crc::<u64>::new(&CRC64_NVME);
                Self::Crc64(CRC.digest_with_initial(seed))
            }
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            Self::Crc16(d) => d.update(data),
            Self::Crc32(d) => d.update(data),
            Self::Crc64(d) => d.update(data),
        }
    }

    pub(crate) fn finalize(self) -> u64 {
        match self {
            Self::Crc16(d) => u64::from(d.finalize()),
            Self::Crc32(d) => u64::from(d.finalize()),
            Self::Crc64(d) => d.finalize(),
        }
    }
}

/// Chain CRC-32C over `data`, continuing from `seed`.
///
/// Used by `update_crc32c`/`update_crc32c_stream`, which checksum the
/// data region with CRC-32C regardless of the context's PI format.
pub(crate) fn crc32c_fold(seed: u32, data: &[u8]) -> u32 {
    const CRC: Crc<u32> = Crc::<u32>::new(&CRC32C);
    let mut digest = CRC.digest_with_initial(seed);
    digest.update(data);
    digest.finalize()
}
