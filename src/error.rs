// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use core::error::Error;
use core::fmt::{self, Display, Formatter};

/// Common error type for all DIF/DIX operations.
///
/// Input errors (malformed sizes, unknown enum values) are reported as
/// [`DifError::InvalidArgument`] before any buffer is touched. A failed
/// verification is reported as [`DifError::Check`] rather than a panic:
/// the first offending block wins and is described by a [`CheckError`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum DifError {
    /// An argument did not satisfy the codec's invariants.
    InvalidArgument(InvalidArgument),

    /// A caller-supplied output array (e.g. for
    /// [`set_md_interleave_iovs`](crate::layout::set_md_interleave_iovs))
    /// was too small to hold the result.
    BufferTooSmall,

    /// The requested operation cannot be carried out, e.g. injecting an
    /// error into a payload that carries no metadata.
    Unsupported,

    /// Verification found a protection-information mismatch.
    Check(CheckError),
}

impl Display for DifError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(e) => write!(f, "invalid argument: {e}"),
            Self::BufferTooSmall => {
                write!(f, "output buffer is too small")
            }
            Self::Unsupported => write!(f, "operation is not supported"),
            Self::Check(e) => write!(f, "{e}"),
        }
    }
}

impl Error for DifError {}

impl From<CheckError> for DifError {
    fn from(e: CheckError) -> Self {
        Self::Check(e)
    }
}

impl From<InvalidArgument> for DifError {
    fn from(e: InvalidArgument) -> Self {
        Self::InvalidArgument(e)
    }
}

/// Reason an argument was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum InvalidArgument {
    /// `block_size` must be strictly greater than `md_size`.
    BlockSizeTooSmall,

    /// `md_size` is smaller than the protection-information tuple it
    /// must hold when any check is enabled.
    MetadataTooSmall,

    /// A scatter-gather list's total length did not match the length
    /// implied by `num_blocks` and the context.
    PayloadLengthMismatch,

    /// The scatter-gather list ran out of bytes before `num_blocks`
    /// blocks could be produced.
    PayloadTooShort,

    /// `num_blocks` is zero.
    NoBlocks,

    /// `data_offset`/`data_len` do not describe a contiguous range
    /// that can be mapped onto whole or partial blocks.
    MisalignedRange,

    /// The DIF type does not support the requested operation (e.g.
    /// remapping the reference tag of a type that has none).
    UnsupportedDifType,
}

impl Display for InvalidArgument {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockSizeTooSmall => {
                write!(f, "block_size must be greater than md_size")
            }
            Self::MetadataTooSmall => {
                write!(f, "md_size is smaller than the PI tuple size")
            }
            Self::PayloadLengthMismatch => {
                write!(f, "scatter-gather list length does not match num_blocks")
            }
            Self::PayloadTooShort => {
                write!(f, "scatter-gather list is shorter than num_blocks requires")
            }
            Self::NoBlocks => write!(f, "num_blocks is zero"),
            Self::MisalignedRange => {
                write!(f, "data_offset/data_len do not align to the context")
            }
            Self::UnsupportedDifType => {
                write!(f, "operation is not supported for this DIF type")
            }
        }
    }
}

/// Describes a verification failure: the first offending block, what
/// kind of subcheck failed, and the expected vs. actual values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CheckError {
    /// Which subcheck failed.
    pub kind: CheckErrorKind,

    /// The value the codec expected to find.
    pub expected: u64,

    /// The value actually found (or computed from the data).
    pub actual: u64,

    /// Index, within the payload, of the block that failed.
    pub block_index: u32,
}

impl Display for CheckError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mismatch at block {}: expected {:#x}, got {:#x}",
            self.kind, self.block_index, self.expected, self.actual
        )
    }
}

/// Which part of the protection information tuple failed to verify.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckErrorKind {
    /// The guard (CRC over the block's data) did not match.
    Guard,
    /// The application tag did not match.
    AppTag,
    /// The reference tag did not match.
    RefTag,
    /// The data itself was flagged as corrupt (used by fault injection
    /// bookkeeping; the codec otherwise infers data corruption from a
    /// guard mismatch).
    Data,
}

impl Display for CheckErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Guard => "guard",
            Self::AppTag => "application tag",
            Self::RefTag => "reference tag",
            Self::Data => "data",
        };
        write!(f, "{s}")
    }
}
