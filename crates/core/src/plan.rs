//! Piece planning for chunked transfers
//!
//! Splits an object of known size into contiguous, disjoint byte ranges.
//! Downloads fetch each range with a ranged GET; uploads read each range
//! from the local file and send it as one multipart part.

use crate::error::{Error, Result};

/// Maximum number of parts in a multipart upload (S3 limit)
pub const MAX_PARTS: u64 = 10_000;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// A contiguous byte range of an object, the unit of transfer
///
/// `end` is inclusive, matching HTTP range semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    /// 0-based ordinal
    pub index: usize,
    /// First byte offset
    pub start: u64,
    /// Last byte offset (inclusive)
    pub end: u64,
}

impl Piece {
    /// Number of bytes covered by this piece
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Pieces are never empty; provided for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// 1-based multipart part number
    pub fn part_number(&self) -> Result<i32> {
        i32::try_from(self.index + 1).map_err(|_| {
            Error::InvalidJob(format!("piece {} has no valid part number", self.index))
        })
    }

    /// HTTP Range header value for this piece
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Parameters of one engine invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferJob {
    pub total_size: u64,
    pub piece_size: u64,
    pub concurrency: usize,
    pub direction: Direction,
}

impl TransferJob {
    /// Create a validated job
    pub fn new(
        total_size: u64,
        piece_size: u64,
        concurrency: usize,
        direction: Direction,
    ) -> Result<Self> {
        if piece_size == 0 {
            return Err(Error::InvalidJob("piece size must be greater than zero".into()));
        }
        if concurrency == 0 {
            return Err(Error::InvalidJob("concurrency must be at least 1".into()));
        }
        Ok(Self {
            total_size,
            piece_size,
            concurrency,
            direction,
        })
    }

    /// Plan the pieces for this job
    pub fn pieces(&self) -> Vec<Piece> {
        split(self.total_size, self.piece_size)
    }
}

/// Number of pieces needed to cover `total_size` bytes
pub fn piece_count(total_size: u64, piece_size: u64) -> usize {
    total_size.div_ceil(piece_size) as usize
}

/// Partition `[0, total_size)` into pieces of `piece_size` bytes
///
/// The final piece carries the remainder. A zero-length object yields no pieces.
pub fn plan_pieces(total_size: u64, piece_size: u64) -> Result<Vec<Piece>> {
    if piece_size == 0 {
        return Err(Error::InvalidJob("piece size must be greater than zero".into()));
    }
    Ok(split(total_size, piece_size))
}

fn split(total_size: u64, piece_size: u64) -> Vec<Piece> {
    let mut pieces = Vec::with_capacity(piece_count(total_size, piece_size));
    let mut start = 0;
    while start < total_size {
        let end = start.saturating_add(piece_size).min(total_size) - 1;
        pieces.push(Piece {
            index: pieces.len(),
            start,
            end,
        });
        start = end + 1;
    }
    pieces
}

/// Grow `part_size` so that `total_size` fits in at most [`MAX_PARTS`] parts
pub fn fit_part_size(total_size: u64, part_size: u64) -> u64 {
    let required = total_size.div_ceil(MAX_PARTS);
    part_size.max(required).max(1)
}
