//! Row-range partitioning for chunked exports.
//!
//! Splits an exported row sequence into evenly sized, contiguous ranges so
//! each range can be serialized and staged as one object. Range count equals
//! the requested slice count except for small results, which collapse into a
//! single range.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WharfError};

/// A half-open `[start, end)` index range over the exported row sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    /// First row index covered by this range (inclusive)
    pub start: u64,
    /// One past the last row index covered by this range
    pub end: u64,
}

impl RowRange {
    /// Number of rows covered by this range
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True when the range covers no rows
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Compute `slices` ordered, contiguous ranges covering `[0, row_count)`.
///
/// Cut points are evenly spaced over the row count and floored to whole row
/// indices; the final range always ends at `row_count` exactly. When
/// `row_count <= slices` a single range covering everything is returned, so
/// no empty ranges are ever produced for small results.
///
/// Returns `InvalidRequest` when `slices` is zero.
pub fn partition_rows(row_count: u64, slices: usize) -> Result<Vec<RowRange>> {
    if slices < 1 {
        return Err(WharfError::InvalidRequest(
            "slice count must be at least 1".to_string(),
        ));
    }

    if row_count <= slices as u64 {
        return Ok(vec![RowRange {
            start: 0,
            end: row_count,
        }]);
    }

    let step = row_count as f64 / slices as f64;
    let mut ranges = Vec::with_capacity(slices);
    let mut start = 0u64;
    for i in 1..slices {
        let cut = (i as f64 * step).floor() as u64;
        ranges.push(RowRange { start, end: cut });
        start = cut;
    }
    ranges.push(RowRange {
        start,
        end: row_count,
    });

    Ok(ranges)
}
