//! Offset/size paging for listing queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a [`QueryPagination`] is out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("page size must be between 1 and {max}, got {size}", max = QueryPagination::MAX_SIZE)]
pub struct InvalidPageSize {
    /// The rejected page size.
    pub size: u64,
}

/// An offset/size window over a listing.
///
/// The offset counts back from the newest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPagination {
    /// Number of entries to skip, starting from the newest.
    pub offset: u64,
    /// Maximum number of entries to return.
    pub size: u64,
}

impl QueryPagination {
    /// The largest page a caller may request.
    pub const MAX_SIZE: u64 = 100;

    /// Creates a new [`QueryPagination`], rejecting sizes outside `1..=MAX_SIZE`.
    pub const fn new(offset: u64, size: u64) -> Result<Self, InvalidPageSize> {
        let pagination = Self { offset, size };
        match pagination.validate() {
            Ok(()) => Ok(pagination),
            Err(err) => Err(err),
        }
    }

    /// Checks that the page size is within `1..=MAX_SIZE`.
    ///
    /// Deserialized values bypass [`QueryPagination::new`] and must be validated before use.
    pub const fn validate(&self) -> Result<(), InvalidPageSize> {
        if self.size == 0 || self.size > Self::MAX_SIZE {
            return Err(InvalidPageSize { size: self.size });
        }
        Ok(())
    }
}
