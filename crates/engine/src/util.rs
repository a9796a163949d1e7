//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API.

use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Largest page size accepted by list operations.
pub(crate) const MAX_PAGE_LIMIT: u64 = 100;

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| EngineError::InconsistentState(format!("invalid {label} id: {value}")))
}

pub(crate) fn parse_optional_uuid(value: Option<&str>, label: &str) -> ResultEngine<Option<Uuid>> {
    value.map(|v| parse_uuid(v, label)).transpose()
}

/// Normalize 1-based `page` and `limit` into `(zero_based_page, limit)`.
pub(crate) fn normalize_page(page: u64, limit: u64) -> (u64, u64) {
    (page.max(1) - 1, limit.clamp(1, MAX_PAGE_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_one_based_and_limit_clamped() {
        assert_eq!(normalize_page(0, 0), (0, 1));
        assert_eq!(normalize_page(1, 20), (0, 20));
        assert_eq!(normalize_page(3, 500), (2, MAX_PAGE_LIMIT));
    }
}
