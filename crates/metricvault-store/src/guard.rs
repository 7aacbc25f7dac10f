//! Result caps for every scan.
//!
//! A cursor is pulled at most `limit + 1` times. Seeing the extra item
//! proves the source held more than the cap; it is dropped and the result
//! is flagged as truncated.

use serde::Serialize;
use tracing::warn;

use crate::error::BackendResult;

/// Default cap on items pulled from any single cursor.
pub const MAX_RETRIEVAL_LIMIT: usize = metricvault_core::config::DEFAULT_MAX_RESULTS;

/// A capped result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bounded<T> {
    pub items: Vec<T>,
    /// More items existed than the cap allowed.
    pub truncated: bool,
}

impl<T> Bounded<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Bounded<U> {
        Bounded {
            items: self.items.into_iter().map(f).collect(),
            truncated: self.truncated,
        }
    }
}

impl<T> IntoIterator for Bounded<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// What a guarded scan is collecting; selects the truncation warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Records,
    Projects,
}

/// Drain at most `limit` items from `cursor`, flagging truncation.
///
/// The first backend error aborts the scan.
pub fn bounded<T, I>(cursor: I, limit: usize, kind: ScanKind) -> BackendResult<Bounded<T>>
where
    I: IntoIterator<Item = BackendResult<T>>,
{
    let mut items = Vec::new();
    for item in cursor.into_iter().take(limit.saturating_add(1)) {
        items.push(item?);
    }

    let truncated = items.len() > limit;
    if truncated {
        items.truncate(limit);
        match kind {
            ScanKind::Records => {
                warn!(limit, "retrieval limit reached, results truncated");
            }
            ScanKind::Projects => {
                warn!(limit, "retrieval limit reached, project list may be incomplete");
            }
        }
    }
    Ok(Bounded { items, truncated })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::BackendError;

    fn ok_items(n: usize) -> impl Iterator<Item = BackendResult<usize>> {
        (0..n).map(Ok)
    }

    #[test]
    fn under_the_limit_is_complete() {
        let result = bounded(ok_items(3), 5, ScanKind::Records).unwrap();
        assert_eq!(result.items, vec![0, 1, 2]);
        assert!(!result.truncated);
    }

    #[test]
    fn exactly_the_limit_is_not_truncated() {
        let result = bounded(ok_items(5), 5, ScanKind::Records).unwrap();
        assert_eq!(result.len(), 5);
        assert!(!result.truncated);
    }

    #[test]
    fn over_the_limit_is_capped_and_flagged() {
        let result = bounded(ok_items(50), 5, ScanKind::Projects).unwrap();
        assert_eq!(result.items, vec![0, 1, 2, 3, 4]);
        assert!(result.truncated);
    }

    #[test]
    fn cursor_is_pulled_at_most_limit_plus_one_times() {
        let pulled = Cell::new(0);
        let cursor = (0..1_000).map(|i| {
            pulled.set(pulled.get() + 1);
            Ok(i)
        });
        let result = bounded(cursor, 10, ScanKind::Records).unwrap();
        assert!(result.truncated);
        assert_eq!(pulled.get(), 11);
    }

    #[test]
    fn backend_errors_propagate() {
        let cursor = vec![Ok(1), Err(BackendError::Read("disk gone".into())), Ok(3)];
        let err = bounded(cursor, 10, ScanKind::Records).unwrap_err();
        assert!(matches!(err, BackendError::Read(_)));
    }

    #[test]
    fn zero_limit_reports_truncation_when_anything_exists() {
        assert!(bounded(ok_items(1), 0, ScanKind::Records).unwrap().truncated);
        assert!(!bounded(ok_items(0), 0, ScanKind::Records).unwrap().truncated);
    }
}
