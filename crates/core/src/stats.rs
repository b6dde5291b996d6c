//! Aggregate error statistics
//!
//! Counts are weighted by occurrences so a context that failed five times
//! contributes five errors to the totals, not one.

use guildwire_domain::{ErrorContext, ErrorStats};

/// Fold a context snapshot into aggregate statistics
pub fn aggregate(contexts: &[ErrorContext]) -> ErrorStats {
    let mut stats = ErrorStats { active_contexts: contexts.len(), ..Default::default() };

    for ctx in contexts {
        let occurrences = u64::from(ctx.occurrences());
        stats.total_errors += occurrences;
        *stats.by_category.entry(ctx.category).or_insert(0) += occurrences;
        *stats.by_severity.entry(ctx.severity).or_insert(0) += occurrences;
    }

    stats
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use guildwire_domain::{ChannelId, ErrorCategory, ErrorSeverity};

    use super::*;

    fn ctx(name: &str, category: ErrorCategory, severity: ErrorSeverity, retries: u32) -> ErrorContext {
        ErrorContext {
            channel: ChannelId::from(name),
            category,
            severity,
            retry_count: retries,
            first_seen: Utc::now(),
            last_retry_at: None,
            recovery_actions: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Tests an empty snapshot aggregates to all zeros.
    #[test]
    fn test_empty_snapshot() {
        let stats = aggregate(&[]);

        assert_eq!(stats.total_errors, 0);
        assert_eq!(stats.active_contexts, 0);
        assert!(stats.by_category.is_empty());
        assert!(stats.by_severity.is_empty());
    }

    /// Tests counts are weighted by occurrences per context.
    #[test]
    fn test_occurrence_weighting() {
        let snapshot = vec![
            ctx("a", ErrorCategory::Connection, ErrorSeverity::High, 4),
            ctx("b", ErrorCategory::Connection, ErrorSeverity::Medium, 0),
            ctx("c", ErrorCategory::Authentication, ErrorSeverity::Critical, 2),
        ];

        let stats = aggregate(&snapshot);

        assert_eq!(stats.active_contexts, 3);
        assert_eq!(stats.total_errors, 5 + 1 + 3);
        assert_eq!(stats.by_category.get(&ErrorCategory::Connection), Some(&6));
        assert_eq!(stats.by_category.get(&ErrorCategory::Authentication), Some(&3));
        assert_eq!(stats.by_severity.get(&ErrorSeverity::High), Some(&5));
        assert_eq!(stats.by_severity.get(&ErrorSeverity::Medium), Some(&1));
        assert_eq!(stats.by_severity.get(&ErrorSeverity::Critical), Some(&3));
    }
}
