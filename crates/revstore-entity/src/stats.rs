//! Per-owner storage statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate numbers over everything one owner has stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerStats {
    /// Live file documents.
    pub total_documents: u64,
    /// Revisions across all documents.
    pub total_revisions: u64,
    /// Bytes across all revisions.
    pub total_bytes: u64,
    /// Revision count per extension; extensionless revisions count as `"unknown"`.
    pub by_extension: BTreeMap<String, u64>,
}

impl OwnerStats {
    /// Account for one revision.
    pub fn record_revision(&mut self, file_extension: &str, byte_size: i64) {
        self.record_group(file_extension, 1, byte_size);
    }

    /// Account for `revisions` revisions sharing one extension and totalling
    /// `byte_size` bytes.
    pub fn record_group(&mut self, file_extension: &str, revisions: i64, byte_size: i64) {
        let revisions = revisions.max(0) as u64;
        self.total_revisions += revisions;
        self.total_bytes += byte_size.max(0) as u64;
        let key = match file_extension.trim_start_matches('.') {
            "" => "unknown".to_string(),
            ext => ext.to_string(),
        };
        *self.by_extension.entry(key).or_insert(0) += revisions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_revision() {
        let mut stats = OwnerStats::default();
        stats.record_revision(".pdf", 10);
        stats.record_revision(".pdf", 20);
        stats.record_revision("", 5);

        assert_eq!(stats.total_revisions, 3);
        assert_eq!(stats.total_bytes, 35);
        assert_eq!(stats.by_extension.get("pdf"), Some(&2));
        assert_eq!(stats.by_extension.get("unknown"), Some(&1));
    }

    #[test]
    fn test_record_group_merges_with_single_revisions() {
        let mut stats = OwnerStats::default();
        stats.record_group(".docx", 3, 300);
        stats.record_revision(".docx", 1);

        assert_eq!(stats.total_revisions, 4);
        assert_eq!(stats.total_bytes, 301);
        assert_eq!(stats.by_extension.get("docx"), Some(&4));
    }
}
