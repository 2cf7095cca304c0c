//! Structural and value comparison of one window.

use std::collections::HashSet;

use crate::core::key::KeyTuple;
use crate::core::traits::FingerprintMap;
use crate::core::value::{Row, SqlValue};

/// Key sets of one window, split by where each key exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPartition {
    /// On the destination only: to be deleted.
    pub source_missing: Vec<KeyTuple>,
    /// On the source only: to be inserted.
    pub dest_missing: Vec<KeyTuple>,
    /// On both sides: to be fingerprinted.
    pub common: Vec<KeyTuple>,
}

/// Split the keys of both sides by canonical form. Input order is kept and
/// duplicates are dropped.
pub fn partition_keys(source: &[KeyTuple], dest: &[KeyTuple]) -> KeyPartition {
    let source_set: HashSet<String> = source.iter().map(KeyTuple::canonical).collect();
    let dest_set: HashSet<String> = dest.iter().map(KeyTuple::canonical).collect();

    let mut partition = KeyPartition::default();
    let mut seen = HashSet::new();
    for key in source {
        let canonical = key.canonical();
        if !seen.insert(canonical.clone()) {
            continue;
        }
        if dest_set.contains(&canonical) {
            partition.common.push(key.clone());
        } else {
            partition.dest_missing.push(key.clone());
        }
    }
    for key in dest {
        let canonical = key.canonical();
        if !source_set.contains(&canonical) && seen.insert(canonical) {
            partition.source_missing.push(key.clone());
        }
    }
    partition
}

/// Keys present in both maps whose fingerprints differ, in key order.
pub fn get_keys_with_differences_in_values(a: &FingerprintMap, b: &FingerprintMap) -> Vec<KeyTuple> {
    let mut keys: Vec<KeyTuple> = a
        .iter()
        .filter_map(|(canonical, fa)| match b.get(canonical) {
            Some(fb) if fb.hash != fa.hash => Some(fa.key.clone()),
            _ => None,
        })
        .collect();
    keys.sort();
    keys
}

/// One changed field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old: SqlValue,
    pub new: SqlValue,
}

/// Field-level difference between a destination row and its source row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDelta {
    pub changes: Vec<FieldChange>,
}

impl FieldDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// New values of the changed fields.
    pub fn values(&self) -> Row {
        self.changes
            .iter()
            .map(|c| (c.field.clone(), c.new.clone()))
            .collect()
    }

    /// `field: old => new, ...` with each value JSON-rendered and truncated.
    pub fn summary(&self) -> String {
        self.changes
            .iter()
            .map(|c| {
                format!(
                    "{}: {} => {}",
                    c.field,
                    c.old.display_truncated(),
                    c.new.display_truncated()
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Compare `fields` of both rows under string-normalized equality. A field
/// absent from a row counts as NULL.
pub fn field_delta(fields: &[String], dest_row: &Row, source_row: &Row) -> FieldDelta {
    let changes = fields
        .iter()
        .filter_map(|field| {
            let old = dest_row.get(field).cloned().unwrap_or(SqlValue::Null);
            let new = source_row.get(field).cloned().unwrap_or(SqlValue::Null);
            old.differs_from(&new).then(|| FieldChange {
                field: field.clone(),
                old,
                new,
            })
        })
        .collect();
    FieldDelta { changes }
}

/// Every one of `fields`, changed or not. Used when the fingerprints differ
/// but the decoded values compare equal.
pub fn full_delta(fields: &[String], dest_row: &Row, source_row: &Row) -> FieldDelta {
    let changes = fields
        .iter()
        .map(|field| FieldChange {
            field: field.clone(),
            old: dest_row.get(field).cloned().unwrap_or(SqlValue::Null),
            new: source_row.get(field).cloned().unwrap_or(SqlValue::Null),
        })
        .collect();
    FieldDelta { changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Fingerprint;

    fn k(id: i64) -> KeyTuple {
        KeyTuple::from_pairs([("id", id)])
    }

    fn fingerprints(entries: &[(i64, &str)]) -> FingerprintMap {
        entries
            .iter()
            .map(|(id, hash)| {
                let key = k(*id);
                (
                    key.canonical(),
                    Fingerprint {
                        hash: hash.to_string(),
                        key,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let source = vec![k(1), k(2), k(3), k(5)];
        let dest = vec![k(2), k(4), k(5), k(6)];
        let p = partition_keys(&source, &dest);
        assert_eq!(p.dest_missing, vec![k(1), k(3)]);
        assert_eq!(p.source_missing, vec![k(4), k(6)]);
        assert_eq!(p.common, vec![k(2), k(5)]);

        let mut all: Vec<String> = p
            .source_missing
            .iter()
            .chain(&p.dest_missing)
            .chain(&p.common)
            .map(KeyTuple::canonical)
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total, "partitions overlap");
        assert_eq!(total, 6);
    }

    #[test]
    fn test_partition_matches_across_value_types() {
        let source = vec![KeyTuple::from_pairs([("id", "7")])];
        let dest = vec![k(7)];
        let p = partition_keys(&source, &dest);
        assert_eq!(p.common.len(), 1);
        assert!(p.source_missing.is_empty());
        assert!(p.dest_missing.is_empty());
    }

    #[test]
    fn test_partition_drops_duplicates() {
        let p = partition_keys(&[k(1), k(1)], &[k(2), k(2)]);
        assert_eq!(p.dest_missing, vec![k(1)]);
        assert_eq!(p.source_missing, vec![k(2)]);
    }

    #[test]
    fn test_diff_reports_only_differing_common_keys() {
        let a = fingerprints(&[(1, "h1"), (2, "h2"), (3, "h3")]);
        let b = fingerprints(&[(1, "h1"), (2, "XX"), (4, "h4")]);
        assert_eq!(get_keys_with_differences_in_values(&a, &b), vec![k(2)]);
        assert!(get_keys_with_differences_in_values(&a, &a).is_empty());
    }

    #[test]
    fn test_field_delta_and_summary() {
        let dest = Row::new().with("id", 2).with("v", "x").with("n", 1);
        let source = Row::new().with("id", 2).with("v", "b").with("n", 1);
        let delta = field_delta(&["v".to_string(), "n".to_string()], &dest, &source);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.summary(), r#"v: "x" => "b""#);
        assert_eq!(delta.values(), Row::new().with("v", "b"));
    }

    #[test]
    fn test_field_delta_treats_null_and_empty_as_different() {
        let dest = Row::new().with("v", SqlValue::Null);
        let source = Row::new().with("v", "");
        let delta = field_delta(&["v".to_string()], &dest, &source);
        assert_eq!(delta.summary(), r#"v: null => """#);
    }
}
