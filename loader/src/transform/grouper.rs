//! Group flow records by database and reconcile method factor lists.
//!
//! ```text
//! Parsed flows (row order)          →  One write per database
//! ┌──────────────────────────┐       ┌─────────────────────────┐
//! │ db: A, flow: Zinc        │       │ A: [Zinc, Lead]         │
//! │ db: B, flow: Copper      │  →    ├─────────────────────────┤
//! │ db: A, flow: Lead        │       │ B: [Copper]             │
//! └──────────────────────────┘       └─────────────────────────┘
//! ```
//!
//! Parsers never merge duplicate rows. When new factors extend an existing
//! method, [`merge_factors`] applies the caller's [`DuplicatePolicy`].

use std::collections::{HashMap, HashSet};

use crate::models::{CharacterizationEntry, DuplicatePolicy, FlowId, FlowRecord};

/// Group flows by target database, keeping first-seen database order and row
/// order inside each database.
pub fn group_by_database(flows: Vec<FlowRecord>) -> Vec<(String, Vec<FlowRecord>)> {
    let mut order: Vec<(String, Vec<FlowRecord>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for flow in flows {
        match index.get(&flow.database) {
            Some(&i) => order[i].1.push(flow),
            None => {
                index.insert(flow.database.clone(), order.len());
                order.push((flow.database.clone(), vec![flow]));
            }
        }
    }

    order
}

/// `(database, code)` keys claimed by flows with different identifiers, in
/// order of first conflict.
pub fn conflicting_keys(flows: &[FlowRecord]) -> Vec<(String, String)> {
    let mut owners: HashMap<(&str, &str), FlowId> = HashMap::new();
    let mut reported = HashSet::new();
    let mut conflicts = Vec::new();

    for flow in flows {
        let key = flow.key();
        let owner = *owners.entry(key).or_insert(flow.id);
        if owner != flow.id && reported.insert(key) {
            conflicts.push((key.0.to_string(), key.1.to_string()));
        }
    }

    conflicts
}

/// Flow identifiers that occur more than once, in order of first repetition.
pub fn duplicate_flows(entries: &[CharacterizationEntry]) -> Vec<FlowId> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut duplicates = Vec::new();

    for entry in entries {
        if !seen.insert(entry.flow) && reported.insert(entry.flow) {
            duplicates.push(entry.flow);
        }
    }

    duplicates
}

/// Extend an existing factor list with new entries.
///
/// - [`DuplicatePolicy::KeepAll`]: `existing` followed by `incoming`.
/// - [`DuplicatePolicy::Replace`]: one factor per flow; a flow keeps the
///   position it first appeared at and the value of its last occurrence.
/// - [`DuplicatePolicy::Reject`]: `Err` with every flow that would appear twice.
pub fn merge_factors(
    existing: Vec<CharacterizationEntry>,
    incoming: Vec<CharacterizationEntry>,
    policy: DuplicatePolicy,
) -> Result<Vec<CharacterizationEntry>, Vec<FlowId>> {
    let mut merged = existing;
    merged.extend(incoming);

    match policy {
        DuplicatePolicy::KeepAll => Ok(merged),
        DuplicatePolicy::Reject => {
            let duplicates = duplicate_flows(&merged);
            if duplicates.is_empty() {
                Ok(merged)
            } else {
                Err(duplicates)
            }
        }
        DuplicatePolicy::Replace => {
            let mut position: HashMap<FlowId, usize> = HashMap::new();
            let mut result: Vec<CharacterizationEntry> = Vec::with_capacity(merged.len());
            for entry in merged {
                match position.get(&entry.flow) {
                    Some(&i) => result[i] = entry,
                    None => {
                        position.insert(entry.flow, result.len());
                        result.push(entry);
                    }
                }
            }
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(database: &str, name: &str) -> FlowRecord {
        FlowRecord {
            id: crate::identity::derive_flow_id(database, name, &["soil"]),
            database: database.into(),
            name: name.into(),
            code: name.into(),
            categories: vec!["soil".into()],
            unit: "kg".into(),
            flow_type: "emission".into(),
            cas_number: String::new(),
        }
    }

    fn entry(id: u64, factor: f64) -> CharacterizationEntry {
        CharacterizationEntry {
            flow: FlowId(id),
            factor,
            unit: None,
        }
    }

    #[test]
    fn test_conflicting_keys() {
        let mut water = flow("A", "Zinc");
        water.id = crate::identity::derive_flow_id("A", "Zinc", &["water"]);
        water.categories = vec!["water".into()];

        let flows = vec![flow("A", "Zinc"), flow("A", "Zinc"), flow("B", "Zinc"), water.clone(), water];
        assert_eq!(conflicting_keys(&flows), vec![("A".to_string(), "Zinc".to_string())]);
        assert!(conflicting_keys(&flows[..3]).is_empty());
    }

    #[test]
    fn test_group_by_database_order() {
        let grouped = group_by_database(vec![
            flow("A", "Zinc"),
            flow("B", "Copper"),
            flow("A", "Lead"),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "A");
        let names: Vec<_> = grouped[0].1.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Zinc", "Lead"]);
        assert_eq!(grouped[1].0, "B");
        assert_eq!(grouped[1].1.len(), 1);
    }

    #[test]
    fn test_duplicate_flows() {
        let entries = vec![entry(1, 1.0), entry(2, 1.0), entry(1, 2.0), entry(1, 3.0), entry(2, 0.0)];
        assert_eq!(duplicate_flows(&entries), vec![FlowId(1), FlowId(2)]);
    }

    #[test]
    fn test_merge_keep_all() {
        let merged = merge_factors(
            vec![entry(1, 1.0)],
            vec![entry(1, 2.0), entry(2, 3.0)],
            DuplicatePolicy::KeepAll,
        )
        .unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_replace_keeps_position_takes_latest() {
        let merged = merge_factors(
            vec![entry(1, 1.0), entry(2, 2.0)],
            vec![entry(3, 3.0), entry(1, 10.0), entry(1, 11.0)],
            DuplicatePolicy::Replace,
        )
        .unwrap();
        let pairs: Vec<_> = merged.iter().map(|e| (e.flow.0, e.factor)).collect();
        assert_eq!(pairs, vec![(1, 11.0), (2, 2.0), (3, 3.0)]);
    }

    #[test]
    fn test_merge_reject() {
        let err = merge_factors(
            vec![entry(1, 1.0)],
            vec![entry(2, 2.0), entry(1, 5.0)],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(err, vec![FlowId(1)]);

        assert!(merge_factors(vec![entry(1, 1.0)], vec![entry(2, 2.0)], DuplicatePolicy::Reject).is_ok());
    }
}
