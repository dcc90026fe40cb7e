//! Multi-page merge with configurable conflict resolution.
//!
//! Each recovered page is folded into one accumulator, in page order. Where
//! only one side has a value, that value is kept. Where both sides have one,
//! [`MergePolicy`] decides:
//!
//! - `FirstNonNullWins`: the accumulator keeps what it already has.
//! - `ScoreBased`: the candidate replaces the existing value only when its
//!   detail score is strictly greater. Top-level `extra_fields` collisions
//!   collect distinct values instead.
//!
//! Groups merge recursively under both policies. A shape mismatch (a group
//! on one side, a value on the other) is resolved in favour of the
//! candidate and logged; it is never an error.

use crate::config::{ExtractionConfig, MergePolicy};
use crate::record::{Group, MergedRecord, Node, PartialRecord};
use tracing::{debug, warn};

/// Folds page records into one [`MergedRecord`].
#[derive(Debug, Clone)]
pub struct RecordMerger {
    policy: MergePolicy,
    unit_tokens: Vec<String>,
}

impl RecordMerger {
    pub fn new(policy: MergePolicy, unit_tokens: Vec<String>) -> Self {
        Self {
            policy,
            unit_tokens,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.merge_policy, config.unit_tokens.clone())
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Detail score of a value: its character count, plus 10 when it
    /// contains a unit token, plus 5 when it contains a digit.
    pub fn score(&self, value: &str) -> usize {
        let lower = value.to_lowercase();
        let mut score = value.chars().count();
        if self.unit_tokens.iter().any(|u| lower.contains(u.as_str())) {
            score += 10;
        }
        if value.chars().any(|c| c.is_ascii_digit()) {
            score += 5;
        }
        score
    }

    /// Merge one page's record into the accumulator.
    pub fn merge(&self, mut acc: MergedRecord, candidate: PartialRecord) -> MergedRecord {
        self.merge_identity(&mut acc.sensor_type, candidate.sensor_type, "sensor_type");
        self.merge_identity(&mut acc.manufacturer, candidate.manufacturer, "manufacturer");
        self.merge_identity(&mut acc.model, candidate.model, "model");
        self.merge_group(&mut acc.specifications, candidate.specifications, "specifications", false);
        let collect_distinct = self.policy == MergePolicy::ScoreBased;
        self.merge_group(&mut acc.extra_fields, candidate.extra_fields, "extra_fields", collect_distinct);
        acc
    }

    /// Merge a sequence of page records, in order, and prune the result.
    pub fn merge_all<I>(&self, records: I) -> MergedRecord
    where
        I: IntoIterator<Item = PartialRecord>,
    {
        let acc = records
            .into_iter()
            .fold(MergedRecord::default(), |acc, r| self.merge(acc, r));
        Self::finalize(acc)
    }

    /// Drop empty specification groups and empty extra fields.
    pub fn finalize(mut acc: MergedRecord) -> MergedRecord {
        acc.prune();
        acc
    }

    fn merge_identity(&self, slot: &mut Option<String>, candidate: Option<String>, field: &str) {
        let Some(candidate) = candidate else {
            return;
        };
        match slot {
            None => *slot = Some(candidate),
            Some(existing) => match self.policy {
                MergePolicy::FirstNonNullWins => {}
                MergePolicy::ScoreBased => {
                    if self.score(&candidate) > self.score(existing) {
                        debug!(field, "Replacing '{}' with higher-scoring '{}'", existing, candidate);
                        *existing = candidate;
                    }
                }
            },
        }
    }

    fn merge_group(&self, acc: &mut Group, candidate: Group, path: &str, collect_distinct: bool) {
        for (key, node) in candidate {
            match acc.get_mut(&key) {
                None => {
                    acc.insert(key, node);
                }
                Some(existing) => {
                    let child = format!("{path}.{key}");
                    self.merge_node(existing, node, &child, collect_distinct);
                }
            }
        }
    }

    fn merge_node(&self, existing: &mut Node, candidate: Node, path: &str, collect_distinct: bool) {
        match (existing, candidate) {
            (Node::Group(acc), Node::Group(cand)) => self.merge_group(acc, cand, path, false),
            (existing, candidate) if existing.is_leaf_like() && candidate.is_leaf_like() => {
                self.resolve_value(existing, candidate, path, collect_distinct)
            }
            (existing, candidate) => {
                warn!(
                    "Shape mismatch at {}: replacing {} with {}",
                    path,
                    existing.kind(),
                    candidate.kind()
                );
                *existing = candidate;
            }
        }
    }

    fn resolve_value(&self, existing: &mut Node, candidate: Node, path: &str, collect_distinct: bool) {
        match self.policy {
            MergePolicy::FirstNonNullWins => {}
            MergePolicy::ScoreBased if collect_distinct => add_distinct(existing, candidate),
            MergePolicy::ScoreBased => {
                if self.score(&candidate.text()) > self.score(&existing.text()) {
                    debug!("Replacing value at {} with higher-scoring candidate", path);
                    *existing = candidate;
                }
            }
        }
    }
}

/// Turn `existing` into the ordered set of distinct values seen so far.
fn add_distinct(existing: &mut Node, candidate: Node) {
    if *existing == candidate {
        return;
    }
    let mut values = match std::mem::replace(existing, Node::List(Vec::new())) {
        Node::List(items) => items,
        other => vec![other],
    };
    let incoming = match candidate {
        Node::List(items) => items,
        other => vec![other],
    };
    for value in incoming {
        if !values.contains(&value) {
            values.push(value);
        }
    }
    *existing = if values.len() == 1 {
        values.remove(0)
    } else {
        Node::List(values)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_UNIT_TOKENS;
    use serde_json::{json, Value};

    fn merger(policy: MergePolicy) -> RecordMerger {
        RecordMerger::new(policy, DEFAULT_UNIT_TOKENS.iter().map(|s| s.to_string()).collect())
    }

    fn partial(v: Value) -> PartialRecord {
        match v {
            Value::Object(m) => PartialRecord::from_object(m),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn score_components() {
        let m = merger(MergePolicy::ScoreBased);
        assert_eq!(m.score("fast"), 4 + 10); // "a" is a unit token
        assert_eq!(m.score("3.3 V"), 5 + 10 + 5);
        assert_eq!(m.score("ok"), 2);
        assert_eq!(m.score("°C"), 2 + 10);
    }

    #[test]
    fn three_page_scenario() {
        let pages = vec![
            partial(json!({"model": "X1", "manufacturer": "Acme"})),
            partial(json!({
                "sensor_type": "Pressure Sensor",
                "specifications": {"performance": {"range": "0-10 bar"}}
            })),
        ];
        let record = merger(MergePolicy::ScoreBased).merge_all(pages);
        assert_eq!(
            record.to_document(),
            json!({
                "model": "X1",
                "manufacturer": "Acme",
                "sensor_type": "Pressure Sensor",
                "specifications": {"performance": {"range": "0-10 bar"}}
            })
        );
    }

    #[test]
    fn first_non_null_keeps_earliest() {
        let pages = vec![
            partial(json!({"model": "X1", "specifications": {"electrical": {"supply": "5 V"}}})),
            partial(json!({"model": "X1-200 Series", "specifications": {"electrical": {"supply": "4.5 V to 5.5 V DC", "output": "analog"}}})),
        ];
        let record = merger(MergePolicy::FirstNonNullWins).merge_all(pages);
        assert_eq!(record.model.as_deref(), Some("X1"));
        let doc = record.to_document();
        assert_eq!(doc["specifications"]["electrical"]["supply"], "5 V");
        assert_eq!(doc["specifications"]["electrical"]["output"], "analog");
    }

    #[test]
    fn score_based_prefers_more_detail() {
        let pages = vec![
            partial(json!({"specifications": {"electrical": {"supply": "5 V"}}})),
            partial(json!({"specifications": {"electrical": {"supply": "4.5 V to 5.5 V DC"}}})),
        ];
        let doc = merger(MergePolicy::ScoreBased).merge_all(pages).to_document();
        assert_eq!(doc["specifications"]["electrical"]["supply"], "4.5 V to 5.5 V DC");
    }

    #[test]
    fn score_tie_keeps_first_seen() {
        let pages = vec![
            partial(json!({"model": "AB-1"})),
            partial(json!({"model": "AB-2"})),
        ];
        let record = merger(MergePolicy::ScoreBased).merge_all(pages);
        assert_eq!(record.model.as_deref(), Some("AB-1"));
    }

    #[test]
    fn score_based_merge_is_deterministic() {
        let pages = || {
            vec![
                partial(json!({"manufacturer": "Acme", "extra_fields": {"notes": "rev A"}})),
                partial(json!({"manufacturer": "Acme Corp.", "extra_fields": {"notes": "rev B"}})),
                partial(json!({"manufacturer": "ACME", "extra_fields": {"notes": "rev A"}})),
            ]
        };
        let m = merger(MergePolicy::ScoreBased);
        assert_eq!(m.merge_all(pages()), m.merge_all(pages()));
    }

    #[test]
    fn extra_fields_collect_distinct_values() {
        let pages = vec![
            partial(json!({"extra_fields": {"certifications": "CE"}})),
            partial(json!({"extra_fields": {"certifications": "RoHS"}})),
            partial(json!({"extra_fields": {"certifications": "CE"}})),
            partial(json!({"extra_fields": {"certifications": ["RoHS", "UL"]}})),
        ];
        let doc = merger(MergePolicy::ScoreBased).merge_all(pages).to_document();
        assert_eq!(doc["extra_fields"]["certifications"], json!(["CE", "RoHS", "UL"]));
    }

    #[test]
    fn extra_fields_equal_values_stay_scalar() {
        let pages = vec![
            partial(json!({"extra_fields": {"package": "SOT-23"}})),
            partial(json!({"extra_fields": {"package": "SOT-23"}})),
        ];
        let doc = merger(MergePolicy::ScoreBased).merge_all(pages).to_document();
        assert_eq!(doc["extra_fields"]["package"], "SOT-23");
    }

    #[test]
    fn first_non_null_extra_fields_keep_first() {
        let pages = vec![
            partial(json!({"extra_fields": {"certifications": "CE"}})),
            partial(json!({"extra_fields": {"certifications": "RoHS"}})),
        ];
        let doc = merger(MergePolicy::FirstNonNullWins).merge_all(pages).to_document();
        assert_eq!(doc["extra_fields"]["certifications"], "CE");
    }

    #[test]
    fn shape_mismatch_takes_candidate() {
        let pages = vec![
            partial(json!({"specifications": {"performance": "very accurate"}})),
            partial(json!({"specifications": {"performance": {"accuracy": "±0.5 °C"}}})),
        ];
        let doc = merger(MergePolicy::FirstNonNullWins).merge_all(pages).to_document();
        assert_eq!(doc["specifications"]["performance"], json!({"accuracy": "±0.5 °C"}));
    }

    #[test]
    fn only_filled_groups_survive() {
        let pages = vec![partial(json!({
            "specifications": {
                "performance": {"range": "0-10 bar"},
                "electrical": {"supply": null},
                "mechanical": {},
                "environmental": {"operating_temp": "null"}
            }
        }))];
        let record = merger(MergePolicy::ScoreBased).merge_all(pages);
        assert_eq!(record.filled_groups(), vec!["performance"]);
        let doc = record.to_document();
        let groups = doc["specifications"].as_object().unwrap();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn nothing_merged_yields_empty_record() {
        let record = merger(MergePolicy::ScoreBased).merge_all(Vec::new());
        assert!(record.is_empty());
        assert_eq!(record.to_document(), json!({"specifications": {}}));
    }
}
