//! Merger stage: outer join of two tables with column reconciliation
//!
//! Rows are matched on a single key column. Every key present on either
//! side yields output rows (a full outer join); columns from the side that
//! lacks the key are null. Columns listed in [`MergeOptions::reconcile`]
//! are collapsed into one column holding the first non-null value, left
//! side first. Other columns present on both sides are kept apart with
//! suffixes.
//!
//! When the two key columns hold different kinds of values (numbers on one
//! side, text on the other) keys are matched by their text, so `2` and
//! `"2"` join.

use crate::error::{ErrorCode, PipelineError, Result};
use crate::table::{Table, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Options controlling the join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Join key column, required on both sides
    pub key: String,
    /// Columns collapsed first-non-null-wins, left side preferred
    pub reconcile: Vec<String>,
    /// Suffixes for overlapping columns that are not reconciled
    pub suffixes: (String, String),
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            key: "id".to_string(),
            reconcile: vec!["name".to_string()],
            suffixes: ("_x".to_string(), "_y".to_string()),
        }
    }
}

impl MergeOptions {
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| {
            Err(PipelineError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                message,
            ))
        };

        if self.key.is_empty() {
            return invalid("merge key must not be empty".to_string());
        }
        if self.reconcile.iter().any(|c| c == &self.key) {
            return invalid(format!(
                "key column '{}' cannot also be reconciled",
                self.key
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.reconcile.iter().find(|c| !seen.insert(c.as_str())) {
            return invalid(format!("column '{}' listed twice in reconcile", dup));
        }
        if self.suffixes.0 == self.suffixes.1 {
            return invalid(format!(
                "merge suffixes must differ, both are '{}'",
                self.suffixes.0
            ));
        }
        Ok(())
    }
}

/// Where an output column takes its value from
#[derive(Debug)]
enum ColumnSource {
    Key,
    Left(usize),
    Right(usize),
    Reconciled {
        left: Option<usize>,
        right: Option<usize>,
    },
}

/// Key wrapper ordering by [`Value::cmp_key`]
struct JoinKey(Value);

impl PartialEq for JoinKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for JoinKey {}

impl PartialOrd for JoinKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JoinKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_key(&other.0)
    }
}

/// How key cells from the two sides are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyMatching {
    /// Keys compare as typed values
    Typed,
    /// Keys compare by their text
    Text,
}

impl KeyMatching {
    fn for_columns(left: &Table, right: &Table, key: &str) -> Self {
        fn kind(value: &Value) -> Option<u8> {
            match value {
                Value::Integer(_) | Value::Float(_) => Some(0),
                Value::Bool(_) => Some(1),
                Value::String(_) => Some(2),
                Value::Null => None,
            }
        }

        let kinds: HashSet<u8> = left
            .column(key)
            .into_iter()
            .flatten()
            .chain(right.column(key).into_iter().flatten())
            .filter_map(kind)
            .collect();
        if kinds.len() > 1 {
            KeyMatching::Text
        } else {
            KeyMatching::Typed
        }
    }

    fn join_key(self, value: &Value) -> JoinKey {
        match self {
            KeyMatching::Typed => JoinKey(value.clone()),
            KeyMatching::Text => JoinKey(Value::String(key_text(value))),
        }
    }
}

/// Text form of a key; whole floats print like integers so `2.0` matches `"2"`
fn key_text(value: &Value) -> String {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            (*f as i64).to_string()
        }
        other => other.to_string(),
    }
}

#[derive(Default)]
struct KeyGroup {
    left: Vec<usize>,
    right: Vec<usize>,
}

fn plan_columns(
    left: &Table,
    right: &Table,
    options: &MergeOptions,
) -> Result<Vec<(String, ColumnSource)>> {
    let key = options.key.as_str();
    let reconciled: HashSet<&str> = options.reconcile.iter().map(String::as_str).collect();
    let carried = |name: &str| name != key && !reconciled.contains(name);

    let mut plan = vec![(key.to_string(), ColumnSource::Key)];
    for (i, name) in left.columns().iter().enumerate() {
        if carried(name) {
            let out = if right.has_column(name) {
                format!("{}{}", name, options.suffixes.0)
            } else {
                name.clone()
            };
            plan.push((out, ColumnSource::Left(i)));
        }
    }
    for (j, name) in right.columns().iter().enumerate() {
        if carried(name) {
            let out = if left.has_column(name) {
                format!("{}{}", name, options.suffixes.1)
            } else {
                name.clone()
            };
            plan.push((out, ColumnSource::Right(j)));
        }
    }
    for name in &options.reconcile {
        plan.push((
            name.clone(),
            ColumnSource::Reconciled {
                left: left.column_index(name),
                right: right.column_index(name),
            },
        ));
    }

    let mut seen = HashSet::new();
    if let Some((dup, _)) = plan.iter().find(|(name, _)| !seen.insert(name.as_str())) {
        return Err(PipelineError::config_with_code(
            ErrorCode::CONFIG_INVALID_VALUE,
            format!(
                "merge would produce column '{}' twice; choose different suffixes",
                dup
            ),
        ));
    }
    Ok(plan)
}

fn warn_on_duplicate_keys(table: &Table, key: &str, side: &str) {
    let duplicated = table
        .key_counts(key)
        .values()
        .filter(|&&count| count > 1)
        .count();
    if duplicated > 0 {
        warn!(
            "{} table has {} duplicated '{}' values; matching rows are combined pairwise",
            side, duplicated, key
        );
    }
}

/// Outer-join `left` and `right` on `options.key`.
///
/// Output rows are ordered by key; rows with a null key never match and
/// follow all keyed rows, left side first. If the key columns hold different
/// kinds of values, keys are matched and emitted as text.
pub fn merge_tables(left: &Table, right: &Table, options: &MergeOptions) -> Result<Table> {
    options.validate()?;
    let key = options.key.as_str();
    let left_key = left
        .column_index(key)
        .ok_or_else(|| PipelineError::key_column_missing(key, "left"))?;
    let right_key = right
        .column_index(key)
        .ok_or_else(|| PipelineError::key_column_missing(key, "right"))?;

    warn_on_duplicate_keys(left, key, "left");
    warn_on_duplicate_keys(right, key, "right");

    let plan = plan_columns(left, right, options)?;

    let matching = KeyMatching::for_columns(left, right, key);
    if matching == KeyMatching::Text {
        warn!(
            "Key column '{}' holds different value types in the left and right tables; matching keys as text",
            key
        );
    }

    let mut groups: BTreeMap<JoinKey, KeyGroup> = BTreeMap::new();
    let (mut left_unkeyed, mut right_unkeyed) = (Vec::new(), Vec::new());
    for (i, row) in left.rows().enumerate() {
        match &row[left_key] {
            Value::Null => left_unkeyed.push(i),
            k => groups.entry(matching.join_key(k)).or_default().left.push(i),
        }
    }
    for (j, row) in right.rows().enumerate() {
        match &row[right_key] {
            Value::Null => right_unkeyed.push(j),
            k => groups.entry(matching.join_key(k)).or_default().right.push(j),
        }
    }

    let mut pairs: Vec<(&Value, Option<usize>, Option<usize>)> = Vec::new();
    let (mut both, mut left_only, mut right_only) = (0usize, 0usize, 0usize);
    for (JoinKey(k), group) in &groups {
        match (group.left.is_empty(), group.right.is_empty()) {
            (false, false) => {
                both += 1;
                for &l in &group.left {
                    pairs.extend(group.right.iter().map(|&r| (k, Some(l), Some(r))));
                }
            }
            (false, true) => {
                left_only += 1;
                pairs.extend(group.left.iter().map(|&l| (k, Some(l), None)));
            }
            (true, false) => {
                right_only += 1;
                pairs.extend(group.right.iter().map(|&r| (k, None, Some(r))));
            }
            (true, true) => {}
        }
    }
    pairs.extend(left_unkeyed.iter().map(|&l| (&Value::Null, Some(l), None)));
    pairs.extend(right_unkeyed.iter().map(|&r| (&Value::Null, None, Some(r))));

    let mut merged = Table::new(plan.iter().map(|(name, _)| name.clone()).collect());
    for (k, l, r) in pairs {
        let l = l.and_then(|i| left.row(i));
        let r = r.and_then(|j| right.row(j));
        let cell = |row: Option<&[Value]>, idx: usize| {
            row.map(|row| row[idx].clone()).unwrap_or(Value::Null)
        };

        let values = plan
            .iter()
            .map(|(_, source)| match source {
                ColumnSource::Key => k.clone(),
                ColumnSource::Left(i) => cell(l, *i),
                ColumnSource::Right(j) => cell(r, *j),
                ColumnSource::Reconciled { left, right } => {
                    let from_left = left.map(|i| cell(l, i)).unwrap_or(Value::Null);
                    if from_left.is_null() {
                        right.map(|j| cell(r, j)).unwrap_or(Value::Null)
                    } else {
                        from_left
                    }
                }
            })
            .collect();
        merged.push_row(values);
    }

    debug!(
        "Merged {} left and {} right rows on '{}': {} keys on both sides, {} left only, {} right only, {} unkeyed",
        left.len(),
        right.len(),
        key,
        both,
        left_only,
        right_only,
        left_unkeyed.len() + right_unkeyed.len()
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{load_table, CsvOptions};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn int(i: i64) -> Value {
        Value::Integer(i)
    }

    fn left_table() -> Table {
        Table::from_rows(
            ["id", "name", "value1"],
            vec![
                vec![int(1), "Alice".into(), int(100)],
                vec![int(2), "Bob".into(), int(200)],
                vec![int(3), "Charlie".into(), int(300)],
            ],
        )
    }

    fn right_table() -> Table {
        Table::from_rows(
            ["id", "name", "value2"],
            vec![
                vec![int(2), "Bob".into(), int(20)],
                vec![int(3), "Charlie".into(), int(30)],
                vec![int(4), "David".into(), int(40)],
            ],
        )
    }

    #[test]
    fn test_outer_join_reference_example() {
        let merged = merge_tables(&left_table(), &right_table(), &MergeOptions::default()).unwrap();

        assert_eq!(merged.columns(), ["id", "value1", "value2", "name"]);
        assert_eq!(merged.len(), 4);

        let ids: Vec<_> = merged.column("id").unwrap().cloned().collect();
        assert_eq!(ids, vec![int(1), int(2), int(3), int(4)]);

        assert_eq!(merged.get(0, "value2"), Some(&Value::Null));
        assert_eq!(merged.get(3, "value1"), Some(&Value::Null));
        assert_eq!(merged.get(1, "value1"), Some(&int(200)));
        assert_eq!(merged.get(1, "value2"), Some(&int(20)));

        let names: Vec<_> = merged.column("name").unwrap().cloned().collect();
        assert_eq!(
            names,
            vec![
                Value::from("Alice"),
                Value::from("Bob"),
                Value::from("Charlie"),
                Value::from("David")
            ]
        );
    }

    #[test]
    fn test_left_name_takes_precedence() {
        let right = Table::from_rows(
            ["id", "name"],
            vec![vec![int(1), "Alicia".into()], vec![int(2), "Robert".into()]],
        );
        let left = Table::from_rows(
            ["id", "name"],
            vec![vec![int(1), "Alice".into()], vec![int(2), Value::Null]],
        );

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.get(0, "name"), Some(&Value::from("Alice")));
        // falls back to the right side when the left value is null
        assert_eq!(merged.get(1, "name"), Some(&Value::from("Robert")));
    }

    #[test]
    fn test_no_name_on_either_side_gives_null_column() {
        let left = Table::from_rows(["id", "a"], vec![vec![int(1), int(10)]]);
        let right = Table::from_rows(["id", "b"], vec![vec![int(2), int(20)]]);

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.columns(), ["id", "a", "b", "name"]);
        assert!(merged.column("name").unwrap().all(Value::is_null));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_name_only_on_right_side() {
        let left = Table::from_rows(["id", "value1"], vec![vec![int(1), int(100)]]);
        let right = Table::from_rows(["id", "name"], vec![vec![int(1), "Alice".into()]]);

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.columns(), ["id", "value1", "name"]);
        assert_eq!(merged.get(0, "name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn test_missing_key_column_names_side() {
        let right = Table::from_rows(["name"], vec![vec!["Bob".into()]]);

        let err = merge_tables(&left_table(), &right, &MergeOptions::default()).unwrap_err();

        match err {
            PipelineError::KeyColumnMissing { column, side, .. } => {
                assert_eq!(column, "id");
                assert_eq!(side, "right");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_columns_get_suffixes() {
        let left = Table::from_rows(["id", "score"], vec![vec![int(1), int(5)]]);
        let right = Table::from_rows(["id", "score"], vec![vec![int(1), int(7)]]);

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.columns(), ["id", "score_x", "score_y", "name"]);
        assert_eq!(merged.get(0, "score_x"), Some(&int(5)));
        assert_eq!(merged.get(0, "score_y"), Some(&int(7)));
    }

    #[test]
    fn test_suffix_collision_is_rejected() {
        let left = Table::from_rows(["id", "score", "score_x"], Vec::<Vec<Value>>::new());
        let right = Table::from_rows(["id", "score"], Vec::<Vec<Value>>::new());

        let err = merge_tables(&left, &right, &MergeOptions::default()).unwrap_err();

        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_VALUE);
    }

    #[test]
    fn test_keys_match_across_integer_and_float() {
        let left = Table::from_rows(["id", "a"], vec![vec![int(1), int(10)]]);
        let right = Table::from_rows(["id", "b"], vec![vec![Value::Float(1.0), int(20)]]);

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get(0, "id"), Some(&int(1)));
        assert_eq!(merged.get(0, "b"), Some(&int(20)));
    }

    #[test]
    fn test_numeric_and_text_keys_match_by_text() {
        let right = Table::from_rows(
            ["id", "name", "value2"],
            vec![
                vec!["2".into(), "Bobby".into(), int(20)],
                vec!["3".into(), Value::Null, int(30)],
                vec!["x4".into(), "David".into(), int(40)],
            ],
        );

        let merged = merge_tables(&left_table(), &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.len(), 4);
        let ids: Vec<_> = merged.column("id").unwrap().cloned().collect();
        assert_eq!(
            ids,
            vec![
                Value::from("1"),
                Value::from("2"),
                Value::from("3"),
                Value::from("x4")
            ]
        );
        assert_eq!(merged.get(1, "name"), Some(&Value::from("Bob")));
        assert_eq!(merged.get(1, "value1"), Some(&int(200)));
        assert_eq!(merged.get(1, "value2"), Some(&int(20)));
        assert_eq!(merged.get(2, "name"), Some(&Value::from("Charlie")));
        assert_eq!(merged.get(3, "value1"), Some(&Value::Null));
    }

    #[test]
    fn test_whole_float_keys_match_text_keys() {
        let left = Table::from_rows(["id", "a"], vec![vec![Value::Float(2.0), int(1)]]);
        let right = Table::from_rows(["id", "b"], vec![vec!["2".into(), int(2)]]);

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get(0, "id"), Some(&Value::from("2")));
        assert_eq!(merged.get(0, "b"), Some(&int(2)));
    }

    #[test]
    fn test_rows_sorted_by_key() {
        let left = Table::from_rows(["id"], vec![vec![int(9)], vec![int(3)]]);
        let right = Table::from_rows(["id"], vec![vec![int(5)], vec![int(1)]]);

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        let ids: Vec<_> = merged.column("id").unwrap().cloned().collect();
        assert_eq!(ids, vec![int(1), int(3), int(5), int(9)]);
    }

    #[test]
    fn test_null_keys_never_match() {
        let left = Table::from_rows(
            ["id", "a"],
            vec![vec![Value::Null, int(1)], vec![int(2), int(2)]],
        );
        let right = Table::from_rows(["id", "b"], vec![vec![Value::Null, int(3)]]);

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get(0, "id"), Some(&int(2)));
        assert_eq!(merged.get(1, "a"), Some(&int(1)));
        assert_eq!(merged.get(1, "b"), Some(&Value::Null));
        assert_eq!(merged.get(2, "b"), Some(&int(3)));
    }

    #[test]
    fn test_duplicate_keys_combine_pairwise() {
        let left = Table::from_rows(
            ["id", "a"],
            vec![vec![int(1), int(10)], vec![int(1), int(11)]],
        );
        let right = Table::from_rows(
            ["id", "b"],
            vec![vec![int(1), int(20)], vec![int(1), int(21)]],
        );

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert_eq!(merged.len(), 4);
        assert_eq!(merged.row(1).unwrap()[1..3], [int(10), int(21)]);
    }

    #[test]
    fn test_empty_inputs_produce_empty_table() {
        let left = Table::from_rows(["id", "name"], Vec::<Vec<Value>>::new());
        let right = Table::from_rows(["id"], Vec::<Vec<Value>>::new());

        let merged = merge_tables(&left, &right, &MergeOptions::default()).unwrap();

        assert!(merged.is_empty());
        assert_eq!(merged.columns(), ["id", "name"]);
    }

    #[derive(Debug)]
    struct Side {
        rows: BTreeMap<String, (Option<String>, i64)>,
    }

    impl Side {
        fn generate(rng: &mut StdRng, ids: usize, prefix: &str) -> Self {
            let mut rows = BTreeMap::new();
            for i in 0..ids {
                if rng.random_bool(0.6) {
                    let name = rng.random_bool(0.75).then(|| format!("{}{}", prefix, i));
                    rows.insert(i.to_string(), (name, rng.random_range(-1000..1000)));
                }
            }
            Side { rows }
        }

        fn to_csv(&self, value_column: &str) -> String {
            let mut csv = format!("id,name,{}\n", value_column);
            for (id, (name, value)) in &self.rows {
                let name = name.as_deref().unwrap_or("");
                csv.push_str(&format!("{},{},{}\n", id, name, value));
            }
            csv
        }

        fn name(&self, id: &str) -> Option<Value> {
            self.rows
                .get(id)
                .and_then(|(name, _)| name.clone())
                .map(Value::String)
        }
    }

    #[test]
    fn test_generated_inputs_hold_outer_join_properties() {
        let dir = TempDir::new().unwrap();
        let left_path = dir.path().join("file1.csv");
        let right_path = dir.path().join("file2.csv");

        for seed in 0..64u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ids = rng.random_range(0..25);
            let mut left = Side::generate(&mut rng, ids, "L");
            let mut right = Side::generate(&mut rng, ids, "R");
            // a non-numeric id turns that side's key column into text
            if rng.random_bool(0.4) {
                let side = if rng.random_bool(0.5) { &mut left } else { &mut right };
                side.rows.insert(format!("x{}", ids), (Some("X".to_string()), 0));
            }
            fs::write(&left_path, left.to_csv("value1")).unwrap();
            fs::write(&right_path, right.to_csv("value2")).unwrap();

            let options = CsvOptions::default();
            let merged = merge_tables(
                &load_table(&left_path, &options).unwrap(),
                &load_table(&right_path, &options).unwrap(),
                &MergeOptions::default(),
            )
            .unwrap();

            let distinct: BTreeSet<&String> =
                left.rows.keys().chain(right.rows.keys()).collect();
            assert_eq!(merged.len(), distinct.len(), "seed {}", seed);

            for row in 0..merged.len() {
                let id = merged.get(row, "id").unwrap().to_string();
                let in_left = left.rows.contains_key(&id);
                let in_right = right.rows.contains_key(&id);
                assert!(in_left || in_right, "seed {} produced unknown id {}", seed, id);

                let expected_name = left
                    .name(&id)
                    .or_else(|| right.name(&id))
                    .unwrap_or(Value::Null);
                assert_eq!(
                    merged.get(row, "name"),
                    Some(&expected_name),
                    "seed {} id {}",
                    seed,
                    id
                );
                if !in_left {
                    assert_eq!(merged.get(row, "value1"), Some(&Value::Null), "seed {}", seed);
                }
                if !in_right {
                    assert_eq!(merged.get(row, "value2"), Some(&Value::Null), "seed {}", seed);
                }
            }
        }
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let reconcile_key = MergeOptions {
            reconcile: vec!["id".to_string()],
            ..Default::default()
        };
        assert!(reconcile_key.validate().is_err());

        let same_suffix = MergeOptions {
            suffixes: ("_a".to_string(), "_a".to_string()),
            ..Default::default()
        };
        assert!(same_suffix.validate().is_err());

        let empty_key = MergeOptions {
            key: String::new(),
            ..Default::default()
        };
        assert!(empty_key.validate().is_err());

        assert!(MergeOptions::default().validate().is_ok());
    }
}
