use crate::error::{PipelineError, CONFIG_ERROR};
use crate::table::{Table, Value};
use regex::Regex;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

/// Accepted spellings, tried in order; the first present column wins.
pub const STUDENT_ID_SYNONYMS: [&str; 5] = [
    "STUDENT ID",
    "STUDENT_ID",
    "ROLL_NUMBER",
    "Roll_Number",
    "Roll Number",
];
pub const CLASS_SYNONYMS: [&str; 4] = ["CLASS", "Class", "GRADE", "Grade"];

pub const STUDENT_ID_COLUMN: &str = "STUDENT ID";
pub const CLASS_COLUMN: &str = "CLASS";
pub const GENDER_COLUMN: &str = "Gender";

/// Attribute values shared by every student in a group, plus the distinct ID count.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub attributes: Vec<(String, Value)>,
    pub student_count: usize,
}

impl GroupSummary {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Non-missing attribute rendered as text.
    pub fn label(&self, column: &str) -> Option<String> {
        self.get(column)
            .filter(|v| !v.is_missing())
            .map(|v| v.render())
    }
}

/// A summary and the IDs of its rows in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub summary: GroupSummary,
    pub student_ids: Vec<String>,
}

struct GroupKey(Vec<Value>);

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let o = a.compare(b);
            if o != Ordering::Equal {
                return o;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

pub fn resolve_column(table: &Table, candidates: &[&str]) -> Option<usize> {
    candidates.iter().find_map(|c| table.column_index(c))
}

fn digit_run() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()
}

fn has_non_digit(v: &Value) -> bool {
    !v.is_missing() && v.render().chars().any(|c| !c.is_ascii_digit())
}

/// First run of digits, or missing when there is none.
pub fn extract_grade_digits(v: &Value) -> Value {
    if v.is_missing() {
        return Value::Missing;
    }
    let text = v.render();
    match digit_run().and_then(|re| re.find(&text)) {
        Some(m) => Value::text(m.as_str()),
        None => Value::Missing,
    }
}

/// Renames the student-ID and class columns to their canonical names and
/// reduces class values to digits when any of them carries other characters.
/// Returns the renamed table and the student-ID column index.
pub fn normalize(table: &Table) -> Result<(Table, usize), PipelineError> {
    let id_idx = resolve_column(table, &STUDENT_ID_SYNONYMS).ok_or_else(|| {
        PipelineError::new(CONFIG_ERROR, "no recognized student ID column found in the data")
            .with_details(json!({ "accepted": STUDENT_ID_SYNONYMS, "columns": table.columns }))
    })?;
    let class_idx = resolve_column(table, &CLASS_SYNONYMS).ok_or_else(|| {
        PipelineError::new(CONFIG_ERROR, "no recognized class column found in the data")
            .with_details(json!({ "accepted": CLASS_SYNONYMS, "columns": table.columns }))
    })?;

    let mut out = table.clone();
    out.columns[id_idx] = STUDENT_ID_COLUMN.to_string();
    out.columns[class_idx] = CLASS_COLUMN.to_string();

    if out.column_values(class_idx).any(has_non_digit) {
        for row in &mut out.rows {
            row[class_idx] = extract_grade_digits(&row[class_idx]);
        }
    }
    Ok((out, id_idx))
}

/// One group per distinct combination of the populated, non-identifying
/// columns; groups come out sorted by key.
pub fn aggregate(table: &Table) -> Result<Vec<Group>, PipelineError> {
    let (table, id_idx) = normalize(table)?;

    let key_cols: Vec<usize> = (0..table.columns.len())
        .filter(|&i| {
            let name = table.columns[i].as_str();
            i != id_idx && name != GENDER_COLUMN && table.has_any_value(i)
        })
        .collect();
    log::debug!(
        "grouping on columns {:?}",
        key_cols.iter().map(|&i| &table.columns[i]).collect::<Vec<_>>()
    );

    let mut groups: BTreeMap<GroupKey, Vec<String>> = BTreeMap::new();
    for row in &table.rows {
        let key = GroupKey(key_cols.iter().map(|&i| row[i].clone()).collect());
        let ids = groups.entry(key).or_default();
        let id = &row[id_idx];
        if !id.is_missing() {
            ids.push(id.render());
        }
    }

    let out: Vec<Group> = groups
        .into_iter()
        .map(|(key, student_ids)| {
            let distinct: HashSet<&str> = student_ids.iter().map(String::as_str).collect();
            let attributes = key_cols
                .iter()
                .zip(key.0)
                .map(|(&i, v)| (table.columns[i].clone(), v))
                .collect();
            Group {
                summary: GroupSummary {
                    attributes,
                    student_count: distinct.len(),
                },
                student_ids,
            }
        })
        .collect();
    log::info!("built {} groups from {} rows", out.len(), table.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        let mut t = Table::new(columns.iter().copied());
        for r in rows {
            t.push_row(r);
        }
        t
    }

    fn t(s: &str) -> Value {
        Value::text(s)
    }

    #[test]
    fn counts_distinct_ids_per_group() {
        let table = roster(
            &["Roll_Number", "Grade", "School Name", "Gender"],
            vec![
                vec![t("A1"), Value::Int(5), t("Alpha"), t("F")],
                vec![t("A2"), Value::Int(5), t("Alpha"), t("M")],
                vec![t("A2"), Value::Int(5), t("Alpha"), t("M")],
                vec![t("B1"), Value::Int(5), t("Beta"), t("F")],
            ],
        );
        let groups = aggregate(&table).expect("aggregate");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].summary.label("School Name").as_deref(), Some("Alpha"));
        assert_eq!(groups[0].summary.student_count, 2);
        assert_eq!(groups[0].student_ids, vec!["A1", "A2", "A2"]);
        assert_eq!(groups[1].summary.student_count, 1);
        assert!(groups[0].summary.get(GENDER_COLUMN).is_none());
    }

    #[test]
    fn all_missing_columns_do_not_split_groups() {
        let table = roster(
            &["STUDENT ID", "CLASS", "Section"],
            vec![
                vec![t("1"), Value::Int(3), Value::Missing],
                vec![t("2"), Value::Int(3), Value::Missing],
            ],
        );
        let groups = aggregate(&table).expect("aggregate");
        assert_eq!(groups.len(), 1);
        assert!(groups[0].summary.get("Section").is_none());
        assert_eq!(groups[0].summary.student_count, 2);
    }

    #[test]
    fn textual_grades_reduce_to_digits_before_grouping() {
        let table = roster(
            &["Roll Number", "Class"],
            vec![
                vec![t("1"), t("Grade 5")],
                vec![t("2"), Value::Int(5)],
                vec![t("3"), t("KG")],
            ],
        );
        let groups = aggregate(&table).expect("aggregate");
        assert_eq!(groups.len(), 2);
        // missing sorts first
        assert_eq!(groups[0].summary.label(CLASS_COLUMN), None);
        assert_eq!(groups[1].summary.label(CLASS_COLUMN).as_deref(), Some("5"));
        assert_eq!(groups[1].summary.student_count, 2);
    }

    #[test]
    fn groups_sort_numerically() {
        let table = roster(
            &["STUDENT_ID", "GRADE"],
            vec![
                vec![t("x"), Value::Int(10)],
                vec![t("y"), Value::Int(9)],
            ],
        );
        let groups = aggregate(&table).expect("aggregate");
        assert_eq!(groups[0].summary.label(CLASS_COLUMN).as_deref(), Some("9"));
        assert_eq!(groups[1].summary.label(CLASS_COLUMN).as_deref(), Some("10"));
    }

    #[test]
    fn mixed_numeric_and_text_sections_keep_identical_rows_together() {
        let table = roster(
            &["STUDENT ID", "CLASS", "Section"],
            vec![
                vec![t("a"), Value::Int(3), t("1a")],
                vec![t("b"), Value::Int(3), t("9")],
                vec![t("c"), Value::Int(3), t("10")],
                vec![t("d"), Value::Int(3), t("9")],
            ],
        );
        let groups = aggregate(&table).expect("aggregate");
        let sections: Vec<_> = groups
            .iter()
            .map(|g| g.summary.label("Section").unwrap_or_default())
            .collect();
        assert_eq!(sections, vec!["9", "10", "1a"]);
        let nines: Vec<_> = groups
            .iter()
            .filter(|g| g.summary.label("Section").as_deref() == Some("9"))
            .collect();
        assert_eq!(nines.len(), 1);
        assert_eq!(nines[0].student_ids, vec!["b", "d"]);
        assert_eq!(nines[0].summary.student_count, 2);
    }

    #[test]
    fn numerically_equal_spellings_are_separate_groups() {
        let table = roster(
            &["STUDENT ID", "CLASS", "School Name"],
            vec![
                vec![t("a"), Value::Int(3), t("07")],
                vec![t("b"), Value::Int(3), t("7")],
                vec![t("c"), Value::Int(3), t("07")],
            ],
        );
        let groups = aggregate(&table).expect("aggregate");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].summary.label("School Name").as_deref(), Some("07"));
        assert_eq!(groups[0].summary.student_count, 2);
        assert_eq!(groups[1].summary.label("School Name").as_deref(), Some("7"));
        assert_eq!(groups[1].summary.student_count, 1);
    }

    #[test]
    fn synonyms_are_tried_in_priority_order() {
        let table = Table::new(["Roll_Number", "STUDENT ID", "Grade"]);
        assert_eq!(resolve_column(&table, &STUDENT_ID_SYNONYMS), Some(1));
        assert_eq!(resolve_column(&table, &CLASS_SYNONYMS), Some(2));
    }

    #[test]
    fn missing_id_or_class_column_is_a_config_error() {
        let no_id = Table::new(["Name", "Grade"]);
        assert_eq!(aggregate(&no_id).unwrap_err().code, CONFIG_ERROR);
        let no_class = Table::new(["Roll_Number", "School Name"]);
        let e = aggregate(&no_class).unwrap_err();
        assert_eq!(e.code, CONFIG_ERROR);
        assert!(e.message.contains("class"));
    }
}
