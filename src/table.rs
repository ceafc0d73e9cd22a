use std::cmp::Ordering;
use std::collections::HashSet;

/// Raw spelling of "not applicable" in enrollment uploads.
pub const NOT_APPLICABLE: &str = "NA";

/// A spreadsheet cell after import. `Missing` covers empty cells, error cells and NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// String form used for IDs, file names and labels. Whole floats drop the `.0`.
    pub fn render(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_nan() => String::new(),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", *f as i64),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Missing => None,
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
        }
    }

    /// Total order used for sorting group keys: missing first, then numeric
    /// values by number, then text. Two values are equal only when they render
    /// the same, so "07" and "7" stay apart while `Int(10)` and "10" meet.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        let by_kind = match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_kind.then_with(|| self.render().cmp(&other.render()))
    }
}

/// Column-named rows. Every row holds exactly `columns.len()` values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |r| &r[idx])
    }

    pub fn has_any_value(&self, idx: usize) -> bool {
        self.column_values(idx).any(|v| !v.is_missing())
    }

    /// Number of distinct non-missing values in `name`; 0 when the column is absent.
    pub fn distinct_count(&self, name: &str) -> usize {
        let Some(idx) = self.column_index(name) else {
            return 0;
        };
        self.column_values(idx)
            .filter(|v| !v.is_missing())
            .map(|v| v.render())
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_floats_render_as_integers() {
        assert_eq!(Value::Float(1001.0).render(), "1001");
        assert_eq!(Value::Float(2.5).render(), "2.5");
        assert_eq!(Value::Int(7).render(), "7");
        assert_eq!(Value::Float(f64::NAN).render(), "");
    }

    #[test]
    fn numeric_values_compare_numerically() {
        assert_eq!(Value::Int(9).compare(&Value::Int(10)), Ordering::Less);
        assert_eq!(Value::text("10").compare(&Value::Int(10)), Ordering::Equal);
        assert_eq!(Value::text("b").compare(&Value::text("a")), Ordering::Greater);
        assert_eq!(Value::Missing.compare(&Value::Int(0)), Ordering::Less);
    }

    #[test]
    fn equal_numbers_with_different_spellings_stay_distinct() {
        assert_ne!(Value::text("07").compare(&Value::text("7")), Ordering::Equal);
        assert_ne!(Value::text("1").compare(&Value::text("1.0")), Ordering::Equal);
        assert_eq!(Value::Float(5.0).compare(&Value::text("5")), Ordering::Equal);
    }

    #[test]
    fn mixed_numeric_and_text_values_order_transitively() {
        let nine = Value::text("9");
        let ten = Value::Int(10);
        let mixed = Value::text("1a");
        assert_eq!(nine.compare(&ten), Ordering::Less);
        assert_eq!(ten.compare(&mixed), Ordering::Less);
        assert_eq!(nine.compare(&mixed), Ordering::Less);
        assert_eq!(mixed.compare(&nine), Ordering::Greater);

        let mut values = vec![mixed.clone(), nine.clone(), ten.clone(), Value::Missing];
        values.sort_by(Value::compare);
        assert_eq!(values, vec![Value::Missing, nine, ten, mixed]);
    }

    #[test]
    fn push_row_pads_short_rows() {
        let mut t = Table::new(["a", "b", "c"]);
        t.push_row(vec![Value::Int(1)]);
        assert_eq!(t.rows[0].len(), 3);
        assert!(t.rows[0][2].is_missing());
        assert!(!t.has_any_value(1));
        assert_eq!(t.distinct_count("a"), 1);
        assert_eq!(t.distinct_count("zzz"), 0);
    }
}
