use crate::table::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HierarchyField {
    Partner,
    District,
    Block,
    School,
    Grade,
    Student,
}

impl HierarchyField {
    pub fn label(self) -> &'static str {
        match self {
            HierarchyField::Partner => "Partner",
            HierarchyField::District => "District",
            HierarchyField::Block => "Block",
            HierarchyField::School => "School",
            HierarchyField::Grade => "Grade",
            HierarchyField::Student => "Student",
        }
    }
}

/// Named, ordered selection of hierarchy fields that make up a composite ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamSet {
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    A8,
}

impl ParamSet {
    pub const ALL: [ParamSet; 8] = [
        ParamSet::A1,
        ParamSet::A2,
        ParamSet::A3,
        ParamSet::A4,
        ParamSet::A5,
        ParamSet::A6,
        ParamSet::A7,
        ParamSet::A8,
    ];

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.key().eq_ignore_ascii_case(key.trim()))
    }

    pub fn key(self) -> &'static str {
        match self {
            ParamSet::A1 => "A1",
            ParamSet::A2 => "A2",
            ParamSet::A3 => "A3",
            ParamSet::A4 => "A4",
            ParamSet::A5 => "A5",
            ParamSet::A6 => "A6",
            ParamSet::A7 => "A7",
            ParamSet::A8 => "A8",
        }
    }

    pub fn fields(self) -> &'static [HierarchyField] {
        use HierarchyField::*;
        match self {
            ParamSet::A1 => &[School, Grade, Student],
            ParamSet::A2 => &[Block, School, Grade, Student],
            ParamSet::A3 => &[District, School, Grade, Student],
            ParamSet::A4 => &[Partner, School, Grade, Student],
            ParamSet::A5 => &[District, Block, School, Grade, Student],
            ParamSet::A6 => &[Partner, Block, School, Grade, Student],
            ParamSet::A7 => &[Partner, District, School, Grade, Student],
            ParamSet::A8 => &[Partner, District, Block, School, Grade, Student],
        }
    }

    /// e.g. "Partner + School + Grade + Student"
    pub fn description(self) -> String {
        self.fields()
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitWidths {
    pub district: usize,
    pub block: usize,
    pub school: usize,
    pub student: usize,
}

impl DigitWidths {
    pub const DEFAULT_MODE: DigitWidths = DigitWidths {
        district: 2,
        block: 2,
        school: 4,
        student: 3,
    };

    pub const CUSTOM_MODE: DigitWidths = DigitWidths {
        district: 2,
        block: 2,
        school: 3,
        student: 4,
    };
}

pub fn zero_pad(n: usize, width: usize) -> String {
    format!("{:0width$}", n, width = width)
}

/// Codes assigned to the distinct values of one categorical column.
#[derive(Debug, Clone)]
pub struct HierarchyCodes {
    sentinel: String,
    zero: String,
    by_value: HashMap<String, String>,
    order: Vec<String>,
}

impl HierarchyCodes {
    fn is_sentinel(&self, raw: &Value) -> bool {
        match raw {
            Value::Text(s) => s.trim() == self.sentinel,
            other => other.is_missing(),
        }
    }

    /// Sentinel and missing values map to the zero code.
    pub fn code_for(&self, raw: &Value) -> String {
        if self.is_sentinel(raw) {
            return self.zero.clone();
        }
        self.by_value
            .get(&raw.render())
            .cloned()
            .unwrap_or_else(|| self.zero.clone())
    }

    /// Distinct non-sentinel values, in the order their codes were handed out.
    pub fn values(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// Single ordered scan: the first time a value is seen it gets the next code,
/// starting at 1. Codes wider than `width` are left to grow.
pub fn assign_codes<'a, I>(values: I, sentinel: &str, width: usize) -> HierarchyCodes
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut codes = HierarchyCodes {
        sentinel: sentinel.to_string(),
        zero: zero_pad(0, width),
        by_value: HashMap::new(),
        order: Vec::new(),
    };
    for raw in values {
        if codes.is_sentinel(raw) {
            continue;
        }
        let key = raw.render();
        if codes.by_value.contains_key(&key) {
            continue;
        }
        let code = zero_pad(codes.order.len() + 1, width);
        codes.by_value.insert(key.clone(), code);
        codes.order.push(key);
    }
    codes
}

pub type HierarchyRow = BTreeMap<HierarchyField, Value>;

/// Concatenates the present fields of `row` in `fields` order. Absent or
/// missing fields are skipped, so IDs of heterogeneous rows can differ in length.
pub fn build_composite_id(row: &HierarchyRow, fields: &[HierarchyField]) -> String {
    let mut out = String::new();
    for field in fields {
        match row.get(field) {
            Some(v) if !v.is_missing() => out.push_str(&v.render()),
            _ => {}
        }
    }
    out
}

/// Shape of the IDs a configuration produces, one `X` per digit, parts separated by spaces.
pub fn id_format_preview(
    param_set: ParamSet,
    digits: &DigitWidths,
    partner_id: u32,
    grade: u32,
) -> String {
    param_set
        .fields()
        .iter()
        .map(|f| {
            let n = match f {
                HierarchyField::Partner => partner_id.to_string().len(),
                HierarchyField::District => digits.district,
                HierarchyField::Block => digits.block,
                HierarchyField::School => digits.school,
                HierarchyField::Grade => grade.to_string().len(),
                HierarchyField::Student => digits.student,
            };
            "X".repeat(n)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(v: &[&str]) -> Vec<Value> {
        v.iter().map(|s| Value::text(*s)).collect()
    }

    #[test]
    fn codes_follow_first_seen_order() {
        let vals = texts(&["North", "South", "North", "East"]);
        let codes = assign_codes(&vals, "NA", 2);
        assert_eq!(codes.code_for(&Value::text("North")), "01");
        assert_eq!(codes.code_for(&Value::text("South")), "02");
        assert_eq!(codes.code_for(&Value::text("East")), "03");
        assert_eq!(codes.len(), 3);
    }

    #[test]
    fn sentinel_and_missing_map_to_zero_code() {
        let vals = vec![Value::text("NA"), Value::Missing, Value::text("West")];
        let codes = assign_codes(&vals, "NA", 3);
        assert_eq!(codes.code_for(&Value::text("NA")), "000");
        assert_eq!(codes.code_for(&Value::Missing), "000");
        assert_eq!(codes.code_for(&Value::text("West")), "001");
    }

    #[test]
    fn codes_grow_past_width_instead_of_failing() {
        let vals: Vec<Value> = (0..12).map(Value::Int).collect();
        let codes = assign_codes(&vals, "NA", 1);
        assert_eq!(codes.code_for(&Value::Int(11)), "12");
    }

    #[test]
    fn whole_float_and_int_share_a_code() {
        let vals = vec![Value::Int(1001), Value::Float(1001.0), Value::Int(1002)];
        let codes = assign_codes(&vals, "NA", 4);
        assert_eq!(codes.code_for(&Value::Float(1001.0)), "0001");
        assert_eq!(codes.code_for(&Value::Int(1002)), "0002");
    }

    #[test]
    fn composite_id_skips_missing_fields() {
        let mut row = HierarchyRow::new();
        row.insert(HierarchyField::Partner, Value::text("7"));
        row.insert(HierarchyField::School, Value::text("0012"));
        row.insert(HierarchyField::Grade, Value::Float(5.0));
        row.insert(HierarchyField::Student, Value::text("003"));
        row.insert(HierarchyField::District, Value::Missing);
        assert_eq!(build_composite_id(&row, ParamSet::A4.fields()), "700125003");
        assert_eq!(build_composite_id(&row, ParamSet::A7.fields()), "700125003");
    }

    #[test]
    fn param_set_lookup_and_preview() {
        assert_eq!(ParamSet::parse("a5"), Some(ParamSet::A5));
        assert_eq!(ParamSet::parse("B1"), None);
        assert_eq!(ParamSet::A4.description(), "Partner + School + Grade + Student");
        assert_eq!(
            id_format_preview(ParamSet::A4, &DigitWidths::DEFAULT_MODE, 1, 1),
            "X XXXX X XXX"
        );
    }
}
