#[path = "../src/table.rs"]
mod table;
#[path = "../src/ids.rs"]
mod ids;

use ids::{assign_codes, build_composite_id, DigitWidths, HierarchyField, HierarchyRow, ParamSet};
use std::collections::HashSet;
use table::{Value, NOT_APPLICABLE};

fn column(raw: &[&str]) -> Vec<Value> {
    raw.iter()
        .map(|s| if s.is_empty() { Value::Missing } else { Value::text(*s) })
        .collect()
}

#[test]
fn sentinel_and_blanks_share_the_zero_code() {
    let values = column(&["NA", "East", "", "West", "NA", "East"]);
    let codes = assign_codes(&values, NOT_APPLICABLE, 3);
    assert_eq!(codes.code_for(&Value::text("NA")), "000");
    assert_eq!(codes.code_for(&Value::Missing), "000");
    assert_eq!(codes.code_for(&Value::text("East")), "001");
    assert_eq!(codes.code_for(&Value::text("West")), "002");
    assert_eq!(codes.values(), ["East", "West"]);
}

#[test]
fn distinct_values_never_share_a_code() {
    let raw: Vec<String> = (0..150).map(|i| format!("school-{}", i % 120)).collect();
    let values: Vec<Value> = raw.iter().map(|s| Value::text(s.as_str())).collect();
    let codes = assign_codes(&values, NOT_APPLICABLE, 2);
    assert_eq!(codes.len(), 120);
    let assigned: HashSet<String> = codes
        .values()
        .iter()
        .map(|v| codes.code_for(&Value::text(v.as_str())))
        .collect();
    assert_eq!(assigned.len(), 120);
    // widths only pad; large runs keep every digit
    assert_eq!(codes.code_for(&Value::text("school-119")), "120");
}

#[test]
fn composite_length_is_sum_of_present_widths() {
    let digits = DigitWidths::DEFAULT_MODE;
    let mut row = HierarchyRow::new();
    row.insert(HierarchyField::Partner, Value::text("7"));
    row.insert(HierarchyField::District, Value::text("03"));
    row.insert(HierarchyField::Block, Value::Missing);
    row.insert(HierarchyField::School, Value::text("0042"));
    row.insert(HierarchyField::Grade, Value::Int(9));
    row.insert(HierarchyField::Student, Value::text("015"));

    for set in ParamSet::ALL {
        let id = build_composite_id(&row, set.fields());
        let expected: usize = set
            .fields()
            .iter()
            .map(|f| match f {
                HierarchyField::Partner | HierarchyField::Grade => 1,
                HierarchyField::District => digits.district,
                HierarchyField::Block => 0,
                HierarchyField::School => digits.school,
                HierarchyField::Student => digits.student,
            })
            .sum();
        assert_eq!(id.len(), expected, "{}", set.key());
    }
    assert_eq!(build_composite_id(&row, ParamSet::A8.fields()), "70300429015");
}
