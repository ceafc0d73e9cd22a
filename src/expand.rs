use crate::error::{PipelineError, BAD_INPUT};
use crate::ids::{
    assign_codes, build_composite_id, zero_pad, DigitWidths, HierarchyField, HierarchyRow,
    ParamSet,
};
use crate::table::{Table, Value, NOT_APPLICABLE};
use serde_json::json;

pub const COL_DISTRICT: &str = "District";
pub const COL_BLOCK: &str = "Block";
pub const COL_SCHOOL_CODE: &str = "School_ID";
pub const COL_SCHOOL_NAME: &str = "School";
pub const COL_TOTAL_STUDENTS: &str = "Total_Students";

pub const STUDENT_ID_COLUMNS: [&str; 6] = [
    "Roll_Number",
    "Grade",
    "School Name",
    "School Code",
    "District Name",
    "Block Name",
];
pub const SCHOOL_CODE_COLUMNS: [&str; 2] = ["School Name", "School Code"];

/// Upper bound on student rows in one expansion, summed over all schools.
pub const MAX_STUDENT_ROWS: usize = 1_000_000;

/// One input row: a school and how many students it reports.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    pub district: Value,
    pub block: Value,
    pub school_name: Value,
    pub school_code: Value,
    pub total_students: Value,
}

/// Everything the expander needs from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpandOptions {
    pub partner_id: u32,
    pub grade: u32,
    pub buffer_percent: f64,
    pub digits: DigitWidths,
    pub param_set: ParamSet,
}

/// An enrollment row with its hierarchy codes attached.
#[derive(Debug, Clone, PartialEq)]
pub struct CodedSchool {
    pub record: EnrollmentRecord,
    pub district_code: String,
    pub block_code: String,
    pub school_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub composite_id: String,
    pub student_no: String,
    pub grade: u32,
    pub school_name: Value,
    pub school_code: String,
    pub district: Value,
    pub block: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub schools: Vec<CodedSchool>,
    pub students: Vec<StudentRecord>,
}

fn required_column(table: &Table, name: &str) -> Result<usize, PipelineError> {
    table.column_index(name).ok_or_else(|| {
        PipelineError::new(BAD_INPUT, format!("missing column {}", name))
            .with_details(json!({ "column": name, "columns": table.columns }))
    })
}

pub fn read_enrollment(table: &Table) -> Result<Vec<EnrollmentRecord>, PipelineError> {
    let district = required_column(table, COL_DISTRICT)?;
    let block = required_column(table, COL_BLOCK)?;
    let school_code = required_column(table, COL_SCHOOL_CODE)?;
    let school_name = required_column(table, COL_SCHOOL_NAME)?;
    let total = required_column(table, COL_TOTAL_STUDENTS)?;

    Ok(table
        .rows
        .iter()
        .map(|r| EnrollmentRecord {
            district: r[district].clone(),
            block: r[block].clone(),
            school_name: r[school_name].clone(),
            school_code: r[school_code].clone(),
            total_students: r[total].clone(),
        })
        .collect())
}

/// floor(enrolled * (1 + buffer/100)); zero when the count is missing or not positive.
pub fn seat_count(enrolled: &Value, buffer_percent: f64) -> usize {
    let Some(n) = enrolled.as_f64() else {
        return 0;
    };
    let seats = (n * (1.0 + buffer_percent / 100.0)).floor();
    if seats.is_finite() && seats > 0.0 {
        seats as usize
    } else {
        0
    }
}

pub fn assign_hierarchy(records: Vec<EnrollmentRecord>, digits: &DigitWidths) -> Vec<CodedSchool> {
    let districts = assign_codes(
        records.iter().map(|r| &r.district),
        NOT_APPLICABLE,
        digits.district,
    );
    let blocks = assign_codes(records.iter().map(|r| &r.block), NOT_APPLICABLE, digits.block);
    let schools = assign_codes(
        records.iter().map(|r| &r.school_code),
        NOT_APPLICABLE,
        digits.school,
    );
    log::debug!(
        "assigned codes: {} districts, {} blocks, {} schools",
        districts.len(),
        blocks.len(),
        schools.len()
    );
    log::debug!("district order: {:?}", districts.values());

    records
        .into_iter()
        .map(|record| CodedSchool {
            district_code: districts.code_for(&record.district),
            block_code: blocks.code_for(&record.block),
            school_code: schools.code_for(&record.school_code),
            record,
        })
        .collect()
}

/// One school row becomes one student row per seat, numbered 1..=seats.
pub fn expand_school(school: &CodedSchool, opts: &ExpandOptions) -> Vec<StudentRecord> {
    let seats = seat_count(&school.record.total_students, opts.buffer_percent);
    let mut row = HierarchyRow::new();
    row.insert(HierarchyField::Partner, Value::text(opts.partner_id.to_string()));
    row.insert(HierarchyField::District, Value::text(school.district_code.clone()));
    row.insert(HierarchyField::Block, Value::text(school.block_code.clone()));
    row.insert(HierarchyField::School, Value::text(school.school_code.clone()));
    row.insert(HierarchyField::Grade, Value::Int(opts.grade as i64));

    let fields = opts.param_set.fields();
    (1..=seats)
        .map(|i| {
            let student_no = zero_pad(i, opts.digits.student);
            row.insert(HierarchyField::Student, Value::text(student_no.clone()));
            StudentRecord {
                composite_id: build_composite_id(&row, fields),
                student_no,
                grade: opts.grade,
                school_name: school.record.school_name.clone(),
                school_code: school.school_code.clone(),
                district: school.record.district.clone(),
                block: school.record.block.clone(),
            }
        })
        .collect()
}

/// Rejects enrollment counts that would expand past `MAX_STUDENT_ROWS`.
fn check_seat_total(
    records: &[EnrollmentRecord],
    buffer_percent: f64,
) -> Result<(), PipelineError> {
    let mut total: usize = 0;
    for r in records {
        let seats = seat_count(&r.total_students, buffer_percent);
        total = total.saturating_add(seats);
        if total > MAX_STUDENT_ROWS {
            return Err(PipelineError::new(
                BAD_INPUT,
                format!(
                    "{} {} for school {} exceeds the limit of {} student rows",
                    COL_TOTAL_STUDENTS,
                    r.total_students.render(),
                    r.school_name.render(),
                    MAX_STUDENT_ROWS
                ),
            )
            .with_details(json!({
                "school": r.school_name.render(),
                "seats": seats,
                "max": MAX_STUDENT_ROWS,
            })));
        }
    }
    Ok(())
}

pub fn expand_all(
    records: Vec<EnrollmentRecord>,
    opts: &ExpandOptions,
) -> Result<Expansion, PipelineError> {
    check_seat_total(&records, opts.buffer_percent)?;
    let schools = assign_hierarchy(records, &opts.digits);
    let mut students = Vec::new();
    for school in &schools {
        let before = students.len();
        students.extend(expand_school(school, opts));
        if students.len() == before {
            log::debug!(
                "school {} produced no seats",
                school.record.school_name.render()
            );
        }
    }
    log::info!(
        "expanded {} schools into {} student rows",
        schools.len(),
        students.len()
    );
    Ok(Expansion { schools, students })
}

/// The per-student workbook: one row per seat.
pub fn student_id_table(students: &[StudentRecord]) -> Table {
    let mut t = Table::new(STUDENT_ID_COLUMNS);
    for s in students {
        t.push_row(vec![
            Value::text(s.composite_id.clone()),
            Value::Int(s.grade as i64),
            s.school_name.clone(),
            Value::text(s.school_code.clone()),
            s.district.clone(),
            s.block.clone(),
        ]);
    }
    t
}

/// The school-code workbook: one row per input school.
pub fn school_code_table(schools: &[CodedSchool]) -> Table {
    let mut t = Table::new(SCHOOL_CODE_COLUMNS);
    for s in schools {
        t.push_row(vec![
            s.record.school_name.clone(),
            Value::text(s.school_code.clone()),
        ]);
    }
    t
}
