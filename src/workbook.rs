use crate::table::{Table, Value};
use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Range, Reader};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

pub const SHEET_NAME: &str = "Sheet1";

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Missing,
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) if f.is_nan() => Value::Missing,
        Data::Float(f) => Value::Float(*f),
        Data::String(s) if s.trim().is_empty() => Value::Missing,
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Text(b.to_string()),
        other => Value::Text(other.to_string()),
    }
}

/// First row is the header; rows with no populated cell are skipped.
pub fn range_to_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Table::default();
    };
    let mut table = Table::new(header.iter().map(|c| c.to_string().trim().to_string()));
    for row in rows {
        let values: Vec<Value> = row.iter().map(cell_value).collect();
        if values.iter().all(Value::is_missing) {
            continue;
        }
        table.push_row(values);
    }
    table
}

pub fn read_first_sheet(path: &Path) -> anyhow::Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook {} has no sheets", path.to_string_lossy()))?
        .with_context(|| format!("failed to read first sheet of {}", path.to_string_lossy()))?;
    let table = range_to_table(&range);
    log::debug!(
        "read {} rows x {} columns from {}",
        table.len(),
        table.columns.len(),
        path.to_string_lossy()
    );
    Ok(table)
}

/// Header row in bold, one worksheet row per table row. Missing cells stay blank.
pub fn write_table(table: &Table, path: &Path) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let header_fmt = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (c, name) in table.columns.iter().enumerate() {
        let col = u16::try_from(c).context("too many columns for a worksheet")?;
        sheet.write_string_with_format(0, col, name.as_str(), &header_fmt)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let row_num = u32::try_from(r + 1).context("too many rows for a worksheet")?;
        for (c, value) in row.iter().enumerate() {
            let col = u16::try_from(c).context("too many columns for a worksheet")?;
            match value {
                Value::Missing => {}
                Value::Int(i) => {
                    sheet.write_number(row_num, col, *i as f64)?;
                }
                Value::Float(f) if f.is_nan() => {}
                Value::Float(f) => {
                    sheet.write_number(row_num, col, *f)?;
                }
                Value::Text(s) => {
                    sheet.write_string(row_num, col, s.as_str())?;
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to write workbook {}", path.to_string_lossy()))?;
    Ok(())
}
