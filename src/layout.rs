//! Attendance sheet layout.
//!
//! Produces a device-independent description of the pages (bordered text
//! cells plus one logo slot, millimetres from the top-left corner) which
//! `pdf` turns into bytes. Column widths are design constants scaled down
//! proportionally when they do not fit between the page margins.

use crate::error::{PipelineError, DATA_INCONSISTENCY};
use crate::group::GroupSummary;
use serde_json::json;

pub const COLUMN_NAMES: [&str; 8] = [
    "S.NO",
    "STUDENT ID",
    "STUDENT NAME",
    "GENDER",
    "TAB ID",
    "SESSION",
    "SUBJECT 1",
    "SUBJECT 2",
];
pub const COLUMN_WIDTHS_MM: [f64; 8] = [6.0, 15.0, 60.0, 10.0, 10.0, 23.0, 24.0, 24.0];
const COLUMN_HINTS: [&str; 8] = [
    "",
    "",
    "",
    "",
    "",
    "(morning/afternoon)",
    "Present/Absent",
    "Present/Absent",
];

pub const HEADER_LABELS: [&str; 5] = ["DISTRICT", "BLOCK", "SCHOOL NAME", "CLASS", "SECTION"];

const TITLE: &str = "ATTENDANCE LIST";
const SUBTITLE: &str = "(PLEASE FILL ALL THE DETAILS IN BLOCK LETTERS)";
const DATE_BLANK: &str = "DATE OF ASSESSMENT : ______________            ";

const TITLE_BOX_H: f64 = 10.0;
const INFO_LINE_H: f64 = 3.0;
const INFO_BOX_H: f64 = 5.0 * INFO_LINE_H;
const TABLE_HEAD_TOP_H: f64 = 4.0;
const TABLE_HEAD_NAME_H: f64 = 0.5;
const TABLE_HEAD_HINT_H: f64 = 4.5;
pub const ROW_H: f64 = 9.0;
const LOGO_W: f64 = 15.0;
const LOGO_H: f64 = 5.0;
/// Distance from the table's right edge to the logo's left edge.
const LOGO_INSET: f64 = 19.0;
const SCHOOL_NAME_SHARE: f64 = 0.65;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSpec {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_left_mm: f64,
    pub margin_right_mm: f64,
    pub margin_top_mm: f64,
    pub margin_bottom_mm: f64,
}

impl PageSpec {
    pub const A4: PageSpec = PageSpec {
        width_mm: 210.0,
        height_mm: 297.0,
        margin_left_mm: 18.0,
        margin_right_mm: 18.0,
        margin_top_mm: 20.0,
        margin_bottom_mm: 20.0,
    };

    pub fn usable_width(&self) -> f64 {
        self.width_mm - self.margin_left_mm - self.margin_right_mm
    }

    fn bottom_limit(&self) -> f64 {
        self.height_mm - self.margin_bottom_mm
    }

    /// Rows that fit under the full header block on the first page.
    pub fn rows_first_page(&self) -> usize {
        let start = self.margin_top_mm + TITLE_BOX_H + INFO_BOX_H + table_head_h();
        rows_between(start, self.bottom_limit())
    }

    /// Rows that fit under the repeated table header on later pages.
    pub fn rows_continuation_page(&self) -> usize {
        rows_between(self.margin_top_mm + table_head_h(), self.bottom_limit())
    }
}

fn table_head_h() -> f64 {
    TABLE_HEAD_TOP_H + TABLE_HEAD_NAME_H + TABLE_HEAD_HINT_H
}

fn rows_between(start: f64, limit: f64) -> usize {
    let n = ((limit - start) / ROW_H + 1e-9).floor();
    if n > 0.0 {
        n as usize
    } else {
        0
    }
}

/// Scales every width by `available / sum` when the sum exceeds `available`;
/// otherwise returns the widths unchanged.
pub fn fit_column_widths(widths: &[f64], available: f64) -> Vec<f64> {
    let total: f64 = widths.iter().sum();
    if total > available && total > 0.0 {
        let factor = available / total;
        widths.iter().map(|w| w * factor).collect()
    } else {
        widths.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Border {
    pub left: bool,
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
}

impl Border {
    pub const NONE: Border = Border {
        left: false,
        top: false,
        right: false,
        bottom: false,
    };
    pub const ALL: Border = Border {
        left: true,
        top: true,
        right: true,
        bottom: true,
    };

    /// Edge letters, e.g. "LTR".
    pub fn edges(spec: &str) -> Border {
        Border {
            left: spec.contains('L'),
            top: spec.contains('T'),
            right: spec.contains('R'),
            bottom: spec.contains('B'),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    pub bold: bool,
    pub size_pt: f64,
}

impl Font {
    const fn regular(size_pt: f64) -> Font {
        Font {
            bold: false,
            size_pt,
        }
    }

    const fn bold(size_pt: f64) -> Font {
        Font {
            bold: true,
            size_pt,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub text: String,
    pub border: Border,
    pub align: Align,
    pub font: Font,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub cells: Vec<Cell>,
    pub logo: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceDocument {
    pub pages: Vec<Page>,
    pub column_widths: Vec<f64>,
    pub student_count: usize,
}

impl AttendanceDocument {
    /// Student IDs placed in the table, in row order.
    #[cfg(test)]
    pub fn student_ids(&self) -> Vec<&str> {
        let cols = self.column_widths.len();
        let mut out = Vec::new();
        for page in &self.pages {
            let rows: Vec<&Cell> = page.cells.iter().filter(|c| c.h == ROW_H).collect();
            out.extend(
                rows.chunks(cols)
                    .filter_map(|r| r.get(1).copied())
                    .map(|c| c.text.as_str()),
            );
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStage {
    NewPage,
    HeaderBlock,
    TableHeader,
    TableRows,
    PageBreak,
    Done,
}

/// Values for the header labels, matched on the first five characters of
/// the attribute name, case-insensitively. Unmatched labels stay blank.
pub fn header_values(summary: &GroupSummary) -> [String; 5] {
    let prefix = |s: &str| s.chars().take(5).collect::<String>().to_lowercase();
    let mut out: [String; 5] = Default::default();
    for (slot, label) in out.iter_mut().zip(HEADER_LABELS) {
        let want = prefix(label);
        if let Some((_, v)) = summary
            .attributes
            .iter()
            .find(|(name, _)| prefix(name.as_str()) == want)
        {
            *slot = v.render();
        }
    }
    out
}

/// Cursor-driven cell placement, one page at a time.
struct Canvas {
    left: f64,
    x: f64,
    y: f64,
    font: Font,
    page: Page,
}

impl Canvas {
    fn new(spec: &PageSpec) -> Self {
        Self {
            left: spec.margin_left_mm,
            x: spec.margin_left_mm,
            y: spec.margin_top_mm,
            font: Font::regular(5.0),
            page: Page::default(),
        }
    }

    fn put(&mut self, w: f64, h: f64, text: &str, border: Border, align: Align) {
        self.page.cells.push(Cell {
            x: self.x,
            y: self.y,
            w,
            h,
            text: text.to_string(),
            border,
            align,
            font: self.font,
        });
    }

    /// Place a cell and move right.
    fn cell(&mut self, w: f64, h: f64, text: &str, border: Border, align: Align) {
        self.put(w, h, text, border, align);
        self.x += w;
    }

    /// Place a cell and move to the start of the next line.
    fn cell_ln(&mut self, w: f64, h: f64, text: &str, border: Border, align: Align) {
        self.put(w, h, text, border, align);
        self.newline(h);
    }

    fn newline(&mut self, h: f64) {
        self.x = self.left;
        self.y += h;
    }

    fn finish(&mut self, spec: &PageSpec) -> Page {
        self.x = self.left;
        self.y = spec.margin_top_mm;
        std::mem::take(&mut self.page)
    }
}

struct LayoutEngine<'a> {
    spec: &'a PageSpec,
    widths: Vec<f64>,
    table_w: f64,
    stage: LayoutStage,
    canvas: Canvas,
    pages: Vec<Page>,
    next_row: usize,
    rows_left_on_page: usize,
}

impl<'a> LayoutEngine<'a> {
    fn new(spec: &'a PageSpec) -> Self {
        let widths = fit_column_widths(&COLUMN_WIDTHS_MM, spec.usable_width());
        let table_w = widths.iter().sum();
        Self {
            spec,
            widths,
            table_w,
            stage: LayoutStage::NewPage,
            canvas: Canvas::new(spec),
            pages: Vec::new(),
            next_row: 0,
            rows_left_on_page: 0,
        }
    }

    fn header_block(&mut self, summary: &GroupSummary) {
        let w = self.table_w;
        let c = &mut self.canvas;
        let top = c.y;

        c.font = Font::bold(7.0);
        c.put(w, TITLE_BOX_H, "", Border::edges("LTR"), Align::Center);
        c.y = top + 2.0;
        c.cell_ln(w, 4.0, TITLE, Border::NONE, Align::Center);
        c.font = Font::regular(3.0);
        c.cell_ln(w, 1.0, SUBTITLE, Border::NONE, Align::Center);
        c.page.logo = Some(Rect {
            x: c.left + w - LOGO_INSET,
            y: top + 2.0,
            w: LOGO_W,
            h: LOGO_H,
        });
        c.y = top + TITLE_BOX_H;

        let [district, block, school, class, section] = header_values(summary);
        c.font = Font::bold(5.0);
        c.put(w, INFO_BOX_H, "", Border::ALL, Align::Left);
        let side = Border::edges("LR");
        c.cell_ln(w, INFO_LINE_H, &format!("DISTRICT : {district}"), side, Align::Left);
        c.cell_ln(w, INFO_LINE_H, &format!("BLOCK : {block}"), side, Align::Left);
        c.cell(
            w * SCHOOL_NAME_SHARE,
            INFO_LINE_H,
            &format!("SCHOOL NAME : {school}"),
            Border::edges("L"),
            Align::Left,
        );
        c.font = Font::bold(4.0);
        c.cell_ln(
            w * (1.0 - SCHOOL_NAME_SHARE),
            INFO_LINE_H,
            DATE_BLANK,
            Border::edges("R"),
            Align::Right,
        );
        c.font = Font::bold(5.0);
        c.cell_ln(w, INFO_LINE_H, &format!("CLASS : {class}"), side, Align::Left);
        c.cell_ln(w, INFO_LINE_H, &format!("SECTION : {section}"), side, Align::Left);
    }

    fn table_header(&mut self) {
        let c = &mut self.canvas;
        c.font = Font::bold(5.0);
        for w in &self.widths {
            c.cell(*w, TABLE_HEAD_TOP_H, "", Border::edges("LTR"), Align::Center);
        }
        c.newline(TABLE_HEAD_TOP_H);
        for (w, name) in self.widths.iter().zip(COLUMN_NAMES) {
            c.cell(*w, TABLE_HEAD_NAME_H, name, Border::edges("LR"), Align::Center);
        }
        c.newline(TABLE_HEAD_NAME_H);
        c.font = Font::regular(5.0);
        for (w, hint) in self.widths.iter().zip(COLUMN_HINTS) {
            c.cell(*w, TABLE_HEAD_HINT_H, hint, Border::edges("LBR"), Align::Center);
        }
        c.newline(TABLE_HEAD_HINT_H);
    }

    fn table_row(&mut self, seq: usize, student_id: &str) {
        let c = &mut self.canvas;
        c.font = Font::regular(6.0);
        let seq = seq.to_string();
        for (i, w) in self.widths.iter().enumerate() {
            let text = match i {
                0 => seq.as_str(),
                1 => student_id,
                _ => "",
            };
            c.cell(*w, ROW_H, text, Border::ALL, Align::Center);
        }
        c.newline(ROW_H);
    }

    fn run(
        mut self,
        summary: &GroupSummary,
        student_ids: &[String],
    ) -> Result<AttendanceDocument, PipelineError> {
        let count = summary.student_count;
        loop {
            self.stage = match self.stage {
                LayoutStage::NewPage => LayoutStage::HeaderBlock,
                LayoutStage::HeaderBlock => {
                    self.header_block(summary);
                    self.rows_left_on_page = self.spec.rows_first_page();
                    LayoutStage::TableHeader
                }
                LayoutStage::TableHeader => {
                    self.table_header();
                    LayoutStage::TableRows
                }
                LayoutStage::TableRows => {
                    while self.next_row < count && self.rows_left_on_page > 0 {
                        let i = self.next_row;
                        let id = student_ids.get(i).ok_or_else(|| {
                            PipelineError::new(
                                DATA_INCONSISTENCY,
                                format!(
                                    "group claims {} students but only {} IDs exist",
                                    count,
                                    student_ids.len()
                                ),
                            )
                            .with_details(json!({
                                "studentCount": count,
                                "available": student_ids.len(),
                                "index": i,
                            }))
                        })?;
                        self.table_row(i + 1, id);
                        self.next_row += 1;
                        self.rows_left_on_page -= 1;
                    }
                    if self.next_row < count {
                        LayoutStage::PageBreak
                    } else {
                        LayoutStage::Done
                    }
                }
                LayoutStage::PageBreak => {
                    let page = self.canvas.finish(self.spec);
                    self.pages.push(page);
                    self.rows_left_on_page = self.spec.rows_continuation_page().max(1);
                    LayoutStage::TableHeader
                }
                LayoutStage::Done => break,
            };
        }
        let last = self.canvas.finish(self.spec);
        self.pages.push(last);
        Ok(AttendanceDocument {
            pages: self.pages,
            column_widths: self.widths,
            student_count: count,
        })
    }
}

/// Lays out one attendance sheet. Row `i` carries the `i`-th entry of
/// `student_ids`; a group claiming more students than it has IDs fails.
pub fn render(
    summary: &GroupSummary,
    student_ids: &[String],
    page: &PageSpec,
) -> Result<AttendanceDocument, PipelineError> {
    LayoutEngine::new(page).run(summary, student_ids)
}
