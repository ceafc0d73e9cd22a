use crate::layout::{Align, AttendanceDocument, Cell, PageSpec, Rect};
use anyhow::{anyhow, Context};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::path::Path;

const PT_PER_MM: f64 = 72.0 / 25.4;
const LINE_WIDTH_MM: f64 = 0.2;
const CELL_PADDING_MM: f64 = 1.0;

// Standard Type1 advance widths (1/1000 em) for ' '..='~'.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722,
    722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556,
    556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500,
    500, 334, 260, 334, 584,
];
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722,
    722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611,
    611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556,
    500, 389, 280, 389, 584,
];
const FALLBACK_WIDTH: u16 = 556;

/// A JPEG embedded as-is (DCTDecode).
#[derive(Debug, Clone)]
pub struct Logo {
    data: Vec<u8>,
    width: u32,
    height: u32,
    components: u8,
}

impl Logo {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read logo {}", path.to_string_lossy()))?;
        Self::from_jpeg(data)
            .with_context(|| format!("unusable logo {}", path.to_string_lossy()))
    }

    pub fn from_jpeg(data: Vec<u8>) -> anyhow::Result<Self> {
        let (width, height, components) =
            jpeg_frame(&data).ok_or_else(|| anyhow!("not a JPEG image"))?;
        Ok(Self {
            data,
            width,
            height,
            components,
        })
    }

    fn color_space(&self) -> &'static str {
        match self.components {
            1 => "DeviceGray",
            4 => "DeviceCMYK",
            _ => "DeviceRGB",
        }
    }
}

/// Width, height and component count from the first SOFn segment.
fn jpeg_frame(data: &[u8]) -> Option<(u32, u32, u8)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            i += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let seg = data.get(i + 4..i + 2 + len)?;
            if seg.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            return Some((width, height, seg[5]));
        }
        i += 2 + len;
    }
    None
}

pub fn text_width_mm(text: &str, bold: bool, size_pt: f64) -> f64 {
    let table = if bold { &HELVETICA_BOLD } else { &HELVETICA };
    let units: u32 = text
        .chars()
        .map(|c| match c {
            ' '..='~' => table[c as usize - 32] as u32,
            _ => FALLBACK_WIDTH as u32,
        })
        .sum();
    units as f64 / 1000.0 * size_pt / PT_PER_MM
}

/// WinAnsi bytes; anything beyond Latin-1 becomes `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
        .collect()
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

struct Painter<'a> {
    page_h: f64,
    ops: &'a mut Vec<Operation>,
}

impl Painter<'_> {
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        let k = PT_PER_MM;
        self.ops.push(Operation::new("m", vec![real(x1 * k), real((self.page_h - y1) * k)]));
        self.ops.push(Operation::new("l", vec![real(x2 * k), real((self.page_h - y2) * k)]));
        self.ops.push(Operation::new("S", vec![]));
    }

    fn cell(&mut self, c: &Cell) {
        let (x1, y1, x2, y2) = (c.x, c.y, c.x + c.w, c.y + c.h);
        if c.border.left {
            self.line(x1, y1, x1, y2);
        }
        if c.border.top {
            self.line(x1, y1, x2, y1);
        }
        if c.border.right {
            self.line(x2, y1, x2, y2);
        }
        if c.border.bottom {
            self.line(x1, y2, x2, y2);
        }
        if c.text.is_empty() {
            return;
        }

        let tw = text_width_mm(&c.text, c.font.bold, c.font.size_pt);
        let dx = match c.align {
            Align::Left => CELL_PADDING_MM,
            Align::Right => c.w - CELL_PADDING_MM - tw,
            Align::Center => (c.w - tw) / 2.0,
        };
        let font_mm = c.font.size_pt / PT_PER_MM;
        let baseline = c.y + 0.5 * c.h + 0.3 * font_mm;
        let k = PT_PER_MM;
        let font = if c.font.bold { "F2" } else { "F1" };
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new("Tf", vec![name(font), real(c.font.size_pt)]));
        self.ops.push(Operation::new(
            "Td",
            vec![real((c.x + dx) * k), real((self.page_h - baseline) * k)],
        ));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_text(&c.text), StringFormat::Literal)],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn image(&mut self, r: &Rect) {
        let k = PT_PER_MM;
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![
                real(r.w * k),
                real(0.0),
                real(0.0),
                real(r.h * k),
                real(r.x * k),
                real((self.page_h - r.y - r.h) * k),
            ],
        ));
        self.ops.push(Operation::new("Do", vec![name("Im1")]));
        self.ops.push(Operation::new("Q", vec![]));
    }
}

/// Serializes a laid-out sheet. The logo slot stays empty without a logo.
pub fn write_pdf(
    doc: &AttendanceDocument,
    spec: &PageSpec,
    logo: Option<&Logo>,
) -> anyhow::Result<Vec<u8>> {
    let mut pdf = Document::with_version("1.5");
    let pages_id = pdf.new_object_id();
    let regular_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let mut resources = dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    };
    if let Some(logo) = logo {
        let mut image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => logo.width as i64,
                "Height" => logo.height as i64,
                "ColorSpace" => logo.color_space(),
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            logo.data.clone(),
        );
        image.allows_compression = false;
        let image_id = pdf.add_object(image);
        resources.set("XObject", dictionary! { "Im1" => image_id });
    }
    let resources_id = pdf.add_object(resources);

    let mut kids: Vec<Object> = Vec::new();
    for page in &doc.pages {
        let mut ops = vec![Operation::new("w", vec![real(LINE_WIDTH_MM * PT_PER_MM)])];
        let mut painter = Painter {
            page_h: spec.height_mm,
            ops: &mut ops,
        };
        for cell in &page.cells {
            painter.cell(cell);
        }
        if let (Some(slot), true) = (page.logo.as_ref(), logo.is_some()) {
            painter.image(slot);
        }
        let content = Content { operations: ops }
            .encode()
            .context("failed to encode page content")?;
        let content_id = pdf.add_object(Stream::new(dictionary! {}, content));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                real(spec.width_mm * PT_PER_MM),
                real(spec.height_mm * PT_PER_MM),
            ],
        }),
    );
    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);
    let created = chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string();
    let info_id = pdf.add_object(dictionary! {
        "Producer" => Object::string_literal(format!("rollcalld {}", env!("CARGO_PKG_VERSION"))),
        "CreationDate" => Object::string_literal(created),
    });
    pdf.trailer.set("Info", info_id);
    pdf.compress();

    let mut out = Vec::new();
    pdf.save_to(&mut out).context("failed to serialize pdf")?;
    Ok(out)
}
