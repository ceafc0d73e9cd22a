use crate::group::{GroupSummary, CLASS_COLUMN};
use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_FILE_NAME: &str = "attendance_Sheets.zip";

const SCHOOL_COLUMN: &str = "School Name";
const DISTRICT_COLUMN: &str = "District Name";
const BLOCK_COLUMN: &str = "Block Name";

const DEFAULT_SCHOOL: &str = "default_school";
const DEFAULT_DISTRICT: &str = "default_district";
const DEFAULT_BLOCK: &str = "default_block";
const DEFAULT_GRADE: &str = "default_grade";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingFormat {
    SchoolDistrict,
    SchoolBlock,
    SchoolGrade,
}

impl NamingFormat {
    pub const ALL: [NamingFormat; 3] = [
        NamingFormat::SchoolDistrict,
        NamingFormat::SchoolBlock,
        NamingFormat::SchoolGrade,
    ];

    /// Accepts either the key (`school_block`) or the template itself (`{school}_{block}`).
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.key() == t || f.template() == t)
    }

    pub fn key(self) -> &'static str {
        match self {
            NamingFormat::SchoolDistrict => "school_district",
            NamingFormat::SchoolBlock => "school_block",
            NamingFormat::SchoolGrade => "school_grade",
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            NamingFormat::SchoolDistrict => "{school}_{district}",
            NamingFormat::SchoolBlock => "{school}_{block}",
            NamingFormat::SchoolGrade => "{school}_Grade{grade}",
        }
    }

    pub fn file_stem(self, summary: &GroupSummary) -> String {
        let school = attr_or(summary, SCHOOL_COLUMN, DEFAULT_SCHOOL);
        let stem = match self {
            NamingFormat::SchoolDistrict => {
                format!("{}_{}", school, attr_or(summary, DISTRICT_COLUMN, DEFAULT_DISTRICT))
            }
            NamingFormat::SchoolBlock => {
                format!("{}_{}", school, attr_or(summary, BLOCK_COLUMN, DEFAULT_BLOCK))
            }
            NamingFormat::SchoolGrade => {
                format!("{}_Grade{}", school, attr_or(summary, CLASS_COLUMN, DEFAULT_GRADE))
            }
        };
        sanitize(&stem)
    }
}

fn attr_or(summary: &GroupSummary, column: &str, default: &str) -> String {
    summary
        .label(column)
        .unwrap_or_else(|| default.to_string())
}

/// Path separators would let a name escape its folder.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        t => t.to_string(),
    }
}

/// Folder a group's sheet lands in.
pub fn district_bucket(summary: &GroupSummary) -> String {
    sanitize(&attr_or(summary, DISTRICT_COLUMN, DEFAULT_DISTRICT))
}

/// `<district>/<file name>.pdf`, the zip entry a group's sheet is stored under.
pub fn entry_name(naming: NamingFormat, summary: &GroupSummary) -> String {
    format!("{}/{}.pdf", district_bucket(summary), naming.file_stem(summary))
}

#[derive(Debug, Clone)]
pub struct Archive {
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
    pub districts: Vec<String>,
}

/// Stages rendered sheets on disk, one folder per district. The staging
/// directory is removed when the builder is dropped, whether or not
/// `finish` was reached.
pub struct ArchiveBuilder {
    naming: NamingFormat,
    staging: TempDir,
    districts: Vec<String>,
}

impl ArchiveBuilder {
    pub fn new(naming: NamingFormat) -> anyhow::Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("rollcalld-")
            .tempdir()
            .context("failed to create staging directory")?;
        Ok(Self {
            naming,
            staging,
            districts: Vec::new(),
        })
    }

    /// Writes one sheet; a second sheet with the same name in the same
    /// district replaces the first.
    pub fn stage(&mut self, summary: &GroupSummary, pdf: &[u8]) -> anyhow::Result<String> {
        let district = district_bucket(summary);
        let folder = self.staging.path().join(&district);
        if !self.districts.contains(&district) {
            std::fs::create_dir_all(&folder).with_context(|| {
                format!("failed to create folder {}", folder.to_string_lossy())
            })?;
            self.districts.push(district.clone());
        }
        let file_name = format!("{}.pdf", self.naming.file_stem(summary));
        let path = folder.join(&file_name);
        std::fs::write(&path, pdf)
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
        Ok(format!("{}/{}", district, file_name))
    }

    /// Zips every staged folder, districts in first-seen order, files sorted by name.
    pub fn finish(self) -> anyhow::Result<Archive> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut entries = Vec::new();

        for district in &self.districts {
            let folder = self.staging.path().join(district);
            let mut files: Vec<PathBuf> = std::fs::read_dir(&folder)
                .with_context(|| format!("failed to list {}", folder.to_string_lossy()))?
                .map(|e| e.map(|e| e.path()))
                .collect::<Result<_, _>>()
                .context("failed to read staged entry")?;
            files.sort();
            for path in files {
                let file_name = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| anyhow!("unreadable staged file {}", path.to_string_lossy()))?
                    .to_string();
                let entry = format!("{}/{}", district, file_name);
                zip.start_file(entry.as_str(), opts)
                    .with_context(|| format!("failed to start entry {}", entry))?;
                let mut f = File::open(&path)
                    .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
                std::io::copy(&mut f, &mut zip)
                    .with_context(|| format!("failed to write entry {}", entry))?;
                entries.push(entry);
            }
        }

        let mut cursor = zip.finish().context("failed to finalize zip archive")?;
        cursor.flush().context("failed to flush zip archive")?;
        log::info!(
            "archived {} documents in {} district folders",
            entries.len(),
            self.districts.len()
        );
        Ok(Archive {
            bytes: cursor.into_inner(),
            entries,
            districts: self.districts,
        })
    }
}

/// Buckets already-rendered sheets by district and zips them.
pub fn organize<D: AsRef<[u8]>>(
    documents: &[D],
    summaries: &[GroupSummary],
    naming: NamingFormat,
) -> anyhow::Result<Archive> {
    if documents.len() != summaries.len() {
        return Err(anyhow!(
            "{} documents for {} group summaries",
            documents.len(),
            summaries.len()
        ));
    }
    let mut builder = ArchiveBuilder::new(naming)?;
    for (pdf, summary) in documents.iter().zip(summaries) {
        builder.stage(summary, pdf.as_ref())?;
    }
    builder.finish()
}
