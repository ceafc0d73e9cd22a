use crate::archive::{self, Archive, NamingFormat};
use crate::error::{PipelineError, BAD_PARAMS, BAD_STATE};
use crate::expand::{self, ExpandOptions, Expansion};
use crate::group::{self, GroupSummary};
use crate::ids::{id_format_preview, DigitWidths, ParamSet};
use crate::layout::{self, PageSpec};
use crate::pdf::{self, Logo};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Default,
    Custom,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DigitParams {
    district: Option<i64>,
    block: Option<i64>,
    school: Option<i64>,
    student: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureParams {
    mode: Option<Mode>,
    partner_id: Option<i64>,
    grade: Option<i64>,
    buffer_percent: Option<f64>,
    #[serde(default)]
    digits: DigitParams,
    param_set: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub mode: Mode,
    pub partner_id: u32,
    pub grade: u32,
    pub buffer_percent: f64,
    pub digits: DigitWidths,
    pub param_set: ParamSet,
}

fn at_least_one(name: &str, v: i64) -> Result<u32, PipelineError> {
    if v < 1 || v > u32::MAX as i64 {
        return Err(PipelineError::new(BAD_PARAMS, format!("{} must be at least 1", name))
            .with_details(json!({ "field": name, "value": v })));
    }
    Ok(v as u32)
}

fn digit_width(name: &str, v: Option<i64>, fallback: usize) -> Result<usize, PipelineError> {
    at_least_one(name, v.unwrap_or(fallback as i64)).map(|n| n as usize)
}

impl RunConfig {
    /// Default mode pins everything except the grade; custom mode fills
    /// omitted fields from the custom defaults.
    pub fn from_params(params: &serde_json::Value) -> Result<Self, PipelineError> {
        let p: ConfigureParams = if params.is_null() {
            ConfigureParams::default()
        } else {
            serde_json::from_value(params.clone()).map_err(|e| {
                PipelineError::new(BAD_PARAMS, format!("invalid configuration: {}", e))
            })?
        };

        let mode = p.mode.unwrap_or(Mode::Default);
        let grade = at_least_one("grade", p.grade.unwrap_or(1))?;
        if mode == Mode::Default {
            return Ok(Self {
                mode,
                partner_id: 1,
                grade,
                buffer_percent: 0.0,
                digits: DigitWidths::DEFAULT_MODE,
                param_set: ParamSet::A4,
            });
        }

        let partner_id = at_least_one("partnerId", p.partner_id.unwrap_or(1))?;
        let buffer_percent = p.buffer_percent.unwrap_or(0.0);
        if !(buffer_percent >= 0.0) || !buffer_percent.is_finite() {
            return Err(PipelineError::new(BAD_PARAMS, "bufferPercent must be 0 or more")
                .with_details(json!({ "field": "bufferPercent" })));
        }
        let base = DigitWidths::CUSTOM_MODE;
        let digits = DigitWidths {
            district: digit_width("digits.district", p.digits.district, base.district)?,
            block: digit_width("digits.block", p.digits.block, base.block)?,
            school: digit_width("digits.school", p.digits.school, base.school)?,
            student: digit_width("digits.student", p.digits.student, base.student)?,
        };
        let param_set = match p.param_set.as_deref() {
            None => ParamSet::A1,
            Some(key) => ParamSet::parse(key).ok_or_else(|| {
                PipelineError::new(BAD_PARAMS, format!("unknown parameter set {}", key))
                    .with_details(json!({
                        "accepted": ParamSet::ALL.iter().map(|p| p.key()).collect::<Vec<_>>()
                    }))
            })?,
        };

        Ok(Self {
            mode,
            partner_id,
            grade,
            buffer_percent,
            digits,
            param_set,
        })
    }

    pub fn expand_options(&self) -> ExpandOptions {
        ExpandOptions {
            partner_id: self.partner_id,
            grade: self.grade,
            buffer_percent: self.buffer_percent,
            digits: self.digits,
            param_set: self.param_set,
        }
    }

    pub fn id_format(&self) -> String {
        id_format_preview(self.param_set, &self.digits, self.partner_id, self.grade)
    }

    pub fn school_code_format(&self) -> String {
        "X".repeat(self.digits.school)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Configured,
    Expanded,
    Rendered,
    Archived,
}

/// Distinct counts over the generated student-ID table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub rows: usize,
    pub students: usize,
    pub schools: usize,
    pub blocks: usize,
    pub districts: usize,
}

impl RunSummary {
    fn of(table: &Table) -> Self {
        Self {
            rows: table.len(),
            students: table.distinct_count("Roll_Number"),
            schools: table.distinct_count("School Name"),
            blocks: table.distinct_count("Block Name"),
            districts: table.distinct_count("District Name"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub summary: GroupSummary,
    pub entry: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    pub path: String,
    pub document_count: usize,
    pub districts: Vec<String>,
    pub entries: Vec<String>,
    pub preview_entry: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExpandedRun {
    pub config: RunConfig,
    pub expansion: Expansion,
    pub student_ids: Table,
}

#[derive(Debug, Clone)]
pub struct RenderedRun {
    pub expanded: ExpandedRun,
    pub documents: Vec<RenderedDocument>,
}

/// Each variant owns exactly what the stages before it produced.
#[derive(Debug, Clone, Default)]
pub enum RunState {
    #[default]
    Idle,
    Configured(RunConfig),
    Expanded(ExpandedRun),
    Rendered(RenderedRun),
    Archived(RenderedRun, ArchiveReport),
}

impl RunState {
    pub fn stage(&self) -> Stage {
        match self {
            RunState::Idle => Stage::Idle,
            RunState::Configured(_) => Stage::Configured,
            RunState::Expanded(_) => Stage::Expanded,
            RunState::Rendered(_) => Stage::Rendered,
            RunState::Archived(..) => Stage::Archived,
        }
    }

    fn config(&self) -> Option<&RunConfig> {
        match self {
            RunState::Idle => None,
            RunState::Configured(c) => Some(c),
            RunState::Expanded(e) => Some(&e.config),
            RunState::Rendered(r) | RunState::Archived(r, _) => Some(&r.expanded.config),
        }
    }

    fn expanded(&self) -> Option<&ExpandedRun> {
        match self {
            RunState::Expanded(e) => Some(e),
            RunState::Rendered(r) | RunState::Archived(r, _) => Some(&r.expanded),
            _ => None,
        }
    }

    pub fn archive(&self) -> Option<&ArchiveReport> {
        match self {
            RunState::Archived(_, report) => Some(report),
            _ => None,
        }
    }

    fn rendered(&self) -> Option<&RenderedRun> {
        match self {
            RunState::Rendered(r) | RunState::Archived(r, _) => Some(r),
            _ => None,
        }
    }
}

/// What `generate_attendance` needs beyond the run's own state.
pub struct AttendanceJob<'a> {
    pub naming: NamingFormat,
    pub out_path: &'a std::path::Path,
    pub roster: Option<Table>,
    pub logo: Option<&'a Logo>,
    pub page: PageSpec,
}

pub struct Run {
    id: String,
    state: RunState,
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_state(op: &str, stage: Stage, needs: &str) -> PipelineError {
    PipelineError::new(BAD_STATE, format!("{} requires {}", op, needs))
        .with_details(json!({ "stage": stage }))
}

impl Run {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: RunState::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn archive(&self) -> Option<&ArchiveReport> {
        self.state.archive()
    }

    pub fn config(&self) -> Option<&RunConfig> {
        self.state.config()
    }

    /// Starts a fresh run with `config`; anything generated earlier is dropped.
    pub fn configure(&mut self, config: RunConfig) {
        self.id = Uuid::new_v4().to_string();
        self.state = RunState::Configured(config);
        log::info!("run {} configured ({:?} mode)", self.id, config.mode);
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Expands `enrollment` under the stored configuration. Allowed again
    /// after a previous expansion, which it replaces.
    pub fn generate_ids(&mut self, enrollment: &Table) -> Result<RunSummary, PipelineError> {
        let config = *self
            .state
            .config()
            .ok_or_else(|| bad_state("ids.generate", self.stage(), "a configured run"))?;
        if enrollment.is_empty() {
            log::warn!("enrollment sheet has no data rows");
        }
        let records = expand::read_enrollment(enrollment)?;
        let expansion = expand::expand_all(records, &config.expand_options())?;
        let student_ids = expand::student_id_table(&expansion.students);
        let summary = RunSummary::of(&student_ids);
        self.state = RunState::Expanded(ExpandedRun {
            config,
            expansion,
            student_ids,
        });
        Ok(summary)
    }

    pub fn expanded(&self, op: &str) -> Result<&ExpandedRun, PipelineError> {
        self.state
            .expanded()
            .ok_or_else(|| bad_state(op, self.stage(), "generated student IDs"))
    }

    /// Renders one sheet per group, stages them by district and writes the zip.
    /// A failure while rendering leaves the run as it was; a failure while
    /// archiving leaves it rendered.
    pub fn generate_attendance(
        &mut self,
        job: AttendanceJob<'_>,
    ) -> Result<ArchiveReport, PipelineError> {
        let expanded = self.expanded("attendance.generate")?.clone();
        let roster = job.roster.as_ref().unwrap_or(&expanded.student_ids);
        let groups = group::aggregate(roster)?;

        let mut documents = Vec::with_capacity(groups.len());
        for g in &groups {
            let doc = layout::render(&g.summary, &g.student_ids, &job.page)?;
            let bytes = pdf::write_pdf(&doc, &job.page, job.logo).map_err(PipelineError::render)?;
            let entry = archive::entry_name(job.naming, &g.summary);
            log::debug!(
                "rendered {} ({} students, {} pages)",
                entry,
                doc.student_count,
                doc.pages.len()
            );
            documents.push(RenderedDocument {
                summary: g.summary.clone(),
                entry,
                pdf: bytes,
            });
        }
        log::info!("rendered {} attendance sheets", documents.len());
        let preview_entry = documents.first().map(|d| d.entry.clone());
        let pdfs: Vec<&[u8]> = documents.iter().map(|d| d.pdf.as_slice()).collect();
        let summaries: Vec<GroupSummary> = documents.iter().map(|d| d.summary.clone()).collect();
        let organized = archive::organize(&pdfs, &summaries, job.naming);
        self.state = RunState::Rendered(RenderedRun {
            expanded,
            documents,
        });

        let zipped = organized.map_err(PipelineError::io)?;
        let path = write_archive(&zipped, job.out_path).map_err(PipelineError::io)?;
        let report = ArchiveReport {
            path,
            document_count: zipped.entries.len(),
            districts: zipped.districts,
            entries: zipped.entries,
            preview_entry,
        };
        if let RunState::Rendered(rendered) = std::mem::take(&mut self.state) {
            self.state = RunState::Archived(rendered, report.clone());
        }
        Ok(report)
    }

    pub fn preview(&self) -> Result<&RenderedDocument, PipelineError> {
        let rendered = self
            .state
            .rendered()
            .ok_or_else(|| bad_state("attendance.preview", self.stage(), "rendered documents"))?;
        rendered.documents.first().ok_or_else(|| {
            PipelineError::new(BAD_STATE, "the last run produced no documents")
        })
    }
}

/// A directory target receives the default archive file name.
fn write_archive(archive: &Archive, out: &std::path::Path) -> anyhow::Result<String> {
    use anyhow::Context;
    let target = if out.is_dir() {
        out.join(crate::archive::ARCHIVE_FILE_NAME)
    } else {
        out.to_path_buf()
    };
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.to_string_lossy()))?;
    }
    std::fs::write(&target, &archive.bytes)
        .with_context(|| format!("failed to write archive {}", target.to_string_lossy()))?;
    log::info!(
        "wrote {} ({} bytes)",
        target.to_string_lossy(),
        archive.bytes.len()
    );
    Ok(target.to_string_lossy().to_string())
}
