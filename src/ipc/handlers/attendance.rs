use crate::archive::NamingFormat;
use crate::error::{PipelineError, BAD_PARAMS};
use crate::ipc::error::{get_optional_str, get_required_str, ok, pipeline_err};
use crate::ipc::types::{AppState, Request};
use crate::layout::PageSpec;
use crate::pdf::Logo;
use crate::run::AttendanceJob;
use crate::workbook;
use base64::Engine;
use serde_json::json;
use std::path::PathBuf;

fn parse_naming(params: &serde_json::Value) -> Result<NamingFormat, PipelineError> {
    let raw = get_required_str(params, "namingFormat")?;
    NamingFormat::parse(&raw).ok_or_else(|| {
        PipelineError::new(BAD_PARAMS, format!("unknown naming format {}", raw)).with_details(
            json!({
                "accepted": NamingFormat::ALL.iter().map(|f| f.key()).collect::<Vec<_>>()
            }),
        )
    })
}

fn generate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, PipelineError> {
    let naming = parse_naming(&req.params)?;
    let out_path = PathBuf::from(get_required_str(&req.params, "outPath")?);
    state.run.expanded("attendance.generate")?;

    let logo = match get_optional_str(&req.params, "logoPath") {
        Some(p) => Some(Logo::load(&PathBuf::from(p)).map_err(PipelineError::io)?),
        None => None,
    };
    let roster = match get_optional_str(&req.params, "rosterPath") {
        Some(p) => Some(workbook::read_first_sheet(&PathBuf::from(p)).map_err(PipelineError::io)?),
        None => None,
    };

    let report = state.run.generate_attendance(AttendanceJob {
        naming,
        out_path: &out_path,
        roster,
        logo: logo.as_ref(),
        page: PageSpec::A4,
    })?;
    Ok(json!({
        "runId": state.run.id(),
        "stage": state.run.stage(),
        "archivePath": report.path,
        "documentCount": report.document_count,
        "districts": report.districts,
        "entries": report.entries,
        "previewEntry": report.preview_entry,
    }))
}

fn preview(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, PipelineError> {
    let doc = state.run.preview()?;
    Ok(json!({
        "entry": doc.entry,
        "studentCount": doc.summary.student_count,
        "byteLength": doc.pdf.len(),
        "pdfBase64": base64::engine::general_purpose::STANDARD.encode(&doc.pdf),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.generate" => generate(state, req),
        "attendance.preview" => preview(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => pipeline_err(&req.id, e),
    })
}
