use crate::error::{PipelineError, BAD_PARAMS};
use crate::expand;
use crate::ipc::error::{get_optional_str, get_required_str, ok, pipeline_err};
use crate::ipc::types::{AppState, Request};
use crate::workbook;
use serde_json::json;
use std::path::PathBuf;

fn generate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, PipelineError> {
    let input = PathBuf::from(get_required_str(&req.params, "inputPath")?);
    // Stage check first so a missing configuration is not reported as a file problem.
    state.run.config().ok_or_else(|| {
        PipelineError::new(crate::error::BAD_STATE, "ids.generate requires a configured run")
    })?;
    let table = workbook::read_first_sheet(&input).map_err(PipelineError::io)?;
    log::info!("read {} enrollment rows", table.len());
    let summary = state.run.generate_ids(&table)?;
    Ok(json!({
        "runId": state.run.id(),
        "stage": state.run.stage(),
        "summary": summary,
    }))
}

fn export(state: &mut AppState, req: &Request) -> Result<serde_json::Value, PipelineError> {
    let student_path = get_optional_str(&req.params, "studentIdsPath").map(PathBuf::from);
    let school_path = get_optional_str(&req.params, "schoolCodesPath").map(PathBuf::from);
    if student_path.is_none() && school_path.is_none() {
        return Err(PipelineError::new(
            BAD_PARAMS,
            "missing params.studentIdsPath or params.schoolCodesPath",
        ));
    }
    let expanded = state.run.expanded("ids.export")?;

    let mut written = Vec::new();
    if let Some(p) = student_path {
        workbook::write_table(&expanded.student_ids, &p).map_err(PipelineError::io)?;
        written.push(json!({
            "kind": "studentIds",
            "path": p.to_string_lossy(),
            "rows": expanded.student_ids.len(),
        }));
    }
    if let Some(p) = school_path {
        let codes = expand::school_code_table(&expanded.expansion.schools);
        workbook::write_table(&codes, &p).map_err(PipelineError::io)?;
        written.push(json!({
            "kind": "schoolCodes",
            "path": p.to_string_lossy(),
            "rows": codes.len(),
        }));
    }
    Ok(json!({ "written": written }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "ids.generate" => generate(state, req),
        "ids.export" => export(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => pipeline_err(&req.id, e),
    })
}
