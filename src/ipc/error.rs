use crate::error::PipelineError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn pipeline_err(id: &str, e: PipelineError) -> serde_json::Value {
    if e.code != crate::error::BAD_PARAMS && e.code != crate::error::BAD_STATE {
        log::warn!("request {} failed: {}", id, e);
    }
    err(id, &e.code, e.message, e.details)
}

pub fn get_required_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<String, PipelineError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            PipelineError::new(crate::error::BAD_PARAMS, format!("missing params.{}", key))
        })
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
