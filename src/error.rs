use serde::Serialize;

pub const CONFIG_ERROR: &str = "config_error";
pub const DATA_INCONSISTENCY: &str = "data_inconsistency";
pub const BAD_PARAMS: &str = "bad_params";
pub const BAD_STATE: &str = "bad_state";
pub const BAD_INPUT: &str = "bad_input";
pub const IO_FAILED: &str = "io_failed";
pub const RENDER_FAILED: &str = "render_failed";

/// Error surfaced across the IPC boundary. `code` is stable; `message` is for humans.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PipelineError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn io(e: anyhow::Error) -> Self {
        Self::new(IO_FAILED, format!("{e:#}"))
    }

    pub fn render(e: anyhow::Error) -> Self {
        Self::new(RENDER_FAILED, format!("{e:#}"))
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PipelineError {}
