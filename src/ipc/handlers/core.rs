use crate::ipc::error::{ok, pipeline_err};
use crate::ipc::types::{AppState, Request};
use crate::run::RunConfig;
use serde_json::json;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "runId": state.run.id(),
            "stage": state.run.stage(),
            "archivePath": state.run.archive().map(|a| a.path.clone()),
        }),
    )
}

fn handle_run_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let config = match RunConfig::from_params(&req.params) {
        Ok(c) => c,
        Err(e) => return pipeline_err(&req.id, e),
    };
    state.run.configure(config);
    ok(
        &req.id,
        json!({
            "runId": state.run.id(),
            "stage": state.run.stage(),
            "config": config,
            "paramSetFields": config.param_set.description(),
            "idFormat": config.id_format(),
            "schoolCodeFormat": config.school_code_format(),
        }),
    )
}

fn handle_run_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.run.reset();
    ok(
        &req.id,
        json!({ "runId": state.run.id(), "stage": state.run.stage() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "run.configure" => Some(handle_run_configure(state, req)),
        "run.reset" => Some(handle_run_reset(state, req)),
        _ => None,
    }
}
