use lambda_http::Request;
use lambda_http::http::Method;
use log::info;
use serde_json::Value;

use crate::events::EventQueue;
use crate::handlers::{App, authorize, parse_id, required_param};
use crate::response::{ApiError, HandlerResult, ok_json};
use crate::store::TableStore;

pub async fn run<S: TableStore, Q: EventQueue>(
    app: &App<S, Q>,
    req: &Request,
    raw_user_id: &str,
) -> HandlerResult {
    let token = required_param(req, "token")?;
    let user_id = parse_id(raw_user_id, "userid")?;
    authorize(app, &token, user_id).await?;

    let stored = app
        .data
        .user_settings(user_id)
        .await
        .map_err(ApiError::exception("Unable to load settings"))?
        .unwrap_or_default();

    if req.method() == Method::GET {
        return ok_json(&stored);
    }

    let body: &[u8] = req.body().as_ref();
    if body.is_empty() {
        return Err(ApiError::MissingParameter("settings"));
    }
    let patch: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::generic("Unable to update settings"))?;
    let mut patch = match patch {
        Value::Object(patch) => patch,
        _ => return Err(ApiError::generic("Unable to update settings")),
    };
    // Credentials may ride along in the body
    patch.remove("token");

    let merged = stored
        .merged_with(&Value::Object(patch))
        .map_err(|_| ApiError::generic("Unable to update settings"))?;

    app.data
        .store_user_settings(user_id, &merged)
        .await
        .map_err(|_| ApiError::generic("Unable to update settings"))?;
    info!("Updated settings for user {user_id}");

    ok_json(&merged)
}
