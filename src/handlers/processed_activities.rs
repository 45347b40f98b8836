use lambda_http::Request;

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

    let ids = app
        .data
        .processed_activities(user_id)
        .await
        .map_err(ApiError::exception("Error loading processed activities"))?;

    ok_json(&ids)
}
