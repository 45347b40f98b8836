use lambda_http::Request;

use crate::events::EventQueue;
use crate::handlers::{App, required_param};
use crate::response::{ApiError, HandlerResult, ok_json};
use crate::store::TableStore;

pub async fn run<S: TableStore, Q: EventQueue>(app: &App<S, Q>, req: &Request) -> HandlerResult {
    let token = required_param(req, "token")?;

    let activities = app
        .strava
        .athlete_activities(&token)
        .await
        .map_err(ApiError::exception("Error fetching activities"))?;

    ok_json(&activities.value)
}
