use lambda_http::Request;
use log::info;

use crate::events::EventQueue;
use crate::handlers::{App, required_param};
use crate::response::{ApiError, HandlerResult, ok_json};
use crate::store::TableStore;

/// Exchanges a Strava OAuth code for an access token and remembers which athlete it belongs to.
pub async fn run<S: TableStore, Q: EventQueue>(app: &App<S, Q>, req: &Request) -> HandlerResult {
    let code = required_param(req, "stravacode")?;

    let exchange = app
        .strava
        .exchange_token(&code)
        .await
        .map_err(ApiError::exception("Error authorizing user"))?;

    app.data
        .store_user_id_for_token(&exchange.access_token, exchange.athlete_id)
        .await
        .map_err(ApiError::exception("Error authorizing user"))?;
    info!("Authorized athlete {}", exchange.athlete_id);

    ok_json(&exchange.body)
}
