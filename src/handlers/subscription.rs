use lambda_http::Request;
use log::{info, warn};
use serde_json::json;

use crate::events::EventQueue;
use crate::handlers::{App, param, require_code};
use crate::response::{ApiError, HandlerResult, ok_empty, ok_json};
use crate::store::TableStore;

pub async fn create<S: TableStore, Q: EventQueue>(app: &App<S, Q>, req: &Request) -> HandlerResult {
    require_code(req, &app.config.backend_code)?;

    let callback_url = app.config.subscription_callback_url();
    info!("Creating push subscription");
    let created = app
        .strava
        .create_push_subscription(&callback_url, app.config.webhooks_verify_token.expose())
        .await
        .map_err(ApiError::exception("Error creating subscription"))?;

    ok_json(&created)
}

pub async fn view<S: TableStore, Q: EventQueue>(app: &App<S, Q>, req: &Request) -> HandlerResult {
    require_code(req, &app.config.backend_code)?;

    let subscriptions = app
        .strava
        .push_subscriptions()
        .await
        .map_err(ApiError::exception("Error viewing subscriptions"))?;

    ok_json(&subscriptions)
}

pub async fn delete<S: TableStore, Q: EventQueue>(
    app: &App<S, Q>,
    req: &Request,
    id: &str,
) -> HandlerResult {
    require_code(req, &app.config.backend_code)?;

    let deleted = app
        .strava
        .delete_push_subscription(id)
        .await
        .map_err(ApiError::exception("Error deleting subscription"))?;

    ok_json(&deleted)
}

/// Answers Strava's subscription validation handshake.
pub fn verify<S: TableStore, Q: EventQueue>(app: &App<S, Q>, req: &Request) -> HandlerResult {
    require_code(req, &app.config.webhooks_token)?;

    let verify_token = param(req, "hub.verify_token").unwrap_or_default();
    if verify_token != app.config.webhooks_verify_token.expose() {
        return Err(ApiError::generic("Verify token was incorrect."));
    }

    let challenge = param(req, "hub.challenge").unwrap_or_default();
    if challenge.is_empty() {
        warn!("Subscription verification without hub.challenge");
    }

    ok_json(&json!({ "hub.challenge": challenge }))
}

/// Queues a push event for the queue processor.
pub async fn receive_event<S: TableStore, Q: EventQueue>(
    app: &App<S, Q>,
    req: &Request,
) -> HandlerResult {
    require_code(req, &app.config.webhooks_token)?;

    let queue = app
        .queue
        .as_ref()
        .ok_or(ApiError::Configuration("QUEUE_URL"))?;

    let body = std::str::from_utf8(req.body().as_ref())
        .map_err(|_| ApiError::generic("Event body must be UTF-8"))?;
    if body.trim().is_empty() {
        return Err(ApiError::MissingParameter("event"));
    }

    queue
        .enqueue(body, 0)
        .await
        .map_err(ApiError::exception("Error queueing event"))?;
    info!("Queued subscription event");

    ok_empty()
}
