use lambda_http::Request;
use log::{info, warn};

use crate::events::EventQueue;
use crate::handlers::{App, authorize, parse_id, required_param};
use crate::models::{Partition, UserId};
use crate::response::{ApiError, HandlerResult, ok_empty};
use crate::store::{DataProvider, TableStore};

async fn delete_logged<S: TableStore>(data: &DataProvider<S>, partition: Partition, row_key: &str) {
    if let Err(e) = data.delete(partition, row_key).await {
        warn!("Failed to delete {partition}/{row_key}: {e:#}");
    }
}

/// Removes every row tied to a user. Returns how many rows were attempted.
pub async fn purge_user<S: TableStore>(
    data: &DataProvider<S>,
    user_id: UserId,
) -> anyhow::Result<usize> {
    let mut attempted = 0;

    for token in data.tokens_for_user(user_id).await? {
        delete_logged(data, Partition::TokenToUser, &token).await;
        attempted += 1;
    }

    delete_logged(data, Partition::UserSettings, &user_id.to_string()).await;
    attempted += 1;

    for activity_id in data.processed_activities(user_id).await? {
        let row_key = activity_id.to_string();
        delete_logged(data, Partition::ProcessedActivities, &row_key).await;
        delete_logged(data, Partition::ActivityWeather, &row_key).await;
        attempted += 2;
    }

    Ok(attempted)
}

pub async fn run<S: TableStore, Q: EventQueue>(
    app: &App<S, Q>,
    req: &Request,
    raw_user_id: &str,
) -> HandlerResult {
    let token = required_param(req, "token")?;
    let user_id = parse_id(raw_user_id, "userid")?;
    authorize(app, &token, user_id).await?;

    app.strava
        .deauthorize(&token)
        .await
        .map_err(ApiError::exception("Error deauthorizing user"))?;

    let attempted = purge_user(&app.data, user_id)
        .await
        .map_err(ApiError::exception("Error deleting account"))?;
    info!("Deleted account for user {user_id} ({attempted} rows)");

    ok_empty()
}
