use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};

use crate::api_status::ApiStatus;
use crate::events::{
    AspectType, BatchItemFailure, EventQueue, FunctionInvoker, ObjectType, SqsBatchResponse,
    SqsEvent, SubscriptionEvent,
};
use crate::store::{DataProvider, TableStore};

/// Floor for requeue delays so a stale limit row cannot spin the queue.
const MIN_REQUEUE_SECONDS: u32 = 60;

/// What the processor did with an event.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    DeletedAccount,
    Described,
    Requeued { delay_seconds: u32 },
}

async fn first_token<S: TableStore>(
    data: &DataProvider<S>,
    user_id: u64,
) -> Result<Option<String>> {
    Ok(data.tokens_for_user(user_id).await?.into_iter().next())
}

async fn process_athlete<S: TableStore>(
    event: &SubscriptionEvent,
    data: &DataProvider<S>,
    invoker: &impl FunctionInvoker,
) -> Result<Outcome> {
    let user_id = event.owner_id;
    match event.authorized() {
        Some(false) => {}
        Some(true) => {
            debug!("Athlete {user_id} update does not revoke access");
            return Ok(Outcome::Ignored);
        }
        None => {
            warn!("Athlete {user_id} event without an authorized flag: {:?}", event.updates);
            return Ok(Outcome::Ignored);
        }
    }

    let Some(token) = first_token(data, user_id).await? else {
        error!("No tokens stored for deauthorized athlete {user_id}");
        return Ok(Outcome::Ignored);
    };

    info!("Athlete {user_id} revoked access, deleting account");
    invoker
        .delete_account(user_id, &token)
        .await
        .with_context(|| format!("Failed to delete account for athlete {user_id}"))?;
    Ok(Outcome::DeletedAccount)
}

async fn process_activity<S: TableStore>(
    event: &SubscriptionEvent,
    raw: &str,
    data: &DataProvider<S>,
    invoker: &impl FunctionInvoker,
    queue: &impl EventQueue,
    darksky_limit: Option<u32>,
) -> Result<Outcome> {
    let activity_id = event.object_id;
    let user_id = event.owner_id;

    if event.aspect_type != AspectType::Create {
        debug!("Ignoring {:?} of activity {activity_id}", event.aspect_type);
        return Ok(Outcome::Ignored);
    }

    let settings = data.user_settings(user_id).await?.unwrap_or_default();
    if !settings.auto_update {
        info!("Auto update disabled for athlete {user_id}");
        return Ok(Outcome::Ignored);
    }

    let Some(token) = first_token(data, user_id).await? else {
        error!("No tokens stored for athlete {user_id}");
        return Ok(Outcome::Ignored);
    };

    let limits = invoker
        .post_description(activity_id, &token)
        .await
        .with_context(|| format!("Failed to describe activity {activity_id}"))?;

    match limits {
        None => {
            info!("Described activity {activity_id}");
            Ok(Outcome::Described)
        }
        Some(limits) => {
            let wait =
                ApiStatus::new(&limits, darksky_limit, Utc::now()).seconds_until_apis_available();
            let delay_seconds = wait.max(MIN_REQUEUE_SECONDS);
            warn!("API limits reached, retrying activity {activity_id} in {delay_seconds}s");
            queue.enqueue(raw, delay_seconds).await?;
            Ok(Outcome::Requeued { delay_seconds })
        }
    }
}

/// Handles one push event. Errors are returned so the queue redelivers the message.
pub async fn process_event<S: TableStore>(
    event: &SubscriptionEvent,
    raw: &str,
    data: &DataProvider<S>,
    invoker: &impl FunctionInvoker,
    queue: &impl EventQueue,
    darksky_limit: Option<u32>,
) -> Result<Outcome> {
    match event.object_type {
        ObjectType::Athlete => process_athlete(event, data, invoker).await,
        ObjectType::Activity => {
            process_activity(event, raw, data, invoker, queue, darksky_limit).await
        }
        ObjectType::Unknown => {
            warn!("Ignoring event for unknown object type: {raw}");
            Ok(Outcome::Ignored)
        }
    }
}

pub async fn process_message<S: TableStore>(
    body: &str,
    data: &DataProvider<S>,
    invoker: &impl FunctionInvoker,
    queue: &impl EventQueue,
    darksky_limit: Option<u32>,
) -> Result<Outcome> {
    let event: SubscriptionEvent =
        serde_json::from_str(body).with_context(|| format!("Invalid subscription event: {body}"))?;
    debug!("Processing {event:?}");
    process_event(&event, body, data, invoker, queue, darksky_limit).await
}

/// Processes every record of a batch. Failed records are reported back for redelivery, so the
/// rest of the batch is not handled twice.
pub async fn process_batch<S: TableStore>(
    batch: SqsEvent,
    data: &DataProvider<S>,
    invoker: &impl FunctionInvoker,
    queue: &impl EventQueue,
    darksky_limit: Option<u32>,
) -> SqsBatchResponse {
    let mut response = SqsBatchResponse::default();

    for record in batch.records {
        let id = record.message_id.unwrap_or_default();
        let Some(body) = record.body else {
            warn!("Skipping message {id:?} without a body");
            continue;
        };

        match process_message(&body, data, invoker, queue, darksky_limit).await {
            Ok(outcome) => info!("Message {id:?}: {outcome:?}"),
            Err(e) if id.is_empty() => error!("Failed to process message without an id: {e:#}"),
            Err(e) => {
                error!("Failed to process message {id:?}: {e:#}");
                response
                    .batch_item_failures
                    .push(BatchItemFailure { item_identifier: id });
            }
        }
    }

    response
}
