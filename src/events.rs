use std::collections::HashMap;
use std::future::Future;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SecretString;
use crate::handlers::{DELETE_ACCOUNT_FUNCTION, DESCRIPTION_FUNCTION};
use crate::models::{ActivityId, ApiLimits, UserId};

/// SQS refuses message delays longer than 15 minutes.
pub const MAX_DELAY_SECONDS: u32 = 900;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectType {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Activity,
    Athlete,
    #[serde(other)]
    Unknown,
}

/// Strava push subscription event. See https://developers.strava.com/docs/webhooks/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub aspect_type: AspectType,
    #[serde(default)]
    pub event_time: i64,
    pub object_id: u64,
    pub object_type: ObjectType,
    pub owner_id: UserId,
    #[serde(default)]
    pub subscription_id: u64,
    #[serde(default)]
    pub updates: HashMap<String, Value>,
}

impl SubscriptionEvent {
    /// `Some(false)` when the athlete revoked access. Strava sends the flag as a string.
    pub fn authorized(&self) -> Option<bool> {
        match self.updates.get("authorized")? {
            Value::Bool(authorized) => Some(*authorized),
            Value::String(authorized) => authorized.parse().ok(),
            _ => None,
        }
    }
}

pub trait EventQueue: Send + Sync {
    fn enqueue(&self, body: &str, delay_seconds: u32) -> impl Future<Output = Result<()>> + Send;
}

pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sqs::Client::new(&sdk_config), queue_url)
    }
}

impl EventQueue for SqsQueue {
    async fn enqueue(&self, body: &str, delay_seconds: u32) -> Result<()> {
        let delay = delay_seconds.min(MAX_DELAY_SECONDS);
        debug!("Enqueueing message with {delay}s delay");

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .delay_seconds(delay as i32)
            .send()
            .await
            .context("Failed to enqueue message")?;
        Ok(())
    }
}

/// Calls back into the deployed HTTP handlers.
pub trait FunctionInvoker: Send + Sync {
    fn delete_account(
        &self,
        user_id: UserId,
        token: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Posts the weather description for an activity. Returns the API limits when the handler
    /// was turned away by a rate limit.
    fn post_description(
        &self,
        activity_id: ActivityId,
        token: &str,
    ) -> impl Future<Output = Result<Option<ApiLimits>>> + Send;
}

pub struct HttpInvoker {
    client: Client,
    hosted_url: String,
    backend_code: SecretString,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    api_limits: ApiLimits,
}

impl HttpInvoker {
    pub fn new(client: Client, hosted_url: impl Into<String>, backend_code: SecretString) -> Self {
        Self {
            client,
            hosted_url: hosted_url.into(),
            backend_code,
        }
    }

    fn function_url(&self, function: &str, id: u64) -> String {
        format!("{}/{}/{}", self.hosted_url, function, id)
    }

    fn params<'a>(&'a self, token: &'a str) -> [(&'a str, &'a str); 2] {
        [("token", token), ("code", self.backend_code.expose())]
    }
}

impl FunctionInvoker for HttpInvoker {
    async fn delete_account(&self, user_id: UserId, token: &str) -> Result<()> {
        let url = self.function_url(DELETE_ACCOUNT_FUNCTION, user_id);
        info!("Request: {url}");

        // Errors drop the URL: the query carries the token and backend code
        self.client
            .delete(&url)
            .query(&self.params(token))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(reqwest::Error::without_url)
            .context("Delete account request failed")?;
        Ok(())
    }

    async fn post_description(
        &self,
        activity_id: ActivityId,
        token: &str,
    ) -> Result<Option<ApiLimits>> {
        let url = self.function_url(DESCRIPTION_FUNCTION, activity_id);
        info!("Request: {url}");

        let response = self
            .client
            .post(&url)
            .query(&self.params(token))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Description request failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)?;

        if let Ok(RateLimitedBody { api_limits }) = serde_json::from_str(&body) {
            return Ok(Some(api_limits));
        }
        if !status.is_success() {
            anyhow::bail!(
                "Description request for activity {activity_id} failed with {status}: {body}"
            );
        }
        Ok(None)
    }
}

/// The slice of an SQS Lambda event this crate reads.
#[derive(Debug, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Partial batch response. Only the listed messages are redelivered.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}
