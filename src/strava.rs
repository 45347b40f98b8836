use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api_status::{HTTP_STATUS_CODE_API_LIMIT_REACHED, RateHeaders};
use crate::config::SecretString;
use crate::models::{ActivityId, UserId};

const API_URL: &str = "https://www.strava.com";

const VIRTUAL_ACTIVITY_TYPES: &[&str] = &["VirtualRide", "VirtualRun"];

/// A response value along with the quota headers that came back with it.
#[derive(Debug)]
pub struct Metered<T> {
    pub value: T,
    pub rate: RateHeaders,
}

#[derive(Debug, thiserror::Error)]
#[error("{api} rate limit reached")]
pub struct RateLimited {
    pub api: &'static str,
    pub rate: RateHeaders,
}

#[derive(Debug, Deserialize)]
pub struct AthleteRef {
    pub id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub athlete: AthleteRef,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub start_latlng: Option<Vec<f64>>,
}

impl Activity {
    pub fn is_virtual(&self) -> bool {
        VIRTUAL_ACTIVITY_TYPES.contains(&self.activity_type.as_str())
    }

    /// Strava reports an empty array rather than null for activities without GPS.
    pub fn start_location(&self) -> Option<(f64, f64)> {
        match self.start_latlng.as_deref() {
            Some([latitude, longitude, ..]) => Some((*latitude, *longitude)),
            _ => None,
        }
    }
}

/// Result of the OAuth code exchange. The whole document is handed back to the caller.
#[derive(Debug)]
pub struct TokenExchange {
    pub access_token: String,
    pub athlete_id: UserId,
    pub body: Value,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    athlete: AthleteRef,
}

pub struct StravaClient {
    client: Client,
    client_id: String,
    client_secret: SecretString,
    base_url: String,
}

impl StravaClient {
    pub fn new(client: Client, client_id: String, client_secret: SecretString) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            base_url: API_URL.to_owned(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn oauth_url(&self, action: &str) -> String {
        format!("{}/oauth/{}", self.base_url, action)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.base_url, path)
    }

    fn app_credentials(&self) -> [(&str, &str); 2] {
        [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose()),
        ]
    }

    async fn send(&self, req: RequestBuilder) -> Result<(Response, RateHeaders)> {
        // Errors drop the URL: it may carry the client secret
        let response = req
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Strava request failed")?;
        let rate = RateHeaders::from_headers(response.headers());
        debug!("Strava responded {} with {rate:?}", response.status());

        if response.status().as_u16() == HTTP_STATUS_CODE_API_LIMIT_REACHED {
            return Err(RateLimited {
                api: "Strava",
                rate,
            }
            .into());
        }

        let response = response
            .error_for_status()
            .map_err(reqwest::Error::without_url)?;
        Ok((response, rate))
    }

    async fn send_json(&self, req: RequestBuilder) -> Result<Metered<Value>> {
        let (response, rate) = self.send(req).await?;
        // Deletes answer 204 with nothing to parse
        let value = if response.status() == StatusCode::NO_CONTENT {
            Value::Null
        } else {
            response
                .json()
                .await
                .map_err(reqwest::Error::without_url)
                .context("Failed to parse Strava response")?
        };
        Ok(Metered { value, rate })
    }

    pub async fn exchange_token(&self, code: &str) -> Result<TokenExchange> {
        let mut form = self.app_credentials().to_vec();
        form.extend([("code", code), ("grant_type", "authorization_code")]);

        let body = self
            .send_json(self.client.post(self.oauth_url("token")).form(&form))
            .await?
            .value;
        let token: TokenResponse = serde_json::from_value(body.clone())
            .context("Unexpected token exchange response")?;

        info!("Exchanged authorization code for athlete {}", token.athlete.id);

        Ok(TokenExchange {
            access_token: token.access_token,
            athlete_id: token.athlete.id,
            body,
        })
    }

    pub async fn deauthorize(&self, token: &str) -> Result<()> {
        self.send(
            self.client
                .post(self.oauth_url("deauthorize"))
                .form(&[("access_token", token)]),
        )
        .await?;
        Ok(())
    }

    pub async fn athlete_activities(&self, token: &str) -> Result<Metered<Value>> {
        self.send_json(
            self.client
                .get(self.api_url("athlete/activities"))
                .bearer_auth(token),
        )
        .await
    }

    pub async fn activity(&self, token: &str, id: ActivityId) -> Result<Metered<Activity>> {
        let (response, rate) = self
            .send(
                self.client
                    .get(self.api_url(&format!("activities/{id}")))
                    .bearer_auth(token),
            )
            .await?;
        let value = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to parse activity {id}"))?;
        Ok(Metered { value, rate })
    }

    pub async fn update_description(
        &self,
        token: &str,
        id: ActivityId,
        description: &str,
    ) -> Result<Metered<()>> {
        let (_, rate) = self
            .send(
                self.client
                    .put(self.api_url(&format!("activities/{id}")))
                    .bearer_auth(token)
                    .json(&json!({ "description": description })),
            )
            .await?;
        Ok(Metered { value: (), rate })
    }

    pub async fn create_push_subscription(
        &self,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<Value> {
        let mut form = self.app_credentials().to_vec();
        form.extend([("callback_url", callback_url), ("verify_token", verify_token)]);

        Ok(self
            .send_json(self.client.post(self.api_url("push_subscriptions")).form(&form))
            .await?
            .value)
    }

    pub async fn push_subscriptions(&self) -> Result<Value> {
        Ok(self
            .send_json(
                self.client
                    .get(self.api_url("push_subscriptions"))
                    .query(&self.app_credentials()),
            )
            .await?
            .value)
    }

    pub async fn delete_push_subscription(&self, id: &str) -> Result<Value> {
        info!("Deleting subscription id: {id}");
        Ok(self
            .send_json(
                self.client
                    .delete(self.api_url(&format!("push_subscriptions/{id}")))
                    .query(&self.app_credentials()),
            )
            .await?
            .value)
    }
}
