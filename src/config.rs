use anyhow::{Context, Result};

pub const DEFAULT_TABLE_NAME: &str = "StravaWeatherman";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub dark_sky_api_key: Option<SecretString>,
    pub dark_sky_api_limit: Option<u32>,
    pub strava_client_id: String,
    pub strava_client_secret: SecretString,
    /// Public base of the deployed API, e.g. `https://example.net/api`.
    pub hosted_url: String,
    pub backend_code: SecretString,
    pub webhooks_token: SecretString,
    pub webhooks_verify_token: SecretString,
    pub table_name: String,
    pub queue_url: Option<String>,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} env var not set"))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dark_sky_api_limit = optional("DARK_SKY_API_LIMIT")
            .map(|limit| limit.parse::<u32>())
            .transpose()
            .context("DARK_SKY_API_LIMIT must be a non-negative integer")?;

        Ok(Self {
            dark_sky_api_key: optional("DARK_SKY_API_KEY").map(SecretString),
            dark_sky_api_limit,
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            strava_client_secret: required("STRAVA_CLIENT_SECRET").map(SecretString)?,
            hosted_url: hosted_url(&required("WEBSITE_HOSTNAME")?),
            backend_code: required("BACKEND_CODE").map(SecretString)?,
            webhooks_token: required("STRAVA_WEBHOOKS_TOKEN").map(SecretString)?,
            webhooks_verify_token: required("STRAVA_WEBHOOKS_VERIFY_TOKEN").map(SecretString)?,
            table_name: optional("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_owned()),
            queue_url: optional("QUEUE_URL"),
        })
    }

    /// Callback registered with Strava for push subscription events.
    pub fn subscription_callback_url(&self) -> String {
        format!(
            "{}/subscription?code={}",
            self.hosted_url,
            self.webhooks_token.expose()
        )
    }
}

fn hosted_url(hostname: &str) -> String {
    format!("https://{}/api", hostname.trim_end_matches('/'))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        dark_sky_api_key: Some(SecretString::new("darksky-key")),
        dark_sky_api_limit: Some(1000),
        strava_client_id: "12345".to_owned(),
        strava_client_secret: SecretString::new("client-secret"),
        hosted_url: hosted_url("weather.example.net"),
        backend_code: SecretString::new("backend-code"),
        webhooks_token: SecretString::new("webhooks-token"),
        webhooks_verify_token: SecretString::new("verify-token"),
        table_name: DEFAULT_TABLE_NAME.to_owned(),
        queue_url: Some("https://sqs.us-east-1.amazonaws.com/1/events".to_owned()),
    }
}
