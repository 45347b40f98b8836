use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::api_status::RateHeaders;
use crate::config::SecretString;
use crate::strava::{Metered, RateLimited};
use crate::weather::WeatherSnapshot;

const API_URL: &str = "https://api.darksky.net";

#[derive(Debug, Deserialize)]
pub struct Forecast {
    pub currently: Option<WeatherSnapshot>,
}

pub struct DarkSkyClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl DarkSkyClient {
    pub fn new(client: Client, api_key: SecretString) -> Self {
        Self {
            client,
            api_key,
            base_url: API_URL.to_owned(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn forecast_url(&self, latitude: f64, longitude: f64, time: DateTime<Utc>) -> String {
        format!(
            "{}/forecast/{}/{},{},{}",
            self.base_url,
            self.api_key.expose(),
            latitude,
            longitude,
            time.timestamp()
        )
    }

    /// Conditions at `time` for the given point. `None` when DarkSky has no `currently` block.
    pub async fn weather_snapshot(
        &self,
        latitude: f64,
        longitude: f64,
        time: DateTime<Utc>,
    ) -> Result<Metered<Option<WeatherSnapshot>>> {
        debug!("Querying DarkSky for {latitude},{longitude} at {time}");

        let response = self
            .client
            .get(self.forecast_url(latitude, longitude, time))
            .query(&[("exclude", "minutely,hourly,daily,alerts,flags"), ("units", "us")])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("DarkSky request failed")?;

        let rate = RateHeaders::from_headers(response.headers());
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(RateLimited { api: "DarkSky", rate }.into());
        }

        // Errors drop the URL: it carries the API key
        let forecast: Forecast = response
            .error_for_status()
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to parse DarkSky forecast")?;

        Ok(Metered {
            value: forecast.currently,
            rate,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_server::{Reply, TestServer};
    use chrono::TimeZone;

    const EXAMPLE_FORECAST_RESPONSE: &str = include_str!("../tests/fixtures/forecast.json");

    fn client_for(server: &TestServer) -> DarkSkyClient {
        DarkSkyClient::new(Client::new(), SecretString::new("darksky-key"))
            .with_base_url(server.base_url.as_str())
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_forecast_url() {
        let client = DarkSkyClient::new(Client::new(), SecretString::new("key"))
            .with_base_url("http://localhost:1234");
        let time = Utc.with_ymd_and_hms(2019, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(
            client.forecast_url(42.36, -71.06, time),
            "http://localhost:1234/forecast/key/42.36,-71.06,1559390400"
        );
    }

    #[test]
    fn test_forecast_without_currently() -> Result<()> {
        let forecast: Forecast = serde_json::from_str(r#"{"latitude": 1.0, "longitude": 2.0}"#)?;
        assert!(forecast.currently.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_weather_snapshot() -> Result<()> {
        let server = TestServer::start(|_| {
            Reply::json(EXAMPLE_FORECAST_RESPONSE).header("x-forecast-api-calls", "17")
        })
        .await;

        let snapshot = client_for(&server)
            .weather_snapshot(42.36, -71.06, start_time())
            .await?;

        assert_eq!(snapshot.rate.darksky_usage, Some(17));
        let weather = snapshot.value.unwrap();
        assert_eq!(weather.summary, "Light Rain");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/forecast/darksky-key/42.36,-71.06,1559390400");
        assert!(requests[0].query.contains("units=us"));
        Ok(())
    }

    #[tokio::test]
    async fn test_error_does_not_reveal_key() {
        let server = TestServer::start(|_| Reply::status(403, "forbidden")).await;

        let err = client_for(&server)
            .weather_snapshot(42.0, -71.0, start_time())
            .await
            .err()
            .unwrap();

        let message = format!("{err:#} {err:?}");
        assert!(message.contains("403"), "{message}");
        assert!(!message.contains("darksky-key"), "{message}");
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = TestServer::start(|_| {
            Reply::status(429, "slow down").header("x-forecast-api-calls", "1000")
        })
        .await;

        let err = client_for(&server)
            .weather_snapshot(42.0, -71.0, start_time())
            .await
            .err()
            .unwrap();

        let limited = err.downcast_ref::<RateLimited>().unwrap();
        assert_eq!(limited.rate.darksky_usage, Some(1000));
    }
}
