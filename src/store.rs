use std::future::Future;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::models::{ActivityId, ApiLimits, AuthToken, Partition, UserId, UserSettings};
use crate::weather::WeatherSnapshot;

const API_LIMITS_ROW: &str = "current";

/// One table row. Rows are addressed by partition and row key; `user_id` and `data` are the only
/// attributes any row carries.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub partition: Partition,
    pub row_key: String,
    pub user_id: Option<UserId>,
    pub data: Option<String>,
}

impl Row {
    pub fn new(partition: Partition, row_key: impl Into<String>) -> Self {
        Self {
            partition,
            row_key: row_key.into(),
            user_id: None,
            data: None,
        }
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_data(mut self, data: String) -> Self {
        self.data = Some(data);
        self
    }
}

pub trait TableStore: Send + Sync {
    fn get(
        &self,
        partition: Partition,
        row_key: &str,
    ) -> impl Future<Output = Result<Option<Row>>> + Send;

    /// Insert or replace.
    fn put(&self, row: Row) -> impl Future<Output = Result<()>> + Send;

    fn delete(
        &self,
        partition: Partition,
        row_key: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Every row in `partition` owned by `user_id`, across all result pages.
    fn query_user(
        &self,
        partition: Partition,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Row>>> + Send;
}

/// Typed access to the rows the handlers read and write.
pub struct DataProvider<S> {
    store: S,
}

impl<S: TableStore> DataProvider<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decode<T: serde::de::DeserializeOwned>(row: Option<Row>, what: &str) -> Result<Option<T>> {
        row.and_then(|row| row.data)
            .map(|data| serde_json::from_str(&data))
            .transpose()
            .with_context(|| format!("Corrupt {what} row"))
    }

    pub async fn user_id_for_token(&self, token: &str) -> Result<Option<UserId>> {
        let row = self.store.get(Partition::TokenToUser, token).await?;
        Ok(row.and_then(|row| row.user_id))
    }

    /// A token authorizes a user when its stored mapping names that user.
    pub async fn is_authorized(&self, token: &str, user_id: UserId) -> Result<bool> {
        Ok(self.user_id_for_token(token).await? == Some(user_id))
    }

    pub async fn tokens_for_user(&self, user_id: UserId) -> Result<Vec<AuthToken>> {
        let rows = self
            .store
            .query_user(Partition::TokenToUser, user_id)
            .await?;
        Ok(rows.into_iter().map(|row| row.row_key).collect())
    }

    pub async fn store_user_id_for_token(&self, token: &str, user_id: UserId) -> Result<()> {
        self.store
            .put(Row::new(Partition::TokenToUser, token).with_user_id(user_id))
            .await
    }

    /// Stored settings filled out with defaults, or `None` if the user never saved any.
    pub async fn user_settings(&self, user_id: UserId) -> Result<Option<UserSettings>> {
        let row = self
            .store
            .get(Partition::UserSettings, &user_id.to_string())
            .await?;
        Self::decode(row, "user settings")
    }

    pub async fn store_user_settings(
        &self,
        user_id: UserId,
        settings: &UserSettings,
    ) -> Result<()> {
        let row = Row::new(Partition::UserSettings, user_id.to_string())
            .with_user_id(user_id)
            .with_data(serde_json::to_string(settings)?);
        self.store.put(row).await
    }

    pub async fn weather_for_activity(
        &self,
        activity_id: ActivityId,
    ) -> Result<Option<WeatherSnapshot>> {
        let row = self
            .store
            .get(Partition::ActivityWeather, &activity_id.to_string())
            .await?;
        Self::decode(row, "activity weather")
    }

    pub async fn store_weather_for_activity(
        &self,
        activity_id: ActivityId,
        weather: &WeatherSnapshot,
    ) -> Result<()> {
        let row = Row::new(Partition::ActivityWeather, activity_id.to_string())
            .with_data(serde_json::to_string(weather)?);
        self.store.put(row).await
    }

    pub async fn is_processed(&self, activity_id: ActivityId) -> Result<bool> {
        let row = self
            .store
            .get(Partition::ProcessedActivities, &activity_id.to_string())
            .await?;
        Ok(row.is_some())
    }

    pub async fn processed_activities(&self, user_id: UserId) -> Result<Vec<ActivityId>> {
        let rows = self
            .store
            .query_user(Partition::ProcessedActivities, user_id)
            .await?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            match row.row_key.parse() {
                Ok(id) => ids.push(id),
                Err(e) => warn!("Skipping processed activity row {:?}: {e}", row.row_key),
            }
        }
        Ok(ids)
    }

    pub async fn store_processed_activity(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<()> {
        let row = Row::new(Partition::ProcessedActivities, activity_id.to_string())
            .with_user_id(user_id);
        self.store.put(row).await
    }

    pub async fn api_limits(&self) -> Result<ApiLimits> {
        let row = self.store.get(Partition::ApiLimits, API_LIMITS_ROW).await?;
        Ok(Self::decode(row, "API limits")?.unwrap_or_default())
    }

    pub async fn store_api_limits(&self, limits: &ApiLimits) -> Result<()> {
        let row = Row::new(Partition::ApiLimits, API_LIMITS_ROW)
            .with_data(serde_json::to_string(limits)?);
        self.store.put(row).await
    }

    pub async fn delete(&self, partition: Partition, row_key: &str) -> Result<()> {
        debug!("Deleting {partition}/{row_key}");
        self.store.delete(partition, row_key).await
    }
}
