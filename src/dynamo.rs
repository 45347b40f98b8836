use std::collections::HashMap;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use log::{debug, info, warn};

use crate::models::{Partition, UserId};
use crate::store::{Row, TableStore};

const PARTITION_KEY: &str = "PartitionKey";
const ROW_KEY: &str = "RowKey";
const USER_ID: &str = "UserId";
const DATA: &str = "Data";

const PARTITIONS: &[Partition] = &[
    Partition::ActivityWeather,
    Partition::ProcessedActivities,
    Partition::TokenToUser,
    Partition::UserSettings,
    Partition::ApiLimits,
];

type Item = HashMap<String, AttributeValue>;

pub struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub async fn from_env(table_name: impl Into<String>) -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&sdk_config), table_name)
    }

    /// Creates the table when it does not exist yet.
    pub async fn ensure_table(&self) -> Result<()> {
        match self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
        {
            Ok(_) => {
                debug!("Table {} exists", self.table_name);
                return Ok(());
            }
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                if !not_found {
                    return Err(e).context("Failed to describe table");
                }
            }
        }

        info!("Creating table {}", self.table_name);
        self.client
            .create_table()
            .table_name(&self.table_name)
            .billing_mode(BillingMode::PayPerRequest)
            .attribute_definitions(string_attribute(PARTITION_KEY)?)
            .attribute_definitions(string_attribute(ROW_KEY)?)
            .key_schema(key_element(PARTITION_KEY, KeyType::Hash)?)
            .key_schema(key_element(ROW_KEY, KeyType::Range)?)
            .send()
            .await
            .context("Failed to create table")?;

        Ok(())
    }
}

fn string_attribute(name: &str) -> Result<AttributeDefinition> {
    Ok(AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()?)
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    Ok(KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()?)
}

fn partition_from_str(value: &str) -> Option<Partition> {
    PARTITIONS.iter().copied().find(|p| p.as_str() == value)
}

fn item_from_row(row: Row) -> Item {
    let mut item = HashMap::new();
    item.insert(
        PARTITION_KEY.to_owned(),
        AttributeValue::S(row.partition.as_str().to_owned()),
    );
    item.insert(ROW_KEY.to_owned(), AttributeValue::S(row.row_key));
    if let Some(user_id) = row.user_id {
        item.insert(USER_ID.to_owned(), AttributeValue::N(user_id.to_string()));
    }
    if let Some(data) = row.data {
        item.insert(DATA.to_owned(), AttributeValue::S(data));
    }
    item
}

fn row_from_item(item: &Item) -> Option<Row> {
    let partition = item
        .get(PARTITION_KEY)
        .and_then(|v| v.as_s().ok())
        .and_then(|p| partition_from_str(p))?;
    let row_key = item.get(ROW_KEY).and_then(|v| v.as_s().ok())?.clone();
    let user_id = item
        .get(USER_ID)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok());
    let data = item.get(DATA).and_then(|v| v.as_s().ok()).cloned();

    Some(Row {
        partition,
        row_key,
        user_id,
        data,
    })
}

impl TableStore for DynamoStore {
    async fn get(&self, partition: Partition, row_key: &str) -> Result<Option<Row>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(PARTITION_KEY, AttributeValue::S(partition.as_str().to_owned()))
            .key(ROW_KEY, AttributeValue::S(row_key.to_owned()))
            .send()
            .await
            .with_context(|| format!("Failed to get {partition}/{row_key}"))?;

        Ok(output.item().and_then(row_from_item))
    }

    async fn put(&self, row: Row) -> Result<()> {
        let key = format!("{}/{}", row.partition, row.row_key);
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_from_row(row)))
            .send()
            .await
            .with_context(|| format!("Failed to put {key}"))?;
        Ok(())
    }

    async fn delete(&self, partition: Partition, row_key: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(PARTITION_KEY, AttributeValue::S(partition.as_str().to_owned()))
            .key(ROW_KEY, AttributeValue::S(row_key.to_owned()))
            .send()
            .await
            .with_context(|| format!("Failed to delete {partition}/{row_key}"))?;
        Ok(())
    }

    async fn query_user(&self, partition: Partition, user_id: UserId) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("#pk = :pk")
                .filter_expression("#uid = :uid")
                .expression_attribute_names("#pk", PARTITION_KEY)
                .expression_attribute_names("#uid", USER_ID)
                .expression_attribute_values(
                    ":pk",
                    AttributeValue::S(partition.as_str().to_owned()),
                )
                .expression_attribute_values(":uid", AttributeValue::N(user_id.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .with_context(|| format!("Failed to query {partition} for user {user_id}"))?;

            for item in output.items() {
                match row_from_item(item) {
                    Some(row) => rows.push(row),
                    None => warn!("Skipping malformed item in {partition}"),
                }
            }
            debug!("Fetched {} {partition} rows so far", rows.len());

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_item_round_trip() {
        let row = Row::new(Partition::TokenToUser, "token").with_user_id(42);
        let item = item_from_row(row.clone());

        assert_eq!(
            item.get(PARTITION_KEY),
            Some(&AttributeValue::S("tokenToUser".to_owned()))
        );
        assert_eq!(item.get(USER_ID), Some(&AttributeValue::N("42".to_owned())));
        assert!(!item.contains_key(DATA));
        assert_eq!(row_from_item(&item), Some(row));
    }

    #[test]
    fn test_row_from_item_with_data() {
        let row = Row::new(Partition::UserSettings, "42")
            .with_data("{}".to_owned());
        assert_eq!(row_from_item(&item_from_row(row.clone())), Some(row));
    }

    #[test]
    fn test_row_from_item_unknown_partition() {
        let mut item = HashMap::new();
        item.insert(PARTITION_KEY.to_owned(), AttributeValue::S("other".to_owned()));
        item.insert(ROW_KEY.to_owned(), AttributeValue::S("x".to_owned()));
        assert_eq!(row_from_item(&item), None);
    }

    #[test]
    fn test_partition_from_str() {
        for partition in PARTITIONS {
            assert_eq!(partition_from_str(partition.as_str()), Some(*partition));
        }
    }
}
