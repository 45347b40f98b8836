#![recursion_limit = "256"]

use anyhow::Context;
use lambda_runtime::{LambdaEvent, service_fn};
use log::warn;
use reqwest::Client;
use serde_json::Value;
use stravaweather::config::Config;
use stravaweather::dynamo::DynamoStore;
use stravaweather::events::{HttpInvoker, SqsEvent, SqsQueue};
use stravaweather::handlers::process_queue::process_batch;
use stravaweather::set_up_logger;
use stravaweather::store::DataProvider;

struct Worker {
    data: DataProvider<DynamoStore>,
    invoker: HttpInvoker,
    queue: SqsQueue,
    darksky_limit: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    set_up_logger(module_path!(), false)?;

    let config = Config::from_env()?;
    let queue_url = config
        .queue_url
        .clone()
        .context("QUEUE_URL env var not set")?;

    let worker = &Worker {
        data: DataProvider::new(DynamoStore::from_env(config.table_name.clone()).await),
        invoker: HttpInvoker::new(
            Client::new(),
            config.hosted_url.clone(),
            config.backend_code.clone(),
        ),
        queue: SqsQueue::from_env(queue_url).await,
        darksky_limit: config.dark_sky_api_limit,
    };

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        handler(worker, event)
    }))
    .await
}

async fn handler(
    worker: &Worker,
    event: LambdaEvent<Value>,
) -> Result<Value, lambda_runtime::Error> {
    let batch: SqsEvent = serde_json::from_value(event.payload)
        .context("Unexpected queue event")?;

    let response = process_batch(
        batch,
        &worker.data,
        &worker.invoker,
        &worker.queue,
        worker.darksky_limit,
    )
    .await;
    if !response.batch_item_failures.is_empty() {
        warn!(
            "{} messages will be redelivered",
            response.batch_item_failures.len()
        );
    }

    Ok(serde_json::to_value(response)?)
}
