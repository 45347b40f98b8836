use lambda_http::{Body, Error, Request, Response, service_fn};
use log::info;
use stravaweather::config::Config;
use stravaweather::dynamo::DynamoStore;
use stravaweather::events::SqsQueue;
use stravaweather::handlers::{App, route};
use stravaweather::set_up_logger;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    set_up_logger(module_path!(), false)?;

    let config = Config::from_env()?;
    let store = DynamoStore::from_env(config.table_name.clone()).await;
    let queue = match &config.queue_url {
        Some(queue_url) => Some(SqsQueue::from_env(queue_url.clone()).await),
        None => {
            info!("QUEUE_URL not set, subscription events will be rejected");
            None
        }
    };

    let app = &App::new(config, store, queue);
    lambda_http::run(service_fn(move |req: Request| handler(app, req))).await
}

async fn handler(app: &App<DynamoStore, SqsQueue>, req: Request) -> Result<Response<Body>, Error> {
    Ok(route(app, req).await)
}
