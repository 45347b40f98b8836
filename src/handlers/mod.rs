use lambda_http::http::Method;
use lambda_http::{Body, Request, RequestExt, Response};
use log::info;
use reqwest::Client;
use serde_json::Value;

use crate::config::{Config, SecretString};
use crate::darksky::DarkSkyClient;
use crate::events::EventQueue;
use crate::response::{ApiError, HandlerResult};
use crate::store::{DataProvider, TableStore};
use crate::strava::StravaClient;

pub mod activities;
pub mod auth;
pub mod delete_account;
pub mod description;
pub mod process_queue;
pub mod processed_activities;
pub mod subscription;
pub mod user_settings;

pub const DESCRIPTION_FUNCTION: &str = "description";
pub const DELETE_ACCOUNT_FUNCTION: &str = "deleteaccount";

/// Everything a handler may touch.
pub struct App<S, Q> {
    pub config: Config,
    pub data: DataProvider<S>,
    pub strava: StravaClient,
    pub darksky: Option<DarkSkyClient>,
    pub queue: Option<Q>,
}

impl<S: TableStore, Q: EventQueue> App<S, Q> {
    pub fn new(config: Config, store: S, queue: Option<Q>) -> Self {
        let client = Client::new();
        let strava = StravaClient::new(
            client.clone(),
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        );
        let darksky = config
            .dark_sky_api_key
            .clone()
            .map(|key| DarkSkyClient::new(client, key));

        Self {
            config,
            data: DataProvider::new(store),
            strava,
            darksky,
            queue,
        }
    }
}

/// Reads a request parameter from the query string, falling back to a field of a JSON body.
pub fn param(req: &Request, name: &str) -> Option<String> {
    if let Some(value) = req
        .query_string_parameters_ref()
        .and_then(|params| params.first(name))
    {
        return Some(value.to_owned());
    }

    let body: Value = serde_json::from_slice(req.body().as_ref()).ok()?;
    match body.get(name)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

pub fn required_param(req: &Request, name: &'static str) -> Result<String, ApiError> {
    param(req, name)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingParameter(name))
}

pub fn parse_id(raw: &str, name: &'static str) -> Result<u64, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::MissingParameter(name));
    }
    raw.parse()
        .map_err(|_| ApiError::generic(format!("Invalid {name} \"{raw}\"")))
}

/// Checks the function key passed as `code`.
pub fn require_code(req: &Request, expected: &SecretString) -> Result<(), ApiError> {
    match param(req, "code") {
        Some(code) if code == expected.expose() => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Token must map to the user named in the route.
pub async fn authorize<S: TableStore, Q>(
    app: &App<S, Q>,
    token: &str,
    user_id: u64,
) -> Result<(), ApiError> {
    let authorized = app
        .data
        .is_authorized(token, user_id)
        .await
        .map_err(ApiError::exception("Error looking up token"))?;

    if authorized {
        Ok(())
    } else {
        Err(ApiError::generic("Must provide a valid auth token"))
    }
}

fn path_segments(path: &str) -> Vec<&str> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.split_first() {
        Some((&"api", rest)) => rest.to_vec(),
        _ => segments,
    }
}

async fn dispatch<S: TableStore, Q: EventQueue>(app: &App<S, Q>, req: &Request) -> HandlerResult {
    let path = req.uri().path();
    let method = req.method();

    match (method, path_segments(path).as_slice()) {
        (&Method::GET | &Method::POST, ["auth"]) => auth::run(app, req).await,
        (&Method::GET, ["activities"]) => activities::run(app, req).await,
        (&Method::GET | &Method::POST, [DESCRIPTION_FUNCTION, id]) => {
            description::run(app, req, id).await
        }
        (&Method::GET | &Method::POST, ["settings", user_id]) => {
            user_settings::run(app, req, user_id).await
        }
        (&Method::GET, ["processedactivities", user_id]) => {
            processed_activities::run(app, req, user_id).await
        }
        (&Method::DELETE | &Method::POST, [DELETE_ACCOUNT_FUNCTION, user_id]) => {
            delete_account::run(app, req, user_id).await
        }
        (&Method::POST, ["createsubscription"]) => subscription::create(app, req).await,
        (&Method::GET, ["viewsubscription"]) => subscription::view(app, req).await,
        (&Method::DELETE, ["deletesubscription", id]) => subscription::delete(app, req, id).await,
        (&Method::GET, ["subscription"]) => subscription::verify(app, req),
        (&Method::POST, ["subscription"]) => subscription::receive_event(app, req).await,
        (
            _,
            ["auth" | "activities" | "createsubscription" | "viewsubscription" | "subscription"]
            | [DESCRIPTION_FUNCTION | "settings" | "processedactivities", _]
            | [DELETE_ACCOUNT_FUNCTION | "deletesubscription", _],
        ) => Err(ApiError::MethodNotAllowed),
        _ => Err(ApiError::NotFound),
    }
}

pub async fn route<S: TableStore, Q: EventQueue>(app: &App<S, Q>, req: Request) -> Response<Body> {
    info!("{} {}", req.method(), req.uri().path());
    dispatch(app, &req)
        .await
        .unwrap_or_else(ApiError::into_response)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use lambda_http::{Body, Request, RequestExt};
    use reqwest::Client;

    use super::App;
    use crate::config::test_config;
    use crate::darksky::DarkSkyClient;
    use crate::events::fake::RecordingQueue;
    use crate::store::memory::MemoryStore;
    use crate::strava::StravaClient;

    pub type TestApp = App<MemoryStore, RecordingQueue>;

    pub fn test_app() -> TestApp {
        App::new(
            test_config(),
            MemoryStore::default(),
            Some(RecordingQueue::default()),
        )
    }

    /// Points the Strava and DarkSky clients at a local test server.
    pub fn test_app_against(base_url: &str) -> TestApp {
        let mut app = test_app();
        let client = Client::new();
        app.strava = StravaClient::new(
            client.clone(),
            app.config.strava_client_id.clone(),
            app.config.strava_client_secret.clone(),
        )
        .with_base_url(base_url);
        app.darksky = app
            .config
            .dark_sky_api_key
            .clone()
            .map(|key| DarkSkyClient::new(client, key).with_base_url(base_url));
        app
    }

    pub fn request(method: &str, path: &str, query: &[(&str, &str)], body: Body) -> Request {
        let query: HashMap<String, String> = query
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();

        lambda_http::http::Request::builder()
            .method(method)
            .uri(path)
            .body(body)
            .unwrap()
            .with_query_string_parameters(query)
    }
}
