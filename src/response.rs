use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};
use log::{error, warn};
use serde::Serialize;
use serde_json::json;

use crate::models::ApiLimits;

pub type HandlerResult = Result<Response<Body>, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing required parameter \"{0}\"")]
    MissingParameter(&'static str),
    #[error("Something went wrong. {0}")]
    Generic(String),
    #[error("Server configuration error: missing \"{0}\"")]
    Configuration(&'static str),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("API limit reached, retry in {retry_after_seconds}s")]
    RateLimited {
        api_limits: ApiLimits,
        retry_after_seconds: u32,
    },
    #[error("{message}")]
    Exception {
        message: &'static str,
        cause: anyhow::Error,
    },
}

impl ApiError {
    pub fn generic(message: impl Into<String>) -> Self {
        ApiError::Generic(message.into())
    }

    pub fn exception(message: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |cause| ApiError::Exception { message, cause }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_) | ApiError::Generic(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Configuration(_) | ApiError::Exception { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let status = self.status();
        match &self {
            ApiError::Exception { message, cause } => error!("{message}: {cause:#}"),
            ApiError::Configuration(name) => error!("Missing configuration for {name}"),
            ApiError::RateLimited { .. } => warn!("{self}"),
            _ => warn!("Rejecting request: {self}"),
        }

        let result = match self {
            ApiError::RateLimited {
                api_limits,
                retry_after_seconds,
            } => json_body(
                status,
                &json!({ "apiLimits": api_limits, "retryAfterSeconds": retry_after_seconds }),
            ),
            other => text_body(status, other.to_string().trim().to_owned()),
        };

        result.unwrap_or_else(|_| {
            let mut response = Response::new(Body::Empty);
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
    }
}

fn text_body(status: StatusCode, body: String) -> Result<Response<Body>, lambda_http::http::Error> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(body.into())
}

fn json_body<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Body>, lambda_http::http::Error> {
    // Unserializable values become null
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_owned());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(body.into())
}

pub fn ok_text(body: impl Into<String>) -> HandlerResult {
    text_body(StatusCode::OK, body.into()).map_err(|e| ApiError::Exception {
        message: "Failed to build response",
        cause: e.into(),
    })
}

pub fn ok_json<T: Serialize>(value: &T) -> HandlerResult {
    json_body(StatusCode::OK, value).map_err(|e| ApiError::Exception {
        message: "Failed to build response",
        cause: e.into(),
    })
}

pub fn ok_empty() -> HandlerResult {
    ok_text(String::new())
}

#[cfg(test)]
pub(crate) fn body_text(response: &Response<Body>) -> String {
    let bytes: &[u8] = response.body().as_ref();
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_missing_parameter_response() {
        let response = ApiError::MissingParameter("token").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "Missing required parameter \"token\"");
    }

    #[test]
    fn test_generic_error_trims() {
        let response = ApiError::generic("").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "Something went wrong.");
    }

    #[test]
    fn test_configuration_error() {
        let response = ApiError::Configuration("DARK_SKY_API_KEY").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(&response).contains("DARK_SKY_API_KEY"));
    }

    #[test]
    fn test_exception_hides_cause() {
        let cause = anyhow::anyhow!("secret detail");
        let err = ApiError::exception("Error fetching activities")(cause);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(&response), "Error fetching activities");
    }

    #[test]
    fn test_rate_limited_body() -> anyhow::Result<()> {
        let response = ApiError::RateLimited {
            api_limits: ApiLimits {
                darksky_usage: Some(1000),
                ..ApiLimits::default()
            },
            retry_after_seconds: 60,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: serde_json::Value = serde_json::from_str(&body_text(&response))?;
        assert_eq!(body["apiLimits"]["darkskyUsage"], 1000);
        assert_eq!(body["retryAfterSeconds"], 60);
        Ok(())
    }
}
