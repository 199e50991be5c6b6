//! Replies sent back to clients
use crate::error::Error;
use crate::timeline::Page;
use crate::tweet::Tweet;

use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};
use warp::Rejection;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

pub fn ok() -> Response {
    "OK".into_response()
}

pub fn created(tweet: &Tweet) -> Response {
    reply::with_status(reply::json(tweet), StatusCode::CREATED).into_response()
}

pub fn page(page: &Page) -> Response {
    reply::json(page).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn error(status: StatusCode, msg: &str) -> Response {
    reply::with_status(reply::json(&ErrorBody { error: msg }), status).into_response()
}

/// Turns every rejection into a JSON error reply.
pub async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    use warp::filters::body::BodyDeserializeError;
    use warp::reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType};

    if let Some(e) = rejection.find::<Error>() {
        let status = e.status();
        if status.is_server_error() {
            log::error!("{}", e);
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return Ok(error(status, "internal server error"));
        }
        return Ok(error(status, &e.to_string()));
    }

    let (status, msg) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = rejection.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("invalid input: {}", e))
    } else if rejection.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if rejection.find::<LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "missing content-length".to_string())
    } else if rejection.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "request body must be JSON".to_string(),
        )
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        log::warn!("Unhandled rejection: {:?}", rejection);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };
    Ok(error(status, &msg))
}
