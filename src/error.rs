use crate::broker::BrokerErr;
use crate::cache::CacheErr;

use std::fmt;
use warp::http::StatusCode;

/// Everything a core operation can fail with.
#[derive(Debug)]
pub enum Error {
    InvalidInput(String),
    Unauthenticated,
    NotFound(String),
    Conflict(String),
    Persistence(String),
    Cache(CacheErr),
    /// The tweet was persisted but its fan-out job could not be published; the outbox
    /// entry stays behind for the sweeper.
    Enqueue(BrokerErr),
    Broker(BrokerErr),
    DeadlineExceeded,
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        use Error::*;
        match self {
            InvalidInput(_) => StatusCode::BAD_REQUEST,
            Unauthenticated => StatusCode::UNAUTHORIZED,
            NotFound(_) => StatusCode::NOT_FOUND,
            Conflict(_) => StatusCode::CONFLICT,
            Enqueue(_) | Broker(_) => StatusCode::SERVICE_UNAVAILABLE,
            DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Persistence(_) | Cache(_) | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether trying the same thing again later might succeed.
    pub fn is_transient(&self) -> bool {
        use Error::*;
        matches!(
            self,
            Persistence(_) | Cache(_) | Enqueue(_) | Broker(_) | DeadlineExceeded
        )
    }
}

impl std::error::Error for Error {}
impl warp::reject::Reject for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use Error::*;
        match self {
            InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Unauthenticated => write!(f, "missing or invalid user credentials"),
            NotFound(what) => write!(f, "{} not found", what),
            Conflict(msg) => write!(f, "conflict: {}", msg),
            Persistence(msg) => write!(f, "persistence failure: {}", msg),
            Cache(inner) => write!(f, "{}", inner),
            Enqueue(inner) => write!(
                f,
                "tweet stored, but its fan-out job could not be enqueued: {}",
                inner
            ),
            Broker(inner) => write!(f, "{}", inner),
            DeadlineExceeded => write!(f, "deadline exceeded"),
            Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl From<CacheErr> for Error {
    fn from(e: CacheErr) -> Self {
        Self::Cache(e)
    }
}

impl From<BrokerErr> for Error {
    fn from(e: BrokerErr) -> Self {
        Self::Broker(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {}", e))
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

/// The unique constraint on `(author_id, client_id)` in the `tweets` table.
pub const CLIENT_ID_KEY: &str = "tweets_client_id_key";

impl From<postgres::Error> for Error {
    fn from(e: postgres::Error) -> Self {
        match e.as_db_error() {
            Some(db)
                if *db.code() == postgres::error::SqlState::UNIQUE_VIOLATION
                    && db.constraint() == Some(CLIENT_ID_KEY) =>
            {
                Self::Conflict("a tweet with this client_id already exists".into())
            }
            _ => Self::Persistence(e.to_string()),
        }
    }
}
