use super::postgres::PgErr;

use std::fmt;
use warp::http::StatusCode;

/// Errors that end (or, on a multiplexed connection, answer) a single client request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestErr {
    /// A credential is required but missing, or does not resolve to a live grant
    Unauthorized(String),
    /// Insufficient scope, unowned list, unknown stream, or missing parameter
    SubscriptionDenied(String),
    /// An inbound control message that could not be parsed
    MalformedMessage(String),
    /// Postgres could not be reached or could not answer
    UpstreamUnavailable(String),
}

impl RequestErr {
    pub(crate) fn unauthorized(reason: &str) -> Self {
        Self::Unauthorized(reason.to_string())
    }

    pub(crate) fn denied(reason: &str) -> Self {
        Self::SubscriptionDenied(reason.to_string())
    }

    pub fn status(&self) -> StatusCode {
        use RequestErr::*;
        match self {
            Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SubscriptionDenied(_) => StatusCode::NOT_FOUND,
            MalformedMessage(_) => StatusCode::BAD_REQUEST,
            UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// The human-readable reason sent to the client
    pub fn reason(&self) -> &str {
        use RequestErr::*;
        match self {
            Unauthorized(reason) | SubscriptionDenied(reason) | MalformedMessage(reason) => reason,
            UpstreamUnavailable(_) => "An unexpected error occurred",
        }
    }
}

impl std::error::Error for RequestErr {}
impl warp::reject::Reject for RequestErr {}

impl fmt::Display for RequestErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use RequestErr::*;
        match self {
            Unauthorized(reason) => write!(f, "Unauthorized: {}", reason),
            SubscriptionDenied(reason) => write!(f, "Subscription denied: {}", reason),
            MalformedMessage(reason) => write!(f, "Malformed message: {}", reason),
            UpstreamUnavailable(inner) => write!(f, "Upstream unavailable: {}", inner),
        }
    }
}

impl From<PgErr> for RequestErr {
    fn from(e: PgErr) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}
