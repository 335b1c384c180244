//! Parse the client request and return a Subscription
mod err;
mod identity;
mod postgres;
mod query;
mod subscription;
pub mod timeline;

#[cfg(test)]
pub(crate) mod mock_postgres;

pub use self::err::RequestErr;
pub use self::identity::{Identity, Scope};
pub use self::postgres::{query as query_store, FilterRow, PgErr, PgPool, PoolStatus, Store};
pub use self::query::StreamParams;
pub use subscription::Subscription;
pub use timeline::{Channel, Stream, Timeline};

use self::query::{OptionalAccessToken, Query};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::ws::Ws;
use warp::{filters::BoxedFilter, path, Filter, Rejection, Reply};

/// Helper macro to match on the first of any of the provided filters
macro_rules! any_of {
    ($filter:expr, $($other_filter:expr),*) => {
        $filter$(.or($other_filter).unify())*.boxed()
    };
}
macro_rules! parse_sse_query {
    (path => $start:tt $(/ $next:tt)*
     endpoint => $endpoint:expr) => {
        path!($start $(/ $next)*)
            .and(Query::to_filter())
            .map(|q: Query| Query {
                stream: Some($endpoint.to_string()),
                ..q
            })
            .boxed()
    };
}

#[derive(Clone)]
pub struct Handler {
    store: Arc<dyn Store>,
    require_auth: bool,
}

impl Handler {
    pub fn new(store: Arc<dyn Store>, require_auth: bool) -> Self {
        Self { store, require_auth }
    }

    pub fn ws_subscription(&self) -> BoxedFilter<(Ws, Subscription)> {
        let (store, require_auth) = (self.store.clone(), self.require_auth);
        path!("api" / "v1" / "streaming")
            .and(warp::ws())
            .and(Query::to_filter())
            .and(OptionalAccessToken::from_auth_header())
            .and(OptionalAccessToken::from_ws_header())
            .and_then(move |ws: Ws, q: Query, header: Option<String>, protocol: Option<String>| {
                let store = store.clone();
                async move {
                    Subscription::from_ws_query(q, header, protocol, store, require_auth)
                        .await
                        .map(|subscription| (ws, subscription))
                        .map_err(warp::reject::custom)
                }
            })
            .untuple_one()
            .boxed()
    }

    pub fn sse_subscription(&self) -> BoxedFilter<(Subscription,)> {
        let (store, require_auth) = (self.store.clone(), self.require_auth);
        let query = any_of!(
            parse_sse_query!(
            path => "api" / "v1" / "streaming" / "user" / "notification"
            endpoint => "user:notification" ),
            parse_sse_query!(
            path => "api" / "v1" / "streaming" / "user"
            endpoint => "user"),
            parse_sse_query!(
            path => "api" / "v1" / "streaming" / "public" / "local"
            endpoint => "public:local"),
            parse_sse_query!(
            path => "api" / "v1" / "streaming" / "public" / "remote"
            endpoint => "public:remote"),
            parse_sse_query!(
            path => "api" / "v1" / "streaming" / "public"
            endpoint => "public"),
            parse_sse_query!(
            path => "api" / "v1" / "streaming" / "direct"
            endpoint => "direct"),
            parse_sse_query!(path => "api" / "v1" / "streaming" / "hashtag" / "local"
                     endpoint => "hashtag:local"),
            parse_sse_query!(path => "api" / "v1" / "streaming" / "hashtag"
                     endpoint => "hashtag"),
            parse_sse_query!(path => "api" / "v1" / "streaming" / "list"
                endpoint => "list")
        );

        warp::get()
            .and(query)
            // SSE clients usually send their token in a header rather than the query string
            .and(OptionalAccessToken::from_auth_header())
            .and_then(move |q: Query, header: Option<String>| {
                let store = store.clone();
                async move {
                    Subscription::from_sse_query(q, header, store, require_auth)
                        .await
                        .map_err(warp::reject::custom)
                }
            })
            .boxed()
    }

    pub fn health(&self) -> BoxedFilter<(&'static str,)> {
        warp::get()
            .and(path!("api" / "v1" / "streaming" / "health"))
            .map(|| "OK")
            .boxed()
    }

    pub fn metrics(&self) -> BoxedFilter<()> {
        warp::get().and(path!("metrics")).boxed()
    }

    pub async fn err(r: Rejection) -> Result<impl Reply, Infallible> {
        let (status, reason) = match r.find::<RequestErr>() {
            Some(e) => (e.status(), e.reason().to_string()),
            None if r.is_not_found() => (StatusCode::NOT_FOUND, "Not found".to_string()),
            None if r.find::<warp::reject::MethodNotAllowed>().is_some() => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
            }
            None => {
                log::warn!("Unhandled rejection: {:?}", r);
                (StatusCode::BAD_REQUEST, "Bad request".to_string())
            }
        };
        let json = warp::reply::json(&json!({ "error": reason }));
        Ok(warp::reply::with_status(json, status))
    }
}

#[cfg(test)]
mod sse_test;
