//! `Subscription` struct and related functionality
use super::identity::Identity;
use super::postgres::Store;
use super::query::{Query, StreamParams};
use super::timeline::Timeline;
use super::RequestErr;

use std::sync::Arc;
use uuid::Uuid;

/// An authenticated streaming request, ready to be attached to a session
#[derive(Clone, Debug)]
pub struct Subscription {
    pub request_id: Uuid,
    pub identity: Arc<Identity>,
    /// The stream named by an SSE path, already resolved
    pub timeline: Option<Timeline>,
    /// A stream named in a WebSocket query string, subscribed after the upgrade
    pub initial_stream: Option<(String, StreamParams)>,
    /// A token sent as the WebSocket subprotocol; it must be echoed back
    pub ws_protocol: Option<String>,
}

impl Subscription {
    pub(super) async fn from_sse_query(
        q: Query,
        header_token: Option<String>,
        store: Arc<dyn Store>,
        require_auth: bool,
    ) -> Result<Self, RequestErr> {
        let request_id = Uuid::new_v4();
        let stream = q.stream.unwrap_or_default();
        let identity = Identity::resolve(header_token.or(q.access_token), &store, require_auth)
            .await
            .map_err(|e| log_rejection(request_id, e))?;
        let timeline = Timeline::resolve(&stream, &q.params, &identity, &store)
            .await
            .map_err(|e| log_rejection(request_id, e))?;
        log::info!(
            "[{}] Starting SSE stream `{}` for account {:?}",
            request_id,
            stream,
            identity.account_id
        );

        Ok(Self {
            request_id,
            identity: Arc::new(identity),
            timeline: Some(timeline),
            initial_stream: None,
            ws_protocol: None,
        })
    }

    pub(super) async fn from_ws_query(
        q: Query,
        header_token: Option<String>,
        protocol_token: Option<String>,
        store: Arc<dyn Store>,
        require_auth: bool,
    ) -> Result<Self, RequestErr> {
        let request_id = Uuid::new_v4();
        let ws_protocol = protocol_token.filter(|t| !t.is_empty());
        let token = header_token.or(q.access_token).or_else(|| ws_protocol.clone());
        let identity = Identity::resolve(token, &store, require_auth)
            .await
            .map_err(|e| log_rejection(request_id, e))?;
        log::info!(
            "[{}] Starting WebSocket session for account {:?}",
            request_id,
            identity.account_id
        );

        Ok(Self {
            request_id,
            identity: Arc::new(identity),
            timeline: None,
            initial_stream: q.stream.map(|stream| (stream, q.params)),
            ws_protocol,
        })
    }
}

fn log_rejection(request_id: Uuid, e: RequestErr) -> RequestErr {
    match &e {
        RequestErr::UpstreamUnavailable(_) => log::error!("[{}] {}", request_id, e),
        _ => log::info!("[{}] Rejected: {}", request_id, e),
    }
    e
}
