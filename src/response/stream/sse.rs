use super::super::metrics::ConnectedClients;
use super::super::redis::SharedManager;
use super::super::session::Session;
use crate::request::{Store, Subscription};

use futures::{future, stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use warp::reply::Reply;
use warp::sse::Event as SseEvent;

pub struct Sse;

impl Sse {
    /// Stream one resolved timeline to the client until it disconnects or its token is
    /// revoked.  The session is owned by the response stream, so dropping the stream
    /// unsubscribes everything.
    pub fn send_events(
        subscription: Subscription,
        store: Arc<dyn Store>,
        manager: SharedManager,
        clients: ConnectedClients,
        heartbeat: Duration,
    ) -> impl Reply {
        let (mut session, deliveries) = Session::new(&subscription, store, manager, clients);
        if let Some(timeline) = subscription.timeline {
            session.attach(timeline);
        }
        let kill = session.kill_switch();

        let opening = stream::once(future::ready(Ok(SseEvent::default().comment(")"))));
        let events = ReceiverStream::new(deliveries).map(move |delivery| {
            let _session = &session;
            Ok::<_, Infallible>(delivery.event.to_sse())
        });
        let event_stream = opening
            .chain(events)
            .take_until(async move { kill.notified().await });

        warp::sse::reply(
            warp::sse::keep_alive()
                .interval(heartbeat)
                .text("thump")
                .stream(event_stream),
        )
    }
}
