use super::super::metrics::ConnectedClients;
use super::super::redis::SharedManager;
use super::super::session::{Delivery, Session};
use crate::request::{RequestErr, Store, StreamParams, Subscription};

use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

const INVALID_PAYLOAD: u16 = 1007;
const UNSUPPORTED_DATA: u16 = 1003;
/// Frames the socket may fall behind by before the connection is closed
const OUTBOUND_BUFFER: usize = 256;

/// A message sent by the client to change what the connection is subscribed to
#[derive(Deserialize, Debug)]
struct ControlMsg {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    stream: Option<StreamName>,
    #[serde(flatten)]
    params: StreamParams,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StreamName {
    One(String),
    Many(Vec<String>),
}

impl StreamName {
    fn first(&self) -> &str {
        match self {
            StreamName::One(name) => name,
            StreamName::Many(names) => names.first().map(String::as_str).unwrap_or_default(),
        }
    }
}

enum Next {
    Continue,
    Close,
}

pub struct Ws {
    subscription: Subscription,
    store: Arc<dyn Store>,
    manager: SharedManager,
    clients: ConnectedClients,
    ping_interval: Duration,
}

impl Ws {
    pub fn new(
        subscription: Subscription,
        store: Arc<dyn Store>,
        manager: SharedManager,
        clients: ConnectedClients,
        ping_interval: Duration,
    ) -> Self {
        Self {
            subscription,
            store,
            manager,
            clients,
            ping_interval,
        }
    }

    pub async fn send_to(self, ws: WebSocket) {
        let (session, deliveries) = Session::new(&self.subscription, self.store, self.manager, self.clients);
        let request_id = session.request_id();
        let (transmit_to_ws, incoming) = ws.split();

        // Everything bound for the client goes through one pipe, drained by its own task
        let (ws_tx, ws_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
        let forwarder = tokio::spawn(async move {
            let outgoing = ReceiverStream::new(ws_rx).map(Ok);
            if let Err(e) = outgoing.forward(transmit_to_ws).await {
                match e.to_string().as_ref() {
                    "IO error: Broken pipe (os error 32)" => (), // just closed unix socket
                    _ => log::warn!("[{}] WebSocket send error: {}", request_id, e),
                }
            }
        });

        let initial_stream = self.subscription.initial_stream;
        relay(session, deliveries, incoming, ws_tx, initial_stream, self.ping_interval).await;
        let _ = forwarder.await;
        log::info!("[{}] WebSocket closed", request_id);
    }
}

/// Drive one connection until the client leaves, stops answering pings, stops reading, or
/// is killed.  Consumes the session, so every listener is gone by the time this returns.
async fn relay<S>(
    mut session: Session,
    mut deliveries: mpsc::Receiver<Delivery>,
    mut incoming: S,
    ws_tx: mpsc::Sender<Message>,
    initial_stream: Option<(String, StreamParams)>,
    ping_interval: Duration,
) where
    S: Stream<Item = Result<Message, warp::Error>> + Unpin,
{
    let request_id = session.request_id();
    if let Some((stream, params)) = &initial_stream {
        if let Err(e) = session.subscribe(stream, params).await {
            send_error(&ws_tx, request_id, &e);
        }
    }

    let kill = session.kill_switch();
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await;
    let mut awaiting_pong = false;

    loop {
        let next = tokio::select! {
            msg = incoming.next() => match msg {
                Some(Ok(msg)) if msg.is_pong() => {
                    awaiting_pong = false;
                    Next::Continue
                }
                Some(Ok(msg)) => handle_client_msg(&mut session, &ws_tx, msg).await,
                Some(Err(e)) => {
                    log::info!("[{}] WebSocket receive error: {}", request_id, e);
                    Next::Close
                }
                None => Next::Close,
            },
            Some(delivery) = deliveries.recv() => send_delivery(&ws_tx, request_id, delivery),
            _ = ping.tick() => match awaiting_pong {
                true => {
                    log::info!("[{}] Ping went unanswered; closing the connection", request_id);
                    Next::Close
                }
                false => {
                    awaiting_pong = true;
                    send(&ws_tx, request_id, Message::ping(Vec::new()))
                }
            },
            _ = kill.notified() => {
                let _ = ws_tx.try_send(Message::close());
                Next::Close
            }
        };
        if let Next::Close = next {
            break;
        }
    }
}

async fn handle_client_msg(session: &mut Session, ws_tx: &mpsc::Sender<Message>, msg: Message) -> Next {
    let request_id = session.request_id();
    if msg.is_close() {
        return Next::Close;
    }
    if msg.is_binary() {
        let _ = ws_tx.try_send(Message::close_with(UNSUPPORTED_DATA, "Binary messages are not supported"));
        return Next::Close;
    }
    let text = match msg.to_str() {
        Ok(text) => text,
        Err(()) => return Next::Continue, // ping; answered automatically
    };

    let control = match serde_json::from_str::<ControlMsg>(text) {
        Ok(control) => control,
        Err(e) => {
            let err = RequestErr::MalformedMessage(e.to_string());
            log::info!("[{}] {}", request_id, err);
            let _ = ws_tx.try_send(Message::close_with(INVALID_PAYLOAD, "Malformed message"));
            return Next::Close;
        }
    };
    let stream = control.stream.as_ref().map(StreamName::first).unwrap_or_default();
    let result = match control.kind.as_str() {
        "subscribe" => session.subscribe(stream, &control.params).await,
        "unsubscribe" => session.unsubscribe(stream, &control.params).await,
        other => {
            log::debug!("[{}] Ignoring control message of type `{}`", request_id, other);
            Ok(())
        }
    };
    if let Err(e) = result {
        send_error(ws_tx, request_id, &e);
    }
    Next::Continue
}

fn send_delivery(ws_tx: &mpsc::Sender<Message>, request_id: Uuid, delivery: Delivery) -> Next {
    send(ws_tx, request_id, Message::text(delivery.event.to_ws_json(&delivery.stream)))
}

fn send_error(ws_tx: &mpsc::Sender<Message>, request_id: Uuid, err: &RequestErr) {
    log::info!("[{}] {}", request_id, err);
    let _ = send(ws_tx, request_id, Message::text(json!({ "error": err.reason() }).to_string()));
}

fn send(ws_tx: &mpsc::Sender<Message>, request_id: Uuid, msg: Message) -> Next {
    match ws_tx.try_send(msg) {
        Ok(()) => Next::Continue,
        Err(TrySendError::Full(_)) => {
            log::warn!("[{}] Socket fell {} messages behind; closing", request_id, OUTBOUND_BUFFER);
            Next::Close
        }
        Err(TrySendError::Closed(_)) => Next::Close,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::{Event, Id};
    use crate::request::mock_postgres::MockPg;
    use crate::request::{Channel, Identity, Scope};
    use crate::response::redis::{Manager, RedisCmd};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    struct Fixture {
        manager: SharedManager,
        _redis_rx: mpsc::UnboundedReceiver<RedisCmd>,
    }

    struct Client {
        incoming: mpsc::UnboundedSender<Result<Message, warp::Error>>,
        outgoing: mpsc::Receiver<Message>,
        relay: JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let (redis_tx, _redis_rx) = mpsc::unbounded_channel();
        Fixture {
            manager: Manager::new(redis_tx, Duration::from_secs(360)).into_arc(),
            _redis_rx,
        }
    }

    fn viewer() -> Identity {
        Identity {
            account_id: Some(Id(1)),
            access_token_id: Some(Id(10)),
            scopes: [Scope::Read].iter().copied().collect(),
            ..Identity::default()
        }
    }

    impl Fixture {
        fn connect(&self, stream: Option<&str>, ping_interval: Duration) -> Client {
            let subscription = Subscription {
                request_id: Uuid::new_v4(),
                identity: Arc::new(viewer()),
                timeline: None,
                initial_stream: stream.map(|name| (name.to_string(), StreamParams::default())),
                ws_protocol: None,
            };
            let (session, deliveries) = Session::new(
                &subscription,
                Arc::new(MockPg::default()),
                self.manager.clone(),
                ConnectedClients::default(),
            );
            let (incoming, incoming_rx) = mpsc::unbounded_channel();
            let (ws_tx, outgoing) = mpsc::channel(OUTBOUND_BUFFER);
            let relay = tokio::spawn(relay(
                session,
                deliveries,
                UnboundedReceiverStream::new(incoming_rx),
                ws_tx,
                subscription.initial_stream,
                ping_interval,
            ));
            Client {
                incoming,
                outgoing,
                relay,
            }
        }

        fn listeners(&self, channel: &str) -> usize {
            let manager = self.manager.lock().unwrap_or_else(Manager::recover);
            manager.listener_count(&Channel::new(channel))
        }

        async fn wait_for_listeners(&self, channel: &str, expected: usize) {
            let waited = timeout(Duration::from_secs(1), async {
                while self.listeners(channel) != expected {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            });
            assert!(waited.await.is_ok(), "`{}` never reached {} listeners", channel, expected);
        }

        fn publish(&self, channel: &Channel, event: Event) {
            let mut manager = self.manager.lock().unwrap_or_else(Manager::recover);
            manager.broadcast(channel, Arc::new(event));
        }
    }

    impl Client {
        fn send(&self, msg: Message) {
            self.incoming.send(Ok(msg)).expect("relay still reading");
        }

        async fn next(&mut self) -> Message {
            timeout(Duration::from_secs(60), self.outgoing.recv())
                .await
                .expect("sent in time")
                .expect("socket still open")
        }

        async fn finished(self) -> mpsc::Receiver<Message> {
            assert!(timeout(Duration::from_secs(61), self.relay).await.is_ok(), "relay kept running");
            self.outgoing
        }
    }

    const LONG: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn malformed_messages_close_with_invalid_payload() {
        let fx = fixture();
        let mut client = fx.connect(Some("public"), LONG);
        fx.wait_for_listeners("timeline:public", 1).await;

        client.send(Message::text("{not json"));
        let close = client.next().await;
        assert_eq!(close.close_frame().map(|(code, _)| code), Some(INVALID_PAYLOAD));
        client.finished().await;
        assert_eq!(fx.listeners("timeline:public"), 0);
        assert_eq!(fx.listeners("timeline:access_token:10"), 0);
    }

    #[tokio::test]
    async fn binary_messages_close_with_unsupported_data() {
        let fx = fixture();
        let mut client = fx.connect(None, LONG);
        client.send(Message::binary(vec![1, 2, 3]));
        let close = client.next().await;
        assert_eq!(close.close_frame().map(|(code, _)| code), Some(UNSUPPORTED_DATA));
        client.finished().await;
    }

    #[tokio::test]
    async fn control_messages_change_subscriptions() {
        let fx = fixture();
        let client = fx.connect(None, LONG);
        client.send(Message::text(r#"{"type":"subscribe","stream":"public"}"#));
        fx.wait_for_listeners("timeline:public", 1).await;
        client.send(Message::text(r#"{"type":"unsubscribe","stream":"public"}"#));
        fx.wait_for_listeners("timeline:public", 0).await;
        drop(client.incoming);
        timeout(Duration::from_secs(1), client.relay).await.expect("relay ended").expect("no panic");
    }

    #[tokio::test]
    async fn denied_streams_report_an_error_and_stay_open() {
        let fx = fixture();
        let mut client = fx.connect(None, LONG);
        client.send(Message::text(r#"{"type":"subscribe","stream":"no-such-stream"}"#));
        let reply = client.next().await;
        let body: serde_json::Value = serde_json::from_str(reply.to_str().expect("text frame")).expect("json");
        assert!(body["error"].is_string());

        client.send(Message::text(r#"{"type":"subscribe","stream":"public"}"#));
        fx.wait_for_listeners("timeline:public", 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_pings_end_the_connection() {
        let fx = fixture();
        let mut client = fx.connect(None, Duration::from_secs(30));
        assert!(client.next().await.is_ping());
        client.finished().await;
        assert_eq!(fx.listeners("timeline:access_token:10"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn answered_pings_keep_the_connection_open() {
        let fx = fixture();
        let mut client = fx.connect(None, Duration::from_secs(30));
        for _ in 0..5 {
            assert!(client.next().await.is_ping());
            client.send(Message::pong(Vec::new()));
        }
        assert_eq!(fx.listeners("timeline:access_token:10"), 1);

        drop(client.incoming);
        assert!(timeout(Duration::from_secs(1), client.relay).await.is_ok());
        assert_eq!(fx.listeners("timeline:access_token:10"), 0);
    }

    #[tokio::test]
    async fn kill_closes_the_socket() {
        let fx = fixture();
        let mut client = fx.connect(Some("public"), LONG);
        fx.wait_for_listeners("timeline:public", 1).await;

        fx.publish(&Channel::access_token(Id(10)), Event::Kill);
        assert!(client.next().await.is_close());
        client.finished().await;
        assert_eq!(fx.listeners("timeline:public"), 0);
    }

    #[tokio::test]
    async fn a_socket_that_stops_draining_is_closed() {
        let fx = fixture();
        let client = fx.connect(Some("user"), LONG);
        fx.wait_for_listeners("timeline:1", 1).await;

        for id in 0..=OUTBOUND_BUFFER {
            fx.publish(&Channel::new("timeline:1"), Event::Delete(id.to_string()));
        }
        let mut outgoing = client.finished().await;
        let mut queued = 0;
        while outgoing.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, OUTBOUND_BUFFER);
        assert_eq!(fx.listeners("timeline:1"), 0);
    }

    #[test]
    fn control_messages_accept_either_stream_shape() -> Result<(), serde_json::Error> {
        let msg: ControlMsg =
            serde_json::from_str(r#"{"type":"subscribe","stream":"hashtag","tag":"rust"}"#)?;
        assert_eq!(msg.kind, "subscribe");
        assert_eq!(msg.stream.as_ref().map(StreamName::first), Some("hashtag"));
        assert_eq!(msg.params.tag.as_deref(), Some("rust"));

        let msg: ControlMsg =
            serde_json::from_str(r#"{"type":"unsubscribe","stream":["list"],"list":3}"#)?;
        assert_eq!(msg.stream.as_ref().map(StreamName::first), Some("list"));
        assert_eq!(msg.params.list.as_deref(), Some("3"));
        Ok(())
    }

    #[test]
    fn control_messages_need_a_type() {
        assert!(serde_json::from_str::<ControlMsg>(r#"{"stream":"public"}"#).is_err());
        assert!(serde_json::from_str::<ControlMsg>("not json").is_err());
    }
}
