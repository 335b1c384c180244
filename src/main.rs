use fanout::config;
use fanout::err::FatalErr;
use fanout::request::{Handler, PgPool, Store, Subscription};
use fanout::response::{ConnectedClients, Manager, Metrics, RedisConn, Sse, Ws};
use fanout::worker;

use std::fs;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use uuid::Uuid;
use warp::http::header::HeaderValue;
use warp::reply::{Reply, Response};
use warp::Filter;

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

fn main() -> Result<(), FatalErr> {
    config::merge_dotenv()?;
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .try_init()?;
    let (postgres_cfg, redis_cfg, cfg) = config::from_env(dotenv::vars().collect())?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    let worker_count = cfg.worker_count();
    if worker_count > 1 && worker::id().is_none() {
        return runtime.block_on(worker::supervise(worker_count));
    }

    // The synchronous Postgres client must connect outside of the runtime
    let store: Arc<dyn Store> = Arc::new(PgPool::new(&postgres_cfg)?);
    runtime.block_on(async move {
        let redis_conn = RedisConn::new(&redis_cfg).await?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let manager = Manager::new(cmd_tx, *redis_cfg.heartbeat_interval).into_arc();
        let redis_manager = manager.clone();
        tokio::spawn(async move {
            match redis_conn.run(redis_manager, cmd_rx).await {
                Ok(()) => FatalErr::exit(FatalErr::Unrecoverable),
                Err(e) => FatalErr::exit(FatalErr::Redis(e)),
            };
        });
        worker::watch_store(store.clone());

        let clients = ConnectedClients::default();
        let request = Handler::new(store.clone(), *cfg.whitelist_mode);

        // Server Sent Events
        let (sse_store, sse_manager, sse_clients) = (store.clone(), manager.clone(), clients.clone());
        let sse_freq = *cfg.sse_interval;
        let sse = request
            .sse_subscription()
            .map(move |subscription: Subscription| {
                log::info!("Incoming SSE request for {:?}", subscription.timeline);
                let request_id = subscription.request_id;
                let reply = Sse::send_events(
                    subscription,
                    sse_store.clone(),
                    sse_manager.clone(),
                    sse_clients.clone(),
                    sse_freq,
                );
                with_request_id(reply, request_id)
            })
            .with(warp::reply::with::header("Connection", "keep-alive"));

        // WebSocket
        let (ws_store, ws_manager, ws_clients) = (store.clone(), manager.clone(), clients.clone());
        let ws_freq = *cfg.ws_interval;
        let ws = request
            .ws_subscription()
            .map(move |ws: warp::ws::Ws, subscription: Subscription| {
                log::info!("Incoming WebSocket request {}", subscription.request_id);
                let request_id = subscription.request_id;
                let protocol = subscription.ws_protocol.clone();
                let session = Ws::new(
                    subscription,
                    ws_store.clone(),
                    ws_manager.clone(),
                    ws_clients.clone(),
                    ws_freq,
                );
                let mut reply = with_request_id(ws.on_upgrade(move |ws| session.send_to(ws)), request_id);
                // The token was sent as a subprotocol, so the client expects it echoed back
                if let Some(value) = protocol.and_then(|p| HeaderValue::from_str(&p).ok()) {
                    reply.headers_mut().insert("sec-websocket-protocol", value);
                }
                reply
            });

        let metrics = Metrics {
            clients,
            manager,
            store,
        };
        let status = request.health().map(|ok: &'static str| ok.into_response()).or(request
            .metrics()
            .map(move || warp::reply::with_header(metrics.render(), "content-type", OPENMETRICS)));

        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(cfg.cors.allowed_methods.clone())
            .allow_headers(cfg.cors.allowed_headers.clone());

        let routes = ws
            .or(sse)
            .with(cors)
            .or(status)
            .recover(Handler::err)
            .map(|reply| with_request_id(reply, Uuid::new_v4()));
        let server = warp::serve(routes);

        if let Some(socket) = &*cfg.unix_socket {
            log::info!("Using Unix socket {}", socket);
            fs::remove_file(socket).unwrap_or_default();
            let incoming = UnixListenerStream::new(UnixListener::bind(socket)?);
            fs::set_permissions(socket, PermissionsExt::from_mode(0o666))?;
            server
                .serve_incoming_with_graceful_shutdown(incoming, worker::shutdown_signal())
                .await;
        } else {
            let server_addr = SocketAddr::new(*cfg.address, *cfg.port);
            let listener = worker::bind(server_addr)?;
            log::warn!("Worker {:?} listening on {}", worker::id(), server_addr);
            server
                .serve_incoming_with_graceful_shutdown(
                    TcpListenerStream::new(listener),
                    worker::shutdown_signal(),
                )
                .await;
        }
        Ok::<(), FatalErr>(())
    })
}

/// Tag a response with its request id, unless an inner filter already did
fn with_request_id(reply: impl Reply, request_id: Uuid) -> Response {
    let mut response = reply.into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().entry("x-request-id").or_insert(value);
    }
    response
}
