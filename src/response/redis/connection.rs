mod err;
pub use err::RedisConnErr;

use super::msg::{RedisParseErr, RedisParseOutput, RedisReply};
use super::{Manager, RedisCmd, SharedManager, Target};
use crate::config::Redis;
use crate::event::Event;
use crate::request::Channel;

use std::str;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

type Result<T> = std::result::Result<T, RedisConnErr>;

/// A pair of Redis connections: `primary` is in subscriber mode and receives events;
/// `secondary` sends the commands that subscriber mode forbids.
#[derive(Debug)]
pub struct RedisConn {
    primary: TcpStream,
    secondary: TcpStream,
    redis_namespace: Option<String>,
    addr: String,
}

impl RedisConn {
    pub async fn new(redis_cfg: &Redis) -> Result<Self> {
        let addr = [&*redis_cfg.host, ":", &*redis_cfg.port.to_string()].concat();

        let primary = Self::new_connection(&addr, redis_cfg.password.as_ref()).await?;
        let mut secondary = Self::new_connection(&addr, redis_cfg.password.as_ref()).await?;
        if let Some(db) = *redis_cfg.db {
            Self::select_db(&mut secondary, &addr, db).await?;
        }
        log::info!("Connected to Redis at {}", addr);

        Ok(Self {
            primary,
            secondary,
            redis_namespace: redis_cfg.namespace.clone().0,
            addr,
        })
    }

    /// Relay events from Redis to the `Manager`, and commands from the `Manager` to Redis.
    ///
    /// Returns `Ok` only once every command sender is gone; losing either connection is an
    /// error.
    pub async fn run(
        self,
        manager: SharedManager,
        mut cmds: mpsc::UnboundedReceiver<RedisCmd>,
    ) -> Result<()> {
        let Self {
            primary,
            secondary,
            redis_namespace,
            addr,
        } = self;
        let ns = redis_namespace.as_deref();
        let (mut primary_rx, mut primary_tx) = primary.into_split();
        let (mut secondary_rx, mut secondary_tx) = secondary.into_split();
        let (mut redis_input, mut redis_replies) = (Vec::new(), Vec::new());
        let (mut input_buf, mut reply_buf) = (vec![0_u8; 16 * 1024], vec![0_u8; 1024]);
        let mut heartbeat_check = tokio::time::interval(Duration::from_secs(1));
        let io_err = |e: std::io::Error| RedisConnErr::with_addr(&addr, e);

        loop {
            tokio::select! {
                n = primary_rx.read(&mut input_buf) => {
                    match n.map_err(io_err)? {
                        0 => Err(RedisConnErr::Closed(addr.clone()))?,
                        n => redis_input.extend_from_slice(&input_buf[..n]),
                    }
                    let consumed = dispatch(&redis_input, ns, &manager)?;
                    redis_input.drain(..consumed);
                }
                n = secondary_rx.read(&mut reply_buf) => {
                    match n.map_err(io_err)? {
                        0 => Err(RedisConnErr::Closed(addr.clone()))?,
                        n => redis_replies.extend_from_slice(&reply_buf[..n]),
                    }
                    let consumed = log_replies(&redis_replies)?;
                    redis_replies.drain(..consumed);
                }
                cmd = cmds.recv() => match cmd {
                    Some(cmd) => {
                        let (target, bytes) = cmd.into_sendable(ns);
                        match target {
                            Target::Subscriber => primary_tx.write_all(&bytes).await,
                            Target::Commands => secondary_tx.write_all(&bytes).await,
                        }
                        .map_err(io_err)?;
                    }
                    None => return Ok(()),
                },
                now = heartbeat_check.tick() => {
                    let mut manager = manager.lock().unwrap_or_else(Manager::recover);
                    manager.send_heartbeats(now.into_std());
                }
            }
        }
    }

    async fn new_connection(addr: &str, pass: Option<&String>) -> Result<TcpStream> {
        let mut conn = TcpStream::connect(&addr)
            .await
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        conn.set_nodelay(true)
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        if let Some(password) = pass {
            Self::auth_connection(&mut conn, addr, password).await?;
        }

        Self::validate_connection(&mut conn, addr).await?;
        Ok(conn)
    }

    async fn auth_connection(conn: &mut TcpStream, addr: &str, pass: &str) -> Result<()> {
        conn.write_all(&super::resp_array(&["AUTH", pass]))
            .await
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        let mut buffer = vec![0_u8; 5];
        conn.read_exact(&mut buffer)
            .await
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        if String::from_utf8_lossy(&buffer) != "+OK\r\n" {
            Err(RedisConnErr::IncorrectPassword(pass.to_string()))?
        }
        Ok(())
    }

    async fn select_db(conn: &mut TcpStream, addr: &str, db: u16) -> Result<()> {
        conn.write_all(&super::resp_array(&["SELECT", &db.to_string()]))
            .await
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        let mut buffer = vec![0_u8; 5];
        conn.read_exact(&mut buffer)
            .await
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        match &*String::from_utf8_lossy(&buffer) {
            "+OK\r\n" => Ok(()),
            other => Err(RedisConnErr::InvalidRedisReply(other.to_string())),
        }
    }

    async fn validate_connection(conn: &mut TcpStream, addr: &str) -> Result<()> {
        conn.write_all(b"PING\r\n")
            .await
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        let mut buffer = vec![0_u8; 7];
        conn.read_exact(&mut buffer)
            .await
            .map_err(|e| RedisConnErr::with_addr(addr, e))?;
        let reply = String::from_utf8_lossy(&buffer);
        match &*reply {
            "+PONG\r\n" => Ok(()),
            "-NOAUTH" => Err(RedisConnErr::MissingPassword),
            "HTTP/1." => Err(RedisConnErr::NotRedis(addr.to_string())),
            _ => Err(RedisConnErr::InvalidRedisReply(reply.to_string())),
        }
    }
}

/// Parse every complete message in `input` and hand each event to the `Manager`.
///
/// Returns the number of bytes consumed; an incomplete trailing message is left in place.
pub(super) fn dispatch(input: &[u8], namespace: Option<&str>, manager: &SharedManager) -> Result<usize> {
    let input = valid_utf8_prefix(input)?;
    let mut unread = input;
    loop {
        use RedisParseOutput::*;
        match RedisParseOutput::try_from(unread) {
            Ok(Msg(msg)) => {
                unread = msg.leftover_input;
                let channel = match strip_namespace(msg.channel_txt, namespace) {
                    Some(channel) => channel,
                    None => continue, // a channel for some other namespace
                };
                match Event::try_from(msg.event_txt) {
                    Ok(event) => {
                        let mut manager = manager.lock().unwrap_or_else(Manager::recover);
                        manager.broadcast(&Channel::new(channel), Arc::new(event));
                    }
                    Err(e) => log::error!("Dropping unparseable message on `{}`: {}", channel, e),
                }
            }
            Ok(NonMsg(leftover)) => unread = leftover,
            Err(RedisParseErr::Incomplete) => break,
            Err(e) => Err(RedisConnErr::Parse(e))?,
        }
    }
    Ok(input.len() - unread.len())
}

/// Check replies to our commands, logging any errors.  Returns the number of bytes consumed.
fn log_replies(input: &[u8]) -> Result<usize> {
    let input = valid_utf8_prefix(input)?;
    let mut unread = input;
    loop {
        match RedisReply::try_from(unread) {
            Ok(reply) => {
                if let Some(e) = reply.error {
                    log::error!("Redis rejected a command: {}", e);
                }
                unread = reply.leftover_input;
            }
            Err(RedisParseErr::Incomplete) => break,
            Err(e) => Err(RedisConnErr::Parse(e))?,
        }
    }
    Ok(input.len() - unread.len())
}

/// Input may end partway through a multi-byte character; anything else that is not UTF-8
/// means the connection is corrupt.
fn valid_utf8_prefix(input: &[u8]) -> Result<&str> {
    match str::from_utf8(input) {
        Ok(input) => Ok(input),
        Err(e) if e.error_len().is_none() => {
            Ok(str::from_utf8(&input[..e.valid_up_to()]).expect("Guaranteed by ^^^^"))
        }
        Err(_) => Err(RedisConnErr::InvalidUtf8),
    }
}

fn strip_namespace<'a>(channel: &'a str, namespace: Option<&str>) -> Option<&'a str> {
    match namespace {
        Some(ns) => channel.strip_prefix(ns)?.strip_prefix(':'),
        None => Some(channel),
    }
}
