//! The Redis side of the server: one subscriber connection, one command connection, and
//! the registry of listeners between them and the client sessions.
mod connection;
mod manager;
pub mod msg;

pub use connection::{RedisConn, RedisConnErr};
pub use manager::{Listener, ListenerId, Manager, SharedManager};

use crate::request::Channel;
use std::time::Duration;

/// Commands the `Manager` asks the Redis connection to send
#[derive(Debug, Clone, PartialEq)]
pub enum RedisCmd {
    Subscribe(Channel),
    Unsubscribe(Channel),
    /// Mark a channel as having live subscribers, so the web app keeps publishing to it
    Heartbeat { channel: Channel, ttl: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Subscriber,
    Commands,
}

impl RedisCmd {
    fn into_sendable(self, namespace: Option<&str>) -> (Target, Vec<u8>) {
        let ns = |name: &str| match namespace {
            Some(ns) => [ns, ":", name].concat(),
            None => name.to_string(),
        };
        match self {
            RedisCmd::Subscribe(channel) => (
                Target::Subscriber,
                resp_array(&["SUBSCRIBE", &ns(channel.as_str())]),
            ),
            RedisCmd::Unsubscribe(channel) => (
                Target::Subscriber,
                resp_array(&["UNSUBSCRIBE", &ns(channel.as_str())]),
            ),
            RedisCmd::Heartbeat { channel, ttl } => (
                Target::Commands,
                resp_array(&[
                    "SET",
                    &ns(&["subscribed:", channel.as_str()].concat()),
                    "1",
                    "EX",
                    &ttl.as_secs().max(1).to_string(),
                ]),
            ),
        }
    }
}

fn resp_array(args: &[&str]) -> Vec<u8> {
    let mut cmd = ["*", &*args.len().to_string(), "\r\n"].concat().into_bytes();
    for &arg in args {
        cmd.extend_from_slice(["$", &*arg.len().to_string(), "\r\n", arg, "\r\n"].concat().as_bytes());
    }
    cmd
}
