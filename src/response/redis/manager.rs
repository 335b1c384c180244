//! Tracks which listeners are interested in which Redis channels, fans received events out
//! to them, and decides when to (un)subscribe and when to refresh heartbeats.
use super::RedisCmd;
use crate::event::Event;
use crate::request::Channel;

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub type Listener = mpsc::UnboundedSender<Arc<Event>>;
pub type SharedManager = Arc<Mutex<Manager>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Subscribers {
    listeners: HashMap<ListenerId, Listener>,
    last_heartbeat: Instant,
}

#[derive(Debug)]
pub struct Manager {
    channels: HashMap<Channel, Subscribers>,
    redis_tx: mpsc::UnboundedSender<RedisCmd>,
    heartbeat_interval: Duration,
}

impl Manager {
    /// Create a new `Manager` that sends its commands to `redis_tx` (but, as yet, has no
    /// active subscriptions).
    pub fn new(redis_tx: mpsc::UnboundedSender<RedisCmd>, heartbeat_interval: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            redis_tx,
            heartbeat_interval,
        }
    }

    pub fn into_arc(self) -> SharedManager {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&mut self, channel: &Channel, id: ListenerId, listener: Listener) {
        if let Some(subscribers) = self.channels.get_mut(channel) {
            subscribers.listeners.insert(id, listener);
            return;
        }

        log::info!("Subscribing to Redis channel `{}`", channel);
        self.send(RedisCmd::Subscribe(channel.clone()));
        let now = Instant::now();
        if !channel.is_admin() {
            self.send(self.heartbeat(channel));
        }
        let mut listeners = HashMap::new();
        listeners.insert(id, listener);
        self.channels.insert(
            channel.clone(),
            Subscribers {
                listeners,
                last_heartbeat: now,
            },
        );
    }

    pub fn unsubscribe(&mut self, channel: &Channel, id: ListenerId) {
        let now_empty = match self.channels.get_mut(channel) {
            Some(subscribers) => {
                subscribers.listeners.remove(&id);
                subscribers.listeners.is_empty()
            }
            None => {
                log::warn!("Attempted to unsubscribe from `{}`, which has no listeners", channel);
                false
            }
        };
        if now_empty {
            self.remove_channel(channel);
        }
    }

    /// Send an event to every listener on a channel, dropping any listener that has gone away
    pub fn broadcast(&mut self, channel: &Channel, event: Arc<Event>) {
        let now_empty = match self.channels.get_mut(channel) {
            Some(subscribers) => {
                subscribers
                    .listeners
                    .retain(|_, listener| listener.send(event.clone()).is_ok());
                subscribers.listeners.is_empty()
            }
            None => {
                log::trace!("Dropping `{}` for `{}`: no listeners", event.event_name(), channel);
                false
            }
        };
        if now_empty {
            self.remove_channel(channel);
        }
    }

    /// Refresh the heartbeat key of every channel whose last heartbeat is at least one
    /// interval old
    pub fn send_heartbeats(&mut self, now: Instant) {
        let interval = self.heartbeat_interval;
        let due: Vec<Channel> = self
            .channels
            .iter_mut()
            .filter(|(channel, subs)| {
                !channel.is_admin() && now.saturating_duration_since(subs.last_heartbeat) >= interval
            })
            .map(|(channel, subs)| {
                subs.last_heartbeat = now;
                channel.clone()
            })
            .collect();
        for channel in due {
            self.send(self.heartbeat(&channel));
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn listener_count(&self, channel: &Channel) -> usize {
        self.channels.get(channel).map_or(0, |subs| subs.listeners.len())
    }

    pub fn recover(poisoned: PoisonError<MutexGuard<Self>>) -> MutexGuard<Self> {
        log::error!("{}", &poisoned);
        poisoned.into_inner()
    }

    fn remove_channel(&mut self, channel: &Channel) {
        log::info!("Unsubscribing from Redis channel `{}`", channel);
        self.channels.remove(channel);
        self.send(RedisCmd::Unsubscribe(channel.clone()));
    }

    fn heartbeat(&self, channel: &Channel) -> RedisCmd {
        RedisCmd::Heartbeat {
            channel: channel.clone(),
            ttl: self.heartbeat_interval * 3,
        }
    }

    fn send(&self, cmd: RedisCmd) {
        if let Err(e) = self.redis_tx.send(cmd) {
            log::error!("Could not send `{:?}`: the Redis connection is closed", e.0);
        }
    }
}

#[cfg(test)]
mod test;
