//! One client connection's set of subscriptions.
//!
//! A `Session` owns every listener it registers with the `Manager`.  Each attached timeline
//! gets its own listener and its own delivery task, so events on one subscription are
//! delivered in the order Redis published them while other subscriptions proceed
//! independently.  Dropping the session removes every listener it registered.
use super::filter::{Evaluator, FilterCache};
use super::metrics::ConnectedClients;
use super::redis::{ListenerId, Manager, SharedManager};
use crate::event::Event;
use crate::request::{Channel, Identity, RequestErr, Store, StreamParams, Subscription, Timeline};

use hashbrown::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Deliveries a client may fall behind by before its session is closed
pub const DELIVERY_BUFFER: usize = 1024;

/// An event on its way to the client, with the stream label it was delivered for
#[derive(Debug, Clone)]
pub struct Delivery {
    pub stream: Arc<Vec<String>>,
    pub event: Arc<Event>,
}

struct Attached {
    channels: Vec<Channel>,
    listener: ListenerId,
    task: JoinHandle<()>,
}

pub struct Session {
    request_id: Uuid,
    identity: Arc<Identity>,
    store: Arc<dyn Store>,
    manager: SharedManager,
    cache: Arc<FilterCache>,
    kill: Arc<Notify>,
    out: mpsc::Sender<Delivery>,
    system: Option<Attached>,
    timelines: HashMap<String, Attached>,
    clients: ConnectedClients,
}

impl Session {
    /// Start a session for `subscription`, listening on its account's system channels.  The
    /// returned receiver yields every event the client should be sent.
    pub fn new(
        subscription: &Subscription,
        store: Arc<dyn Store>,
        manager: SharedManager,
        clients: ConnectedClients,
    ) -> (Self, mpsc::Receiver<Delivery>) {
        let (out, deliveries) = mpsc::channel(DELIVERY_BUFFER);
        clients.increment();
        let mut session = Self {
            request_id: subscription.request_id,
            identity: subscription.identity.clone(),
            store,
            manager,
            cache: Arc::new(FilterCache::default()),
            kill: Arc::new(Notify::new()),
            out,
            system: None,
            timelines: HashMap::new(),
            clients,
        };
        session.system = session.listen_for_system_events();
        (session, deliveries)
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Notified once if the session must close: its access token was revoked, its account
    /// was suspended, or the client stopped reading
    pub fn kill_switch(&self) -> Arc<Notify> {
        self.kill.clone()
    }

    /// Resolve a stream request and attach it.  Attaching a timeline the session already
    /// has is a no-op.
    pub async fn subscribe(&mut self, stream: &str, params: &StreamParams) -> Result<(), RequestErr> {
        let timeline = Timeline::resolve(stream, params, &self.identity, &self.store).await?;
        self.attach(timeline);
        Ok(())
    }

    pub async fn unsubscribe(&mut self, stream: &str, params: &StreamParams) -> Result<(), RequestErr> {
        let timeline = Timeline::resolve(stream, params, &self.identity, &self.store).await?;
        self.detach(&timeline.key());
        Ok(())
    }

    /// Returns `false` if an identical timeline was already attached
    pub fn attach(&mut self, timeline: Timeline) -> bool {
        let key = timeline.key();
        if self.timelines.contains_key(&key) {
            log::debug!("[{}] Already subscribed to {:?}", self.request_id, timeline.label);
            return false;
        }
        log::info!("[{}] Subscribing to {:?}", self.request_id, timeline.label);

        let (listener, mut events) = mpsc::unbounded_channel::<Arc<Event>>();
        let id = ListenerId::new();
        {
            let mut manager = self.manager.lock().unwrap_or_else(Manager::recover);
            for channel in &timeline.channels {
                manager.subscribe(channel, id, listener.clone());
            }
        }

        let label = Arc::new(timeline.label);
        let evaluator = match timeline.needs_filtering {
            true => Some(Evaluator::new(
                self.identity.clone(),
                self.store.clone(),
                self.cache.clone(),
                self.request_id,
            )),
            false => None,
        };
        let (out, kill, request_id) = (self.out.clone(), self.kill.clone(), self.request_id);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let event = match &evaluator {
                    Some(evaluator) => match evaluator.evaluate(event).await {
                        Some(event) => event,
                        None => continue,
                    },
                    None => event,
                };
                let delivery = Delivery {
                    stream: label.clone(),
                    event,
                };
                match out.try_send(delivery) {
                    Ok(()) => (),
                    Err(TrySendError::Full(_)) => {
                        log::warn!("[{}] Client fell {} events behind; closing", request_id, DELIVERY_BUFFER);
                        kill.notify_one();
                        break;
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        });

        self.timelines.insert(
            key,
            Attached {
                channels: timeline.channels,
                listener: id,
                task,
            },
        );
        true
    }

    /// Returns `false` if no timeline with this key was attached
    pub fn detach(&mut self, key: &str) -> bool {
        match self.timelines.remove(key) {
            Some(attached) => {
                log::info!("[{}] Unsubscribing from `{}`", self.request_id, key);
                self.release(attached);
                true
            }
            None => false,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.timelines.len()
    }

    fn listen_for_system_events(&self) -> Option<Attached> {
        let mut channels = Vec::new();
        if let Some(token) = self.identity.access_token_id {
            channels.push(Channel::access_token(token));
        }
        if let Some(account) = self.identity.account_id {
            channels.push(Channel::system(account));
        }
        if channels.is_empty() {
            return None;
        }

        let (listener, mut events) = mpsc::unbounded_channel::<Arc<Event>>();
        let id = ListenerId::new();
        {
            let mut manager = self.manager.lock().unwrap_or_else(Manager::recover);
            for channel in &channels {
                manager.subscribe(channel, id, listener.clone());
            }
        }

        let (kill, cache, request_id) = (self.kill.clone(), self.cache.clone(), self.request_id);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match *event {
                    Event::Kill => {
                        log::info!("[{}] Received `kill`; closing the connection", request_id);
                        kill.notify_one();
                    }
                    Event::FiltersChanged => cache.invalidate(),
                    ref other => {
                        log::debug!("[{}] Ignoring `{}` on a system channel", request_id, other.event_name())
                    }
                }
            }
        });
        Some(Attached {
            channels,
            listener: id,
            task,
        })
    }

    fn release(&self, attached: Attached) {
        attached.task.abort();
        let mut manager = self.manager.lock().unwrap_or_else(Manager::recover);
        for channel in &attached.channels {
            manager.unsubscribe(channel, attached.listener);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        log::info!("[{}] Closing session", self.request_id);
        let attached: Vec<Attached> = self
            .timelines
            .drain()
            .map(|(_, attached)| attached)
            .chain(self.system.take())
            .collect();
        for attached in attached {
            self.release(attached);
        }
        self.clients.decrement();
    }
}
