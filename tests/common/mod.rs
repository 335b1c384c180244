//! A Store that lives in memory, plus helpers shared by the integration tests
#![allow(dead_code)]
use fanout::event::Id;
use fanout::request::{FilterRow, Identity, PgErr, PoolStatus, Scope, Store};
use fanout::response::{ConnectedClients, Manager, RedisCmd, SharedManager};

use hashbrown::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const UPDATE: &str = include_str!("../../test_data/update_event.json");

#[derive(Default)]
pub struct MemoryStore {
    pub tokens: HashMap<String, Identity>,
    pub lists: HashMap<i64, Id>,
    pub mutes: HashSet<(Id, Id)>,
    pub filters: Mutex<Vec<(Id, FilterRow)>>,
    pub filter_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn with_token(mut self, token: &str, account: i64, scopes: &str) -> Self {
        let identity = Identity {
            account_id: Some(Id(account)),
            access_token_id: Some(Id(account * 100)),
            scopes: Scope::parse_all(scopes),
            ..Identity::default()
        };
        self.tokens.insert(token.to_string(), identity);
        self
    }

    pub fn with_list(mut self, list: i64, owner: i64) -> Self {
        self.lists.insert(list, Id(owner));
        self
    }

    pub fn with_mute(mut self, account: i64, target: i64) -> Self {
        self.mutes.insert((Id(account), Id(target)));
        self
    }

    pub fn add_keyword(&self, account: i64, filter_id: i64, keyword: &str, whole_word: bool) {
        let row = FilterRow {
            filter_id: Id(filter_id),
            title: format!("filter {}", filter_id),
            context: vec!["public".to_string()],
            expires_at: None,
            action: 0,
            keyword: keyword.to_string(),
            whole_word,
        };
        self.filters.lock().unwrap_or_else(|e| e.into_inner()).push((Id(account), row));
    }
}

impl Store for MemoryStore {
    fn select_identity(&self, token: &str) -> Result<Option<Identity>, PgErr> {
        Ok(self.tokens.get(token).cloned())
    }

    fn user_owns_list(&self, account: Id, list_id: i64) -> Result<bool, PgErr> {
        Ok(self.lists.get(&list_id) == Some(&account))
    }

    fn select_blocked(
        &self,
        viewer: Id,
        _author: Id,
        targets: &[Id],
        _author_domain: Option<&str>,
    ) -> Result<bool, PgErr> {
        Ok(targets.iter().any(|t| self.mutes.contains(&(viewer, *t))))
    }

    fn select_filter_rows(&self, account: Id) -> Result<Vec<FilterRow>, PgErr> {
        self.filter_reads.fetch_add(1, Ordering::SeqCst);
        let filters = self.filters.lock().unwrap_or_else(|e| e.into_inner());
        Ok(filters
            .iter()
            .filter(|(owner, _)| *owner == account)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn ping(&self) -> Result<(), PgErr> {
        Ok(())
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus::default()
    }
}

pub struct Server {
    pub store: Arc<MemoryStore>,
    pub manager: SharedManager,
    pub clients: ConnectedClients,
    pub redis_rx: mpsc::UnboundedReceiver<RedisCmd>,
}

impl Server {
    pub fn new(store: MemoryStore) -> Self {
        let (redis_tx, redis_rx) = mpsc::unbounded_channel();
        Self {
            store: Arc::new(store),
            manager: Manager::new(redis_tx, Duration::from_secs(360)).into_arc(),
            clients: ConnectedClients::default(),
            redis_rx,
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn listeners(&self, channel: &str) -> usize {
        let manager = self.manager.lock().unwrap_or_else(Manager::recover);
        manager.listener_count(&fanout::request::Channel::new(channel))
    }

    pub fn publish(&self, channel: &str, event_txt: &str) {
        let event = fanout::event::Event::try_from(event_txt).expect("valid event");
        let mut manager = self.manager.lock().unwrap_or_else(Manager::recover);
        manager.broadcast(&fanout::request::Channel::new(channel), Arc::new(event));
    }

    /// Every command the manager has sent to Redis so far
    pub fn redis_cmds(&mut self) -> Vec<RedisCmd> {
        let mut cmds = Vec::new();
        while let Ok(cmd) = self.redis_rx.try_recv() {
            cmds.push(cmd);
        }
        cmds
    }

    /// Wait (briefly) for a listener count, since sessions subscribe on their own tasks
    pub async fn wait_for_listeners(&self, channel: &str, count: usize) {
        for _ in 0..100 {
            if self.listeners(channel) == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("`{}` never reached {} listeners", channel, count);
    }
}

/// An update by account 42, mentioning account 7, with the given spoiler text
pub fn update_with_spoiler(spoiler_text: &str) -> String {
    let mut event: serde_json::Value = serde_json::from_str(UPDATE).expect("valid fixture");
    event["payload"]["spoiler_text"] = serde_json::Value::String(spoiler_text.to_string());
    event.to_string()
}
