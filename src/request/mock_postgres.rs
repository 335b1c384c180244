//! An in-memory stand-in for Postgres
use super::identity::{Identity, Scope};
use super::postgres::{FilterRow, PgErr, PoolStatus, Store};
use crate::event::Id;

use hashbrown::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Result<T> = std::result::Result<T, PgErr>;

#[derive(Default)]
pub struct MockPg {
    tokens: HashMap<String, Identity>,
    lists: HashMap<i64, Id>,
    blocks: HashSet<(Id, Id)>,
    domain_blocks: HashSet<(Id, String)>,
    filters: Mutex<HashMap<Id, Vec<FilterRow>>>,
    pub filter_reads: AtomicUsize,
    pub relationship_reads: AtomicUsize,
    fail: bool,
}

impl MockPg {
    pub fn with_token(mut self, token: &str, account: i64, token_id: i64, scopes: &str) -> Self {
        let identity = Identity {
            account_id: Some(Id(account)),
            access_token_id: Some(Id(token_id)),
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

    /// `account` blocks (or mutes) `target`
    pub fn with_block(mut self, account: i64, target: i64) -> Self {
        self.blocks.insert((Id(account), Id(target)));
        self
    }

    pub fn with_domain_block(mut self, account: i64, domain: &str) -> Self {
        self.domain_blocks.insert((Id(account), domain.to_string()));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn set_filters(&self, account: i64, rows: Vec<FilterRow>) {
        let mut filters = self.filters.lock().unwrap_or_else(|e| e.into_inner());
        filters.insert(Id(account), rows);
    }

    fn check(&self) -> Result<()> {
        match self.fail {
            true => Err(PgErr::Unavailable("mock configured to fail".to_string())),
            false => Ok(()),
        }
    }
}

pub fn keyword(filter_id: i64, title: &str, keyword: &str, whole_word: bool) -> FilterRow {
    FilterRow {
        filter_id: Id(filter_id),
        title: title.to_string(),
        context: vec!["home".to_string(), "public".to_string()],
        expires_at: None,
        action: 0,
        keyword: keyword.to_string(),
        whole_word,
    }
}

impl Store for MockPg {
    fn select_identity(&self, token: &str) -> Result<Option<Identity>> {
        self.check()?;
        Ok(self.tokens.get(token).cloned())
    }

    fn user_owns_list(&self, account: Id, list_id: i64) -> Result<bool> {
        self.check()?;
        Ok(self.lists.get(&list_id) == Some(&account))
    }

    fn select_blocked(
        &self,
        viewer: Id,
        author: Id,
        targets: &[Id],
        author_domain: Option<&str>,
    ) -> Result<bool> {
        self.check()?;
        self.relationship_reads.fetch_add(1, Ordering::SeqCst);
        let blocked_target = targets.iter().any(|t| self.blocks.contains(&(viewer, *t)));
        let blocked_by_author = self.blocks.contains(&(author, viewer));
        let blocked_domain = author_domain
            .map_or(false, |d| self.domain_blocks.contains(&(viewer, d.to_string())));
        Ok(blocked_target || blocked_by_author || blocked_domain)
    }

    fn select_filter_rows(&self, account: Id) -> Result<Vec<FilterRow>> {
        self.check()?;
        self.filter_reads.fetch_add(1, Ordering::SeqCst);
        let filters = self.filters.lock().unwrap_or_else(|e| e.into_inner());
        Ok(filters.get(&account).cloned().unwrap_or_default())
    }

    fn ping(&self) -> Result<()> {
        self.check()
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            total: 1,
            idle: 1,
            waiting: 0,
        }
    }
}
