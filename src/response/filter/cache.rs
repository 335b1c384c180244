use super::rules::FilterRule;
use crate::event::Id;
use crate::request::{query_store, PgErr, Store};

use std::sync::{Arc, Mutex};

type Rules = Arc<Vec<FilterRule>>;

#[derive(Debug)]
enum State {
    Absent,
    Populated(Rules),
}

#[derive(Debug)]
struct Inner {
    state: State,
    generation: u64,
}

/// A connection's compiled keyword filters.  Loaded on first use; `invalidate` discards them
/// so the next update re-reads the store.
#[derive(Debug)]
pub struct FilterCache {
    inner: Mutex<Inner>,
}

impl Default for FilterCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Absent,
                generation: 0,
            }),
        }
    }
}

impl FilterCache {
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = State::Absent;
        inner.generation += 1;
    }

    /// The cached rules, or the generation a load must match to be stored
    fn get(&self) -> Result<Rules, u64> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match &inner.state {
            State::Populated(rules) => Ok(Arc::clone(rules)),
            State::Absent => Err(inner.generation),
        }
    }

    /// Store freshly loaded rules unless the cache was invalidated while they loaded
    fn populate(&self, generation: u64, rules: Rules) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.generation == generation {
            inner.state = State::Populated(rules);
        }
    }

    pub async fn get_or_load(&self, store: &Arc<dyn Store>, account: Id) -> Result<Rules, PgErr> {
        let generation = match self.get() {
            Ok(rules) => return Ok(rules),
            Err(generation) => generation,
        };
        let rows = query_store(store, move |pg| pg.select_filter_rows(account)).await?;
        let rules = Arc::new(FilterRule::from_rows(rows));
        self.populate(generation, Arc::clone(&rules));
        Ok(rules)
    }
}
