//! Decide whether an update reaches a viewer, and annotate it with their keyword filters.
mod cache;
mod rules;
mod text;

pub use cache::FilterCache;
pub use rules::{apply, FilterAction, FilterMeta, FilterResult, FilterRule};
pub use text::{html_to_text, searchable_text};

use crate::event::{Event, Id, Status};
use crate::request::{query_store, Identity, PgErr, Store};

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct Evaluator {
    identity: Arc<Identity>,
    store: Arc<dyn Store>,
    cache: Arc<FilterCache>,
    request_id: Uuid,
}

impl Evaluator {
    pub fn new(
        identity: Arc<Identity>,
        store: Arc<dyn Store>,
        cache: Arc<FilterCache>,
        request_id: Uuid,
    ) -> Self {
        Self {
            identity,
            store,
            cache,
            request_id,
        }
    }

    /// The event to deliver, or `None` if the viewer should not see it.  Only update-class
    /// events are inspected.
    pub async fn evaluate(&self, event: Arc<Event>) -> Option<Arc<Event>> {
        let status = match event.update_payload() {
            Some(status) => status,
            None => return Some(event),
        };
        if status.language_not(&self.identity.chosen_languages) {
            log::trace!("[{}] Skipping status {} by language", self.request_id, status.id);
            return None;
        }
        let viewer = match self.identity.account_id {
            Some(viewer) => viewer,
            None => return Some(event),
        };

        match self.is_blocked(viewer, status).await {
            Ok(false) => (),
            Ok(true) => return None,
            Err(e) => {
                log::error!("[{}] Dropping status {}: {}", self.request_id, status.id, e);
                return None;
            }
        }
        if status.filtered.is_some() {
            return Some(event);
        }

        let rules = match self.cache.get_or_load(&self.store, viewer).await {
            Ok(rules) => rules,
            Err(e) => {
                log::error!("[{}] Dropping status {}: {}", self.request_id, status.id, e);
                return None;
            }
        };
        let results = apply(&rules, &searchable_text(status), Utc::now());
        let results = match serde_json::to_value(results) {
            Ok(results) => results,
            Err(e) => {
                log::error!("[{}] Could not encode filter results: {}", self.request_id, e);
                return None;
            }
        };
        event.with_filter_results(results).map(Arc::new)
    }

    async fn is_blocked(&self, viewer: Id, status: &Status) -> Result<bool, PgErr> {
        let author = status.author();
        let targets = status.involved_accounts();
        let domain = status.author_domain().map(str::to_string);
        query_store(&self.store, move |pg| {
            pg.select_blocked(viewer, author, &targets, domain.as_deref())
        })
        .await
    }
}
