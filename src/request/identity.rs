use super::postgres::{self, Store};
use super::RequestErr;
use crate::event::Id;

use hashbrown::HashSet;
use std::sync::Arc;

/// Who is connected, and what their credential allows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Identity {
    pub account_id: Option<Id>,
    pub access_token_id: Option<Id>,
    pub scopes: HashSet<Scope>,
    pub device_id: Option<String>,
    pub chosen_languages: Vec<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn has_any_scope(&self, required: &[Scope]) -> bool {
        required.iter().any(|scope| self.scopes.contains(scope))
    }

    /// Resolve a credential.  A missing credential yields an anonymous identity unless the
    /// server requires authentication for every stream.
    pub async fn resolve(
        token: Option<String>,
        store: &Arc<dyn Store>,
        require_auth: bool,
    ) -> Result<Self, RequestErr> {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => postgres::query(store, move |pg| pg.select_identity(&token))
                .await?
                .ok_or_else(|| RequestErr::unauthorized("Invalid access token")),
            None if require_auth => Err(RequestErr::unauthorized("Missing access token")),
            None => Ok(Self::anonymous()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Read,
    Statuses,
    Notifications,
    Crypto,
}

impl Scope {
    pub fn parse_all(scopes: &str) -> HashSet<Self> {
        scopes.split(' ').filter_map(Scope::parse).collect()
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Scope::Read),
            "read:statuses" => Some(Scope::Statuses),
            "read:notifications" => Some(Scope::Notifications),
            "crypto" => Some(Scope::Crypto),
            "" => None,
            other if other.starts_with("read:") => {
                log::debug!("Ignoring scope `{}`, which grants no streams", other);
                None
            }
            _ => None, // write, follow, push, admin:* and friends
        }
    }
}
