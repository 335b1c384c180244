//! Streams a client can ask for, and the broker channels that carry them
pub use self::hashtag::normalize as normalize_hashtag;

use super::identity::{Identity, Scope};
use super::postgres::{self, Store};
use super::query::StreamParams;
use super::RequestErr;
use crate::event::Id;

use std::fmt;
use std::sync::Arc;

mod hashtag;

/// A broker channel name, without any namespace prefix
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Control events for every connection authenticated with one credential
    pub fn access_token(token_id: Id) -> Self {
        Self(format!("timeline:access_token:{}", token_id))
    }

    /// Control events for every connection authenticated as one account
    pub fn system(account: Id) -> Self {
        Self(format!("timeline:system:{}", account))
    }

    /// Administrative channels are never kept alive with heartbeats
    pub fn is_admin(&self) -> bool {
        self.0.starts_with("timeline:access_token:") || self.0.starts_with("timeline:system:")
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reach {
    Federated,
    Local,
    Remote,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    User,
    UserNotification,
    Public { reach: Reach, media: bool },
    Hashtag { local: bool },
    Direct,
    List,
}

impl Stream {
    pub fn from_name(name: &str, only_media: bool) -> Result<Self, RequestErr> {
        use {Reach::*, Stream::*};
        Ok(match name {
            "user" => User,
            "user:notification" => UserNotification,
            "public" => Public { reach: Federated, media: only_media },
            "public:local" => Public { reach: Local, media: only_media },
            "public:remote" => Public { reach: Remote, media: only_media },
            "public:media" => Public { reach: Federated, media: true },
            "public:local:media" => Public { reach: Local, media: true },
            "public:remote:media" => Public { reach: Remote, media: true },
            "hashtag" => Hashtag { local: false },
            "hashtag:local" => Hashtag { local: true },
            "direct" => Direct,
            "list" => List,
            other => {
                log::info!("Request for nonexistent stream: `{}`", other);
                Err(RequestErr::denied("Unknown stream type"))?
            }
        })
    }

    pub fn name(&self) -> &'static str {
        use {Reach::*, Stream::*};
        match self {
            User => "user",
            UserNotification => "user:notification",
            Public { reach: Federated, media: false } => "public",
            Public { reach: Local, media: false } => "public:local",
            Public { reach: Remote, media: false } => "public:remote",
            Public { reach: Federated, media: true } => "public:media",
            Public { reach: Local, media: true } => "public:local:media",
            Public { reach: Remote, media: true } => "public:remote:media",
            Hashtag { local: false } => "hashtag",
            Hashtag { local: true } => "hashtag:local",
            Direct => "direct",
            List => "list",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Stream::Public { .. } | Stream::Hashtag { .. })
    }

    /// Any one of these scopes grants access to a non-public stream
    fn required_scopes(&self) -> &'static [Scope] {
        match self {
            Stream::UserNotification => &[Scope::Read, Scope::Notifications],
            _ => &[Scope::Read, Scope::Statuses],
        }
    }

    pub fn check_scopes(&self, identity: &Identity) -> Result<(), RequestErr> {
        match self.is_public() || identity.has_any_scope(self.required_scopes()) {
            true => Ok(()),
            false => Err(RequestErr::denied("Access token does not cover required scopes")),
        }
    }
}

/// A resolved stream: the channels to subscribe and how to treat what arrives on them
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    pub stream: Stream,
    pub channels: Vec<Channel>,
    pub needs_filtering: bool,
    /// The `stream` field sent with each event on a multiplexed connection
    pub label: Vec<String>,
}

impl Timeline {
    /// Check scopes and resolve a stream request into channels.  Nothing is subscribed here.
    pub async fn resolve(
        stream_name: &str,
        params: &StreamParams,
        identity: &Identity,
        store: &Arc<dyn Store>,
    ) -> Result<Self, RequestErr> {
        use Stream::*;
        let stream = Stream::from_name(stream_name, params.only_media())?;
        stream.check_scopes(identity)?;
        let account = || {
            identity
                .account_id
                .ok_or_else(|| RequestErr::denied("Missing access token"))
        };
        let mut label = vec![stream.name().to_string()];

        let channels = match stream {
            User => {
                let account = account()?;
                let mut channels = vec![Channel(format!("timeline:{}", account))];
                if let (true, Some(device)) = (
                    identity.has_any_scope(&[Scope::Crypto]),
                    identity.device_id.as_ref(),
                ) {
                    channels.push(Channel(format!("timeline:{}:{}", account, device)));
                }
                if identity.has_any_scope(&[Scope::Read, Scope::Notifications]) {
                    channels.push(Channel(format!("timeline:{}:notifications", account)));
                }
                channels
            }
            UserNotification => vec![Channel(format!("timeline:{}:notifications", account()?))],
            Public { .. } => vec![Channel(format!("timeline:{}", stream.name()))],
            Hashtag { local } => {
                let tag = params
                    .tag
                    .as_deref()
                    .filter(|tag| !tag.is_empty())
                    .ok_or_else(|| RequestErr::denied("No tag for stream provided"))?;
                label.push(tag.to_string());
                let suffix = if local { ":local" } else { "" };
                vec![Channel(format!("timeline:hashtag:{}{}", normalize_hashtag(tag), suffix))]
            }
            Direct => vec![Channel(format!("timeline:direct:{}", account()?))],
            List => {
                let account = account()?;
                let denied = || RequestErr::denied("Not authorized to stream this list");
                let list = params.list.clone().ok_or_else(denied)?;
                let list_id: i64 = list.parse().map_err(|_| denied())?;
                let owned =
                    postgres::query(store, move |pg| pg.user_owns_list(account, list_id)).await?;
                if !owned {
                    Err(denied())?
                }
                label.push(list);
                vec![Channel(format!("timeline:list:{}", list_id))]
            }
        };

        Ok(Self {
            needs_filtering: stream.is_public(),
            stream,
            channels,
            label,
        })
    }

    /// Identifies this timeline within a connection, independent of channel order
    pub fn key(&self) -> String {
        let mut names: Vec<&str> = self.channels.iter().map(Channel::as_str).collect();
        names.sort_unstable();
        names.join(";")
    }
}
