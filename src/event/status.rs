use super::Id;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A Status entity, as published on `update` and `status.update` events.
///
/// Only the fields needed to decide visibility are typed; every other field is kept verbatim
/// in `other` so that the Status can be re-encoded without loss.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Status {
    pub(crate) id: Id,
    pub(crate) account: Account,
    #[serde(default)]
    pub(crate) mentions: Vec<Mention>,
    #[serde(default)]
    pub(crate) language: Option<String>,
    #[serde(default)]
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) spoiler_text: String,
    #[serde(default)]
    pub(crate) poll: Option<Poll>,
    #[serde(default)]
    pub(crate) media_attachments: Vec<Attachment>,
    // Present when the publisher already evaluated the viewer's filters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) filtered: Option<Value>,
    #[serde(flatten)]
    pub(crate) other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub(crate) id: Id,
    pub(crate) acct: String,
    #[serde(flatten)]
    pub(crate) other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mention {
    pub(crate) id: Id,
    #[serde(flatten)]
    pub(crate) other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Poll {
    #[serde(default)]
    pub(crate) options: Vec<PollOption>,
    #[serde(flatten)]
    pub(crate) other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PollOption {
    pub(crate) title: String,
    #[serde(flatten)]
    pub(crate) other: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Attachment {
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(flatten)]
    pub(crate) other: Map<String, Value>,
}

impl Status {
    /// Returns `true` if the status is filtered out based on its language
    pub(crate) fn language_not(&self, allowed_langs: &[String]) -> bool {
        const ALLOW: bool = false;
        const REJECT: bool = true;

        if allowed_langs.is_empty() {
            return ALLOW; // listing no allowed_langs results in allowing all languages
        }
        match self.language.as_deref() {
            None | Some("") => ALLOW, // If toot language is unknown, toot is always allowed
            Some(toot_language) if allowed_langs.iter().any(|l| l == toot_language) => ALLOW,
            Some(toot_language) => {
                log::trace!(
                    "Filtering out toot {} from `{}` in `{}`; allowed: {:?}",
                    self.id,
                    self.account.acct,
                    toot_language,
                    allowed_langs
                );
                REJECT
            }
        }
    }

    pub(crate) fn author(&self) -> Id {
        self.account.id
    }

    /// The domain of the author's instance, or `None` for local accounts
    pub(crate) fn author_domain(&self) -> Option<&str> {
        self.account.acct.split('@').nth(1).filter(|domain| !domain.is_empty())
    }

    /// The author followed by every mentioned account
    pub(crate) fn involved_accounts(&self) -> Vec<Id> {
        std::iter::once(self.author())
            .chain(self.mentions.iter().map(|m| m.id))
            .collect()
    }

    /// All text a keyword filter applies to, still as HTML: spoiler text, content, poll
    /// options and media descriptions, separated by blank lines.
    pub(crate) fn searchable_content(&self) -> String {
        let poll_options = self.poll.iter().flat_map(|p| p.options.iter().map(|o| o.title.as_str()));
        let descriptions = self
            .media_attachments
            .iter()
            .map(|a| a.description.as_deref().unwrap_or_default());

        std::iter::once(self.spoiler_text.as_str())
            .chain(std::iter::once(self.content.as_str()))
            .chain(poll_options)
            .chain(descriptions)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub(crate) fn with_filter_results(&self, results: Value) -> Self {
        Self {
            filtered: Some(results),
            ..self.clone()
        }
    }
}
