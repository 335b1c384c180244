//! Validate query params with type checking
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use warp::filters::BoxedFilter;
use warp::Filter as WarpFilter;

/// The query string of a streaming request
#[derive(Deserialize, Debug, Default, Clone)]
pub struct Query {
    pub access_token: Option<String>,
    pub stream: Option<String>,
    #[serde(flatten)]
    pub params: StreamParams,
}

/// Stream parameters shared by query strings and WebSocket control messages
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct StreamParams {
    #[serde(default, deserialize_with = "string_or_number")]
    pub tag: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub list: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub only_media: Option<String>,
}

impl StreamParams {
    /// `only_media` is set unless it is missing or one of the usual spellings of false
    pub fn only_media(&self) -> bool {
        const FALSE_VALUES: [&str; 9] = ["", "false", "0", "f", "F", "FALSE", "off", "OFF", "False"];
        self.only_media
            .as_deref()
            .map_or(false, |value| !FALSE_VALUES.contains(&value))
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

impl Query {
    pub fn to_filter() -> BoxedFilter<(Self,)> {
        warp::query()
            .or(warp::any().map(Self::default))
            .unify()
            .boxed()
    }
}

pub(super) struct OptionalAccessToken;

impl OptionalAccessToken {
    pub(super) fn from_auth_header() -> BoxedFilter<(Option<String>,)> {
        warp::header::optional::<String>("authorization")
            .map(|auth: Option<String>| {
                auth.and_then(|auth| {
                    let (scheme, token) = auth.split_once(' ')?;
                    match scheme.eq_ignore_ascii_case("bearer") {
                        true => Some(token.trim().to_string()),
                        false => None,
                    }
                })
            })
            .boxed()
    }

    pub(super) fn from_ws_header() -> BoxedFilter<(Option<String>,)> {
        warp::header::optional::<String>("sec-websocket-protocol").boxed()
    }
}
