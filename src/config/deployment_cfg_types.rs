use crate::from_env_var;
use std::{fmt, net::IpAddr, str::FromStr, time::Duration};
use strum::{EnumString, VariantNames};

from_env_var!(
    /// The current environment, which controls what file to read other ENV vars from
    let name = Env;
    let default: EnvInner = EnvInner::Development;
    let (env_var, allowed_values) = ("NODE_ENV", format!("one of: {:?}", EnvInner::VARIANTS));
    let from_str = |s| EnvInner::from_str(s).ok();
);
from_env_var!(
    /// The address to run the server on
    let name = ServerAddr;
    let default: IpAddr = IpAddr::V4("127.0.0.1".parse().expect("hardcoded"));
    let (env_var, allowed_values) = ("BIND", "a valid address (e.g., 127.0.0.1)");
    let from_str = |s| match s {
        "localhost" => Some(IpAddr::V4("127.0.0.1".parse().expect("hardcoded"))),
        _ => s.parse().ok(),
    };
);
from_env_var!(
    /// A Unix Socket to use in place of a local address
    let name = Socket;
    let default: Option<String> = None;
    let (env_var, allowed_values) = ("SOCKET", "any string");
    let from_str = |s| Some(Some(s.to_string()));
);
from_env_var!(
    /// The time between heartbeat comments sent via Server Sent Events
    let name = SseInterval;
    let default: Duration = Duration::from_millis(15_000);
    let (env_var, allowed_values) = ("SSE_FREQ", "a positive number of milliseconds");
    let from_str = |s| s.parse().ok().filter(|n: &u64| *n > 0).map(Duration::from_millis);
);
from_env_var!(
    /// The time between liveness pings sent via WebSocket
    let name = WsInterval;
    let default: Duration = Duration::from_millis(30_000);
    let (env_var, allowed_values) = ("WS_FREQ", "a positive number of milliseconds");
    let from_str = |s| s.parse().ok().filter(|n: &u64| *n > 0).map(Duration::from_millis);
);
from_env_var!(
    /// The port to run the server on
    let name = Port;
    let default: u16 = 4000;
    let (env_var, allowed_values) = ("PORT", "a number between 0 and 65535");
    let from_str = |s| s.parse().ok();
);
from_env_var!(
    /// If true, reject unauthenticated requests (for instances in limited federation mode)
    let name = WhitelistMode;
    let default: bool = false;
    let (env_var, allowed_values) = ("WHITELIST_MODE", "true or false");
    let from_str = |s| s.parse().ok();
);
from_env_var!(
    /// The number of worker processes to run
    let name = ClusterNum;
    let default: Option<usize> = None;
    let (env_var, allowed_values) = ("STREAMING_CLUSTER_NUM", "a positive number");
    let from_str = |s| s.parse().ok().filter(|n: &usize| *n > 0).map(Some);
);

#[derive(EnumString, VariantNames, Debug, Clone, Copy, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum EnvInner {
    Production,
    Development,
}

/// Permissions for Cross Origin Resource Sharing (CORS)
pub struct Cors<'a> {
    pub allowed_headers: Vec<&'a str>,
    pub allowed_methods: Vec<&'a str>,
}
impl fmt::Debug for Cors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allowed headers: {:?}\n      allowed methods: {:?}",
            self.allowed_headers, self.allowed_methods
        )
    }
}
impl std::default::Default for Cors<'_> {
    fn default() -> Self {
        Self {
            allowed_methods: vec!["GET", "OPTIONS"],
            allowed_headers: vec!["Authorization", "Accept", "Cache-Control"],
        }
    }
}
