use crate::from_env_var;
use std::time::Duration;

from_env_var!(
    /// The host address where Redis is running
    let name = RedisHost;
    let default: String = "127.0.0.1".to_string();
    let (env_var, allowed_values) = ("REDIS_HOST", "a valid address (e.g., 127.0.0.1)");
    let from_str = |s| Some(s.to_string());
);
from_env_var!(
    /// The port Redis is running on
    let name = RedisPort;
    let default: u16 = 6379;
    let (env_var, allowed_values) = ("REDIS_PORT", "a number between 0 and 65535");
    let from_str = |s| s.parse().ok();
);
from_env_var!(
    /// The password to use for Redis
    let name = RedisPass;
    let default: Option<String> = None;
    let (env_var, allowed_values) = ("REDIS_PASSWORD", "any string");
    let from_str = |s| Some(Some(s.to_string()));
);
from_env_var!(
    /// The Redis database for heartbeat keys (PubSub channels ignore databases)
    let name = RedisDb;
    let default: Option<u16> = None;
    let (env_var, allowed_values) = ("REDIS_DB", "a number");
    let from_str = |s| s.parse().ok().map(Some);
);
from_env_var!(
    /// A prefix for every Redis channel and key, for Redis instances shared by several sites
    let name = RedisNamespace;
    let default: Option<String> = None;
    let (env_var, allowed_values) = ("REDIS_NAMESPACE", "any string");
    let from_str = |s| Some(Some(s.to_string()));
);
from_env_var!(
    /// How often to refresh the `subscribed:<channel>` marker keys
    let name = RedisHeartbeat;
    let default: Duration = Duration::from_secs(6 * 60);
    let (env_var, allowed_values) = ("REDIS_HEARTBEAT_INTERVAL", "a number of seconds");
    let from_str = |s| s.parse().ok().filter(|n: &u64| *n > 0).map(Duration::from_secs);
);
