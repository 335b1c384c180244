use super::redis_cfg_types::*;
use super::EnvVar;
use crate::err::FatalErr;

#[derive(Debug, Clone, Default)]
pub struct Redis {
    pub password: RedisPass,
    pub port: RedisPort,
    pub host: RedisHost,
    pub db: RedisDb,
    pub namespace: RedisNamespace,
    pub heartbeat_interval: RedisHeartbeat,
}

impl Redis {
    const DB_SET_WARNING: &'static str = r"Redis database specified, but PubSub connections do not use databases.
The database only applies to the `subscribed:<channel>` heartbeat keys.";

    pub(crate) fn from_env(env: EnvVar) -> Result<Self, FatalErr> {
        let env = match env.get("REDIS_URL").cloned() {
            Some(url_str) => env.update_with_redis_url(&url_str)?,
            None => env,
        };

        let cfg = Self {
            password: RedisPass::default().maybe_update(env.get("REDIS_PASSWORD"))?,
            port: RedisPort::default().maybe_update(env.get("REDIS_PORT"))?,
            host: RedisHost::default().maybe_update(env.get("REDIS_HOST"))?,
            db: RedisDb::default().maybe_update(env.get("REDIS_DB"))?,
            namespace: RedisNamespace::default().maybe_update(env.get("REDIS_NAMESPACE"))?,
            heartbeat_interval: RedisHeartbeat::default()
                .maybe_update(env.get("REDIS_HEARTBEAT_INTERVAL"))?,
        };

        if cfg.db.is_some() {
            log::warn!("{}", Self::DB_SET_WARNING);
        }
        log::info!("Redis configuration:\n{:#?},", &cfg.redacted());
        Ok(cfg)
    }

    fn redacted(&self) -> Self {
        Self {
            password: RedisPass(self.password.as_ref().map(|_| "********".to_string())),
            ..self.clone()
        }
    }
}
