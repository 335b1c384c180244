use super::deployment_cfg_types::*;
use super::EnvVar;
use crate::err::FatalErr;

#[derive(Debug, Default)]
pub struct Deployment<'a> {
    pub env: Env,
    pub address: ServerAddr,
    pub port: Port,
    pub unix_socket: Socket,
    pub cors: Cors<'a>,
    pub sse_interval: SseInterval,
    pub ws_interval: WsInterval,
    pub whitelist_mode: WhitelistMode,
    pub cluster_num: ClusterNum,
}

impl Deployment<'_> {
    pub(crate) fn from_env(env: &EnvVar) -> Result<Self, FatalErr> {
        let mut cfg = Self {
            env: Env::default().maybe_update(env.get("NODE_ENV"))?,
            address: ServerAddr::default().maybe_update(env.get("BIND"))?,
            port: Port::default().maybe_update(env.get("PORT"))?,
            unix_socket: Socket::default().maybe_update(env.get("SOCKET"))?,
            sse_interval: SseInterval::default().maybe_update(env.get("SSE_FREQ"))?,
            ws_interval: WsInterval::default().maybe_update(env.get("WS_FREQ"))?,
            whitelist_mode: WhitelistMode::default().maybe_update(env.get("WHITELIST_MODE"))?,
            cluster_num: ClusterNum::default().maybe_update(env.get("STREAMING_CLUSTER_NUM"))?,
            cors: Cors::default(),
        };
        cfg.env = cfg.env.maybe_update(env.get("RUST_ENV"))?;
        // Limited federation and authorized fetch both imply that every stream needs a token
        let always_require_auth = ["LIMITED_FEDERATION_MODE", "AUTHORIZED_FETCH"]
            .iter()
            .any(|var| env.get(*var).map(String::as_str) == Some("true"));
        if always_require_auth {
            cfg.whitelist_mode = WhitelistMode(true);
        }

        log::warn!("Using deployment configuration:\n {:#?}", &cfg);
        Ok(cfg)
    }

    /// The number of workers to start: `STREAMING_CLUSTER_NUM` if set; otherwise one in
    /// development and one fewer than the number of CPUs (minimum one) in production.
    pub fn worker_count(&self) -> usize {
        if self.unix_socket.is_some() {
            return 1;
        }
        match (*self.cluster_num, *self.env) {
            (Some(n), _) => n,
            (None, EnvInner::Development) => 1,
            (None, EnvInner::Production) => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1),
        }
    }
}
