use super::postgres_cfg_types::*;
use super::EnvVar;
use crate::err::FatalErr;

#[derive(Debug, Clone, Default)]
pub struct Postgres {
    pub user: PgUser,
    pub host: PgHost,
    pub password: PgPass,
    pub database: PgDatabase,
    pub port: PgPort,
    pub ssl_mode: PgSslMode,
    pub pool_size: PgPoolSize,
}

impl Postgres {
    /// Read the Postgres settings, letting `DATABASE_URL` override the individual variables
    pub(crate) fn from_env(env: EnvVar) -> Result<Self, FatalErr> {
        let env = match env.get("DATABASE_URL").cloned() {
            Some(url_str) => env.update_with_postgres_url(&url_str)?,
            None => env,
        };

        let cfg = Self {
            user: PgUser::default().maybe_update(env.get("DB_USER"))?,
            host: PgHost::default().maybe_update(env.get("DB_HOST"))?,
            password: PgPass::default().maybe_update(env.get("DB_PASS"))?,
            database: PgDatabase::default().maybe_update(env.get("DB_NAME"))?,
            port: PgPort::default().maybe_update(env.get("DB_PORT"))?,
            ssl_mode: PgSslMode::default().maybe_update(env.get("DB_SSLMODE"))?,
            pool_size: PgPoolSize::default().maybe_update(env.get("DB_POOL"))?,
        };
        if !matches!(*cfg.ssl_mode, PgSslInner::Disable | PgSslInner::Allow | PgSslInner::Prefer) {
            log::warn!(
                "DB_SSLMODE is `{:?}`, but TLS is not supported; connecting without TLS",
                *cfg.ssl_mode
            );
        }
        log::info!("Postgres configuration:\n{:#?}", cfg.redacted());
        Ok(cfg)
    }

    fn redacted(&self) -> Self {
        Self {
            password: PgPass(self.password.as_ref().map(|_| "********".to_string())),
            ..self.clone()
        }
    }
}
