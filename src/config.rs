//! Configuration settings for the worker, its Postgres pool and its Redis connections.
//!
//! Every setting can be provided through an environmental variable, either set at runtime or
//! read from the `.env` (or, in production, `.env.production`) file.  Invalid values are fatal.
pub use {deployment_cfg::Deployment, postgres_cfg::Postgres, redis_cfg::Redis};

use self::environmental_variables::EnvVar;
use super::err::FatalErr;
use hashbrown::HashMap;
use std::env;

mod deployment_cfg;
mod deployment_cfg_types;
mod environmental_variables;
mod postgres_cfg;
mod postgres_cfg_types;
mod redis_cfg;
mod redis_cfg_types;

pub fn merge_dotenv() -> Result<(), FatalErr> {
    let env_file = match env::var("NODE_ENV").or_else(|_| env::var("RUST_ENV")).ok().as_deref() {
        Some("production") => ".env.production",
        Some("development") | None => ".env",
        Some(unsupported) => Err(FatalErr::config(
            "NODE_ENV",
            unsupported,
            "`production` or `development`",
        ))?,
    };
    match dotenv::from_filename(env_file) {
        Ok(_) => Ok(()),
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("No `{}` file found; using environmental variables only", env_file);
            Ok(())
        }
        Err(e) => Err(FatalErr::Dotenv(e)),
    }
}

pub fn from_env<'a>(
    env_vars: HashMap<String, String>,
) -> Result<(Postgres, Redis, Deployment<'a>), FatalErr> {
    let env_vars = EnvVar::new(env_vars);
    log::info!("Environmental variables received: {}", &env_vars);
    Ok((
        Postgres::from_env(env_vars.clone())?,
        Redis::from_env(env_vars.clone())?,
        Deployment::from_env(&env_vars)?,
    ))
}
