//! Configuration read from the environment (and, optionally, a `.env` file).
//!
//! Every setting has a default; any of them can be overridden by the environmental
//! variable named in its type's definition.
mod deployment_cfg;
mod deployment_cfg_types;
mod environmental_variables;
mod fanout_cfg;
mod fanout_cfg_types;
mod postgres_cfg;
mod postgres_cfg_types;
mod redis_cfg;
mod redis_cfg_types;

pub use {
    deployment_cfg::Deployment, fanout_cfg::Fanout, postgres_cfg::Postgres, redis_cfg::Redis,
};
pub use {
    deployment_cfg_types::*, fanout_cfg_types::*, postgres_cfg_types::PgSslInner,
    redis_cfg_types::RedisInterval,
};

pub(crate) use environmental_variables::EnvVar;

use crate::err::FatalErr;
use hashbrown::HashMap;
use std::env;

pub fn merge_dotenv() -> Result<(), FatalErr> {
    let env_file = match env::var("ENV").ok().as_deref() {
        Some("production") => ".env.production",
        Some("development") | None => ".env",
        Some(unsupported) => Err(FatalErr::config(
            "ENV",
            unsupported,
            "`production` or `development`",
        ))?,
    };
    let res = dotenv::from_filename(env_file);

    if let Ok(value) = env::var("ENV") {
        if value == "production" && res.is_err() {
            Err(FatalErr::config(
                "ENV",
                &value,
                "`development` (which does not require a `.env.production` file)",
            ))?
        }
    }
    Ok(())
}

pub fn from_env<'a>(
    env_vars: HashMap<String, String>,
) -> Result<(Postgres, Redis, Fanout, Deployment<'a>), FatalErr> {
    let env_vars = EnvVar::new(env_vars);
    log::info!("Environmental variables chirp received: {}", &env_vars);
    Ok((
        Postgres::from_env(env_vars.clone())?,
        Redis::from_env(env_vars.clone())?,
        Fanout::from_env(&env_vars)?,
        Deployment::from_env(&env_vars)?,
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_documented_values() -> Result<(), FatalErr> {
        let (pg, redis, fanout, deployment) = from_env(HashMap::new())?;
        assert_eq!(*fanout.window, 800);
        assert_eq!(*fanout.viral_threshold, 10_000);
        assert_eq!(*fanout.fanout_limit, 10_000);
        assert_eq!(*fanout.chunk, 500);
        assert_eq!(*fanout.batch_parallelism, 4);
        assert_eq!(*fanout.prefetch, 10);
        assert_eq!(fanout.timeline_ttl.as_secs(), 30 * 24 * 60 * 60);
        assert_eq!(*pg.port, 5432);
        assert_eq!(*redis.port, 6379);
        assert_eq!(*deployment.port, 4000);
        Ok(())
    }

    #[test]
    fn env_vars_override_defaults() -> Result<(), FatalErr> {
        let vars: HashMap<String, String> = vec![
            ("WINDOW", "50"),
            ("FANOUT_LIMIT", "3"),
            ("REDIS_URL", "redis://cache:7000"),
            ("DB_SSLMODE", "disable"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let (pg, redis, fanout, _) = from_env(vars)?;
        assert_eq!(*fanout.window, 50);
        assert_eq!(*fanout.fanout_limit, 3);
        assert_eq!(&*redis.host, "cache");
        assert_eq!(*redis.port, 7000);
        assert_eq!(*pg.ssl_mode, PgSslInner::Disable);
        Ok(())
    }

    #[test]
    fn invalid_values_are_fatal() {
        let vars: HashMap<String, String> = vec![("CHUNK".to_string(), "zero".to_string())]
            .into_iter()
            .collect();
        assert!(from_env(vars).is_err());
    }
}
