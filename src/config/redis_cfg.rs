use super::redis_cfg_types::*;
use super::EnvVar;
use crate::err::FatalErr;

#[derive(Debug, Default, Clone)]
pub struct Redis {
    pub user: RedisUser,
    pub password: RedisPass,
    pub port: RedisPort,
    pub host: RedisHost,
    pub db: RedisDb,
    pub namespace: RedisNamespace,
    // **NOTE**:  Every idle consumer polls Redis once per interval.  Lowering it shortens
    // fan-out latency on a quiet system at the cost of more round trips.
    pub polling_interval: RedisInterval,
    pub pool_size: RedisPoolSize,
}

impl Redis {
    const USER_SET_WARNING: &'static str =
        "Redis user specified, but Redis did not ask for a username.  Ignoring it.";

    pub(crate) fn from_env(env: EnvVar) -> Result<Self, FatalErr> {
        let env = match env.get("REDIS_URL").cloned() {
            Some(url_str) => env.update_with_url(&url_str)?,
            None => env,
        };

        let cfg = Self {
            user: RedisUser::default().maybe_update(env.get("REDIS_USER"))?,
            password: RedisPass::default().maybe_update(env.get("REDIS_PASSWORD"))?,
            port: RedisPort::default().maybe_update(env.get("REDIS_PORT"))?,
            host: RedisHost::default().maybe_update(env.get("REDIS_HOST"))?,
            db: RedisDb::default().maybe_update(env.get("REDIS_DB"))?,
            namespace: RedisNamespace::default().maybe_update(env.get("REDIS_NAMESPACE"))?,
            polling_interval: RedisInterval::default()
                .maybe_update(env.get("REDIS_POLL_INTERVAL"))?,
            pool_size: RedisPoolSize::default().maybe_update(env.get("REDIS_POOL_SIZE"))?,
        };

        if cfg.user.is_some() {
            log::warn!("{}", Self::USER_SET_WARNING);
        }
        log::info!(
            "Redis configuration: {}:{} (db: {:?}, namespace: {:?}, pool: {}, poll: {:?})",
            *cfg.host,
            *cfg.port,
            *cfg.db,
            *cfg.namespace,
            *cfg.pool_size,
            *cfg.polling_interval
        );
        Ok(cfg)
    }
}
