use super::postgres_cfg_types::*;
use super::EnvVar;
use crate::err::FatalErr;

#[derive(Debug, Default, Clone)]
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
    pub(crate) fn from_env(env: EnvVar) -> Result<Self, FatalErr> {
        let env = match env.get("DATABASE_URL").cloned() {
            Some(url_str) => env.update_with_url(&url_str)?,
            None => env,
        };

        let cfg = Self {
            user: PgUser::default().maybe_update(env.get("DB_USER"))?,
            host: PgHost::default().maybe_update(env.get("DB_HOST"))?,
            password: PgPass::default().maybe_update(env.get("DB_PASS"))?,
            database: PgDatabase::default().maybe_update(env.get("DB_NAME"))?,
            port: PgPort::default().maybe_update(env.get("DB_PORT"))?,
            ssl_mode: PgSslMode::default().maybe_update(env.get("DB_SSLMODE"))?,
            pool_size: PgPoolSize::default().maybe_update(env.get("DB_POOL_SIZE"))?,
        };

        log::info!(
            "Postgres configuration: {}@{}:{}/{} (sslmode: {:?}, pool: {})",
            *cfg.user,
            *cfg.host,
            *cfg.port,
            *cfg.database,
            *cfg.ssl_mode,
            *cfg.pool_size
        );
        Ok(cfg)
    }
}
