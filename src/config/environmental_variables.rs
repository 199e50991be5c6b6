use crate::err::FatalErr;

use hashbrown::HashMap;
use std::fmt;
use url::Url;

#[derive(Debug, Clone)]
pub(crate) struct EnvVar(pub HashMap<String, String>);
impl std::ops::Deref for EnvVar {
    type Target = HashMap<String, String>;
    fn deref(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl EnvVar {
    pub(crate) fn new(vars: HashMap<String, String>) -> Self {
        Self(vars)
    }

    pub(crate) fn maybe_add_env_var(&mut self, key: &str, maybe_value: Option<impl ToString>) {
        if let Some(value) = maybe_value {
            self.0.insert(key.to_string(), value.to_string());
        }
    }

    /// Splits a `redis://` or `postgres://` URL into the individual variables it stands for.
    ///
    /// Variables set explicitly in the environment are overwritten: the URL wins.
    pub(crate) fn update_with_url(mut self, url_str: &str) -> Result<Self, FatalErr> {
        let url = Url::parse(url_str)?;
        let password = match url.password() {
            Some(encoded) => Some(urlencoding::decode(encoded)?.into_owned()),
            None => None,
        };
        let db_path = url.path().trim_start_matches('/').to_string();
        let db = Some(db_path).filter(|path| !path.is_empty());
        let user = Some(url.username()).filter(|user| !user.is_empty());

        match url.scheme() {
            "redis" => {
                self.maybe_add_env_var("REDIS_HOST", url.host_str());
                self.maybe_add_env_var("REDIS_PORT", url.port());
                self.maybe_add_env_var("REDIS_PASSWORD", password);
                self.maybe_add_env_var("REDIS_USER", user);
                self.maybe_add_env_var("REDIS_DB", db);
            }
            "postgres" | "postgresql" => {
                self.maybe_add_env_var("DB_HOST", url.host_str());
                self.maybe_add_env_var("DB_PORT", url.port());
                self.maybe_add_env_var("DB_PASS", password);
                self.maybe_add_env_var("DB_USER", user);
                self.maybe_add_env_var("DB_NAME", db);
                for (k, v) in url.query_pairs() {
                    if k == "sslmode" {
                        self.maybe_add_env_var("DB_SSLMODE", Some(v));
                    }
                }
            }
            other => Err(FatalErr::config(
                "URL scheme",
                other,
                "one of `redis`, `postgres`, or `postgresql`",
            ))?,
        }
        Ok(self)
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = String::new();
        for env_var in &[
            "ENV",
            "RUST_LOG",
            "BIND",
            "PORT",
            "REQUEST_DEADLINE_MS",
            "DB_USER",
            "DB_PORT",
            "DB_HOST",
            "DB_NAME",
            "DB_SSLMODE",
            "DB_POOL_SIZE",
            "REDIS_HOST",
            "REDIS_USER",
            "REDIS_PORT",
            "REDIS_DB",
            "REDIS_NAMESPACE",
            "REDIS_POLL_INTERVAL",
            "REDIS_POOL_SIZE",
            "WINDOW",
            "VIRAL_THRESHOLD",
            "FANOUT_LIMIT",
            "CHUNK",
            "BATCH_PARALLELISM",
            "TWEET_PREFETCH",
            "TIMELINE_TTL_DAYS",
            "FANOUT_WORKERS",
            "JOB_DEADLINE_MS",
            "OUTBOX_INTERVAL_MS",
            "OUTBOX_GRACE_MS",
        ] {
            if let Some(value) = self.get(*env_var) {
                result = format!("{}\n    {}: {}", result, env_var, value)
            }
        }
        for secret in &["DB_PASS", "REDIS_PASSWORD"] {
            if self.contains_key(*secret) {
                result = format!("{}\n    {}: [redacted]", result, secret)
            }
        }
        write!(f, "{}", result)
    }
}

#[macro_export]
macro_rules! from_env_var {
    ($(#[$outer:meta])*
     let name = $name:ident;
     let default: $type:ty = $inner:expr;
     let (env_var, allowed_values) = ($env_var:tt, $allowed_values:expr);
     let from_str = |$arg:ident| $body:expr;
    ) => {
        $(#[$outer])*
        #[derive(Clone)]
        pub struct $name(pub $type);
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }
        impl std::ops::Deref for $name {
            type Target = $type;
            fn deref(&self) -> &$type {
                &self.0
            }
        }
        impl std::default::Default for $name {
            fn default() -> Self {
                $name($inner)
            }
        }
        impl $name {
            fn inner_from_str($arg: &str) -> Option<$type> {
                $body
            }
            pub(crate) fn maybe_update(
                self,
                var: Option<&String>,
            ) -> Result<Self, $crate::err::FatalErr> {
                Ok(match var {
                    Some(empty_string) if empty_string.is_empty() => Self::default(),
                    Some(value) => Self(Self::inner_from_str(value).ok_or_else(|| {
                        $crate::err::FatalErr::config($env_var, value, &$allowed_values)
                    })?),
                    None => self,
                })
            }
        }
    };
}
