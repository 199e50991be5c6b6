use crate::from_env_var;
use std::{fmt, net::IpAddr, str::FromStr, time::Duration};
use strum::VariantNames;
use strum_macros::{EnumString, VariantNames};

from_env_var!(
    /// The current environment, which controls what file to read other ENV vars from
    let name = Env;
    let default: EnvInner = EnvInner::Development;
    let (env_var, allowed_values) = ("ENV", format!("one of: {:?}", EnvInner::VARIANTS));
    let from_str = |s| EnvInner::from_str(s).ok();
);
#[derive(EnumString, VariantNames, Debug, Clone, Copy, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum EnvInner {
    Production,
    Development,
}

from_env_var!(
    /// The address to run the HTTP server on
    let name = ChirpAddr;
    let default: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
    let (env_var, allowed_values) = ("BIND", "a valid address (e.g., 127.0.0.1)");
    let from_str = |s| match s {
        "localhost" => Some(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)),
        _ => s.parse().ok(),
    };
);

from_env_var!(
    /// The port to run the HTTP server on
    let name = Port;
    let default: u16 = 4000;
    let (env_var, allowed_values) = ("PORT", "a number between 0 and 65535");
    let from_str = |s| s.parse().ok();
);

from_env_var!(
    /// How long a single HTTP request may take before it fails with a 504
    let name = RequestDeadline;
    let default: Duration = Duration::from_millis(5_000);
    let (env_var, allowed_values) = ("REQUEST_DEADLINE_MS", "a number of milliseconds");
    let from_str = |s| s.parse().map(Duration::from_millis).ok();
);

/// Permissions for Cross Origin Resource Sharing (CORS)
#[derive(Clone)]
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
            allowed_methods: vec!["GET", "POST", "DELETE", "OPTIONS"],
            allowed_headers: vec!["Authorization", "Accept", "Content-Type", "X-User-Id"],
        }
    }
}
