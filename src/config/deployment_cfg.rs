use super::deployment_cfg_types::*;
use super::EnvVar;
use crate::err::FatalErr;

#[derive(Debug, Default, Clone)]
pub struct Deployment<'a> {
    pub env: Env,
    pub address: ChirpAddr,
    pub port: Port,
    pub request_deadline: RequestDeadline,
    pub cors: Cors<'a>,
}

impl Deployment<'_> {
    pub(crate) fn from_env(env: &EnvVar) -> Result<Self, FatalErr> {
        let cfg = Self {
            env: Env::default().maybe_update(env.get("ENV"))?,
            address: ChirpAddr::default().maybe_update(env.get("BIND"))?,
            port: Port::default().maybe_update(env.get("PORT"))?,
            request_deadline: RequestDeadline::default()
                .maybe_update(env.get("REQUEST_DEADLINE_MS"))?,
            cors: Cors::default(),
        };
        log::info!("Using deployment configuration:\n {:#?}", &cfg);
        Ok(cfg)
    }
}
