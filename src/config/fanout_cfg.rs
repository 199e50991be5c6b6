use super::fanout_cfg_types::*;
use super::EnvVar;
use crate::err::FatalErr;

/// Tuning for ingest, fan-out, and timeline reads.
#[derive(Debug, Default, Clone)]
pub struct Fanout {
    pub window: Window,
    pub viral_threshold: ViralThreshold,
    pub fanout_limit: FanoutLimit,
    pub chunk: Chunk,
    pub batch_parallelism: BatchParallelism,
    pub prefetch: TweetPrefetch,
    pub timeline_ttl: TimelineTtl,
    pub workers: FanoutWorkers,
    pub job_deadline: JobDeadline,
    pub outbox_interval: OutboxInterval,
    pub outbox_grace: OutboxGrace,
}

impl Fanout {
    pub(crate) fn from_env(env: &EnvVar) -> Result<Self, FatalErr> {
        let cfg = Self {
            window: Window::default().maybe_update(env.get("WINDOW"))?,
            viral_threshold: ViralThreshold::default().maybe_update(env.get("VIRAL_THRESHOLD"))?,
            fanout_limit: FanoutLimit::default().maybe_update(env.get("FANOUT_LIMIT"))?,
            chunk: Chunk::default().maybe_update(env.get("CHUNK"))?,
            batch_parallelism: BatchParallelism::default()
                .maybe_update(env.get("BATCH_PARALLELISM"))?,
            prefetch: TweetPrefetch::default().maybe_update(env.get("TWEET_PREFETCH"))?,
            timeline_ttl: TimelineTtl::default().maybe_update(env.get("TIMELINE_TTL_DAYS"))?,
            workers: FanoutWorkers::default().maybe_update(env.get("FANOUT_WORKERS"))?,
            job_deadline: JobDeadline::default().maybe_update(env.get("JOB_DEADLINE_MS"))?,
            outbox_interval: OutboxInterval::default()
                .maybe_update(env.get("OUTBOX_INTERVAL_MS"))?,
            outbox_grace: OutboxGrace::default().maybe_update(env.get("OUTBOX_GRACE_MS"))?,
        };

        if *cfg.viral_threshold > *cfg.fanout_limit {
            log::warn!(
                "VIRAL_THRESHOLD ({}) is above FANOUT_LIMIT ({}); authors between the two \
                 will be pull-only but still routed to the normal queue",
                *cfg.viral_threshold,
                *cfg.fanout_limit
            );
        }
        log::info!("Fan-out configuration:\n{:#?}", &cfg);
        Ok(cfg)
    }
}
