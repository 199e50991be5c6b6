use crate::from_env_var;
use std::time::Duration;

from_env_var!(
    /// The maximum number of entries any materialized timeline holds
    let name = Window;
    let default: usize = 800;
    let (env_var, allowed_values) = ("WINDOW", "a positive number");
    let from_str = |s| s.parse().ok().filter(|n| *n > 0);
);

from_env_var!(
    /// Follower count above which an author's jobs go to the high-priority queue
    let name = ViralThreshold;
    let default: u64 = 10_000;
    let (env_var, allowed_values) = ("VIRAL_THRESHOLD", "a number");
    let from_str = |s| s.parse().ok();
);

from_env_var!(
    /// Follower count above which an author's tweets are not pushed, only pulled at read time
    let name = FanoutLimit;
    let default: u64 = 10_000;
    let (env_var, allowed_values) = ("FANOUT_LIMIT", "a number");
    let from_str = |s| s.parse().ok();
);

from_env_var!(
    /// Number of followers handled by one fan-out batch
    let name = Chunk;
    let default: usize = 500;
    let (env_var, allowed_values) = ("CHUNK", "a positive number");
    let from_str = |s| s.parse().ok().filter(|n| *n > 0);
);

from_env_var!(
    /// Number of batches of a single job that may run at once
    let name = BatchParallelism;
    let default: usize = 4;
    let (env_var, allowed_values) = ("BATCH_PARALLELISM", "a positive number");
    let from_str = |s| s.parse().ok().filter(|n| *n > 0);
);

from_env_var!(
    /// Number of unacknowledged jobs a consumer holds at once
    let name = TweetPrefetch;
    let default: usize = 10;
    let (env_var, allowed_values) = ("TWEET_PREFETCH", "a positive number");
    let from_str = |s| s.parse().ok().filter(|n| *n > 0);
);

from_env_var!(
    /// How long an untouched timeline survives in the cache
    let name = TimelineTtl;
    let default: Duration = Duration::from_secs(30 * 24 * 60 * 60);
    let (env_var, allowed_values) = ("TIMELINE_TTL_DAYS", "a number of days");
    let from_str = |s| s.parse::<u64>().map(|days| Duration::from_secs(days * 24 * 60 * 60)).ok();
);

from_env_var!(
    /// Number of fan-out consumers per node
    let name = FanoutWorkers;
    let default: usize = 2;
    let (env_var, allowed_values) = ("FANOUT_WORKERS", "a positive number");
    let from_str = |s| s.parse().ok().filter(|n| *n > 0);
);

from_env_var!(
    /// How long one fan-out job may run before it is requeued
    let name = JobDeadline;
    let default: Duration = Duration::from_millis(30_000);
    let (env_var, allowed_values) = ("JOB_DEADLINE_MS", "a number of milliseconds");
    let from_str = |s| s.parse().map(Duration::from_millis).ok();
);

from_env_var!(
    /// Time between two outbox sweeps
    let name = OutboxInterval;
    let default: Duration = Duration::from_millis(5_000);
    let (env_var, allowed_values) = ("OUTBOX_INTERVAL_MS", "a number of milliseconds");
    let from_str = |s| s.parse().map(Duration::from_millis).ok();
);

from_env_var!(
    /// Age an outbox entry must reach before the sweeper re-enqueues it
    let name = OutboxGrace;
    let default: Duration = Duration::from_millis(10_000);
    let (env_var, allowed_values) = ("OUTBOX_GRACE_MS", "a number of milliseconds");
    let from_str = |s| s.parse().map(Duration::from_millis).ok();
);
