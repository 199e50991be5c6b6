//! Tweet fan-out and timeline service
//!
//!
//! This crate stores new tweets, distributes them to their authors' followers, and serves
//! paginated home and author timelines.  Ordinary authors are handled with fan-out on write
//! (each new tweet is pushed into every follower's cached home timeline); authors with more
//! followers than the fan-out limit are handled with fan-out on read (their tweets are merged
//! into a reader's home timeline when it is requested).
//!
//! # Notes on data flow
//! * **Client Request → Warp**:
//! Warp filters for valid requests and parses request data.  The authenticated user arrives in
//! a header set by the upstream auth layer; every request gets a deadline.
//!
//! * **Warp → Ingestor**:
//! The `Ingestor` validates a new tweet, persists it together with an outbox entry, and hands
//! it to the `Router`, which publishes a fan-out `Job` on one of the priority queues of the
//! `Broker`.
//!
//! * **Broker → Worker → Fanout**:
//! A pool of `Worker`s consumes jobs (high, normal and low queues polled 3:2:1) and runs them
//! through `Fanout`, which writes the tweet id into each follower's home timeline in chunks.
//! Followers that could not be reached are kept as dead letters and re-driven later.
//!
//! * **Sweeper**:
//! Re-publishes jobs for tweets whose outbox entry was never acknowledged and re-drives dead
//! letters once their backoff has passed.
//!
//! * **Warp → Reader**:
//! The `Reader` pages through the cached timelines, merges in pull-only authors, and rebuilds
//! a timeline from the store when the cache is cold or unavailable.

pub mod broker;
pub mod cache;
pub mod config;
pub mod deadline;
pub mod err;
pub mod error;
pub mod fanout;
pub mod ingest;
pub mod job;
pub mod outbox;
pub mod request;
pub mod response;
pub mod retry;
pub mod router;
pub mod service;
pub mod store;
pub mod timeline;
pub mod tweet;

pub use error::Error;
