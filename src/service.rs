//! The core's components, wired to one set of collaborators.
use crate::broker::Broker;
use crate::cache::Cache;
use crate::config;
use crate::fanout::{DeadLetters, Fanout, Worker};
use crate::ingest::Ingestor;
use crate::outbox::Sweeper;
use crate::request::Handler;
use crate::router::Router;
use crate::store::{Graph, Persistence};
use crate::timeline::{PullOnlyIndex, Reader, TimelineCache};

use std::sync::Arc;
use std::time::Duration;

pub struct Service {
    pub store: Arc<dyn Persistence>,
    pub graph: Arc<dyn Graph>,
    pub cache: Arc<dyn Cache>,
    pub broker: Arc<dyn Broker>,
    pub timelines: TimelineCache,
    pub router: Router,
    pub ingestor: Arc<Ingestor>,
    pub fanout: Arc<Fanout>,
    pub reader: Arc<Reader>,
    cfg: config::Fanout,
}

impl Service {
    pub fn new(
        store: Arc<dyn Persistence>,
        graph: Arc<dyn Graph>,
        cache: Arc<dyn Cache>,
        broker: Arc<dyn Broker>,
        cfg: &config::Fanout,
    ) -> Self {
        let timelines = TimelineCache::new(cache.clone(), *cfg.window, *cfg.timeline_ttl);
        let pull_only = PullOnlyIndex::new(cache.clone());
        let router = Router::new(broker.clone(), *cfg.viral_threshold);
        let ingestor = Ingestor::new(store.clone(), graph.clone(), cache.clone(), router.clone());
        let fanout = Fanout::new(
            store.clone(),
            graph.clone(),
            timelines.clone(),
            pull_only.clone(),
            DeadLetters::new(cache.clone()),
            cfg,
        );
        let reader = Reader::new(timelines.clone(), pull_only, store.clone(), graph.clone());
        Self {
            store,
            graph,
            cache,
            broker,
            timelines,
            router,
            ingestor: Arc::new(ingestor),
            fanout: Arc::new(fanout),
            reader: Arc::new(reader),
            cfg: cfg.clone(),
        }
    }

    pub fn handler(&self, request_deadline: Duration) -> Handler {
        Handler::new(
            self.ingestor.clone(),
            self.reader.clone(),
            self.fanout.clone(),
            self.store.clone(),
            request_deadline,
        )
    }

    pub fn worker(&self, poll_interval: Duration) -> Worker {
        Worker::new(
            self.broker.clone(),
            self.fanout.clone(),
            &self.cfg,
            poll_interval,
        )
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.store.clone(),
            self.graph.clone(),
            self.cache.clone(),
            self.router.clone(),
            &self.cfg,
        )
    }
}
