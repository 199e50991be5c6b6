use chirp::broker::RedisBroker;
use chirp::cache::{RedisCache, RedisPool};
use chirp::config;
use chirp::err::FatalErr;
use chirp::service::Service;
use chirp::store::PgStore;

use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use warp::Filter;

fn main() -> Result<(), FatalErr> {
    config::merge_dotenv()?;
    pretty_env_logger::try_init()?;
    let (postgres_cfg, redis_cfg, fanout_cfg, cfg) = config::from_env(dotenv::vars().collect())?;

    // The synchronous Postgres client must be created (and finally dropped) outside the runtime
    let store = Arc::new(PgStore::new(&postgres_cfg)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        store.migrate().await?;

        let poll_interval = *redis_cfg.polling_interval;
        let pool = RedisPool::connect(redis_cfg).await?;
        let consumer = RedisBroker::consumer_id(dotenv::var("HOSTNAME").ok().as_deref());
        let broker = RedisBroker::new(pool.clone(), consumer.as_str());
        broker.recover().await?;
        log::info!("Consuming fan-out jobs as `{}`", consumer);

        let service = Service::new(
            store.clone(),
            store.clone(),
            Arc::new(RedisCache::new(pool)),
            Arc::new(broker),
            &fanout_cfg,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut background: Vec<_> = (0..*fanout_cfg.workers)
            .map(|_| tokio::spawn(Arc::new(service.worker(poll_interval)).run(shutdown_rx.clone())))
            .collect();
        background.push(tokio::spawn(service.sweeper().run(shutdown_rx)));
        log::info!("Started {} fan-out worker(s)", *fanout_cfg.workers);

        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(cfg.cors.allowed_methods.clone())
            .allow_headers(cfg.cors.allowed_headers.clone());
        let routes = service.handler(*cfg.request_deadline).routes().with(cors);

        let server_addr = SocketAddr::new(*cfg.address, *cfg.port);
        let (addr, server) = warp::serve(routes).try_bind_with_graceful_shutdown(server_addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Could not listen for shutdown signals: {}", e);
                futures::future::pending::<()>().await;
            }
        })?;
        log::info!("Listening on {}", addr);
        server.await;

        log::info!("Shutting down; waiting for in-flight fan-out jobs");
        let _ = shutdown_tx.send(true);
        for task in join_all(background).await {
            task?;
        }
        Ok::<_, FatalErr>(())
    })
}
