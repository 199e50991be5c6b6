use super::*;
use crate::broker::{Broker, MemoryBroker};
use crate::cache::MemoryCache;
use crate::config;
use crate::service::Service;
use crate::store::MemoryStore;

use serde_json::{json, Value};
use warp::http::StatusCode;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Fixture {
    store: Arc<MemoryStore>,
    broker: Arc<MemoryBroker>,
    service: Service,
    routes: BoxedFilter<(Response,)>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let service = Service::new(
        store.clone(),
        store.clone(),
        Arc::new(MemoryCache::new()),
        broker.clone(),
        &config::Fanout::default(),
    );
    let routes = service.handler(Duration::from_secs(5)).routes();
    Fixture {
        store,
        broker,
        service,
        routes,
    }
}

impl Fixture {
    async fn post(&self, user: &str, body: Value) -> (StatusCode, Value) {
        let res = warp::test::request()
            .method("POST")
            .path("/tweets")
            .header(USER_HEADER, user)
            .json(&body)
            .reply(&self.routes)
            .await;
        (res.status(), serde_json::from_slice(res.body()).unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str, user: Option<&str>) -> (StatusCode, Value) {
        let mut req = warp::test::request().method("GET").path(path);
        if let Some(user) = user {
            req = req.header(USER_HEADER, user);
        }
        let res = req.reply(&self.routes).await;
        (res.status(), serde_json::from_slice(res.body()).unwrap_or(Value::Null))
    }

    async fn delete(&self, id: &str, user: &str) -> StatusCode {
        warp::test::request()
            .method("DELETE")
            .path(&format!("/tweets/{}", id))
            .header(USER_HEADER, user)
            .reply(&self.routes)
            .await
            .status()
    }

    /// Runs every queued job through a worker, like the background pool would.
    async fn drain(&self) -> TestResult {
        let worker = self.service.worker(Duration::from_millis(10));
        while let Some(delivery) = self.broker.consume(&crate::broker::Queue::ALL).await? {
            worker.handle(delivery).await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn health_check() {
    let f = fixture();
    let res = warp::test::request()
        .path("/health")
        .reply(&f.routes)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), "OK");
}

#[tokio::test]
async fn posting_a_tweet_returns_it() {
    let f = fixture();
    let (status, body) = f.post("7", json!({ "content": "hello" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["content"], "hello");
    assert_eq!(body["author_id"], "7");
    assert_eq!(body["counters"]["likes"], 0);
    assert!(body["id"].as_str().is_some());
    assert_eq!(f.broker.peek(crate::broker::Queue::Normal).len(), 1);
}

#[tokio::test]
async fn posting_requires_a_user() {
    let f = fixture();
    let res = warp::test::request()
        .method("POST")
        .path("/tweets")
        .json(&json!({ "content": "hello" }))
        .reply(&f.routes)
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = f.post("not-a-number", json!({ "content": "hello" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(f.broker.is_empty());
}

#[tokio::test]
async fn invalid_tweets_are_rejected() {
    let f = fixture();
    let (status, body) = f.post("7", json!({ "content": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or("").contains("empty"));

    let (status, _) = f.post("7", json!({ "content": "x".repeat(281) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = f.post("7", json!({ "content": 12 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(f.broker.is_empty());
}

#[tokio::test]
async fn duplicate_client_ids_conflict() {
    let f = fixture();
    let body = json!({ "content": "once", "client_id": "abc" });
    assert_eq!(f.post("7", body.clone()).await.0, StatusCode::CREATED);
    assert_eq!(f.post("7", body).await.0, StatusCode::CONFLICT);
}

#[tokio::test]
async fn home_timeline_shows_followed_authors() -> TestResult {
    let f = fixture();
    f.store.follow(UserId(1), UserId(2));
    f.post("2", json!({ "content": "first" })).await;
    f.post("2", json!({ "content": "second" })).await;
    f.drain().await?;

    let (status, body) = f.get("/timeline/home?limit=1", Some("1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tweets"][0]["content"], "second");
    assert_eq!(body["has_more"], true);
    let cursor = body["next_cursor"].as_str().ok_or("missing cursor")?.to_string();

    let (_, body) = f
        .get(&format!("/timeline/home?limit=1&cursor={}", cursor), Some("1"))
        .await;
    assert_eq!(body["tweets"][0]["content"], "first");
    assert_eq!(body["has_more"], false);
    assert_eq!(body["next_cursor"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn home_timeline_requires_a_user() {
    let f = fixture();
    let (status, body) = f.get("/timeline/home", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn author_timeline_is_public() {
    let f = fixture();
    f.post("2", json!({ "content": "mine" })).await;

    let (status, body) = f.get("/timeline/user/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tweets"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["tweets"][0]["content"], "mine");

    let (status, body) = f.get("/timeline/user/3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tweets"], json!([]));
}

#[tokio::test]
async fn bad_cursors_are_rejected() {
    let f = fixture();
    let (status, _) = f.get("/timeline/home?cursor=***", Some("1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = f.get("/timeline/user/2?limit=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_author_can_delete() -> TestResult {
    let f = fixture();
    f.store.follow(UserId(1), UserId(2));
    let (_, tweet) = f.post("2", json!({ "content": "regret" })).await;
    let id = tweet["id"].as_str().ok_or("missing id")?.to_string();
    f.drain().await?;

    assert_eq!(f.delete(&id, "1").await, StatusCode::NOT_FOUND);
    assert_eq!(f.delete(&id, "2").await, StatusCode::NO_CONTENT);
    assert_eq!(f.delete(&id, "2").await, StatusCode::NOT_FOUND);

    let (_, body) = f.get("/timeline/home", Some("1")).await;
    assert_eq!(body["tweets"], json!([]));
    let (_, body) = f.get("/timeline/user/2", None).await;
    assert_eq!(body["tweets"], json!([]));
    Ok(())
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let f = fixture();
    let (status, body) = f.get("/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");
}
