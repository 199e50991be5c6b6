//! Postgres queries
use super::{Graph, OutboxEntry, Persistence, Result};
use crate::config::{self, PgSslInner};
use crate::error::Error;
use crate::timeline::Entry;
use crate::tweet::{Counters, Score, Tweet, TweetId, UserId};

use ::postgres::{self, Row};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use r2d2_postgres::PostgresConnectionManager;

type PgConn = r2d2::PooledConnection<PostgresConnectionManager<postgres::NoTls>>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tweets (
    id            TEXT PRIMARY KEY,
    author_id     BIGINT NOT NULL,
    content       TEXT NOT NULL,
    score         BIGINT NOT NULL,
    reply_to_id   TEXT,
    retweet_of_id TEXT,
    likes         BIGINT NOT NULL DEFAULT 0,
    retweets      BIGINT NOT NULL DEFAULT 0,
    replies       BIGINT NOT NULL DEFAULT 0,
    client_id     TEXT,
    CONSTRAINT tweets_client_id_key UNIQUE (author_id, client_id)
);
CREATE INDEX IF NOT EXISTS tweets_author_score ON tweets (author_id, score DESC, id DESC);

CREATE TABLE IF NOT EXISTS follows (
    follower_id BIGINT NOT NULL,
    followee_id BIGINT NOT NULL,
    PRIMARY KEY (followee_id, follower_id)
);
CREATE INDEX IF NOT EXISTS follows_follower ON follows (follower_id);

CREATE TABLE IF NOT EXISTS fanout_outbox (
    tweet_id   TEXT PRIMARY KEY REFERENCES tweets (id) ON DELETE CASCADE,
    author_id  BIGINT NOT NULL,
    attempts   INTEGER NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS fanout_outbox_created ON fanout_outbox (created_at);
";

const TWEET_COLUMNS: &str =
    "id, author_id, content, score, reply_to_id, retweet_of_id, likes, retweets, replies, client_id";

#[derive(Clone, Debug)]
pub struct PgStore {
    pub conn: r2d2::Pool<PostgresConnectionManager<postgres::NoTls>>,
}

impl PgStore {
    pub fn new(pg_cfg: &config::Postgres) -> Result<Self> {
        let mut cfg = postgres::Config::new();
        cfg.user(&pg_cfg.user)
            .host(&pg_cfg.host)
            .port(*pg_cfg.port)
            .dbname(&pg_cfg.database)
            .ssl_mode(match *pg_cfg.ssl_mode {
                PgSslInner::Disable => postgres::config::SslMode::Disable,
                PgSslInner::Prefer => postgres::config::SslMode::Prefer,
                PgSslInner::Require => postgres::config::SslMode::Require,
            });
        if let Some(password) = &*pg_cfg.password {
            cfg.password(password);
        };

        cfg.connect(postgres::NoTls)?; // Test connection, letting us immediately exit with an error
                                       // when Postgres isn't running instead of timing out below
        let manager = PostgresConnectionManager::new(cfg, postgres::NoTls);
        let pool = r2d2::Pool::builder()
            .max_size(*pg_cfg.pool_size)
            .build(manager)?;
        Ok(Self { conn: pool })
    }

    /// Creates the tables this service reads and writes, if they are missing.
    pub async fn migrate(&self) -> Result<()> {
        self.run(|conn| Ok(conn.batch_execute(SCHEMA)?)).await
    }

    pub async fn follow(&self, follower: UserId, author: UserId) -> Result<()> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
                &[&follower.0, &author.0],
            )?;
            Ok(())
        })
        .await
    }

    /// Runs blocking Postgres work on tokio's blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConn) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

fn tweet_from_row(row: &Row) -> Tweet {
    Tweet {
        id: TweetId(row.get(0)),
        author_id: UserId(row.get(1)),
        content: row.get(2),
        created_at: Score(row.get(3)).to_datetime(),
        reply_to_id: row.get::<_, Option<String>>(4).map(TweetId),
        retweet_of_id: row.get::<_, Option<String>>(5).map(TweetId),
        counters: Counters {
            likes: row.get(6),
            retweets: row.get(7),
            replies: row.get(8),
        },
        client_id: row.get(9),
    }
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl Persistence for PgStore {
    async fn put_tweet(&self, tweet: &Tweet) -> Result<()> {
        let tweet = tweet.clone();
        self.run(move |conn| {
            let score = tweet.score().0;
            let mut tx = conn.transaction()?;
            // a retry after a commit whose acknowledgement was lost finds the tweet stored
            let inserted = tx.execute(
                "INSERT INTO tweets
                   (id, author_id, content, score, reply_to_id, retweet_of_id, client_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO NOTHING",
                &[
                    &tweet.id.0,
                    &tweet.author_id.0,
                    &tweet.content,
                    &score,
                    &tweet.reply_to_id.as_ref().map(|id| id.0.clone()),
                    &tweet.retweet_of_id.as_ref().map(|id| id.0.clone()),
                    &tweet.client_id,
                ],
            )?;
            if inserted == 0 {
                return Ok(());
            }
            tx.execute(
                "INSERT INTO fanout_outbox (tweet_id, author_id, created_at) VALUES ($1, $2, $3)",
                &[&tweet.id.0, &tweet.author_id.0, &score],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_tweet(&self, id: &TweetId) -> Result<Option<Tweet>> {
        let id = id.0.clone();
        self.run(move |conn| {
            Ok(conn
                .query_opt(
                    &*format!("SELECT {} FROM tweets WHERE id = $1", TWEET_COLUMNS),
                    &[&id],
                )?
                .map(|row| tweet_from_row(&row)))
        })
        .await
    }

    async fn batch_get_tweets(&self, ids: &[TweetId]) -> Result<HashMap<TweetId, Tweet>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        self.run(move |conn| {
            Ok(conn
                .query(
                    &*format!("SELECT {} FROM tweets WHERE id = ANY($1)", TWEET_COLUMNS),
                    &[&ids],
                )?
                .iter()
                .map(tweet_from_row)
                .map(|tweet| (tweet.id.clone(), tweet))
                .collect())
        })
        .await
    }

    async fn list_author_tweet_ids(
        &self,
        author: UserId,
        since: Option<Score>,
        before: Option<&Entry>,
        n: usize,
    ) -> Result<Vec<Entry>> {
        let since = since.map(|score| score.0);
        let (before_score, before_id) = match before {
            Some(entry) => (Some(entry.score.0), Some(entry.tweet_id.0.clone())),
            None => (None, None),
        };
        self.run(move |conn| {
            Ok(conn
                .query(
                    "SELECT id, score FROM tweets
                     WHERE author_id = $1
                       AND ($2::BIGINT IS NULL OR score >= $2)
                       AND ($3::BIGINT IS NULL OR (score, id) < ($3, $4::TEXT))
                     ORDER BY score DESC, id DESC
                     LIMIT $5",
                    &[&author.0, &since, &before_score, &before_id, &limit(n)],
                )?
                .iter()
                .map(|row| Entry::new(TweetId(row.get(0)), Score(row.get(1))))
                .collect())
        })
        .await
    }

    async fn delete_tweet(&self, id: &TweetId) -> Result<bool> {
        let id = id.0.clone();
        self.run(move |conn| Ok(conn.execute("DELETE FROM tweets WHERE id = $1", &[&id])? > 0))
            .await
    }

    async fn outbox_pending(
        &self,
        older_than: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<OutboxEntry>> {
        let older_than = Score::from_datetime(older_than).0;
        self.run(move |conn| {
            Ok(conn
                .query(
                    "SELECT tweet_id, author_id, attempts, created_at FROM fanout_outbox
                     WHERE created_at < $1
                     ORDER BY created_at
                     LIMIT $2",
                    &[&older_than, &limit(n)],
                )?
                .iter()
                .map(|row| OutboxEntry {
                    tweet_id: TweetId(row.get(0)),
                    author_id: UserId(row.get(1)),
                    attempts: row.get::<_, i32>(2).max(0) as u32,
                    created_at: Score(row.get(3)).to_datetime(),
                })
                .collect())
        })
        .await
    }

    async fn outbox_ack(&self, id: &TweetId) -> Result<()> {
        let id = id.0.clone();
        self.run(move |conn| {
            conn.execute("DELETE FROM fanout_outbox WHERE tweet_id = $1", &[&id])?;
            Ok(())
        })
        .await
    }

    async fn outbox_bump(&self, id: &TweetId) -> Result<u32> {
        let id = id.0.clone();
        self.run(move |conn| {
            conn.query_opt(
                "UPDATE fanout_outbox SET attempts = attempts + 1 WHERE tweet_id = $1
                 RETURNING attempts",
                &[&id],
            )?
            .map(|row| row.get::<_, i32>(0).max(0) as u32)
            .ok_or_else(|| Error::NotFound(format!("outbox entry for {}", id)))
        })
        .await
    }
}

#[async_trait]
impl Graph for PgStore {
    async fn followers(
        &self,
        author: UserId,
        after: Option<UserId>,
        n: usize,
    ) -> Result<Vec<UserId>> {
        let after = after.map_or(i64::MIN, |id| id.0);
        self.run(move |conn| {
            Ok(conn
                .query(
                    "SELECT follower_id FROM follows
                     WHERE followee_id = $1 AND follower_id > $2
                     ORDER BY follower_id
                     LIMIT $3",
                    &[&author.0, &after, &limit(n)],
                )?
                .iter()
                .map(|row| UserId(row.get(0)))
                .collect())
        })
        .await
    }

    async fn following(&self, user: UserId) -> Result<Vec<UserId>> {
        self.run(move |conn| {
            Ok(conn
                .query(
                    "SELECT followee_id FROM follows WHERE follower_id = $1",
                    &[&user.0],
                )?
                .iter()
                .map(|row| UserId(row.get(0)))
                .collect())
        })
        .await
    }

    async fn follower_count(&self, author: UserId) -> Result<u64> {
        self.run(move |conn| {
            let count: i64 = conn
                .query_one(
                    "SELECT COUNT(*) FROM follows WHERE followee_id = $1",
                    &[&author.0],
                )?
                .get(0);
            Ok(count.max(0) as u64)
        })
        .await
    }
}
