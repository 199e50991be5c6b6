//! Parse client requests and run them against the core
mod query;

pub use query::PageQuery;

use crate::deadline::Deadline;
use crate::error::Error;
use crate::fanout::Fanout;
use crate::ingest::Ingestor;
use crate::response;
use crate::store::Persistence;
use crate::timeline::Reader;
use crate::tweet::{NewTweet, TweetId, UserId};

use std::sync::Arc;
use std::time::Duration;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::{path, Filter};

/// Largest request body accepted for a new tweet.
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Header the upstream auth layer puts the authenticated user's id in.
pub const USER_HEADER: &str = "x-user-id";

/// Helper macro to match on the first of any of the provided filters
macro_rules! any_of {
    ($filter:expr, $($other_filter:expr),*) => {
        $filter$(.or($other_filter).unify())*.boxed()
    };
}

#[derive(Clone)]
pub struct Handler {
    ingestor: Arc<Ingestor>,
    reader: Arc<Reader>,
    fanout: Arc<Fanout>,
    store: Arc<dyn Persistence>,
    request_deadline: Duration,
}

impl Handler {
    pub fn new(
        ingestor: Arc<Ingestor>,
        reader: Arc<Reader>,
        fanout: Arc<Fanout>,
        store: Arc<dyn Persistence>,
        request_deadline: Duration,
    ) -> Self {
        Self {
            ingestor,
            reader,
            fanout,
            store,
            request_deadline,
        }
    }

    /// Every endpoint, with errors already turned into JSON replies.
    pub fn routes(&self) -> BoxedFilter<(Response,)> {
        any_of!(
            self.post_tweet(),
            self.delete_tweet(),
            self.home_timeline(),
            self.author_timeline(),
            self.health()
        )
        .recover(response::recover)
        .unify()
        .boxed()
    }

    pub fn health(&self) -> BoxedFilter<(Response,)> {
        path!("health")
            .and(warp::get())
            .map(response::ok)
            .boxed()
    }

    pub fn post_tweet(&self) -> BoxedFilter<(Response,)> {
        let handler = self.clone();
        path!("tweets")
            .and(warp::post())
            .and(authenticated_user())
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::json())
            .and_then(move |author: UserId, new: NewTweet| {
                let handler = handler.clone();
                async move {
                    log::debug!("Incoming tweet from {}", author);
                    let tweet = handler
                        .ingestor
                        .ingest(author, new, handler.deadline())
                        .await
                        .map_err(warp::reject::custom)?;
                    Ok::<_, warp::Rejection>(response::created(&tweet))
                }
            })
            .boxed()
    }

    pub fn delete_tweet(&self) -> BoxedFilter<(Response,)> {
        let handler = self.clone();
        path!("tweets" / String)
            .and(warp::delete())
            .and(authenticated_user())
            .and_then(move |id: String, user: UserId| {
                let handler = handler.clone();
                async move {
                    handler
                        .delete(TweetId(id), user)
                        .await
                        .map_err(warp::reject::custom)?;
                    Ok::<_, warp::Rejection>(response::no_content())
                }
            })
            .boxed()
    }

    pub fn home_timeline(&self) -> BoxedFilter<(Response,)> {
        let handler = self.clone();
        path!("timeline" / "home")
            .and(warp::get())
            .and(authenticated_user())
            .and(PageQuery::to_filter())
            .and_then(move |user: UserId, query: PageQuery| {
                let handler = handler.clone();
                async move {
                    let page = handler
                        .reader
                        .home_timeline(user, query.cursor, query.limit, handler.deadline())
                        .await
                        .map_err(warp::reject::custom)?;
                    Ok::<_, warp::Rejection>(response::page(&page))
                }
            })
            .boxed()
    }

    pub fn author_timeline(&self) -> BoxedFilter<(Response,)> {
        let handler = self.clone();
        path!("timeline" / "user" / UserId)
            .and(warp::get())
            .and(PageQuery::to_filter())
            .and_then(move |author: UserId, query: PageQuery| {
                let handler = handler.clone();
                async move {
                    let page = handler
                        .reader
                        .author_timeline(author, query.cursor, query.limit, handler.deadline())
                        .await
                        .map_err(warp::reject::custom)?;
                    Ok::<_, warp::Rejection>(response::page(&page))
                }
            })
            .boxed()
    }

    /// Deletes the tweet if `user` wrote it.  Tweets by anyone else are reported as not
    /// found, so their existence is not revealed.
    async fn delete(&self, id: TweetId, user: UserId) -> Result<(), Error> {
        let deadline = self.deadline();
        let tweet = deadline
            .run(self.store.get_tweet(&id))
            .await?
            .filter(|tweet| tweet.author_id == user)
            .ok_or_else(|| Error::NotFound(format!("tweet {}", id)))?;
        if !deadline.run(self.store.delete_tweet(&id)).await? {
            Err(Error::NotFound(format!("tweet {}", id)))?
        }
        log::info!("Deleted tweet {} by {}", id, user);

        match self
            .fanout
            .scatter_remove(&tweet.id, tweet.author_id, deadline)
            .await
        {
            Ok(0) => (),
            Ok(lingering) => log::warn!("{} timelines still list deleted tweet {}", lingering, id),
            Err(e) => log::warn!("Deleted tweet {} may linger in timelines: {}", id, e),
        }
        Ok(())
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.request_deadline)
    }
}

/// The id the upstream auth layer vouched for, or a rejection with `Unauthenticated`.
pub fn authenticated_user() -> BoxedFilter<(UserId,)> {
    warp::header::optional::<String>(USER_HEADER)
        .and_then(|header: Option<String>| async move {
            header
                .and_then(|id| id.trim().parse::<UserId>().ok())
                .ok_or_else(|| warp::reject::custom(Error::Unauthenticated))
        })
        .boxed()
}

#[cfg(test)]
mod test;
