//! Validate query params with type checking
use crate::error::Error;
use crate::timeline::Cursor;

use serde::Deserialize;
use warp::filters::BoxedFilter;
use warp::Filter as WarpFilter;

#[derive(Deserialize, Debug, Default)]
struct RawPage {
    cursor: Option<String>,
    limit: Option<String>,
}

/// `?cursor=&limit=` of a timeline request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageQuery {
    pub cursor: Option<Cursor>,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub(crate) fn to_filter() -> BoxedFilter<(Self,)> {
        warp::query()
            .or(warp::any().map(RawPage::default))
            .unify()
            .and_then(|raw: RawPage| async move {
                Self::parse(raw).map_err(warp::reject::custom)
            })
            .boxed()
    }

    fn parse(raw: RawPage) -> Result<Self, Error> {
        let cursor = match raw.cursor.as_deref() {
            None | Some("") => None,
            Some(cursor) => Some(cursor.parse()?),
        };
        let limit = match raw.limit.as_deref() {
            None | Some("") => None,
            Some(limit) => Some(limit.parse().map_err(|_| {
                Error::InvalidInput(format!("`{}` is not a valid limit", limit))
            })?),
        };
        Ok(Self { cursor, limit })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timeline::Entry;
    use crate::tweet::Score;

    #[tokio::test]
    async fn missing_params_are_none() -> Result<(), warp::Rejection> {
        let query = warp::test::request()
            .path("/timeline/home")
            .filter(&PageQuery::to_filter())
            .await?;
        assert_eq!(query, PageQuery::default());
        Ok(())
    }

    #[tokio::test]
    async fn params_are_parsed() -> Result<(), warp::Rejection> {
        let cursor = Cursor(Entry::new("abc".into(), Score(42)));
        let query = warp::test::request()
            .path(&format!("/timeline/home?limit=5&cursor={}", cursor))
            .filter(&PageQuery::to_filter())
            .await?;
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.cursor, Some(cursor));
        Ok(())
    }

    #[tokio::test]
    async fn bad_params_are_rejected() {
        for path in ["/timeline/home?limit=lots", "/timeline/home?cursor=***"] {
            let res = warp::test::request()
                .path(path)
                .filter(&PageQuery::to_filter())
                .await;
            assert!(res.is_err(), "{}", path);
        }
    }
}
