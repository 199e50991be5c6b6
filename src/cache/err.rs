use super::redis::RedisConnErr;
use std::fmt;

#[derive(Debug)]
pub enum CacheErr {
    /// The cache could not be reached at all.
    Unavailable(String),
    Connection(RedisConnErr),
    /// Redis answered, but not with the shape the command calls for.
    UnexpectedReply(String),
}

impl std::error::Error for CacheErr {}

impl fmt::Display for CacheErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use CacheErr::*;
        match self {
            Unavailable(why) => write!(f, "cache unavailable: {}", why),
            Connection(inner) => write!(f, "{}", inner),
            UnexpectedReply(reply) => write!(f, "unexpected reply from the cache: {}", reply),
        }
    }
}

impl From<RedisConnErr> for CacheErr {
    fn from(e: RedisConnErr) -> Self {
        Self::Connection(e)
    }
}
