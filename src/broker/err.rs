use crate::cache::RedisConnErr;
use std::fmt;

#[derive(Debug)]
pub enum BrokerErr {
    Unavailable(String),
    Redis(RedisConnErr),
    /// A message body that is not a job we understand.
    Unparseable(String),
    UnknownDelivery(u64),
}

impl std::error::Error for BrokerErr {}

impl fmt::Display for BrokerErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use BrokerErr::*;
        match self {
            Unavailable(why) => write!(f, "broker unavailable: {}", why),
            Redis(inner) => write!(f, "{}", inner),
            Unparseable(why) => write!(f, "could not parse job: {}", why),
            UnknownDelivery(tag) => write!(f, "no unacked delivery with tag {}", tag),
        }
    }
}

impl From<RedisConnErr> for BrokerErr {
    fn from(e: RedisConnErr) -> Self {
        Self::Redis(e)
    }
}

impl From<serde_json::Error> for BrokerErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Unparseable(e.to_string())
    }
}
