//! Methods for parsing replies in the subset of the Redis Serialization Protocol that the
//! commands we send can produce.
//!
//! A reply is a simple string (`+OK\r\n`), an error (`-ERR ...\r\n`), an integer
//! (`:42\r\n`), a bulk string (`$5\r\nhello\r\n`, or `$-1\r\n` for nil), or an array of
//! further replies (`*2\r\n...`, or `*-1\r\n` for nil).  See the
//! [Redis protocol documentation](https://redis.io/topics/protocol) for details.
//!
//! Parsing happens in two passes: the first borrows from the input buffer and fails cheaply
//! with `Incomplete` when more bytes are needed; only a complete reply is copied into an
//! owned `Reply`.
mod err;
pub use err::RespParseErr;

use super::connection::RedisConnErr;
use std::str;

/// An owned reply from Redis.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    pub(crate) fn integer(self) -> Result<i64, RedisConnErr> {
        match self {
            Reply::Integer(n) => Ok(n),
            other => Err(RedisConnErr::InvalidRedisReply(format!("{:?}", other))),
        }
    }

    pub(crate) fn bulk_string(self) -> Result<Option<String>, RedisConnErr> {
        match self {
            Reply::Bulk(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| RedisConnErr::InvalidRedisReply(e.to_string())),
            Reply::Nil => Ok(None),
            other => Err(RedisConnErr::InvalidRedisReply(format!("{:?}", other))),
        }
    }

    pub(crate) fn array(self) -> Result<Vec<Reply>, RedisConnErr> {
        match self {
            Reply::Array(items) => Ok(items),
            Reply::Nil => Ok(Vec::new()),
            other => Err(RedisConnErr::InvalidRedisReply(format!("{:?}", other))),
        }
    }

    pub(crate) fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(status) if status == "OK")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RespData<'a> {
    Status(&'a str),
    Error(&'a str),
    Integer(i64),
    Bulk(&'a [u8]),
    Nil,
    Array(Vec<RespData<'a>>),
}

impl From<RespData<'_>> for Reply {
    fn from(data: RespData<'_>) -> Self {
        match data {
            RespData::Status(s) => Reply::Status(s.to_string()),
            RespData::Error(s) => Reply::Error(s.to_string()),
            RespData::Integer(n) => Reply::Integer(n),
            RespData::Bulk(bytes) => Reply::Bulk(bytes.to_vec()),
            RespData::Nil => Reply::Nil,
            RespData::Array(items) => Reply::Array(items.into_iter().map(Reply::from).collect()),
        }
    }
}

/// Parses one reply off the front of `input`, returning it along with the number of bytes
/// it took up.
pub fn parse_reply(input: &[u8]) -> Result<(Reply, usize), RespParseErr> {
    let (data, rest) = bytes_to_resp_data(input)?;
    Ok((data.into(), input.len() - rest.len()))
}

use RespParseErr::*;
type RespParser<'a, Item> = Result<Item, RespParseErr>;

fn bytes_to_resp_data(input: &[u8]) -> RespParser<(RespData, &[u8])> {
    let (first_byte, rest) = input.split_first().ok_or(Incomplete)?;
    match first_byte {
        b'+' => parse_line(rest).map(|(line, rest)| (RespData::Status(line), rest)),
        b'-' => parse_line(rest).map(|(line, rest)| (RespData::Error(line), rest)),
        b':' => parse_number(rest).map(|(n, rest)| (RespData::Integer(n), rest)),
        b'$' => parse_bulk_string(rest),
        b'*' => parse_array(rest),
        other => Err(InvalidLineStart(String::from_utf8_lossy(&[*other]).to_string())),
    }
}

fn parse_line(input: &[u8]) -> RespParser<(&str, &[u8])> {
    let end = input
        .windows(2)
        .position(|pair| pair == b"\r\n")
        .ok_or(Incomplete)?;
    Ok((str::from_utf8(&input[..end])?, &input[end + 2..]))
}

fn parse_number(input: &[u8]) -> RespParser<(i64, &[u8])> {
    let (line, rest) = parse_line(input)?;
    Ok((line.parse()?, rest))
}

/// All bulk strings have the format `$[LENGTH_OF_ITEM_BODY]\r\n[ITEM_BODY]\r\n`
fn parse_bulk_string(input: &[u8]) -> RespParser<(RespData, &[u8])> {
    let (len, rest) = parse_number(input)?;
    if len < 0 {
        return Ok((RespData::Nil, rest));
    }
    let len = len as usize;
    let content = rest.get(..len).ok_or(Incomplete)?;
    match rest.get(len..len + 2) {
        None => Err(Incomplete),
        Some(b"\r\n") => Ok((RespData::Bulk(content), &rest[len + 2..])),
        Some(_) => Err(InvalidLineEnd),
    }
}

fn parse_array(input: &[u8]) -> RespParser<(RespData, &[u8])> {
    let (number_of_elements, mut rest) = parse_number(input)?;
    if number_of_elements < 0 {
        return Ok((RespData::Nil, rest));
    }

    let mut inner = Vec::with_capacity(number_of_elements as usize);
    for _ in 0..number_of_elements {
        let (next_el, new_rest) = bytes_to_resp_data(rest)?;
        rest = new_rest;
        inner.push(next_el);
    }
    Ok((RespData::Array(inner), rest))
}

/// Encodes a command as a RESP array of bulk strings.
pub(crate) fn encode_cmd<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.as_ref().len() + 16).sum::<usize>());
    out.extend_from_slice(b"*");
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        out.extend_from_slice(b"$");
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

#[cfg(test)]
mod test;
