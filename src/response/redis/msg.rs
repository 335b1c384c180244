//! Methods for parsing input in the small subset of the Redis Serialization Protocol we
//! support.
//!
//! Every message received on the subscriber connection is a Redis Array whose elements are
//! Bulk Strings or Integers (as Redis defines those terms).  See the
//! [Redis protocol documentation](https://redis.io/topics/protocol) for details.  A raw
//! message might look slightly like this (simplified, with line breaks added between
//! fields):
//!
//! ```text
//! *3\r\n
//! $7\r\n
//! message\r\n
//! $10\r\n
//! timeline:4\r\n
//! $1386\r\n{\"event\":\"update\",\"payload\"...\"queued_at\":1569623342825}\r\n
//! ```
//!
//! Read that as: an array with three elements: the first element is a bulk string with
//! seven characters, the second is a bulk string with ten characters, and the third is a
//! bulk string with 1,386 characters.
//!
//! The command connection only ever receives Simple Strings, Errors and Integers.
mod err;
pub use err::RedisParseErr;

use self::RedisParseOutput::*;

use std::convert::TryInto;

#[derive(Debug, Clone, PartialEq)]
pub enum RedisParseOutput<'a> {
    Msg(RedisMsg<'a>),
    NonMsg(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedisMsg<'a> {
    pub channel_txt: &'a str,
    pub event_txt: &'a str,
    pub leftover_input: &'a str,
}

/// A reply received on the command connection
#[derive(Debug, Clone, PartialEq)]
pub struct RedisReply<'a> {
    pub error: Option<&'a str>,
    pub leftover_input: &'a str,
}

impl<'a> TryFrom<&'a str> for RedisParseOutput<'a> {
    type Error = RedisParseErr;
    fn try_from(utf8: &'a str) -> Result<RedisParseOutput<'a>, Self::Error> {
        let (structured_txt, leftover_utf8) = utf8_to_redis_data(utf8)?;
        let structured_txt = RedisStructuredText {
            structured_txt,
            leftover_input: leftover_utf8,
        };
        structured_txt.try_into()
    }
}

impl<'a> TryFrom<&'a str> for RedisReply<'a> {
    type Error = RedisParseErr;
    fn try_from(utf8: &'a str) -> Result<RedisReply<'a>, Self::Error> {
        let (data, leftover_input) = utf8_to_redis_data(utf8)?;
        Ok(RedisReply {
            error: match data {
                Error(msg) => Some(msg),
                _ => None,
            },
            leftover_input,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RedisStructuredText<'a> {
    structured_txt: RedisData<'a>,
    leftover_input: &'a str,
}
#[derive(Debug, Clone, PartialEq)]
enum RedisData<'a> {
    RedisArray(Vec<RedisData<'a>>),
    BulkString(&'a str),
    SimpleString(&'a str),
    Error(&'a str),
    Integer(i64),
    Nil,
}

use RedisData::*;
use RedisParseErr::*;
type RedisParser<'a, Item> = Result<Item, RedisParseErr>;
fn utf8_to_redis_data(s: &str) -> Result<(RedisData, &str), RedisParseErr> {
    if s.len() < 4 {
        Err(Incomplete)?
    };
    let first_char = s.chars().next().ok_or(Incomplete)?;
    let s = &s[first_char.len_utf8()..];
    match first_char {
        ':' => parse_redis_int(s),
        '$' => parse_redis_bulk_string(s),
        '*' => parse_redis_array(s),
        '+' => parse_redis_line(s).map(|(line, rest)| (SimpleString(line), rest)),
        '-' => parse_redis_line(s).map(|(line, rest)| (Error(line), rest)),
        e => Err(InvalidLineStart(e.to_string())),
    }
}

fn after_newline_at(s: &str, start: usize) -> RedisParser<&str> {
    let s = s.get(start..).ok_or(Incomplete)?;
    if s.len() < 2 {
        Err(Incomplete)?
    }
    if !s.starts_with("\r\n") {
        return Err(RedisParseErr::InvalidLineEnd);
    }
    Ok(&s["\r\n".len()..])
}

fn parse_number_at(s: &str) -> RedisParser<(i64, &str)> {
    let sign_len = usize::from(s.starts_with('-'));
    let len = sign_len
        + s[sign_len..]
            .bytes()
            .position(|b| !b.is_ascii_digit())
            .ok_or(Incomplete)?;
    Ok((s[..len].parse()?, after_newline_at(s, len)?))
}

fn parse_redis_line(s: &str) -> RedisParser<(&str, &str)> {
    let end = s.find("\r\n").ok_or(Incomplete)?;
    Ok((&s[..end], &s[end + "\r\n".len()..]))
}

/// Parse a Redis bulk string and return the content of that string and the unparsed remainder.
///
/// All bulk strings have the format `$[LENGTH_OF_ITEM_BODY]\r\n[ITEM_BODY]\r\n`
fn parse_redis_bulk_string(s: &str) -> RedisParser<(RedisData, &str)> {
    let (len, rest) = parse_number_at(s)?;
    let len = match usize::try_from(len) {
        Ok(len) => len,
        Err(_) => return Ok((Nil, rest)), // `$-1`
    };
    let content = rest.get(..len).ok_or(Incomplete)?;
    Ok((BulkString(content), after_newline_at(rest, len)?))
}

fn parse_redis_int(s: &str) -> RedisParser<(RedisData, &str)> {
    let (number, rest) = parse_number_at(s)?;
    Ok((Integer(number), rest))
}

fn parse_redis_array(s: &str) -> RedisParser<(RedisData, &str)> {
    let (number_of_elements, mut rest) = parse_number_at(s)?;
    let number_of_elements = match usize::try_from(number_of_elements) {
        Ok(n) => n,
        Err(_) => return Ok((Nil, rest)), // `*-1`
    };

    let mut inner = Vec::with_capacity(number_of_elements);
    for _ in 0..number_of_elements {
        let (next_el, new_rest) = utf8_to_redis_data(rest)?;
        rest = new_rest;
        inner.push(next_el);
    }
    Ok((RedisArray(inner), rest))
}

impl<'a> TryFrom<RedisData<'a>> for &'a str {
    type Error = RedisParseErr;

    fn try_from(val: RedisData<'a>) -> Result<Self, Self::Error> {
        match val {
            BulkString(inner) => Ok(inner),
            _ => Err(IncorrectRedisType),
        }
    }
}

impl<'a> TryFrom<RedisStructuredText<'a>> for RedisParseOutput<'a> {
    type Error = RedisParseErr;

    fn try_from(input: RedisStructuredText<'a>) -> Result<RedisParseOutput<'a>, Self::Error> {
        let mut redis_strings = match input.structured_txt {
            RedisArray(elements) => elements.into_iter(),
            _ => Err(IncorrectRedisType)?,
        };
        let command: &str = redis_strings.next().ok_or(MissingField)?.try_into()?;
        match command {
            // Messages look like;
            // $10\r\ntimeline:4\r\n
            // $1386\r\n{\"event\":\"update\",\"payload\"...\"queued_at\":1569623342825}\r\n
            "message" => Ok(Msg(RedisMsg {
                channel_txt: redis_strings.next().ok_or(MissingField)?.try_into()?,
                event_txt: redis_strings.next().ok_or(MissingField)?.try_into()?,
                leftover_input: input.leftover_input,
            })),
            // subscription statuses look like:
            // $14\r\ntimeline:local\r\n
            // :47\r\n
            "subscribe" | "unsubscribe" => Ok(NonMsg(input.leftover_input)),
            other => {
                log::debug!("Ignoring unexpected `{}` reply from Redis", other);
                Ok(NonMsg(input.leftover_input))
            }
        }
    }
}

#[cfg(test)]
mod test;
