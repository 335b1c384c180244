use std::{fmt, num::ParseIntError};

#[derive(Debug, Clone, PartialEq)]
pub enum RedisParseErr {
    Incomplete,
    InvalidNumber(ParseIntError),
    InvalidLineStart(String),
    InvalidLineEnd,
    IncorrectRedisType,
    MissingField,
}

impl fmt::Display for RedisParseErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use RedisParseErr::*;
        match self {
            Incomplete => write!(f, "The input from Redis does not form a complete message"),
            InvalidNumber(e) => write!(f, "Redis sent an invalid length or integer: {}", e),
            InvalidLineStart(c) => write!(f, "A Redis line cannot start with `{}`", c),
            InvalidLineEnd => write!(f, "A Redis line did not end with `\\r\\n`"),
            IncorrectRedisType => write!(f, "Redis sent a different type than expected"),
            MissingField => write!(f, "A Redis array is missing an expected element"),
        }
    }
}

impl std::error::Error for RedisParseErr {}

impl From<ParseIntError> for RedisParseErr {
    fn from(error: ParseIntError) -> Self {
        Self::InvalidNumber(error)
    }
}
