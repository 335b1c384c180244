use super::super::msg::RedisParseErr;
use std::fmt;

#[derive(Debug)]
pub enum RedisConnErr {
    ConnectionErr { addr: String, inner: std::io::Error },
    InvalidRedisReply(String),
    IncorrectPassword(String),
    MissingPassword,
    NotRedis(String),
    Closed(String),
    Parse(RedisParseErr),
    InvalidUtf8,
}

impl RedisConnErr {
    pub(super) fn with_addr<T: AsRef<str>>(address: T, inner: std::io::Error) -> Self {
        Self::ConnectionErr {
            addr: address.as_ref().to_string(),
            inner,
        }
    }
}

impl std::error::Error for RedisConnErr {}

impl fmt::Display for RedisConnErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use RedisConnErr::*;
        let msg = match self {
            ConnectionErr { addr, inner } => format!(
                "Error connecting to Redis at {}.\n\
                 Connection Error: {}",
                addr, inner
            ),
            InvalidRedisReply(unexpected_reply) => format!(
                "Received an unexpected reply from Redis: `{}`",
                unexpected_reply
            ),
            IncorrectPassword(_) => "Incorrect Redis password.  \
                 Please supply the correct password with the REDIS_PASSWORD environmental variable."
                .to_string(),
            MissingPassword => "Invalid authentication for Redis.  Redis is configured to require \
                                a password, but you did not provide one. \n\
                                Set a password using the REDIS_PASSWORD environmental variable."
                .to_string(),
            NotRedis(addr) => format!(
                "The server at {} is not a Redis server.  Please update the REDIS_HOST and/or \
                 REDIS_PORT environmental variables and try again.",
                addr
            ),
            Closed(addr) => format!("The Redis server at {} closed the connection", addr),
            Parse(inner) => format!("Could not parse input from Redis: {}", inner),
            InvalidUtf8 => "Redis sent input that is not valid UTF-8".to_string(),
        };
        write!(f, "{}", msg)
    }
}
