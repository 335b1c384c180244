use crate::request::PgErr;
use crate::response::RedisConnErr;
use std::fmt;

pub enum FatalErr {
    Postgres(PgErr),
    Redis(RedisConnErr),
    Logger(log::SetLoggerError),
    StdIo(std::io::Error),
    Dotenv(dotenv::Error),
    UrlParse(url::ParseError),
    UrlEncoding(std::string::FromUtf8Error),
    ConfigErr(String),
    Unrecoverable,
}

impl FatalErr {
    /// Log the error and shut down this process; a worker's supervisor restarts it.
    pub fn exit(msg: impl fmt::Display) -> ! {
        log::error!("{}", msg);
        eprintln!("FATAL ERROR: {}", msg);
        std::process::exit(1);
    }

    pub fn config(var: &str, value: &str, allowed_vals: &str) -> Self {
        Self::ConfigErr(format!(
            "{0} is set to `{1}`, which is invalid.\n{3:7}{0} must be {2}.",
            var, value, allowed_vals, ""
        ))
    }
}

impl std::error::Error for FatalErr {}
impl fmt::Debug for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl fmt::Display for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use FatalErr::*;
        write!(
            f,
            "{}",
            match self {
                Postgres(e) => format!("could not connect to Postgres.\n{:7}{}", "", e),
                Redis(e) => format!("{}", e),
                Logger(e) => format!("{}", e),
                StdIo(e) => format!("{}", e),
                Dotenv(e) => format!("could not read the `.env` file.\n{:7}{}", "", e),
                UrlParse(e) => format!("could not parse the connection URL.\n{:7}{}", "", e),
                UrlEncoding(e) => format!("could not decode the connection URL.\n{:7}{}", "", e),
                ConfigErr(e) => e.to_string(),
                Unrecoverable => "The streaming server will now shut down.".into(),
            }
        )
    }
}

impl From<PgErr> for FatalErr {
    fn from(e: PgErr) -> Self {
        Self::Postgres(e)
    }
}
impl From<RedisConnErr> for FatalErr {
    fn from(e: RedisConnErr) -> Self {
        Self::Redis(e)
    }
}
impl From<std::string::FromUtf8Error> for FatalErr {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::UrlEncoding(e)
    }
}
impl From<url::ParseError> for FatalErr {
    fn from(e: url::ParseError) -> Self {
        Self::UrlParse(e)
    }
}
impl From<std::io::Error> for FatalErr {
    fn from(e: std::io::Error) -> Self {
        Self::StdIo(e)
    }
}
impl From<log::SetLoggerError> for FatalErr {
    fn from(e: log::SetLoggerError) -> Self {
        Self::Logger(e)
    }
}
