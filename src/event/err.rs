use std::fmt;

#[derive(Debug)]
pub enum EventErr {
    SerdeParse(serde_json::Error),
    MissingId,
}

impl std::error::Error for EventErr {}

impl fmt::Display for EventErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use EventErr::*;
        match self {
            SerdeParse(inner) => write!(f, "{}", inner),
            MissingId => write!(f, "Expected the event payload to be an ID"),
        }
    }
}

impl From<serde_json::Error> for EventErr {
    fn from(error: serde_json::Error) -> Self {
        Self::SerdeParse(error)
    }
}
