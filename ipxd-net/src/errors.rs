use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("segment: {0}")]
    Segment(String),
}

impl Error {
    pub fn segment(msg: impl Into<String>) -> Self {
        Self::Segment(msg.into())
    }
}
