use std::error::Error as StdError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Download or upload exceeded the configured size cap.
    #[error("media exceeds size cap of {limit} bytes")]
    TooLarge { limit: u64 },

    /// The download did not finish within the time budget.
    #[error("media download timed out")]
    Timeout,

    /// The remote returned a non-success status.
    #[error("media download failed: HTTP {status}")]
    Http { status: u16 },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
