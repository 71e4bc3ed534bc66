/// Worker related errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("This type of job ({0}) is currently not supported.")]
    UnsupportedJobType(String),

    #[error("relay error: {0}")]
    Relay(#[from] enostr::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("the relay worker is no longer running")]
    WorkerGone,
}

impl Error {
    pub fn unsupported(category: impl std::fmt::Display) -> Self {
        Error::UnsupportedJobType(category.to_string())
    }
}
