use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exambuilder returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{message}")]
    Api { code: String, message: String },
    #[error("{0} was not found")]
    NotFound(String),
    #[error("could not decode exambuilder response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Stable code carried into `OperationResponse::error`.
    pub fn code(&self) -> &str {
        match self {
            Self::Http(_) => "HTTP_ERROR",
            Self::Status { .. } => "API_ERROR",
            Self::Api { code, .. } => code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Decode(_) => "DECODE_ERROR",
        }
    }
}
