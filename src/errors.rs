use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Rate limited")]
    RateLimited,

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid word: {0}")]
    InvalidWord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index not ready")]
    NotReady,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Env error: {0}")]
    EnvError(String),
}

impl AppError {
    /// Stable machine-readable code surfaced to clients in JSON bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::RateLimited => "rate_limited",
            AppError::Forbidden => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidWord(_) => "invalid_word",
            AppError::Io(_) => "io_error",
            AppError::NotReady => "not_ready",
            AppError::Serialization(_) => "io_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::EnvError(_) => "bad_request",
        }
    }

    pub fn to_response(&self) -> (StatusCode, String) {
        match self {
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.code().into()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.code().into()),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.code().into()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.code().into()),
            AppError::InvalidWord(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, self.code().into()),
            AppError::Serialization(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::EnvError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = self.to_response();
        (status, body).into_response()
    }
}
