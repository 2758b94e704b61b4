use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaProxyErr {
    #[error("Invalid media request: {0}")]
    InvalidRequest(String),

    #[error("Upstream responded with status {0}")]
    Upstream(u16),

    #[error("Failed to fetch media from upstream: {0}")]
    Fetch(String),
}

impl ResponseError for MediaProxyErr {
    fn status_code(&self) -> StatusCode {
        match self {
            MediaProxyErr::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            MediaProxyErr::Upstream(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            MediaProxyErr::Fetch(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}
