use axum::response::{IntoResponse, Response};
use http::header::{ALLOW, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};

use common::acl::AclError;
use common::credentials::CredentialError;
use common::ldp::{allowed_methods, LdpError};
use common::path::{PathError, Target};

/// Challenges offered with every 401.
const CHALLENGES: [&str; 2] = ["Bearer realm=\"Solid\"", "DPoP realm=\"Solid\""];

/// Anything that can end a pod request early.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("authentication required")]
    Unauthorized,
    #[error("access denied")]
    Forbidden,
    #[error("credentials: {0}")]
    Credentials(#[from] CredentialError),
    #[error("access control: {0}")]
    Acl(#[from] AclError),
    #[error(transparent)]
    Ldp(#[from] LdpError),
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
    #[error("not found")]
    OutsidePod,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Unauthorized => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden => StatusCode::FORBIDDEN,
            RequestError::Credentials(e) => match e {
                CredentialError::Malformed(_) => StatusCode::BAD_REQUEST,
                CredentialError::TimedOut(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::UNAUTHORIZED,
            },
            RequestError::Acl(AclError::TimedOut(_)) => StatusCode::SERVICE_UNAVAILABLE,
            RequestError::Acl(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RequestError::Ldp(e) => match e {
                LdpError::NotFound(_) => StatusCode::NOT_FOUND,
                LdpError::AlreadyExists(_) => StatusCode::CONFLICT,
                LdpError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
                LdpError::ContainerNotEmpty(_) => StatusCode::CONFLICT,
                LdpError::Forbidden(_) => StatusCode::FORBIDDEN,
                LdpError::BadRequest(_) => StatusCode::BAD_REQUEST,
                LdpError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                LdpError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
                LdpError::Conflict(_) => StatusCode::CONFLICT,
                LdpError::TimedOut(_) => StatusCode::SERVICE_UNAVAILABLE,
                LdpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            RequestError::Path(_) => StatusCode::BAD_REQUEST,
            RequestError::OutsidePod => StatusCode::NOT_FOUND,
        }
    }

    fn log(&self, status: StatusCode) {
        match status {
            s if s.is_server_error() => tracing::error!(status = s.as_u16(), error = %self, "request failed"),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::info!(status = status.as_u16(), error = %self, "request denied")
            }
            s => tracing::warn!(status = s.as_u16(), error = %self, "request rejected"),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        self.log(status);

        let body = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            StatusCode::SERVICE_UNAVAILABLE => "request timed out".to_string(),
            _ => self.to_string(),
        };
        let mut response = (status, [(CONTENT_TYPE, "text/plain")], body).into_response();

        let headers = response.headers_mut();
        if status == StatusCode::UNAUTHORIZED {
            for challenge in CHALLENGES {
                headers.append(WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
            }
        }
        if let RequestError::Ldp(LdpError::MethodNotAllowed(path)) = &self {
            let allow = allowed_methods(&Target::Resource(path.clone()))
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                headers.insert(ALLOW, value);
            }
        }
        response
    }
}
