use thiserror::Error;

/// Failures of the server-side document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Why a candidate file did not become the current dataset.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    /// Wrong file type; nothing was read.
    #[error("{file_name}: please upload only Excel files (.xls, .xlsx)")]
    Rejected { file_name: String },

    /// The decoder could not make sense of the file content.
    #[error("Error reading Excel file {file_name}: {message}")]
    Parse { file_name: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartError {
    #[error("Please select X and Y axes and ensure data is loaded.")]
    MissingAxis,

    #[error("Please select X and Y axes and ensure data is loaded.")]
    EmptyDataset,

    #[error("unknown chart type: {0}")]
    UnknownKind(String),

    #[error("chart rendering failed: {0}")]
    Render(String),
}

/// Errors surfaced by the REST handlers. Each variant maps to one status code
/// and a `{ "message": ... }` body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    /// The cause is logged, never sent to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(feature = "web")]
mod web {
    use super::ApiError;
    use axum::{
        Json,
        extract::rejection::JsonRejection,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde_json::json;

    impl From<JsonRejection> for ApiError {
        fn from(rejection: JsonRejection) -> Self {
            ApiError::BadRequest(rejection.body_text())
        }
    }

    impl ApiError {
        pub fn status(&self) -> StatusCode {
            match self {
                ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
                ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
                ApiError::NotFound(_) => StatusCode::NOT_FOUND,
                ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let message = match &self {
                ApiError::Internal(cause) => {
                    log::error!("{}", cause);
                    "Server error".to_string()
                }
                other => other.to_string(),
            };
            (self.status(), Json(json!({ "message": message }))).into_response()
        }
    }
}

/// Failures talking to the REST backend from the client side.
#[cfg(feature = "web")]
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded {status}: {message}")]
    Api { status: u16, message: String },

    #[error("not signed in")]
    NotAuthenticated,
}

#[cfg(feature = "web")]
impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status().map(|s| s.as_u16()),
            ClientError::NotAuthenticated => None,
        }
    }
}

#[cfg(feature = "web")]
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("chart drawing failed: {0}")]
    Drawing(String),

    #[error("PNG encoding failed: {0}")]
    Encoding(#[from] image::ImageError),

    #[error("no chart to download")]
    NothingRendered,
}

#[cfg(feature = "web")]
impl From<RenderError> for ChartError {
    fn from(err: RenderError) -> Self {
        ChartError::Render(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_names_accepted_types() {
        let err = IngestError::Rejected {
            file_name: "notes.txt".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("notes.txt"));
        assert!(display.contains(".xlsx"));
    }

    #[test]
    fn parse_error_carries_decoder_message() {
        let err = IngestError::Parse {
            file_name: "broken.xlsx".to_string(),
            message: "invalid zip header".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Error reading Excel file broken.xlsx: invalid zip header"
        );
    }

    #[cfg(feature = "web")]
    #[test]
    fn internal_errors_hide_their_cause() {
        use axum::response::IntoResponse;

        let response = ApiError::Internal("disk on fire".to_string()).into_response();
        assert_eq!(response.status(), 500);
    }

    #[cfg(feature = "web")]
    #[test]
    fn status_codes_follow_variants() {
        assert_eq!(ApiError::Unauthorized("No token").status(), 401);
        assert_eq!(ApiError::Forbidden("Forbidden").status(), 403);
        assert_eq!(ApiError::NotFound("Upload not found").status(), 404);
        assert_eq!(ApiError::BadRequest("x".into()).status(), 400);
    }
}
