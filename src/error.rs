// Error taxonomy for the gateway's request path.
//
// Every error that can surface to an HTTP client is a `GatewayError`. The
// `StatusCode` mapping lives next to the variant definitions so that adding
// a new failure mode can't forget to pick a status.

use thiserror::Error;
use tide::StatusCode;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed parameter, bad cursor shape, forbidden option combination,
    /// a `/v1/fields/{field}` name outside the allowed set, and the like.
    #[error("{0}")]
    ClientInput(String),

    /// Missing or malformed bearer token, or a failed sandbox access probe
    /// that itself returned 401.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The sandbox access probe (or the upstream files API) returned a
    /// non-401 error status. Carries the upstream status through so the
    /// gate can "surface the upstream status code and body" per §4.7.
    #[error("upstream denied access with status {status}: {body}")]
    ProbeDenied { status: u16, body: String },

    /// No matching content: a missing remote file, or an empty logical
    /// range. Callers pick 204 or 404 depending on route, see `§7`.
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-2xx upstream response, decode failure, or timeout talking to
    /// the files API / cluster state endpoint.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Reader construction failed, or a formatter produced no output for a
    /// record that must have one (range mode only, see `§4.1`).
    #[error("internal error: {0}")]
    Internal(String),

    /// A cursor was syntactically well-formed but did not exist in the
    /// journal, or seeking to it landed on the wrong entry.
    #[error("invalid cursor")]
    InvalidCursor,

    /// A read was attempted before any seek/skip positioned the reader.
    #[error("journal reader was not initialized")]
    UninitializedReader,

    /// The underlying `sd_journal_seek_*` call failed.
    #[error("failed to seek journal: {0}")]
    SeekFailed(String),

    /// Any other local journal I/O failure.
    #[error("journal I/O error: {0}")]
    JournalIo(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::ClientInput(_) => StatusCode::BadRequest,
            GatewayError::InvalidCursor => StatusCode::BadRequest,
            GatewayError::UninitializedReader => StatusCode::BadRequest,
            GatewayError::Unauthorized(_) => StatusCode::Unauthorized,
            GatewayError::ProbeDenied { status, .. } => {
                StatusCode::try_from(*status).unwrap_or(StatusCode::InternalServerError)
            }
            GatewayError::NotFound(_) => StatusCode::NotFound,
            GatewayError::SeekFailed(_) => StatusCode::BadRequest,
            GatewayError::Upstream(_) => StatusCode::InternalServerError,
            GatewayError::JournalIo(_) => StatusCode::InternalServerError,
            GatewayError::Internal(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<GatewayError> for tide::Error {
    fn from(e: GatewayError) -> tide::Error {
        let status = e.status();
        tide::Error::new(status, e)
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
