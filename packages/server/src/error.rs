//! API error type and its HTTP mapping.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use risk_map_geocoder::GeocodeError;
use risk_map_risk::RiskError;
use risk_map_server_models::ApiErrorBody;
use risk_map_spatial::SpatialError;

/// Errors returned by request handlers.
///
/// Client errors carry their message to the response body. Server errors
/// are logged with full detail and answered with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A parameter is missing, malformed, or out of range.
    #[error("{0}")]
    BadRequest(String),

    /// The requested cell or feature row does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Scoring failed (feature store, calibration, or score overflow).
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// A spatial lookup failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// The geocoding proxy failed.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),
}

impl ApiError {
    /// Shorthand for [`ApiError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Shorthand for [`ApiError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Message sent to the client.
    fn public_message(&self) -> String {
        match self {
            Self::BadRequest(message) | Self::NotFound(message) => message.clone(),
            Self::Risk(_) => "Failed to compute risk".to_string(),
            Self::Spatial(SpatialError::Backend(_)) => "Spatial query failed".to_string(),
            Self::Spatial(e) => e.to_string(),
            Self::Geocode(GeocodeError::Http(_)) => "Geocoding service unavailable".to_string(),
            Self::Geocode(e) => format!("Geocoding failed: {e}"),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::Spatial(SpatialError::InvalidCoordinate(_) | SpatialError::InvalidRadius(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Geocode(GeocodeError::Http(_)) => StatusCode::BAD_GATEWAY,
            Self::Risk(_) | Self::Spatial(SpatialError::Backend(_)) | Self::Geocode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{status}: {self}");
        }
        HttpResponse::build(status).json(ApiErrorBody {
            error: self.public_message(),
        })
    }
}
