//! Error handling.

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_smithy_types::byte_stream::error::Error as ByteStreamError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ndarray::ShapeError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tracing::{event, Level};

use crate::models::CloudStorage;
use crate::upload::UploadError;

/// Datacube server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum DatacubeError {
    /// Datacube constructed with coordinates that do not match its values
    #[error("datacube coordinates do not match the shape of its values")]
    CubeShapeMismatch,

    /// Invalid WKT in the request geometry
    #[error("geometry is not valid well-known text: {reason}")]
    Geometry { reason: String },

    /// Metacube assembly over collections with differing grids
    #[error("cannot merge datacubes on incompatible coordinate grids")]
    GridMismatch,

    /// Artifact or store I/O error
    #[error("artifact i/o error")]
    Io(#[from] std::io::Error),

    /// Error decoding a collection's scene catalog
    #[error("failed to decode the scene catalog for collection {collection}")]
    ManifestDecode {
        collection: String,
        #[source]
        cause: serde_json::Error,
    },

    /// Metacube assembly invoked without any datacubes
    #[error("cannot merge an empty set of datacubes")]
    MergeEmpty,

    /// Error reinterpreting raster bytes as pixel values
    #[error("failed to convert raster bytes for object {key}")]
    RasterFromBytes { key: String },

    /// Error deserialising the request body into AnalyticsRequest
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Error validating request data (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error validating request data (single error)
    #[error("request data is not valid")]
    RequestDataValidationSingle(#[from] validator::ValidationError),

    /// Error deserialising query parameters into QueryOptions
    #[error("request query is not valid")]
    RequestQueryRejection(#[from] QueryRejection),

    /// Error reading object data from S3
    #[error("error receiving object from S3 storage")]
    S3ByteStream(#[from] ByteStreamError),

    /// Missing Content-Length header in S3 response.
    #[error("S3 response missing Content-Length header")]
    S3ContentLengthMissing,

    /// Error while retrieving an object from S3
    #[error("error retrieving object from S3 storage")]
    S3GetObject(#[from] SdkError<GetObjectError>),

    /// Error creating an ndarray from catalog raster data
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// Error formatting a timestamp
    #[error("failed to format timestamp")]
    TimeFormat(#[from] time::error::Format),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Error uploading an artifact to a cloud storage backend
    #[error("error while uploading folder to {backend}")]
    Upload {
        backend: CloudStorage,
        #[source]
        cause: UploadError,
    },

    /// Invalid chunk shape for a zarr artifact
    #[error("invalid zarr chunk shape: {reason}")]
    ZarrChunkShape { reason: String },

    /// Error creating a zarr array
    #[error("failed to create zarr artifact")]
    ZarrCreate(#[from] zarrs::array::ArrayCreateError),

    /// Error creating a zarr group
    #[error("failed to create zarr group")]
    ZarrGroup(#[from] zarrs::group::GroupCreateError),

    /// Error creating a zarr filesystem store
    #[error("failed to create zarr store")]
    ZarrStore(#[from] zarrs::filesystem::FilesystemStoreCreateError),

    /// Error in the zarr storage layer
    #[error("zarr storage error")]
    ZarrStorage(#[from] zarrs::storage::StorageError),

    /// Error writing datacube values into a zarr array
    #[error("failed to write zarr artifact")]
    ZarrWrite(#[from] zarrs::array::ArrayError),
}

impl IntoResponse for DatacubeError {
    /// Convert from a `DatacubeError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }

    /// Return a 400 bad request ErrorResponse
    fn bad_request<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Return a 401 unauthorised ErrorResponse
    fn unauthorised<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    /// Return a 500 internal server error ErrorResponse
    fn internal_server_error<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<DatacubeError> for ErrorResponse {
    /// Convert from a `DatacubeError` into an `ErrorResponse`.
    fn from(error: DatacubeError) -> Self {
        let response = match &error {
            // Bad request
            DatacubeError::Geometry { reason: _ }
            | DatacubeError::RequestDataJsonRejection(_)
            | DatacubeError::RequestDataValidation(_)
            | DatacubeError::RequestDataValidationSingle(_)
            | DatacubeError::RequestQueryRejection(_) => Self::bad_request(&error),

            // Internal server error
            DatacubeError::CubeShapeMismatch
            | DatacubeError::GridMismatch
            | DatacubeError::Io(_)
            | DatacubeError::ManifestDecode {
                collection: _,
                cause: _,
            }
            | DatacubeError::MergeEmpty
            | DatacubeError::RasterFromBytes { key: _ }
            | DatacubeError::S3ByteStream(_)
            | DatacubeError::S3ContentLengthMissing
            | DatacubeError::ShapeInvalid(_)
            | DatacubeError::TimeFormat(_)
            | DatacubeError::TryFromInt(_)
            | DatacubeError::Upload {
                backend: _,
                cause: _,
            }
            | DatacubeError::ZarrChunkShape { reason: _ }
            | DatacubeError::ZarrCreate(_)
            | DatacubeError::ZarrGroup(_)
            | DatacubeError::ZarrStore(_)
            | DatacubeError::ZarrStorage(_)
            | DatacubeError::ZarrWrite(_) => Self::internal_server_error(&error),

            DatacubeError::S3GetObject(sdk_error) => {
                // Tailor the response based on the specific SdkError variant.
                match &sdk_error {
                    // These are generic SdkError variants.
                    // Internal server error
                    SdkError::ConstructionFailure(_)
                    | SdkError::DispatchFailure(_)
                    | SdkError::ResponseError(_)
                    | SdkError::TimeoutError(_) => Self::internal_server_error(&error),

                    // This is a more specific ServiceError variant, with GetObjectError as the
                    // inner error.
                    SdkError::ServiceError(get_obj_error) => {
                        let get_obj_error = get_obj_error.err();
                        match get_obj_error {
                            GetObjectError::InvalidObjectState(_)
                            | GetObjectError::NoSuchKey(_) => Self::bad_request(&error),

                            // Quite a lot of error cases end up as unhandled. Attempt to determine
                            // the error from the code.
                            _ => {
                                match get_obj_error.code() {
                                    // Bad request
                                    Some("NoSuchBucket") => Self::bad_request(&error),

                                    // Unauthorised
                                    Some("InvalidAccessKeyId")
                                    | Some("SignatureDoesNotMatch")
                                    | Some("AccessDenied") => Self::unauthorised(&error),

                                    // Internal server error
                                    _ => Self::internal_server_error(&error),
                                }
                            }
                        }
                    }

                    // The enum is marked as non-exhaustive
                    _ => Self::internal_server_error(&error),
                }
            }
        };

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
