use std::sync::Arc;

use chrono::{DateTime, Utc};
use poem::http::{header, StatusCode};
use poem::middleware::Tracing;
use poem::{Endpoint, EndpointExt, Middleware, Request, Route};
use poem_openapi::auth::Bearer;
use poem_openapi::param::{Path, Query};
use poem_openapi::payload::{Binary, Json};
use poem_openapi::types::multipart::Upload;
use poem_openapi::{ApiResponse, Multipart, Object, OpenApi, OpenApiService, SecurityScheme};
use uuid::Uuid;

use crate::controller::{NewUpload, UploadCoordinator};
use crate::error::{ErrorKind, StorageError, UploadError};
use crate::identity::IdentityProvider;
use crate::processor::RawImageParams;
use crate::records::UploadRecord;

/// Room left for the multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(SecurityScheme)]
#[oai(type = "bearer")]
pub struct BearerAuth(Bearer);

#[derive(Multipart, Debug)]
pub struct UploadPayload {
    /// The file to store.
    file: Upload,

    /// An optional folder below the caller's own directory.
    folder: Option<String>,
}

#[derive(Object, Debug)]
pub struct ErrorBody {
    error: String,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct CreatedUpload {
    /// The generated ID for the upload.
    upload_id: Uuid,

    /// The crc32 checksum of the stored file.
    checksum: u32,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct UploadSummary {
    id: Uuid,
    file_path: String,
    created_at: DateTime<Utc>,
}

impl From<UploadRecord> for UploadSummary {
    fn from(record: UploadRecord) -> Self {
        Self {
            id: record.id,
            file_path: record.file_path,
            created_at: record.created_at,
        }
    }
}

#[derive(Object, Debug)]
pub struct UploadList {
    uploads: Vec<UploadSummary>,
}

#[derive(Object, Debug)]
pub struct Message {
    message: String,
}

/// Declares an API response with the shared error variants and
/// the conversion from `UploadError` into them.
macro_rules! api_response {
    ( $name:ident { $($ok:tt)* } ) => {
        #[derive(ApiResponse)]
        pub enum $name {
            $($ok)*

            #[oai(status = 400)]
            BadRequest(Json<ErrorBody>),

            #[oai(status = 401)]
            Unauthorized(Json<ErrorBody>),

            #[oai(status = 403)]
            Forbidden(Json<ErrorBody>),

            #[oai(status = 404)]
            NotFound(Json<ErrorBody>),

            #[oai(status = 500)]
            InternalServerError(Json<ErrorBody>),
        }

        impl $name {
            fn unauthorized() -> Self {
                Self::Unauthorized(Json(ErrorBody {
                    error: "invalid or missing access token".to_string(),
                }))
            }
        }

        impl From<UploadError> for $name {
            fn from(err: UploadError) -> Self {
                let body = Json(ErrorBody { error: err.to_string() });
                match err.kind() {
                    ErrorKind::Validation => Self::BadRequest(body),
                    ErrorKind::NotFound => Self::NotFound(body),
                    ErrorKind::Forbidden => Self::Forbidden(body),
                    ErrorKind::Storage | ErrorKind::Processing => {
                        error!("request failed: {:?}", err);
                        Self::InternalServerError(body)
                    },
                }
            }
        }
    };
}

api_response!(CreateResponse {
    #[oai(status = 200)]
    Ok(Json<CreatedUpload>),
});

api_response!(ListResponse {
    #[oai(status = 200)]
    Ok(Json<UploadList>),
});

api_response!(GetResponse {
    #[oai(status = 200)]
    Ok(Json<UploadSummary>),
});

api_response!(DeleteResponse {
    #[oai(status = 200)]
    Ok(Json<Message>),
});

api_response!(FileResponse {
    #[oai(status = 200)]
    Ok(Binary<Vec<u8>>, #[oai(header = "Content-Type")] String),
});

api_response!(ImageResponse {
    #[oai(status = 200)]
    Ok(
        Binary<Vec<u8>>,
        #[oai(header = "Content-Type")] String,
        #[oai(header = "Content-Disposition")] String,
    ),
});

/// Resolves the bearer token to an owner id or returns early with a 401.
macro_rules! authenticate {
    ( $api:expr, $auth:expr, $resp:ident ) => {{
        match $api.identity.validate(&$auth.0.token) {
            Some(owner_id) => owner_id,
            None => return $resp::unauthorized(),
        }
    }};
}

pub struct StowageApi {
    coordinator: Arc<UploadCoordinator>,
    identity: Arc<dyn IdentityProvider>,
}

impl StowageApi {
    pub fn new(coordinator: Arc<UploadCoordinator>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            coordinator,
            identity,
        }
    }
}

#[OpenApi]
impl StowageApi {
    /// Upload a file
    ///
    /// Stores the file below the caller's directory, optionally inside `folder`.
    #[oai(path = "/uploads", method = "post")]
    async fn create_upload(&self, auth: BearerAuth, payload: UploadPayload) -> CreateResponse {
        let owner_id = authenticate!(self, auth, CreateResponse);

        let file_name = payload.file.file_name().unwrap_or_default().to_string();
        let content = match payload.file.into_vec().await {
            Ok(content) => content,
            Err(e) => return UploadError::UploadFailed(StorageError::from(e)).into(),
        };

        let upload = NewUpload {
            content: &content,
            file_name: &file_name,
            folder: payload.folder.as_deref().unwrap_or_default(),
            declared_size: content.len(),
        };

        match self.coordinator.create_upload(owner_id, upload).await {
            Ok(info) => CreateResponse::Ok(Json(CreatedUpload {
                upload_id: info.record.id,
                checksum: info.checksum,
            })),
            Err(e) => e.into(),
        }
    }

    /// List uploads
    ///
    /// Every upload of the caller, oldest first.
    #[oai(path = "/uploads", method = "get")]
    async fn list_uploads(&self, auth: BearerAuth) -> ListResponse {
        let owner_id = authenticate!(self, auth, ListResponse);

        match self.coordinator.list_uploads(owner_id).await {
            Ok(records) => ListResponse::Ok(Json(UploadList {
                uploads: records.into_iter().map(UploadSummary::from).collect(),
            })),
            Err(e) => e.into(),
        }
    }

    /// Get an upload
    #[oai(path = "/uploads/:id", method = "get")]
    async fn get_upload(&self, auth: BearerAuth, id: Path<Uuid>) -> GetResponse {
        let owner_id = authenticate!(self, auth, GetResponse);

        match self.coordinator.get_upload(id.0, owner_id).await {
            Ok(record) => GetResponse::Ok(Json(record.into())),
            Err(e) => e.into(),
        }
    }

    /// Delete an upload
    ///
    /// Removes the stored file and then its record.
    #[oai(path = "/uploads/:id", method = "delete")]
    async fn delete_upload(&self, auth: BearerAuth, id: Path<Uuid>) -> DeleteResponse {
        let owner_id = authenticate!(self, auth, DeleteResponse);

        match self.coordinator.delete_upload(id.0, owner_id).await {
            Ok(()) => DeleteResponse::Ok(Json(Message {
                message: "upload deleted successfully".to_string(),
            })),
            Err(e) => e.into(),
        }
    }

    /// Fetch a file
    ///
    /// Returns the stored bytes as they were uploaded.
    #[oai(path = "/files/:id", method = "get")]
    async fn get_file(&self, auth: BearerAuth, id: Path<Uuid>) -> FileResponse {
        let owner_id = authenticate!(self, auth, FileResponse);

        match self.coordinator.get_raw(id.0, owner_id).await {
            Ok((data, mime)) => FileResponse::Ok(Binary(data.to_vec()), mime.to_string()),
            Err(e) => e.into(),
        }
    }

    /// Fetch an image variant
    ///
    /// Resizes to width `w` (never enlarging), and re-encodes with quality `q`
    /// into `format` (`jpeg`, `jpg`, `png`, `webp`, `avif` or `original`).
    #[oai(path = "/images/:id", method = "get")]
    async fn get_image(
        &self,
        auth: BearerAuth,
        id: Path<Uuid>,
        #[oai(name = "w")] width: Query<Option<i64>>,
        #[oai(name = "q")] quality: Query<Option<i64>>,
        format: Query<Option<String>>,
    ) -> ImageResponse {
        let owner_id = authenticate!(self, auth, ImageResponse);

        let params = RawImageParams {
            width: width.0,
            quality: quality.0,
            format: format.0,
        };

        match self.coordinator.get_image(id.0, owner_id, params).await {
            Ok(img) => {
                let disposition = format!("inline; filename=\"{}\"", img.suggested_filename(id.0));
                ImageResponse::Ok(Binary(img.data.to_vec()), img.mime, disposition)
            },
            Err(e) => e.into(),
        }
    }
}

/// Refuses bodies whose declared length is above the limit before they
/// are buffered. Requests without a `Content-Length` pass through, the
/// coordinator still checks the size of what was actually received.
pub struct UploadLimit {
    limit: usize,
}

impl UploadLimit {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl<E: Endpoint> Middleware<E> for UploadLimit {
    type Output = UploadLimitEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        UploadLimitEndpoint {
            inner: ep,
            limit: self.limit,
        }
    }
}

pub struct UploadLimitEndpoint<E> {
    inner: E,
    limit: usize,
}

#[poem::async_trait]
impl<E: Endpoint> Endpoint for UploadLimitEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        let declared = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());

        if matches!(declared, Some(len) if len > self.limit) {
            debug!("refusing body of {:?} bytes, limit is {}", declared, self.limit);
            return Err(poem::Error::from_status(StatusCode::PAYLOAD_TOO_LARGE));
        }

        self.inner.call(req).await
    }
}

/// Builds the HTTP app with the API nested under `base_path`.
pub fn build(api: StowageApi, base_path: &str, max_upload_size: usize) -> impl Endpoint {
    let service = OpenApiService::new(api, "Stowage API", env!("CARGO_PKG_VERSION"))
        .server(base_path);
    let docs = service.redoc();

    Route::new()
        .nest(base_path, service)
        .nest("/docs", docs)
        .with(UploadLimit::new(max_upload_size + MULTIPART_OVERHEAD))
        .with(Tracing)
}
