use async_trait::async_trait;
use axum::extract::FromRequest;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use std::borrow::Cow;
use tracing::error;

pub(crate) trait ApiResponse: erased_serde::Serialize {}
erased_serde::serialize_trait_object!(ApiResponse);

/// Every endpoint exposes a Response type
#[derive(serde::Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub(crate) enum Response<'a> {
    Ok(Box<dyn erased_serde::Serialize + Send + Sync + 'static>),
    Error(EndpointError<'a>),
}

impl<T: ApiResponse + Send + Sync + 'static> From<T> for Response<'static> {
    fn from(value: T) -> Self {
        Self::Ok(Box::new(value))
    }
}

/// The response upon encountering an error. Serializes to the
/// `{"detail": ...}` envelope; the kind only picks the status code.
#[derive(serde::Serialize, PartialEq, Eq, Debug)]
pub struct EndpointError<'a> {
    #[serde(skip)]
    kind: ErrorKind,

    /// A context aware message describing the error
    detail: Cow<'a, str>,
}

/// The kind of an error
#[allow(unused)]
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    User,
    Unauthorized,
    NotFound,
    UpstreamService,
    Internal,
}

impl<'a> EndpointError<'a> {
    fn new(kind: ErrorKind, message: impl Into<Cow<'a, str>>) -> Self {
        Self {
            kind,
            detail: message.into(),
        }
    }

    /// The request body or parameters failed validation.
    pub fn user(message: impl Into<Cow<'a, str>>) -> Self {
        Self::new(ErrorKind::User, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'a, str>>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn upstream(message: impl Into<Cow<'a, str>>) -> Self {
        Self::new(ErrorKind::UpstreamService, message)
    }

    pub fn internal(message: impl Into<Cow<'a, str>>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::User => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::UpstreamService => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EndpointError<'static> {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (status, axum::Json(Response::Error(self))).into_response()
    }
}

impl From<anyhow::Error> for EndpointError<'static> {
    fn from(err: anyhow::Error) -> Self {
        error!(?err, "unhandled endpoint error");
        Self::internal("Internal server error")
    }
}

pub(crate) fn json<'a, T>(val: T) -> axum::Json<Response<'a>>
where
    Response<'a>: From<T>,
{
    axum::Json(Response::from(val))
}

pub(crate) type Result<T, E = EndpointError<'static>> = std::result::Result<T, E>;

/// JSON body extractor whose every rejection (syntax error, wrong or
/// missing content-type, field mismatch) is a 422 with the usual `detail`
/// envelope, so request-validation failures look the same on every route.
pub struct Json<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for Json<T>
where
    axum::Json<T>: FromRequest<S, B, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = EndpointError<'static>;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(EndpointError::user(rejection.to_string())),
        }
    }
}
