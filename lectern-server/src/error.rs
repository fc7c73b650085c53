//! Handler errors. Anything the client may act upon goes through the wire
//! `Api` variant; database and I/O failures stay `Anyhow` and only get
//! logged.

use lectern_api::{Error as ApiError, ItemId, UserId, Uuid};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    /// The caller is signed in but may not touch this user, item or blob
    pub fn permission_denied() -> Error {
        Error::Api(ApiError::PermissionDenied)
    }

    pub fn authentication_required() -> Error {
        Error::Api(ApiError::AuthenticationRequired)
    }

    pub fn uuid_already_used(uuid: Uuid) -> Error {
        Error::Api(ApiError::UuidAlreadyUsed(uuid))
    }

    /// Emails are the login names, so this is what a duplicate email gives
    pub fn name_already_used(name: String) -> Error {
        Error::Api(ApiError::NameAlreadyUsed(name))
    }

    pub fn invalid_pow() -> Error {
        Error::Api(ApiError::InvalidPow)
    }

    /// Also returned when the id exists with another content kind
    pub fn item_not_found(id: ItemId) -> Error {
        Error::Api(ApiError::ItemNotFound(id))
    }

    pub fn user_not_found(id: UserId) -> Error {
        Error::Api(ApiError::UserNotFound(id))
    }

    pub fn blob_not_found(path: &str) -> Error {
        Error::Api(ApiError::BlobNotFound(String::from(path)))
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let err = match self {
            Error::Anyhow(err) => {
                tracing::error!(?err, "internal server error");
                #[cfg(not(test))]
                let err =
                    ApiError::Unknown(String::from("Internal server error, see logs for details"));
                #[cfg(test)]
                let err = ApiError::Unknown(format!("Internal server error: {err:?}"));
                err
            }
            Error::Api(err) => {
                tracing::info!("returning error to client: {err}");
                err
            }
        };
        (err.status_code(), err.contents()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};

    async fn body(err: Error) -> (StatusCode, Option<ApiError>) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        (status, ApiError::parse(&bytes).ok())
    }

    #[tokio::test]
    async fn responses_carry_the_wire_error() {
        let u = UserId(Uuid::new_v4());
        assert_eq!(
            body(Error::user_not_found(u)).await,
            (StatusCode::NOT_FOUND, Some(ApiError::UserNotFound(u)))
        );
        assert_eq!(
            body(Error::blob_not_found("videos/abc")).await.1,
            Some(ApiError::BlobNotFound(String::from("videos/abc")))
        );
        assert_eq!(
            body(Error::permission_denied()).await,
            (StatusCode::FORBIDDEN, Some(ApiError::PermissionDenied))
        );

        let (status, err) = body(Error::Anyhow(anyhow::anyhow!("disk on fire"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(err, Some(ApiError::Unknown(msg)) if msg.contains("disk on fire")));
    }
}
