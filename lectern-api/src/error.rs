use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::{CommentId, ItemId, UserId};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Text must not be empty")]
    EmptyText,

    #[error("Item not found {0:?}")]
    ItemNotFound(ItemId),

    #[error("User not found {0:?}")]
    UserNotFound(UserId),

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Blob not found {0:?}")]
    BlobNotFound(String),

    #[error("Missing media: {0}")]
    MissingMedia(String),

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid name {0:?}")]
    InvalidName(String),

    #[error("Invalid Proof of Work")]
    InvalidPow,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Error::EmptyText => StatusCode::BAD_REQUEST,
            Error::ItemNotFound(_) => StatusCode::NOT_FOUND,
            Error::UserNotFound(_) => StatusCode::NOT_FOUND,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::BlobNotFound(_) => StatusCode::NOT_FOUND,
            Error::MissingMedia(_) => StatusCode::BAD_REQUEST,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPow => StatusCode::BAD_REQUEST,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::AuthenticationRequired => json!({
                "message": "authentication required",
                "type": "authentication-required",
            }),
            Error::EmptyText => json!({
                "message": "text must not be empty",
                "type": "empty-text",
            }),
            Error::ItemNotFound(i) => json!({
                "message": "item not found",
                "type": "item-not-found",
                "uuid": i.0,
            }),
            Error::UserNotFound(u) => json!({
                "message": "user not found",
                "type": "user-not-found",
                "uuid": u.0,
            }),
            Error::CommentNotFound(c) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "uuid": c.0,
            }),
            Error::BlobNotFound(path) => json!({
                "message": "blob not found",
                "type": "blob-not-found",
                "name": path,
            }),
            Error::MissingMedia(msg) => json!({
                "message": msg,
                "type": "missing-media",
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": "conflict-uuid",
                "uuid": u,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a name",
                "type": "invalid-name",
                "name": n,
            }),
            Error::InvalidPow => json!({
                "message": "invalid proof-of-work",
                "type": "invalid-pow",
            }),
            Error::Unavailable(msg) => json!({
                "message": msg,
                "type": "unavailable",
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let message = || {
            String::from(
                data.get("message")
                    .and_then(|msg| msg.as_str())
                    .unwrap_or(""),
            )
        };
        let uuid = || {
            data.get("uuid")
                .and_then(|uuid| uuid.as_str())
                .and_then(|uuid| Uuid::from_str(uuid).ok())
                .ok_or_else(|| anyhow!("error is about a uuid but no proper uuid was provided"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(message()),
                "permission-denied" => Error::PermissionDenied,
                "authentication-required" => Error::AuthenticationRequired,
                "empty-text" => Error::EmptyText,
                "item-not-found" => Error::ItemNotFound(ItemId(uuid()?)),
                "user-not-found" => Error::UserNotFound(UserId(uuid()?)),
                "comment-not-found" => Error::CommentNotFound(CommentId(uuid()?)),
                "blob-not-found" => Error::BlobNotFound(String::from(
                    data.get("name")
                        .and_then(|n| n.as_str())
                        .ok_or_else(|| anyhow!("error is a missing blob without a name"))?,
                )),
                "missing-media" => Error::MissingMedia(message()),
                "conflict-uuid" => Error::UuidAlreadyUsed(uuid()?),
                "conflict-name" => Error::NameAlreadyUsed(String::from(
                    data.get("name")
                        .and_then(|n| n.as_str())
                        .ok_or_else(|| anyhow!("error is a name conflict without a name"))?,
                )),
                "null-byte" => Error::NullByteInString(String::from(
                    data.get("string").and_then(|s| s.as_str()).ok_or_else(|| {
                        anyhow!("error is a null-byte-in-string without a string")
                    })?,
                )),
                "invalid-name" => Error::InvalidName(String::from(
                    data.get("name").and_then(|s| s.as_str()).ok_or_else(|| {
                        anyhow!("error is about an invalid name but no name was provided")
                    })?,
                )),
                "invalid-pow" => Error::InvalidPow,
                "unavailable" => Error::Unavailable(message()),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
