use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

mod action;
pub use action::Action;

mod auth;
pub use auth::{AuthToken, NewSession};

mod comment;
pub use comment::{Comment, CommentId, Reply};

mod content;
pub use content::{preview, ContentItem, ContentKind, ItemId, NewItem, PREVIEW_LEN};

mod db;
pub use db::{BlobHandle, BlobStore, Db, ItemFilter};

mod error;
pub use error::Error;

mod event;
pub use event::{Event, EventData};

mod user;
pub use user::{NewUser, ProfileUpdate, Role, User, UserId};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

// sqlite and most JSON consumers choke on NUL, so forbid them everywhere
// user-provided strings end up
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Text that gets displayed as a comment, reply or title must not be blank
pub fn validate_text(s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::EmptyText);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_validation() {
        assert_eq!(validate_text("Nice video"), Ok(()));
        assert_eq!(validate_text("  padded  "), Ok(()));
        assert_eq!(validate_text(""), Err(Error::EmptyText));
        assert_eq!(validate_text(" \n\t "), Err(Error::EmptyText));
        assert_eq!(
            validate_text("a\0b"),
            Err(Error::NullByteInString(String::from("a\0b")))
        );
        assert_eq!(validate_string(""), Ok(()));
    }
}
