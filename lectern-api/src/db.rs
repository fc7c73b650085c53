use async_trait::async_trait;

use crate::{ContentItem, ContentKind, Error, Event, ItemId, NewItem, ProfileUpdate, User, UserId};

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ItemFilter {
    /// Only list items created by this user
    pub owner: Option<UserId>,
}

impl ItemFilter {
    pub fn all() -> ItemFilter {
        ItemFilter { owner: None }
    }

    pub fn owned_by(owner: UserId) -> ItemFilter {
        ItemFilter { owner: Some(owner) }
    }

    pub fn matches(&self, item: &ContentItem) -> bool {
        self.owner.map_or(true, |o| item.owner_id == o)
    }
}

/// Access to the item collections, as seen by one session
///
/// Implementations must apply `submit_event` atomically against the latest
/// stored record, after running `Event::authorize` on that same record.
#[async_trait]
pub trait Db: Send {
    /// The signed-in user, if any. Read on every mutating call.
    fn current_user(&self) -> Option<User>;

    async fn list_users(&mut self) -> Result<Vec<User>, Error>;

    /// Changes the signed-in user's own profile, returning the updated user
    async fn update_profile(&mut self, update: ProfileUpdate) -> Result<User, Error>;

    async fn fetch_item(&mut self, kind: ContentKind, id: ItemId) -> Result<ContentItem, Error>;
    async fn list_items(
        &mut self,
        kind: ContentKind,
        filter: &ItemFilter,
    ) -> Result<Vec<ContentItem>, Error>;
    async fn create_item(&mut self, item: NewItem) -> Result<ContentItem, Error>;

    /// Returns the stored item after the event got applied
    async fn submit_event(&mut self, e: Event) -> Result<ContentItem, Error>;

    async fn delete_item(&mut self, kind: ContentKind, id: ItemId) -> Result<(), Error>;
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BlobHandle(pub String);

impl BlobHandle {
    /// Checks `path` is a relative slash-separated path of plain segments
    pub fn parse(path: &str) -> Result<BlobHandle, Error> {
        let valid_segment = |s: &str| {
            !s.is_empty()
                && s != "."
                && s != ".."
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        };
        if path.split('/').all(valid_segment) {
            Ok(BlobHandle(String::from(path)))
        } else {
            Err(Error::InvalidName(String::from(path)))
        }
    }
}

#[async_trait]
pub trait BlobStore: Send {
    async fn upload(&mut self, path: &str, bytes: Vec<u8>) -> Result<BlobHandle, Error>;
    async fn download_url(&mut self, handle: &BlobHandle) -> Result<String, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_paths() {
        assert!(BlobHandle::parse("videos/4b1c2d3e").is_ok());
        assert!(BlobHandle::parse("ebookImages/cover.png").is_ok());
        for bad in ["", "/abs", "a//b", "../etc/passwd", "a/./b", "a b", "a/"] {
            assert_eq!(
                BlobHandle::parse(bad),
                Err(Error::InvalidName(String::from(bad))),
                "accepted {bad:?}"
            );
        }
    }
}
