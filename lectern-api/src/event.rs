use chrono::Utc;

use crate::{CommentId, ContentItem, ContentKind, Error, ItemId, Time, UserId};

/// One mutation of one item, applied atomically by whoever stores the item
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Event {
    pub owner_id: UserId,
    pub date: Time,
    pub kind: ContentKind,
    pub item_id: ItemId,

    pub data: EventData,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum EventData {
    Like,
    AddComment {
        id: CommentId,
        author_name: String,
        text: String,
    },
    AddReply {
        comment_id: CommentId,
        id: CommentId,
        author_name: String,
        text: String,
    },
    DeleteComment(CommentId),
    Edit {
        title: String,
        description: String,
    },
}

impl EventData {
    pub fn add_comment(id: CommentId, author_name: &str, text: &str) -> EventData {
        EventData::AddComment {
            id,
            author_name: String::from(author_name),
            text: String::from(text),
        }
    }

    pub fn add_reply(
        comment_id: CommentId,
        id: CommentId,
        author_name: &str,
        text: &str,
    ) -> EventData {
        EventData::AddReply {
            comment_id,
            id,
            author_name: String::from(author_name),
            text: String::from(text),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            EventData::Like => Ok(()),
            EventData::DeleteComment(_) => Ok(()),
            EventData::AddComment {
                id: _,
                author_name,
                text,
            }
            | EventData::AddReply {
                comment_id: _,
                id: _,
                author_name,
                text,
            } => {
                crate::validate_string(author_name)?;
                crate::validate_text(text)
            }
            EventData::Edit { title, description } => {
                crate::validate_text(title)?;
                crate::validate_string(description)
            }
        }
    }

    /// Whether only the item's owner may submit this
    pub fn is_owner_only(&self) -> bool {
        match self {
            EventData::Like | EventData::AddComment { .. } | EventData::AddReply { .. } => false,
            EventData::DeleteComment(_) | EventData::Edit { .. } => true,
        }
    }
}

impl Event {
    pub fn now(owner_id: UserId, kind: ContentKind, item_id: ItemId, data: EventData) -> Event {
        Event {
            owner_id,
            date: Utc::now(),
            kind,
            item_id,
            data,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.data.validate()
    }

    /// Checks `self.owner_id` may submit this event against the stored `item`.
    /// Callers are responsible for having authenticated `self.owner_id`.
    pub fn authorize(&self, item: &ContentItem) -> Result<(), Error> {
        if self.data.is_owner_only() && !item.is_owned_by(&self.owner_id) {
            return Err(Error::PermissionDenied);
        }
        Ok(())
    }
}
