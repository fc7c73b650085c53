use uuid::Uuid;

use crate::{Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn new() -> CommentId {
        CommentId(Uuid::new_v4())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: UserId,

    /// Display name of the author when the comment was posted
    pub author_name: String,

    pub text: String,
    pub date: Time,

    /// Replies in chronological order
    pub replies: Vec<Reply>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Reply {
    pub id: CommentId,
    pub author_id: UserId,
    pub author_name: String,
    pub text: String,
    pub date: Time,
}

impl Comment {
    pub fn find_in<'a>(comments: &'a [Comment], id: &CommentId) -> Option<&'a Comment> {
        comments.iter().find(|c| c.id == *id)
    }

    pub fn find_in_mut<'a>(
        comments: &'a mut [Comment],
        id: &CommentId,
    ) -> Option<&'a mut Comment> {
        comments.iter_mut().find(|c| c.id == *id)
    }

    /// Whether `id` is used by this comment or any of its replies
    pub fn uses_id(&self, id: &CommentId) -> bool {
        self.id == *id || self.replies.iter().any(|r| r.id == *id)
    }
}
