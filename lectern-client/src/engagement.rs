use crate::api::{
    self, CommentId, ContentItem, ContentKind, Db, Error, Event, EventData, ItemId, User,
};

/// Likes and the comment thread of one item, kept in sync with the backend
///
/// The local record only ever changes to a record returned by a successful
/// write, so a failed operation leaves it as it was.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngagementStore {
    item: ContentItem,
}

impl From<ContentItem> for EngagementStore {
    fn from(item: ContentItem) -> EngagementStore {
        EngagementStore::new(item)
    }
}

impl EngagementStore {
    pub fn new(mut item: ContentItem) -> EngagementStore {
        if item.normalize() {
            tracing::warn!(item = ?item.id, "loaded item had inconsistent likes");
        }
        EngagementStore { item }
    }

    pub fn item(&self) -> &ContentItem {
        &self.item
    }

    pub fn id(&self) -> ItemId {
        self.item.id
    }

    pub fn kind(&self) -> ContentKind {
        self.item.kind
    }

    pub fn likes(&self) -> u64 {
        self.item.likes
    }

    pub fn comments(&self) -> &[api::Comment] {
        &self.item.comments
    }

    pub async fn reload<D: Db>(&mut self, db: &mut D) -> Result<(), Error> {
        let item = db.fetch_item(self.item.kind, self.item.id).await?;
        self.replace(item);
        Ok(())
    }

    /// Records a like by the current user. Likes cannot be withdrawn, so this
    /// returns `false` without writing when the user already liked the item.
    pub async fn toggle_like<D: Db>(&mut self, db: &mut D) -> Result<bool, Error> {
        let user = signed_in(db)?;
        if self.item.is_liked_by(&user.id) {
            return Ok(false);
        }
        self.submit(db, &user, EventData::Like).await?;
        Ok(true)
    }

    pub async fn add_comment<D: Db>(&mut self, db: &mut D, text: &str) -> Result<CommentId, Error> {
        let user = signed_in(db)?;
        api::validate_text(text)?;
        let id = CommentId::new();
        let data = EventData::add_comment(id, &user.display_name, text.trim());
        self.submit(db, &user, data).await?;
        Ok(id)
    }

    pub async fn add_reply<D: Db>(
        &mut self,
        db: &mut D,
        comment_id: CommentId,
        text: &str,
    ) -> Result<CommentId, Error> {
        let user = signed_in(db)?;
        api::validate_text(text)?;
        if self.item.comment(&comment_id).is_none() {
            return Err(Error::CommentNotFound(comment_id));
        }
        let id = CommentId::new();
        let data = EventData::add_reply(comment_id, id, &user.display_name, text.trim());
        self.submit(db, &user, data).await?;
        Ok(id)
    }

    /// Removes a comment along with all its replies. Owner only.
    pub async fn delete_comment<D: Db>(
        &mut self,
        db: &mut D,
        comment_id: CommentId,
    ) -> Result<(), Error> {
        let user = self.owner(db)?;
        if self.item.comment(&comment_id).is_none() {
            return Err(Error::CommentNotFound(comment_id));
        }
        self.submit(db, &user, EventData::DeleteComment(comment_id))
            .await
    }

    pub async fn edit_item<D: Db>(
        &mut self,
        db: &mut D,
        title: &str,
        description: &str,
    ) -> Result<(), Error> {
        let user = self.owner(db)?;
        let data = EventData::Edit {
            title: String::from(title.trim()),
            description: String::from(description),
        };
        data.validate()?;
        self.submit(db, &user, data).await
    }

    /// Deletes the item with its whole comment tree. Owner only; the store
    /// is stale once this succeeded.
    pub async fn delete_item<D: Db>(&self, db: &mut D) -> Result<(), Error> {
        self.owner(db)?;
        tracing::debug!(item = ?self.item.id, kind = self.item.kind.as_str(), "deleting item");
        db.delete_item(self.item.kind, self.item.id).await
    }

    fn owner<D: Db>(&self, db: &D) -> Result<User, Error> {
        let user = signed_in(db)?;
        if !self.item.is_owned_by(&user.id) {
            return Err(Error::PermissionDenied);
        }
        Ok(user)
    }

    async fn submit<D: Db>(&mut self, db: &mut D, user: &User, data: EventData) -> Result<(), Error> {
        let e = Event::now(user.id, self.item.kind, self.item.id, data);
        tracing::debug!(item = ?self.item.id, event = ?e.data, "submitting event");
        let item = db.submit_event(e).await?;
        self.replace(item);
        Ok(())
    }

    fn replace(&mut self, item: ContentItem) {
        *self = EngagementStore::new(item);
    }
}

fn signed_in<D: Db>(db: &D) -> Result<User, Error> {
    db.current_user().ok_or(Error::AuthenticationRequired)
}
