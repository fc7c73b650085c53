use std::{borrow::Cow, collections::HashMap};

use crate::{
    api::{
        self, Comment, CommentId, ContentItem, ContentKind, Db, Error, ItemFilter, ItemId, Role,
        PREVIEW_LEN,
    },
    EngagementStore,
};

/// Number of comments shown before "show more comments" gets toggled
pub const COMMENTS_PER_PAGE: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope {
    All,
    /// Only the items the current user published
    Mine,
}

/// One item of a list, with the state of its comment box and reply boxes
#[derive(Clone, Debug)]
pub struct ItemView {
    pub store: EngagementStore,
    pub comment_draft: String,
    reply_drafts: HashMap<CommentId, String>,
    show_all_comments: bool,
}

impl ItemView {
    pub fn new(store: EngagementStore) -> ItemView {
        ItemView {
            store,
            comment_draft: String::new(),
            reply_drafts: HashMap::new(),
            show_all_comments: false,
        }
    }

    pub fn item(&self) -> &ContentItem {
        self.store.item()
    }

    pub fn displayed_comments(&self) -> &[Comment] {
        let comments = self.store.comments();
        if self.show_all_comments {
            comments
        } else {
            &comments[..comments.len().min(COMMENTS_PER_PAGE)]
        }
    }

    pub fn has_more_comments(&self) -> bool {
        self.store.comments().len() > COMMENTS_PER_PAGE
    }

    pub fn toggle_comments(&mut self) {
        self.show_all_comments = !self.show_all_comments;
    }

    pub fn reply_draft(&self, comment: &CommentId) -> &str {
        self.reply_drafts.get(comment).map_or("", |d| d.as_str())
    }

    pub fn set_reply_draft(&mut self, comment: CommentId, text: String) {
        self.reply_drafts.insert(comment, text);
    }

    pub fn description_preview(&self) -> Cow<'_, str> {
        api::preview(&self.item().description, PREVIEW_LEN)
    }

    pub fn transcript_preview(&self) -> Option<Cow<'_, str>> {
        self.item()
            .transcript
            .as_deref()
            .map(|t| api::preview(t, PREVIEW_LEN))
    }

    /// Posts the comment draft, clearing it once stored
    pub async fn submit_comment<D: Db>(&mut self, db: &mut D) -> Result<CommentId, Error> {
        let id = self.store.add_comment(db, &self.comment_draft).await?;
        self.comment_draft.clear();
        Ok(id)
    }

    /// Posts the reply draft of `comment`, clearing it once stored
    pub async fn submit_reply<D: Db>(
        &mut self,
        db: &mut D,
        comment: CommentId,
    ) -> Result<CommentId, Error> {
        let text = self.reply_draft(&comment).to_string();
        let id = self.store.add_reply(db, comment, &text).await?;
        self.reply_drafts.remove(&comment);
        Ok(id)
    }

    pub async fn delete_comment<D: Db>(
        &mut self,
        db: &mut D,
        comment: CommentId,
    ) -> Result<(), Error> {
        self.store.delete_comment(db, comment).await?;
        self.reply_drafts.remove(&comment);
        Ok(())
    }
}

/// The videos or ebooks a page shows, filtered by a live search query
#[derive(Clone, Debug)]
pub struct ContentList {
    kind: ContentKind,
    scope: Scope,
    query: String,
    items: Vec<ItemView>,
}

impl ContentList {
    pub async fn load<D: Db>(
        db: &mut D,
        kind: ContentKind,
        scope: Scope,
    ) -> Result<ContentList, Error> {
        let mut list = ContentList {
            kind,
            scope,
            query: String::new(),
            items: Vec::new(),
        };
        list.reload(db).await?;
        Ok(list)
    }

    /// Refetches every item, dropping the drafts of items that disappeared
    pub async fn reload<D: Db>(&mut self, db: &mut D) -> Result<(), Error> {
        let filter = match self.scope {
            Scope::All => ItemFilter::all(),
            Scope::Mine => {
                let me = db.current_user().ok_or(Error::AuthenticationRequired)?;
                ItemFilter::owned_by(me.id)
            }
        };
        let fetched = db.list_items(self.kind, &filter).await?;
        tracing::debug!(
            kind = self.kind.as_str(),
            num_items = fetched.len(),
            "loaded content list"
        );
        let mut previous = self
            .items
            .drain(..)
            .map(|v| (v.store.id(), v))
            .collect::<HashMap<_, _>>();
        self.items = fetched
            .into_iter()
            .map(|item| match previous.remove(&item.id) {
                Some(mut view) => {
                    view.store = EngagementStore::new(item);
                    view
                }
                None => ItemView::new(EngagementStore::new(item)),
            })
            .collect();
        Ok(())
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Items matching the current query, in listing order
    pub fn visible(&self) -> impl Iterator<Item = &ItemView> {
        let query = self.query.trim().to_lowercase();
        self.items
            .iter()
            .filter(move |v| v.item().matches(&query))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&ItemView> {
        self.items.iter().find(|v| v.store.id() == *id)
    }

    pub fn get_mut(&mut self, id: &ItemId) -> Option<&mut ItemView> {
        self.items.iter_mut().find(|v| v.store.id() == *id)
    }

    /// Adds an item that was just published, if it belongs in this list
    pub fn on_publish(&mut self, item: ContentItem) {
        if item.kind == self.kind && self.get(&item.id).is_none() {
            self.items.push(ItemView::new(EngagementStore::new(item)));
        }
    }

    pub async fn on_edit<D: Db>(
        &mut self,
        db: &mut D,
        id: &ItemId,
        title: &str,
        description: &str,
    ) -> Result<(), Error> {
        let view = self.get_mut(id).ok_or(Error::ItemNotFound(*id))?;
        view.store.edit_item(db, title, description).await
    }

    pub async fn on_delete<D: Db>(&mut self, db: &mut D, id: &ItemId) -> Result<(), Error> {
        let pos = self
            .items
            .iter()
            .position(|v| v.store.id() == *id)
            .ok_or(Error::ItemNotFound(*id))?;
        self.items[pos].store.delete_item(db).await?;
        self.items.remove(pos);
        Ok(())
    }
}

/// Headline numbers of the admin dashboard
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Overview {
    pub students: usize,
    pub lecturers: usize,
    pub admins: usize,
    pub videos: usize,
    pub ebooks: usize,
}

impl Overview {
    pub async fn load<D: Db>(db: &mut D) -> Result<Overview, Error> {
        let mut res = Overview::default();
        for u in db.list_users().await? {
            match u.role {
                Role::Student => res.students += 1,
                Role::Lecturer => res.lecturers += 1,
                Role::Admin => res.admins += 1,
            }
        }
        res.videos = db
            .list_items(ContentKind::Video, &ItemFilter::all())
            .await?
            .len();
        res.ebooks = db
            .list_items(ContentKind::Ebook, &ItemFilter::all())
            .await?
            .len();
        Ok(res)
    }

    pub fn users(&self) -> usize {
        self.students + self.lecturers + self.admins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthToken, NewItem, NewSession, NewUser, UserId, Uuid};
    use lectern_mock_server::MockServer;

    fn user(server: &mut MockServer, name: &str, role: Role) -> AuthToken {
        let email = format!("{}@example.org", name.to_lowercase());
        server
            .admin_create_user(NewUser::new(
                UserId(Uuid::new_v4()),
                String::from(name),
                email.clone(),
                role,
                String::from("hunter2"),
            ))
            .unwrap();
        server
            .auth(NewSession::new(email, String::from("hunter2"), String::from("test")))
            .unwrap()
    }

    fn publish(server: &mut MockServer, tok: AuthToken, title: &str) -> ContentItem {
        let me = server.whoami(tok).unwrap();
        server
            .create_item(
                tok,
                NewItem {
                    id: ItemId(Uuid::new_v4()),
                    kind: ContentKind::Video,
                    owner_id: me.id,
                    owner_name: me.display_name,
                    date: chrono::Utc::now(),
                    title: String::from(title),
                    description: format!("All about {title}"),
                    url: String::from("https://youtu.be/dQw4w9WgXcQ"),
                    image_url: None,
                    transcript: None,
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn scopes_and_search() {
        let mut server = MockServer::new();
        let alice = user(&mut server, "Alice", Role::Lecturer);
        let carol = user(&mut server, "Carol", Role::Lecturer);
        let bob = user(&mut server, "Bob", Role::Student);
        publish(&mut server, alice, "Rust ownership");
        publish(&mut server, alice, "Python basics");
        publish(&mut server, carol, "Trust and safety");

        let all = ContentList::load(&mut server.session(bob), ContentKind::Video, Scope::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let mut mine =
            ContentList::load(&mut server.session(alice), ContentKind::Video, Scope::Mine)
                .await
                .unwrap();
        assert_eq!(mine.len(), 2);
        mine.set_query("RUST");
        let titles = mine
            .visible()
            .map(|v| v.item().title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Rust ownership"]);
        mine.set_query("");
        assert_eq!(mine.visible().count(), 2);

        assert!(ContentList::load(
            &mut server.session(AuthToken::stub()),
            ContentKind::Video,
            Scope::Mine
        )
        .await
        .is_err());
    }

    #[tokio::test]
    async fn drafts_and_pagination() {
        let mut server = MockServer::new();
        let alice = user(&mut server, "Alice", Role::Lecturer);
        let bob = user(&mut server, "Bob", Role::Student);
        let video = publish(&mut server, alice, "Rust ownership");
        let mut list = ContentList::load(&mut server.session(bob), ContentKind::Video, Scope::All)
            .await
            .unwrap();

        let view = list.get_mut(&video.id).unwrap();
        view.comment_draft = String::from("   ");
        assert_eq!(
            view.submit_comment(&mut server.session(bob)).await,
            Err(Error::EmptyText)
        );
        assert_eq!(view.comment_draft, "   ");

        for i in 0..COMMENTS_PER_PAGE + 2 {
            view.comment_draft = format!("comment {i}");
            view.submit_comment(&mut server.session(bob)).await.unwrap();
            assert!(view.comment_draft.is_empty());
        }
        assert!(view.has_more_comments());
        assert_eq!(view.displayed_comments().len(), COMMENTS_PER_PAGE);
        view.toggle_comments();
        assert_eq!(view.displayed_comments().len(), COMMENTS_PER_PAGE + 2);

        let first = view.displayed_comments()[0].id;
        view.set_reply_draft(first, String::from("me too"));
        view.submit_reply(&mut server.session(alice), first)
            .await
            .unwrap();
        assert_eq!(view.reply_draft(&first), "");
        assert_eq!(view.item().comments[0].replies[0].text, "me too");

        // drafts survive a reload
        view.comment_draft = String::from("half-written");
        list.reload(&mut server.session(bob)).await.unwrap();
        assert_eq!(list.get(&video.id).unwrap().comment_draft, "half-written");
    }

    #[tokio::test]
    async fn owner_actions_update_the_list() {
        let mut server = MockServer::new();
        let alice = user(&mut server, "Alice", Role::Lecturer);
        let bob = user(&mut server, "Bob", Role::Student);
        let video = publish(&mut server, alice, "Rust ownership");
        let mut list =
            ContentList::load(&mut server.session(alice), ContentKind::Video, Scope::Mine)
                .await
                .unwrap();

        assert_eq!(
            list.on_delete(&mut server.session(bob), &video.id).await,
            Err(Error::PermissionDenied)
        );
        assert_eq!(list.len(), 1);

        list.on_edit(&mut server.session(alice), &video.id, "Rust 101", "Updated")
            .await
            .unwrap();
        assert_eq!(list.get(&video.id).unwrap().item().title, "Rust 101");

        list.on_delete(&mut server.session(alice), &video.id)
            .await
            .unwrap();
        assert!(list.is_empty());
        assert_eq!(
            server.fetch_item(alice, ContentKind::Video, video.id),
            Err(Error::ItemNotFound(video.id))
        );
    }

    #[tokio::test]
    async fn overview_counts() {
        let mut server = MockServer::new();
        let admin = user(&mut server, "Admin", Role::Admin);
        let alice = user(&mut server, "Alice", Role::Lecturer);
        user(&mut server, "Bob", Role::Student);
        user(&mut server, "Dan", Role::Student);
        publish(&mut server, alice, "Rust ownership");
        let o = Overview::load(&mut server.session(admin)).await.unwrap();
        assert_eq!(
            o,
            Overview {
                students: 2,
                lecturers: 1,
                admins: 1,
                videos: 1,
                ebooks: 0,
            }
        );
        assert_eq!(o.users(), 4);
    }
}
