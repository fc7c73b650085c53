use std::collections::{btree_map, BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use lectern_api::{
    Action, AuthToken, BlobHandle, BlobStore, ContentItem, ContentKind, Db, Error, Event,
    ItemFilter, ItemId, NewItem, NewSession, NewUser, ProfileUpdate, User, UserId, Uuid,
};

/// In-memory backend enforcing the same rules as the HTTP server
#[derive(Clone, Debug, Default)]
pub struct MockServer {
    users: BTreeMap<UserId, DbUser>,
    items: BTreeMap<ItemId, ContentItem>,
    blobs: HashMap<BlobHandle, Blob>,
    writes: usize,
    failures: VecDeque<Error>,
}

#[derive(Clone, Debug)]
struct DbUser {
    user: User,
    pass_hash: String,

    /// Device name of each open session
    sessions: HashMap<AuthToken, String>,
}

#[derive(Clone, Debug)]
struct Blob {
    owner: UserId,
    data: Vec<u8>,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::default()
    }

    /// Number of write requests received so far, failed ones included
    pub fn test_writes(&self) -> usize {
        self.writes
    }

    /// Make the next write request fail with `e` without touching any state
    pub fn test_fail_next(&mut self, e: Error) {
        self.failures.push_back(e);
    }

    pub fn admin_create_user(&mut self, u: NewUser) -> Result<(), Error> {
        u.validate()?;

        if self.users.values().any(|db| db.user.email == u.email) {
            return Err(Error::NameAlreadyUsed(u.email));
        }

        match self.users.entry(u.id) {
            btree_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(u.id.0)),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(DbUser {
                    user: u.user(),
                    pass_hash: u.initial_password_hash,
                    sessions: HashMap::new(),
                });
                Ok(())
            }
        }
    }

    /// Removes the account along with its sessions. What the user published
    /// stays available.
    pub fn admin_delete_user(&mut self, id: UserId) -> Result<(), Error> {
        self.users
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::UserNotFound(id))
    }

    pub fn auth(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate_except_pow()?;
        let u = self
            .users
            .values_mut()
            .find(|u| u.user.email == s.user)
            .ok_or(Error::PermissionDenied)?;
        if !bcrypt::verify(&s.password, &u.pass_hash).unwrap_or(false) {
            return Err(Error::PermissionDenied);
        }
        let tok = AuthToken(Uuid::new_v4());
        u.sessions.insert(tok, s.device);
        Ok(tok)
    }

    fn resolve(&self, tok: AuthToken) -> Result<&DbUser, Error> {
        self.users
            .values()
            .find(|u| u.sessions.contains_key(&tok))
            .ok_or(Error::AuthenticationRequired)
    }

    pub fn unauth(&mut self, tok: AuthToken) -> Result<(), Error> {
        let u = self
            .users
            .values_mut()
            .find(|u| u.sessions.contains_key(&tok))
            .ok_or(Error::AuthenticationRequired)?;
        u.sessions.remove(&tok);
        Ok(())
    }

    pub fn whoami(&self, tok: AuthToken) -> Result<User, Error> {
        Ok(self.resolve(tok)?.user.clone())
    }

    pub fn update_profile(&mut self, tok: AuthToken, update: ProfileUpdate) -> Result<User, Error> {
        let user = self.write(tok)?;
        update.validate()?;
        let u = self
            .users
            .get_mut(&user.id)
            .ok_or(Error::AuthenticationRequired)?;
        u.user.display_name = update.display_name;
        Ok(u.user.clone())
    }

    pub fn fetch_users(&self, tok: AuthToken) -> Result<Vec<User>, Error> {
        self.resolve(tok)?;
        Ok(self.users.values().map(|u| u.user.clone()).collect())
    }

    pub fn fetch_item(
        &self,
        tok: AuthToken,
        kind: ContentKind,
        id: ItemId,
    ) -> Result<ContentItem, Error> {
        self.resolve(tok)?;
        self.items
            .get(&id)
            .filter(|i| i.kind == kind)
            .cloned()
            .ok_or(Error::ItemNotFound(id))
    }

    /// Items of `kind` in creation order
    pub fn list_items(
        &self,
        tok: AuthToken,
        kind: ContentKind,
        filter: &ItemFilter,
    ) -> Result<Vec<ContentItem>, Error> {
        self.resolve(tok)?;
        let mut res = self
            .items
            .values()
            .filter(|i| i.kind == kind && filter.matches(i))
            .cloned()
            .collect::<Vec<_>>();
        res.sort_by_key(|i| (i.date, i.id));
        Ok(res)
    }

    fn write(&mut self, tok: AuthToken) -> Result<User, Error> {
        let user = self.resolve(tok)?.user.clone();
        self.writes += 1;
        match self.failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(user),
        }
    }

    /// Returns the stored item, unless the action deleted it
    pub fn submit_action(
        &mut self,
        tok: AuthToken,
        a: Action,
    ) -> Result<Option<ContentItem>, Error> {
        let user = self.write(tok)?;
        a.validate()?;
        match a {
            Action::NewItem(i) => {
                if i.owner_id != user.id || !user.role.can_publish() {
                    return Err(Error::PermissionDenied);
                }
                match self.items.entry(i.id) {
                    btree_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(i.id.0)),
                    btree_map::Entry::Vacant(entry) => {
                        Ok(Some(entry.insert(ContentItem::from(i)).clone()))
                    }
                }
            }
            Action::NewEvent(e) => {
                if e.owner_id != user.id {
                    return Err(Error::PermissionDenied);
                }
                let item = self
                    .items
                    .get_mut(&e.item_id)
                    .filter(|i| i.kind == e.kind)
                    .ok_or(Error::ItemNotFound(e.item_id))?;
                item.submit(&e)?;
                Ok(Some(item.clone()))
            }
            Action::DeleteItem(kind, id) => {
                let item = self
                    .items
                    .get(&id)
                    .filter(|i| i.kind == kind)
                    .ok_or(Error::ItemNotFound(id))?;
                if !item.is_owned_by(&user.id) {
                    return Err(Error::PermissionDenied);
                }
                self.items.remove(&id);
                Ok(None)
            }
        }
    }

    pub fn create_item(&mut self, tok: AuthToken, i: NewItem) -> Result<ContentItem, Error> {
        let id = i.id;
        self.submit_action(tok, Action::NewItem(i))?
            .ok_or(Error::ItemNotFound(id))
    }

    pub fn submit_event(&mut self, tok: AuthToken, e: Event) -> Result<ContentItem, Error> {
        let id = e.item_id;
        self.submit_action(tok, Action::NewEvent(e))?
            .ok_or(Error::ItemNotFound(id))
    }

    pub fn delete_item(&mut self, tok: AuthToken, kind: ContentKind, id: ItemId) -> Result<(), Error> {
        self.submit_action(tok, Action::DeleteItem(kind, id))
            .map(|_| ())
    }

    pub fn upload_blob(
        &mut self,
        tok: AuthToken,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<BlobHandle, Error> {
        let user = self.write(tok)?;
        let handle = BlobHandle::parse(path)?;
        if !user.role.can_publish() {
            return Err(Error::PermissionDenied);
        }
        if let Some(b) = self.blobs.get(&handle) {
            if b.owner != user.id {
                return Err(Error::PermissionDenied);
            }
        }
        self.blobs.insert(
            handle.clone(),
            Blob {
                owner: user.id,
                data: bytes,
            },
        );
        Ok(handle)
    }

    pub fn fetch_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>, Error> {
        self.blobs
            .get(handle)
            .map(|b| b.data.clone())
            .ok_or_else(|| Error::BlobNotFound(handle.0.clone()))
    }

    /// View of the server through the session `tok`
    pub fn session(&mut self, tok: AuthToken) -> MockSession<'_> {
        MockSession { server: self, tok }
    }
}

pub struct MockSession<'a> {
    server: &'a mut MockServer,
    tok: AuthToken,
}

#[async_trait]
impl<'a> Db for MockSession<'a> {
    fn current_user(&self) -> Option<User> {
        self.server.whoami(self.tok).ok()
    }

    async fn list_users(&mut self) -> Result<Vec<User>, Error> {
        self.server.fetch_users(self.tok)
    }

    async fn update_profile(&mut self, update: ProfileUpdate) -> Result<User, Error> {
        self.server.update_profile(self.tok, update)
    }

    async fn fetch_item(&mut self, kind: ContentKind, id: ItemId) -> Result<ContentItem, Error> {
        self.server.fetch_item(self.tok, kind, id)
    }

    async fn list_items(
        &mut self,
        kind: ContentKind,
        filter: &ItemFilter,
    ) -> Result<Vec<ContentItem>, Error> {
        self.server.list_items(self.tok, kind, filter)
    }

    async fn create_item(&mut self, item: NewItem) -> Result<ContentItem, Error> {
        self.server.create_item(self.tok, item)
    }

    async fn submit_event(&mut self, e: Event) -> Result<ContentItem, Error> {
        self.server.submit_event(self.tok, e)
    }

    async fn delete_item(&mut self, kind: ContentKind, id: ItemId) -> Result<(), Error> {
        self.server.delete_item(self.tok, kind, id)
    }
}

#[async_trait]
impl<'a> BlobStore for MockSession<'a> {
    async fn upload(&mut self, path: &str, bytes: Vec<u8>) -> Result<BlobHandle, Error> {
        self.server.upload_blob(self.tok, path, bytes)
    }

    async fn download_url(&mut self, handle: &BlobHandle) -> Result<String, Error> {
        self.server.fetch_blob(handle)?;
        Ok(format!("mock://blobs/{}", handle.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_api::{CommentId, EventData, Role};

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

    fn video(owner: &User) -> NewItem {
        NewItem {
            id: ItemId(Uuid::new_v4()),
            kind: ContentKind::Video,
            owner_id: owner.id,
            owner_name: owner.display_name.clone(),
            date: chrono::Utc::now(),
            title: String::from("Intro"),
            description: String::from("Welcome"),
            url: String::from("https://youtu.be/dQw4w9WgXcQ"),
            image_url: None,
            transcript: None,
        }
    }

    #[test]
    fn sessions() {
        let mut server = MockServer::new();
        let tok = user(&mut server, "Alice", Role::Lecturer);
        assert_eq!(
            server.admin_create_user(NewUser::new(
                UserId(Uuid::new_v4()),
                String::from("Alice bis"),
                String::from("alice@example.org"),
                Role::Student,
                String::from("pass"),
            )),
            Err(Error::NameAlreadyUsed(String::from("alice@example.org")))
        );
        assert_eq!(
            server.auth(NewSession::new(
                String::from("alice@example.org"),
                String::from("wrong"),
                String::from("test")
            )),
            Err(Error::PermissionDenied)
        );
        assert_eq!(server.whoami(tok).unwrap().display_name, "Alice");
        server.unauth(tok).unwrap();
        assert_eq!(server.whoami(tok), Err(Error::AuthenticationRequired));
    }

    #[test]
    fn forged_events_are_rejected() {
        let mut server = MockServer::new();
        let alice_tok = user(&mut server, "Alice", Role::Lecturer);
        let mallory_tok = user(&mut server, "Mallory", Role::Student);
        let alice = server.whoami(alice_tok).unwrap();
        let mallory = server.whoami(mallory_tok).unwrap();
        let item = server.create_item(alice_tok, video(&alice)).unwrap();
        let c = CommentId::new();
        server
            .submit_event(
                mallory_tok,
                Event::now(
                    mallory.id,
                    item.kind,
                    item.id,
                    EventData::add_comment(c, "Mallory", "spam"),
                ),
            )
            .unwrap();

        // pretending to be the owner
        assert_eq!(
            server.submit_event(
                mallory_tok,
                Event::now(alice.id, item.kind, item.id, EventData::DeleteComment(c)),
            ),
            Err(Error::PermissionDenied)
        );
        // honest about it but still not the owner
        assert_eq!(
            server.submit_event(
                mallory_tok,
                Event::now(mallory.id, item.kind, item.id, EventData::DeleteComment(c)),
            ),
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            server.delete_item(mallory_tok, item.kind, item.id),
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            server.create_item(mallory_tok, video(&mallory)),
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            server
                .fetch_item(alice_tok, item.kind, item.id)
                .unwrap()
                .comments
                .len(),
            1
        );
    }

    #[test]
    fn kinds_are_separate() {
        let mut server = MockServer::new();
        let tok = user(&mut server, "Alice", Role::Lecturer);
        let alice = server.whoami(tok).unwrap();
        let item = server.create_item(tok, video(&alice)).unwrap();
        assert_eq!(
            server.fetch_item(tok, ContentKind::Ebook, item.id),
            Err(Error::ItemNotFound(item.id))
        );
        assert!(server
            .list_items(tok, ContentKind::Ebook, &ItemFilter::all())
            .unwrap()
            .is_empty());
        let ebook = NewItem {
            kind: ContentKind::Ebook,
            image_url: Some(String::from("mock://blobs/ebookImages/x")),
            ..video(&alice)
        };
        assert_eq!(
            server.create_item(tok, ebook).map(|i| i.kind),
            Ok(ContentKind::Ebook)
        );
    }

    #[test]
    fn injected_failures_leave_state_alone() {
        let mut server = MockServer::new();
        let tok = user(&mut server, "Alice", Role::Lecturer);
        let alice = server.whoami(tok).unwrap();
        server.test_fail_next(Error::Unavailable(String::from("down")));
        assert_eq!(
            server.create_item(tok, video(&alice)),
            Err(Error::Unavailable(String::from("down")))
        );
        assert!(server
            .list_items(tok, ContentKind::Video, &ItemFilter::all())
            .unwrap()
            .is_empty());
        assert_eq!(server.test_writes(), 1);
        assert!(server.create_item(tok, video(&alice)).is_ok());
    }

    #[test]
    fn blobs() {
        let mut server = MockServer::new();
        let tok = user(&mut server, "Alice", Role::Lecturer);
        let h = server.upload_blob(tok, "videos/abc", vec![1, 2, 3]).unwrap();
        assert_eq!(server.fetch_blob(&h), Ok(vec![1, 2, 3]));
        assert!(server.upload_blob(tok, "../escape", vec![]).is_err());
        assert_eq!(
            server.upload_blob(AuthToken::stub(), "videos/def", vec![]),
            Err(Error::AuthenticationRequired)
        );
        assert_eq!(
            server.fetch_blob(&BlobHandle(String::from("videos/def"))),
            Err(Error::BlobNotFound(String::from("videos/def")))
        );
    }

    #[test]
    fn blobs_belong_to_their_uploader() {
        let mut server = MockServer::new();
        let alice = user(&mut server, "Alice", Role::Lecturer);
        let carol = user(&mut server, "Carol", Role::Lecturer);
        let mallory = user(&mut server, "Mallory", Role::Student);
        let h = server
            .upload_blob(alice, "videos/abc", b"lecture".to_vec())
            .unwrap();

        assert_eq!(
            server.upload_blob(mallory, "videos/abc", b"defaced".to_vec()),
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            server.upload_blob(mallory, "videos/fresh", b"spam".to_vec()),
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            server.upload_blob(carol, "videos/abc", b"mine now".to_vec()),
            Err(Error::PermissionDenied)
        );
        assert_eq!(server.fetch_blob(&h), Ok(b"lecture".to_vec()));

        server
            .upload_blob(alice, "videos/abc", b"lecture, take 2".to_vec())
            .unwrap();
        assert_eq!(server.fetch_blob(&h), Ok(b"lecture, take 2".to_vec()));
    }

    #[test]
    fn profile_updates() {
        let mut server = MockServer::new();
        let tok = user(&mut server, "Alice", Role::Student);
        let alice = server
            .update_profile(
                tok,
                ProfileUpdate {
                    display_name: String::from("Dr. Alice"),
                },
            )
            .unwrap();
        assert_eq!(alice.display_name, "Dr. Alice");
        assert_eq!(server.whoami(tok), Ok(alice));
        assert_eq!(
            server.update_profile(
                tok,
                ProfileUpdate {
                    display_name: String::from(" "),
                }
            ),
            Err(Error::InvalidName(String::from(" ")))
        );
        assert_eq!(
            server.update_profile(
                AuthToken::stub(),
                ProfileUpdate {
                    display_name: String::from("Eve"),
                }
            ),
            Err(Error::AuthenticationRequired)
        );
    }

    #[test]
    fn deleted_users_lose_their_sessions_not_their_content() {
        let mut server = MockServer::new();
        let alice_tok = user(&mut server, "Alice", Role::Lecturer);
        let bob_tok = user(&mut server, "Bob", Role::Student);
        let alice = server.whoami(alice_tok).unwrap();
        let item = server.create_item(alice_tok, video(&alice)).unwrap();

        server.admin_delete_user(alice.id).unwrap();
        assert_eq!(server.whoami(alice_tok), Err(Error::AuthenticationRequired));
        assert_eq!(
            server.auth(NewSession::new(
                String::from("alice@example.org"),
                String::from("hunter2"),
                String::from("test")
            )),
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            server.admin_delete_user(alice.id),
            Err(Error::UserNotFound(alice.id))
        );
        assert_eq!(server.fetch_item(bob_tok, item.kind, item.id), Ok(item));
        assert_eq!(server.fetch_users(bob_tok).unwrap().len(), 1);
    }
}
