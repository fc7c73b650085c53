use async_trait::async_trait;
use lectern_client::api::{
    Action, AuthToken, BlobHandle, BlobStore, ContentItem, ContentKind, Db, Error, Event,
    ItemFilter, ItemId, NewItem, NewSession, ProfileUpdate, User, UserId,
};

/// Turns a response into either its JSON payload or the API error it carries
pub fn decode<T: serde::de::DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &[u8],
) -> Result<T, Error> {
    if !status.is_success() {
        return Err(Error::parse(body)
            .unwrap_or_else(|err| Error::Unknown(format!("server returned {status}: {err:#}"))));
    }
    // handlers returning nothing answer with an empty body
    let body = if body.is_empty() { &b"null"[..] } else { body };
    serde_json::from_slice(body).map_err(|err| Error::Unknown(format!("parsing response: {err}")))
}

fn unavailable(err: reqwest::Error) -> Error {
    Error::Unavailable(err.to_string())
}

async fn send<T: serde::de::DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, Error> {
    let resp = req.send().await.map_err(unavailable)?;
    let status = resp.status();
    let body = resp.bytes().await.map_err(unavailable)?;
    decode(status, &body)
}

/// Deletes a user account, with the server's admin token
pub async fn delete_user(
    client: &reqwest::Client,
    host: &str,
    admin_token: AuthToken,
    id: UserId,
) -> Result<(), Error> {
    send(
        client
            .post(format!("{host}/api/admin/delete-user"))
            .bearer_auth(admin_token.0)
            .json(&id),
    )
    .await
}

pub async fn login(
    client: &reqwest::Client,
    host: &str,
    session: &NewSession,
) -> Result<AuthToken, Error> {
    send(client.post(format!("{host}/api/auth")).json(session)).await
}

/// The HTTP API, as seen by one session
///
/// The signed-in user is fetched once in `connect` and then served from
/// memory. Each `lectern-ctl` invocation runs a single command, so the copy
/// can only go stale through this same handle, and `update_profile` refreshes
/// it. Long-lived callers should reconnect rather than keep one around.
pub struct RemoteDb {
    client: reqwest::Client,
    host: String,
    token: AuthToken,
    user: User,
}

impl RemoteDb {
    pub async fn connect(
        client: reqwest::Client,
        host: String,
        token: AuthToken,
    ) -> Result<RemoteDb, Error> {
        let user = send(
            client
                .get(format!("{host}/api/whoami"))
                .bearer_auth(token.0),
        )
        .await?;
        Ok(RemoteDb {
            client,
            host,
            token,
            user,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.host))
            .bearer_auth(self.token.0)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.host))
            .bearer_auth(self.token.0)
    }

    async fn submit(&self, a: &Action) -> Result<Option<ContentItem>, Error> {
        send(self.post("/api/submit-action").json(a)).await
    }

    pub async fn logout(self) -> Result<(), Error> {
        send(self.post("/api/unauth")).await
    }

    pub async fn fetch_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>, Error> {
        let resp = self
            .client
            .get(format!("{}/api/blobs/{}", self.host, handle.0))
            .send()
            .await
            .map_err(unavailable)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(unavailable)?;
        if !status.is_success() {
            return decode(status, &body);
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Db for RemoteDb {
    fn current_user(&self) -> Option<User> {
        Some(self.user.clone())
    }

    async fn list_users(&mut self) -> Result<Vec<User>, Error> {
        send(self.get("/api/fetch-users")).await
    }

    async fn update_profile(&mut self, update: ProfileUpdate) -> Result<User, Error> {
        update.validate()?;
        let user: User = send(self.post("/api/update-profile").json(&update)).await?;
        self.user = user.clone();
        Ok(user)
    }

    async fn fetch_item(&mut self, kind: ContentKind, id: ItemId) -> Result<ContentItem, Error> {
        send(self.get(&format!("/api/items/{}/{}", kind.as_str(), id.0))).await
    }

    async fn list_items(
        &mut self,
        kind: ContentKind,
        filter: &ItemFilter,
    ) -> Result<Vec<ContentItem>, Error> {
        let mut req = self.get(&format!("/api/items/{}", kind.as_str()));
        if let Some(owner) = filter.owner {
            req = req.query(&[("owner", owner.0.to_string())]);
        }
        send(req).await
    }

    async fn create_item(&mut self, item: NewItem) -> Result<ContentItem, Error> {
        let id = item.id;
        self.submit(&Action::NewItem(item))
            .await?
            .ok_or(Error::ItemNotFound(id))
    }

    async fn submit_event(&mut self, e: Event) -> Result<ContentItem, Error> {
        let id = e.item_id;
        self.submit(&Action::NewEvent(e))
            .await?
            .ok_or(Error::ItemNotFound(id))
    }

    async fn delete_item(&mut self, kind: ContentKind, id: ItemId) -> Result<(), Error> {
        self.submit(&Action::DeleteItem(kind, id)).await.map(|_| ())
    }
}

#[async_trait]
impl BlobStore for RemoteDb {
    async fn upload(&mut self, path: &str, bytes: Vec<u8>) -> Result<BlobHandle, Error> {
        send(
            self.post("/api/blobs")
                .query(&[("path", path)])
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes),
        )
        .await
    }

    async fn download_url(&mut self, handle: &BlobHandle) -> Result<String, Error> {
        Ok(format!("{}/api/blobs/{}", self.host, handle.0))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use axum::{
        extract::State,
        routing::{get, post},
        Json, Router,
    };
    use lectern_client::api::{CommentId, Role, Uuid};
    use reqwest::StatusCode;

    /// Serves whoami and update-profile for a single user on a free port
    async fn profile_server(user: User) -> String {
        let app = Router::new()
            .route(
                "/api/whoami",
                get(|State(u): State<Arc<Mutex<User>>>| async move {
                    Json(u.lock().unwrap().clone())
                }),
            )
            .route(
                "/api/update-profile",
                post(
                    |State(u): State<Arc<Mutex<User>>>, Json(p): Json<ProfileUpdate>| async move {
                        let mut u = u.lock().unwrap();
                        u.display_name = p.display_name;
                        Json(u.clone())
                    },
                ),
            )
            .with_state(Arc::new(Mutex::new(user)));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service());
        tokio::spawn(server);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn profile_updates_refresh_the_signed_in_user() {
        let bob = User {
            id: UserId(Uuid::new_v4()),
            display_name: String::from("Bob"),
            email: String::from("bob@example.org"),
            role: Role::Student,
        };
        let host = profile_server(bob.clone()).await;
        let mut db = RemoteDb::connect(reqwest::Client::new(), host, AuthToken(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(db.current_user(), Some(bob.clone()));

        let robert = db
            .update_profile(ProfileUpdate {
                display_name: String::from("Robert"),
            })
            .await
            .unwrap();
        assert_eq!(robert.display_name, "Robert");
        assert_eq!(db.current_user(), Some(robert));

        assert_eq!(
            db.update_profile(ProfileUpdate {
                display_name: String::new(),
            })
            .await,
            Err(Error::InvalidName(String::new()))
        );
        assert_eq!(db.current_user().map(|u| u.display_name).as_deref(), Some("Robert"));
    }

    #[test]
    fn decodes_payloads_and_errors() {
        assert_eq!(decode::<()>(StatusCode::OK, b""), Ok(()));
        assert_eq!(
            decode::<Option<u32>>(StatusCode::OK, b"null"),
            Ok(None)
        );
        let c = CommentId(Uuid::new_v4());
        let err = Error::CommentNotFound(c);
        assert_eq!(
            decode::<ContentItem>(err.status_code(), &err.contents()),
            Err(err)
        );
        assert!(matches!(
            decode::<()>(StatusCode::BAD_GATEWAY, b"<html>proxy error</html>"),
            Err(Error::Unknown(_))
        ));
        assert!(matches!(
            decode::<ContentItem>(StatusCode::OK, b"{}"),
            Err(Error::Unknown(_))
        ));
    }
}
