#![cfg(test)]

use bolero::generator::TypeGenerator;
use axum::{
    extract::FromRequestParts,
    http::{self, request},
};
use chrono::Utc;
use lectern_api::{
    Action, CommentId, ContentItem, ContentKind, Error as ApiError, Event, EventData, ItemFilter,
    ItemId, NewItem, NewSession, NewUser, ProfileUpdate, Role, User, UserId,
};
use lectern_mock_server::MockServer;
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

// bcrypt's lowest cost, hashing at the real cost would make fuzzing crawl
const TEST_BCRYPT_COST: u32 = 4;
const TEST_PASSWORD: &str = "correct horse battery staple";

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

async fn test_pool() -> sqlx::SqlitePool {
    // a single connection that never gets recycled, as each connection to
    // `sqlite::memory:` would otherwise see its own empty database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("opening in-memory database");
    MIGRATOR
        .run(&pool)
        .await
        .expect("failed applying migrations");
    pool
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                let _ = tracing_subscriber::fmt::try_init();
            }
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_generator($gen)
                .cloned()
                .for_each(move |v| {
                    runtime.block_on(async move {
                        let pool = test_pool().await;
                        let idle_before = pool.num_idle();
                        let () = $fn(pool.clone(), v).await;
                        let mut idle_after = pool.num_idle();
                        let wait_release_since = std::time::Instant::now();
                        while idle_after < idle_before
                            && wait_release_since.elapsed() <= std::time::Duration::from_secs(1)
                        {
                            tokio::task::yield_now().await;
                            idle_after = pool.num_idle();
                        }
                        assert!(
                            idle_after >= idle_before,
                            "test {} held onto pool after exiting test",
                            stringify!($name)
                        );
                    })
                });
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::AuthenticationRequired)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        if std::any::TypeId::of::<Resp>() == std::any::TypeId::of::<()>() {
            // the server returns an empty string in this situation, which does not parse properly with serde_json
            return Ok(serde_json::from_slice(b"null").unwrap());
        } else {
            return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
                panic!(
                    r#"
                        Failed parsing resp body!

                        The error is the following:
                        ---
                        {err}
                        ---

                        Response body is:
                        ---
                        {body:?}
                        ---

                        Request was:
                        ---
                        {req_body:?}
                        ---
                    "#
                )
            }));
        }
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

fn test_user(display_name: &str, email: &str, role: Role) -> NewUser {
    NewUser {
        id: UserId(Uuid::new_v4()),
        display_name: String::from(display_name),
        email: String::from(email),
        role,
        initial_password_hash: bcrypt::hash(TEST_PASSWORD, TEST_BCRYPT_COST)
            .expect("hashing test password"),
    }
}

fn test_session(email: &str, password: &str) -> NewSession {
    NewSession {
        user: String::from(email),
        password: String::from(password),
        device: String::from("fuzzer"),
        pow: String::new(),
    }
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        name: String,
        email_id: u8,
        role: u8,
    },
    Auth {
        uid: usize,
        wrong_password: bool,
    },
    Unauth {
        sid: usize,
    },
    Whoami {
        sid: usize,
    },
    FetchUsers {
        sid: usize,
    },
    UpdateProfile {
        sid: usize,
        name: String,
    },
    DeleteUser {
        uid: usize,
        missing: bool,
    },
    Publish {
        sid: usize,
        ebook: bool,
        title: String,
        has_url: bool,
    },
    List {
        sid: usize,
        ebook: bool,
        mine: bool,
    },
    Fetch {
        sid: usize,
        item: usize,
        wrong_kind: bool,
    },
    Like {
        sid: usize,
        item: usize,
    },
    Comment {
        sid: usize,
        item: usize,
        text: String,
    },
    Reply {
        sid: usize,
        item: usize,
        comment: usize,
        text: String,
    },
    DeleteComment {
        sid: usize,
        item: usize,
        comment: usize,
        forged: bool,
    },
    Edit {
        sid: usize,
        item: usize,
        title: String,
        description: String,
    },
    DeleteItem {
        sid: usize,
        item: usize,
    },
}

struct Session {
    app: AuthToken,
    mock: AuthToken,
    user: User,
}

struct ComparativeFuzzer {
    admin_token: Uuid,
    app: Router,
    mock: MockServer,
    users: Vec<NewUser>,
    sessions: Vec<Session>,
    items: Vec<(ContentKind, ItemId)>,
    comments: Vec<CommentId>,
}

impl ComparativeFuzzer {
    async fn new(pool: sqlx::SqlitePool) -> ComparativeFuzzer {
        let admin_token = Uuid::new_v4();
        let mut fuzzer = ComparativeFuzzer {
            admin_token,
            app: app(pool, Some(AuthToken(admin_token))),
            mock: MockServer::new(),
            users: Vec::new(),
            sessions: Vec::new(),
            items: Vec::new(),
            comments: Vec::new(),
        };
        for (name, role) in [("Lecturer", Role::Lecturer), ("Student", Role::Student)] {
            let email = format!("{}@example.org", name.to_lowercase());
            fuzzer.create_user(test_user(name, &email, role)).await;
            fuzzer
                .execute_fuzz_op(FuzzOp::Auth {
                    uid: usize::MAX,
                    wrong_password: false,
                })
                .await;
        }
        assert_eq!(fuzzer.sessions.len(), 2, "failed setting up base sessions");
        fuzzer
    }

    async fn create_user(&mut self, new_user: NewUser) {
        let app_res = run_on_app(
            &mut self.app,
            "POST",
            "/api/admin/create-user",
            Some(self.admin_token),
            &new_user,
        )
        .await;
        let mock_res = self.mock.admin_create_user(new_user.clone());
        if mock_res.is_ok() {
            self.users.push(new_user);
        }
        compare("CreateUser", app_res, mock_res);
    }

    fn session(&self, sid: usize) -> Option<&Session> {
        resize_int(sid, ..self.sessions.len()).map(|sid| &self.sessions[sid])
    }

    fn item(&self, item: usize) -> (ContentKind, ItemId) {
        resize_int(item, ..self.items.len())
            .map(|i| self.items[i])
            .unwrap_or((ContentKind::Video, ItemId(Uuid::new_v4())))
    }

    fn comment(&self, comment: usize) -> CommentId {
        resize_int(comment, ..self.comments.len())
            .map(|c| self.comments[c])
            .unwrap_or_else(CommentId::new)
    }

    async fn submit(&mut self, name: &str, sid: usize, a: Action) {
        let Some(s) = self.session(sid) else { return };
        let (app_tok, mock_tok) = (s.app.0, s.mock);
        let app_res: Result<Option<ContentItem>, ApiError> = run_on_app(
            &mut self.app,
            "POST",
            "/api/submit-action",
            Some(app_tok),
            &a,
        )
        .await;
        compare(name, app_res, self.mock.submit_action(mock_tok, a));
    }

    async fn submit_event(&mut self, name: &str, sid: usize, item: usize, data: EventData) {
        let Some(s) = self.session(sid) else { return };
        let (kind, item_id) = self.item(item);
        let e = Event::now(s.user.id, kind, item_id, data);
        self.submit(name, sid, Action::NewEvent(e)).await
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser {
                name,
                email_id,
                role,
            } => {
                let role = match role % 3 {
                    0 => Role::Student,
                    1 => Role::Lecturer,
                    _ => Role::Admin,
                };
                let email = format!("user{email_id}@example.org");
                self.create_user(test_user(&name, &email, role)).await;
            }
            FuzzOp::Auth {
                uid,
                wrong_password,
            } => {
                let Some(uid) = resize_int(uid, ..self.users.len()) else { return };
                let user = self.users[uid].user();
                let password = if wrong_password { "wrong" } else { TEST_PASSWORD };
                let session = test_session(&user.email, password);
                let app_tok = run_on_app(&mut self.app, "POST", "/api/auth", None, &session).await;
                let mock_tok = self.mock.auth(session);
                if let (&Ok(app), &Ok(mock)) = (&app_tok, &mock_tok) {
                    self.sessions.push(Session { app, mock, user });
                }
                compare("Auth", app_tok.map(|_| ()), mock_tok.map(|_| ()));
            }
            FuzzOp::Unauth { sid } => {
                let Some(s) = self.session(sid) else { return };
                let (app_tok, mock_tok) = (s.app.0, s.mock);
                let app_res = run_on_app(&mut self.app, "POST", "/api/unauth", Some(app_tok), &())
                    .await;
                compare("Unauth", app_res, self.mock.unauth(mock_tok));
            }
            FuzzOp::Whoami { sid } => {
                let Some(s) = self.session(sid) else { return };
                let (app_tok, mock_tok) = (s.app.0, s.mock);
                let app_res = run_on_app(&mut self.app, "GET", "/api/whoami", Some(app_tok), &())
                    .await;
                compare("Whoami", app_res, self.mock.whoami(mock_tok));
            }
            FuzzOp::FetchUsers { sid } => {
                let Some(s) = self.session(sid) else { return };
                let (app_tok, mock_tok) = (s.app.0, s.mock);
                let app_res =
                    run_on_app(&mut self.app, "GET", "/api/fetch-users", Some(app_tok), &()).await;
                compare("FetchUsers", app_res, self.mock.fetch_users(mock_tok));
            }
            FuzzOp::UpdateProfile { sid, name } => {
                let Some(sid) = resize_int(sid, ..self.sessions.len()) else { return };
                let (app_tok, mock_tok) = (self.sessions[sid].app.0, self.sessions[sid].mock);
                let update = ProfileUpdate { display_name: name };
                let app_res = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/update-profile",
                    Some(app_tok),
                    &update,
                )
                .await;
                let mock_res = self.mock.update_profile(mock_tok, update);
                if let Ok(u) = &mock_res {
                    self.sessions[sid].user = u.clone();
                }
                compare("UpdateProfile", app_res, mock_res);
            }
            FuzzOp::DeleteUser { uid, missing } => {
                let id = match resize_int(uid, ..self.users.len()) {
                    Some(uid) if !missing => self.users[uid].id,
                    _ => UserId(Uuid::new_v4()),
                };
                let app_res = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/admin/delete-user",
                    Some(self.admin_token),
                    &id,
                )
                .await;
                compare("DeleteUser", app_res, self.mock.admin_delete_user(id));
            }
            FuzzOp::Publish {
                sid,
                ebook,
                title,
                has_url,
            } => {
                let Some(s) = self.session(sid) else { return };
                let kind = if ebook {
                    ContentKind::Ebook
                } else {
                    ContentKind::Video
                };
                let item = NewItem {
                    id: ItemId(Uuid::new_v4()),
                    kind,
                    owner_id: s.user.id,
                    owner_name: s.user.display_name.clone(),
                    date: Utc::now(),
                    title,
                    description: String::from("description"),
                    url: if has_url {
                        String::from("https://youtu.be/dQw4w9WgXcQ")
                    } else {
                        String::new()
                    },
                    image_url: None,
                    transcript: None,
                };
                self.items.push((kind, item.id));
                self.submit("Publish", sid, Action::NewItem(item)).await;
            }
            FuzzOp::List { sid, ebook, mine } => {
                let Some(s) = self.session(sid) else { return };
                let (app_tok, mock_tok) = (s.app.0, s.mock);
                let kind = if ebook {
                    ContentKind::Ebook
                } else {
                    ContentKind::Video
                };
                let filter = if mine {
                    ItemFilter::owned_by(s.user.id)
                } else {
                    ItemFilter::all()
                };
                let uri = match filter.owner {
                    Some(owner) => format!("/api/items/{}?owner={}", kind.as_str(), owner.0),
                    None => format!("/api/items/{}", kind.as_str()),
                };
                let app_res = run_on_app(&mut self.app, "GET", &uri, Some(app_tok), &()).await;
                compare("List", app_res, self.mock.list_items(mock_tok, kind, &filter));
            }
            FuzzOp::Fetch {
                sid,
                item,
                wrong_kind,
            } => {
                let Some(s) = self.session(sid) else { return };
                let (app_tok, mock_tok) = (s.app.0, s.mock);
                let (mut kind, id) = self.item(item);
                if wrong_kind {
                    kind = match kind {
                        ContentKind::Video => ContentKind::Ebook,
                        ContentKind::Ebook => ContentKind::Video,
                    };
                }
                let uri = format!("/api/items/{}/{}", kind.as_str(), id.0);
                let app_res = run_on_app(&mut self.app, "GET", &uri, Some(app_tok), &()).await;
                compare("Fetch", app_res, self.mock.fetch_item(mock_tok, kind, id));
            }
            FuzzOp::Like { sid, item } => {
                self.submit_event("Like", sid, item, EventData::Like).await
            }
            FuzzOp::Comment { sid, item, text } => {
                let id = CommentId::new();
                self.comments.push(id);
                let Some(s) = self.session(sid) else { return };
                let data = EventData::add_comment(id, &s.user.display_name, &text);
                self.submit_event("Comment", sid, item, data).await
            }
            FuzzOp::Reply {
                sid,
                item,
                comment,
                text,
            } => {
                let id = CommentId::new();
                let parent = self.comment(comment);
                self.comments.push(id);
                let Some(s) = self.session(sid) else { return };
                let data = EventData::add_reply(parent, id, &s.user.display_name, &text);
                self.submit_event("Reply", sid, item, data).await
            }
            FuzzOp::DeleteComment {
                sid,
                item,
                comment,
                forged,
            } => {
                let data = EventData::DeleteComment(self.comment(comment));
                if forged {
                    // claim to be the first user, who owns most items
                    let Some(s) = self.session(sid) else { return };
                    let (kind, item_id) = self.item(item);
                    let e = Event::now(self.users[0].id, kind, item_id, data);
                    let name = if s.user.id == self.users[0].id {
                        "DeleteComment"
                    } else {
                        "ForgedDeleteComment"
                    };
                    self.submit(name, sid, Action::NewEvent(e)).await
                } else {
                    self.submit_event("DeleteComment", sid, item, data).await
                }
            }
            FuzzOp::Edit {
                sid,
                item,
                title,
                description,
            } => {
                self.submit_event("Edit", sid, item, EventData::Edit { title, description })
                    .await
            }
            FuzzOp::DeleteItem { sid, item } => {
                let (kind, id) = self.item(item);
                self.submit("DeleteItem", sid, Action::DeleteItem(kind, id))
                    .await
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..50usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);

async fn send_raw(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
) -> (http::StatusCode, Vec<u8>) {
    let resp = app
        .ready()
        .await
        .expect("waiting for app to be ready")
        .call(req)
        .await
        .expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    (status, body.to_vec())
}

/// Creates a user through the admin route and opens a session for them
async fn sign_up(app: &mut Router, admin_token: Uuid, name: &str, role: Role) -> (User, AuthToken) {
    let u = test_user(name, &format!("{}@example.org", name.to_lowercase()), role);
    let () = run_on_app(app, "POST", "/api/admin/create-user", Some(admin_token), &u)
        .await
        .unwrap();
    let tok: AuthToken =
        run_on_app(app, "POST", "/api/auth", None, &test_session(&u.email, TEST_PASSWORD))
            .await
            .unwrap();
    (u.user(), tok)
}

fn upload_req(tok: AuthToken, path: &str, data: &'static [u8]) -> request::Request<axum::body::Body> {
    request::Builder::new()
        .method("POST")
        .uri(format!("/api/blobs?path={path}"))
        .header(http::header::AUTHORIZATION, format!("bearer {}", tok.0))
        .body(axum::body::Body::from(data))
        .unwrap()
}

fn download_req(path: &str) -> request::Request<axum::body::Body> {
    request::Builder::new()
        .method("GET")
        .uri(format!("/api/blobs/{path}"))
        .body(axum::body::Body::empty())
        .unwrap()
}

#[tokio::test]
async fn blobs_round_trip() {
    let admin_token = Uuid::new_v4();
    let mut app = app(test_pool().await, Some(AuthToken(admin_token)));
    let (_, tok) = sign_up(&mut app, admin_token, "Lecturer", Role::Lecturer).await;

    let (status, body) = send_raw(&mut app, upload_req(tok, "ebooks/some-book", b"%PDF-1.4")).await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<lectern_api::BlobHandle>(&body).unwrap().0,
        "ebooks/some-book"
    );

    assert_eq!(
        send_raw(&mut app, download_req("ebooks/some-book")).await,
        (http::StatusCode::OK, b"%PDF-1.4".to_vec())
    );

    let missing = request::Builder::new()
        .method("GET")
        .uri("/api/blobs/ebooks/other-book")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = send_raw(&mut app, missing).await;
    assert_eq!(status, http::StatusCode::NOT_FOUND);
    assert_eq!(
        ApiError::parse(&body).unwrap(),
        ApiError::BlobNotFound(String::from("ebooks/other-book"))
    );

    let anonymous = request::Builder::new()
        .method("POST")
        .uri("/api/blobs?path=ebooks/spam")
        .body(axum::body::Body::from(&b"spam"[..]))
        .unwrap();
    assert_eq!(
        send_raw(&mut app, anonymous).await.0,
        http::StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn blobs_cannot_be_overwritten_by_others() {
    let admin_token = Uuid::new_v4();
    let mut app = app(test_pool().await, Some(AuthToken(admin_token)));
    let (_, alice) = sign_up(&mut app, admin_token, "Alice", Role::Lecturer).await;
    let (_, carol) = sign_up(&mut app, admin_token, "Carol", Role::Lecturer).await;
    let (_, mallory) = sign_up(&mut app, admin_token, "Mallory", Role::Student).await;

    let (status, _) = send_raw(&mut app, upload_req(alice, "videos/abc", b"lecture")).await;
    assert_eq!(status, http::StatusCode::OK);

    for (tok, path) in [
        (mallory, "videos/abc"),
        (mallory, "videos/fresh"),
        (carol, "videos/abc"),
    ] {
        let (status, body) = send_raw(&mut app, upload_req(tok, path, b"defaced")).await;
        assert_eq!(status, http::StatusCode::FORBIDDEN, "uploading to {path}");
        assert_eq!(ApiError::parse(&body).unwrap(), ApiError::PermissionDenied);
    }
    assert_eq!(
        send_raw(&mut app, download_req("videos/abc")).await,
        (http::StatusCode::OK, b"lecture".to_vec())
    );
    assert_eq!(
        send_raw(&mut app, download_req("videos/fresh")).await.0,
        http::StatusCode::NOT_FOUND
    );

    let (status, _) = send_raw(&mut app, upload_req(alice, "videos/abc", b"lecture v2")).await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(
        send_raw(&mut app, download_req("videos/abc")).await,
        (http::StatusCode::OK, b"lecture v2".to_vec())
    );
}

#[tokio::test]
async fn deleted_publishers_leave_their_content() {
    let admin_token = Uuid::new_v4();
    let mut app = app(test_pool().await, Some(AuthToken(admin_token)));
    let (alice, alice_tok) = sign_up(&mut app, admin_token, "Alice", Role::Lecturer).await;
    let (_, bob_tok) = sign_up(&mut app, admin_token, "Bob", Role::Student).await;

    let item = NewItem {
        id: ItemId(Uuid::new_v4()),
        kind: ContentKind::Video,
        owner_id: alice.id,
        owner_name: alice.display_name.clone(),
        date: Utc::now(),
        title: String::from("Intro to Rust"),
        description: String::from("Ownership"),
        url: String::from("https://youtu.be/dQw4w9WgXcQ"),
        image_url: None,
        transcript: None,
    };
    let _: Option<ContentItem> = run_on_app(
        &mut app,
        "POST",
        "/api/submit-action",
        Some(alice_tok.0),
        &Action::NewItem(item.clone()),
    )
    .await
    .unwrap();
    let (status, _) = send_raw(&mut app, upload_req(alice_tok, "videos/abc", b"lecture")).await;
    assert_eq!(status, http::StatusCode::OK);

    let not_admin: Result<(), ApiError> = run_on_app(
        &mut app,
        "POST",
        "/api/admin/delete-user",
        Some(bob_tok.0),
        &alice.id,
    )
    .await;
    assert_eq!(not_admin, Err(ApiError::PermissionDenied));

    let () = run_on_app(
        &mut app,
        "POST",
        "/api/admin/delete-user",
        Some(admin_token),
        &alice.id,
    )
    .await
    .unwrap();
    let again: Result<(), ApiError> = run_on_app(
        &mut app,
        "POST",
        "/api/admin/delete-user",
        Some(admin_token),
        &alice.id,
    )
    .await;
    assert_eq!(again, Err(ApiError::UserNotFound(alice.id)));

    let whoami: Result<User, ApiError> =
        run_on_app(&mut app, "GET", "/api/whoami", Some(alice_tok.0), &()).await;
    assert_eq!(whoami, Err(ApiError::AuthenticationRequired));
    let stored: ContentItem = run_on_app(
        &mut app,
        "GET",
        &format!("/api/items/video/{}", item.id.0),
        Some(bob_tok.0),
        &(),
    )
    .await
    .unwrap();
    assert_eq!(stored.owner_name, "Alice");
    assert_eq!(
        send_raw(&mut app, download_req("videos/abc")).await,
        (http::StatusCode::OK, b"lecture".to_vec())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_comments_are_all_kept() {
    let dir = tempfile::tempdir().expect("creating tempdir");
    let db_url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = create_sqlx_pool(&db_url, 4).await.expect("opening database");
    MIGRATOR.run(&pool).await.expect("applying migrations");
    let admin_token = Uuid::new_v4();
    let mut app = app(pool, Some(AuthToken(admin_token)));

    let mut tokens = Vec::new();
    let mut users = Vec::new();
    for (name, role) in [("Lecturer", Role::Lecturer), ("Student", Role::Student)] {
        let email = format!("{}@example.org", name.to_lowercase());
        let u = test_user(name, &email, role);
        let () = run_on_app(&mut app, "POST", "/api/admin/create-user", Some(admin_token), &u)
            .await
            .unwrap();
        let tok: AuthToken = run_on_app(
            &mut app,
            "POST",
            "/api/auth",
            None,
            &test_session(&email, TEST_PASSWORD),
        )
        .await
        .unwrap();
        tokens.push(tok);
        users.push(u.user());
    }

    let item = NewItem {
        id: ItemId(Uuid::new_v4()),
        kind: ContentKind::Video,
        owner_id: users[0].id,
        owner_name: users[0].display_name.clone(),
        date: Utc::now(),
        title: String::from("Intro to Rust"),
        description: String::from("Ownership"),
        url: String::from("https://youtu.be/dQw4w9WgXcQ"),
        image_url: None,
        transcript: None,
    };
    let _: Option<ContentItem> = run_on_app(
        &mut app,
        "POST",
        "/api/submit-action",
        Some(tokens[0].0),
        &Action::NewItem(item.clone()),
    )
    .await
    .unwrap();

    const NUM_COMMENTS: usize = 20;
    let (kind, id) = (item.kind, item.id);
    let mut tasks = Vec::new();
    for i in 0..NUM_COMMENTS {
        let mut app = app.clone();
        let (user, tok) = (users[i % 2].clone(), tokens[i % 2]);
        tasks.push(tokio::spawn(async move {
            let e = Event::now(
                user.id,
                kind,
                id,
                EventData::add_comment(CommentId::new(), &user.display_name, &format!("#{i}")),
            );
            let res: Result<Option<ContentItem>, ApiError> = run_on_app(
                &mut app,
                "POST",
                "/api/submit-action",
                Some(tok.0),
                &Action::NewEvent(e),
            )
            .await;
            res.expect("submitting comment");
        }));
    }
    for t in tasks {
        t.await.expect("comment task panicked");
    }

    let stored: ContentItem = run_on_app(
        &mut app,
        "GET",
        &format!("/api/items/video/{}", item.id.0),
        Some(tokens[1].0),
        &(),
    )
    .await
    .unwrap();
    assert_eq!(stored.comments.len(), NUM_COMMENTS);
}
