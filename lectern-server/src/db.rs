use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use lectern_api::{
    AuthToken, BlobHandle, ContentItem, ContentKind, Event, ItemFilter, ItemId, NewItem,
    NewSession, NewUser, ProfileUpdate, Role, Time, User, UserId, Uuid,
};
use sqlx::Row;

use crate::Error;

/// Number of times an event is re-applied when racing with other writers
const MAX_CAS_ATTEMPTS: usize = 16;

// Fixed-width so that lexicographic order on the column is chronological
fn date_column(date: &Time) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_uuid(s: &str) -> anyhow::Result<Uuid> {
    Uuid::try_parse(s).with_context(|| format!("parsing uuid {s:?} from the database"))
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<User> {
    let role: String = row.try_get("role").context("retrieving the role field")?;
    Ok(User {
        id: UserId(parse_uuid(
            &row.try_get::<String, _>("id")
                .context("retrieving the id field")?,
        )?),
        display_name: row
            .try_get("display_name")
            .context("retrieving the display_name field")?,
        email: row.try_get("email").context("retrieving the email field")?,
        role: Role::parse(&role).ok_or_else(|| anyhow!("unknown role {role:?} in database"))?,
    })
}

pub async fn create_user(conn: &mut sqlx::SqliteConnection, u: NewUser) -> Result<(), Error> {
    let email_used = sqlx::query("SELECT 1 FROM users WHERE email = ?")
        .bind(&u.email)
        .fetch_optional(&mut *conn)
        .await
        .context("checking whether email is already used")?;
    if email_used.is_some() {
        return Err(Error::name_already_used(u.email));
    }
    let id_used = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(u.id.0.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("checking whether user id is already used")?;
    if id_used.is_some() {
        return Err(Error::uuid_already_used(u.id.0));
    }
    sqlx::query(
        "INSERT INTO users (id, display_name, email, role, password_hash) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(u.id.0.to_string())
    .bind(&u.display_name)
    .bind(&u.email)
    .bind(u.role.as_str())
    .bind(&u.initial_password_hash)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting user {:?}", u.id))?;
    Ok(())
}

/// Returns `None` if the credentials are wrong
pub async fn login_user(
    conn: &mut sqlx::SqliteConnection,
    s: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = ?")
        .bind(&s.user)
        .fetch_optional(&mut *conn)
        .await
        .context("fetching password hash")?;
    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };
    let hash: String = row
        .try_get("password_hash")
        .context("retrieving the password_hash field")?;
    if !bcrypt::verify(&s.password, &hash).unwrap_or(false) {
        return Ok(None);
    }
    let user: String = row.try_get("id").context("retrieving the id field")?;
    let token = AuthToken(Uuid::new_v4());
    let now = date_column(&Utc::now());
    sqlx::query(
        "INSERT INTO sessions (id, user_id, device, login_time, last_active) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(token.0.to_string())
    .bind(&user)
    .bind(&s.device)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await
    .context("inserting new session")?;
    Ok(Some(token))
}

/// Returns whether a session was actually closed
pub async fn logout_user(conn: &mut sqlx::SqliteConnection, token: &AuthToken) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(token.0.to_string())
        .execute(&mut *conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() == 1)
}

pub async fn recover_session(conn: &mut sqlx::SqliteConnection, token: AuthToken) -> Result<User, Error> {
    let row = sqlx::query(
        "
            SELECT users.id, users.display_name, users.email, users.role
            FROM sessions
            INNER JOIN users
                ON users.id = sessions.user_id
            WHERE sessions.id = ?
        ",
    )
    .bind(token.0.to_string())
    .fetch_optional(&mut *conn)
    .await
    .context("recovering session")?
    .ok_or(Error::authentication_required())?;
    let user = user_from_row(&row)?;
    sqlx::query("UPDATE sessions SET last_active = ? WHERE id = ?")
        .bind(date_column(&Utc::now()))
        .bind(token.0.to_string())
        .execute(&mut *conn)
        .await
        .context("updating session last-active time")?;
    Ok(user)
}

/// Display names are copied into items and comments when they get written,
/// so renaming leaves those untouched
pub async fn update_profile(
    conn: &mut sqlx::SqliteConnection,
    user: &User,
    update: ProfileUpdate,
) -> anyhow::Result<User> {
    sqlx::query("UPDATE users SET display_name = ? WHERE id = ?")
        .bind(&update.display_name)
        .bind(user.id.0.to_string())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("renaming user {:?}", user.id))?;
    Ok(User {
        display_name: update.display_name,
        ..user.clone()
    })
}

/// Removes the account and closes its sessions. Items, comments and blobs
/// it authored are kept.
pub async fn delete_user(conn: &mut sqlx::SqliteConnection, id: UserId) -> Result<(), Error> {
    // sessions reference the user, so they have to go first
    let sessions = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(id.0.to_string())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("closing sessions of {id:?}"))?;
    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id.0.to_string())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("deleting user {id:?}"))?;
    if res.rows_affected() != 1 {
        return Err(Error::user_not_found(id));
    }
    tracing::info!(user = ?id, sessions = sessions.rows_affected(), "deleted user");
    Ok(())
}

pub async fn fetch_users(conn: &mut sqlx::SqliteConnection) -> anyhow::Result<Vec<User>> {
    sqlx::query("SELECT id, display_name, email, role FROM users ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .context("querying users table")?
        .iter()
        .map(user_from_row)
        .collect()
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<(ContentItem, i64)> {
    let body: String = row.try_get("body").context("retrieving the body field")?;
    let revision: i64 = row
        .try_get("revision")
        .context("retrieving the revision field")?;
    let mut item: ContentItem =
        serde_json::from_str(&body).context("deserializing item body")?;
    if item.normalize() {
        tracing::warn!(item = ?item.id, "stored item had inconsistent likes");
    }
    Ok((item, revision))
}

async fn fetch_item_and_revision(
    conn: &mut sqlx::SqliteConnection,
    kind: ContentKind,
    id: ItemId,
) -> Result<(ContentItem, i64), Error> {
    let row = sqlx::query("SELECT body, revision FROM items WHERE id = ? AND kind = ?")
        .bind(id.0.to_string())
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching item {id:?}"))?
        .ok_or_else(|| Error::item_not_found(id))?;
    Ok(item_from_row(&row)?)
}

pub async fn fetch_item(
    conn: &mut sqlx::SqliteConnection,
    kind: ContentKind,
    id: ItemId,
) -> Result<ContentItem, Error> {
    Ok(fetch_item_and_revision(conn, kind, id).await?.0)
}

/// Items of `kind` in creation order
pub async fn list_items(
    conn: &mut sqlx::SqliteConnection,
    kind: ContentKind,
    filter: &ItemFilter,
) -> anyhow::Result<Vec<ContentItem>> {
    let rows = match filter.owner {
        None => {
            sqlx::query("SELECT body, revision FROM items WHERE kind = ? ORDER BY date, id")
                .bind(kind.as_str())
                .fetch_all(&mut *conn)
                .await
        }
        Some(owner) => {
            sqlx::query(
                "SELECT body, revision FROM items WHERE kind = ? AND owner_id = ? ORDER BY date, id",
            )
            .bind(kind.as_str())
            .bind(owner.0.to_string())
            .fetch_all(&mut *conn)
            .await
        }
    }
    .with_context(|| format!("listing {}", kind.collection()))?;
    rows.iter()
        .map(|r| item_from_row(r).map(|(item, _)| item))
        .collect()
}

pub async fn create_item(
    conn: &mut sqlx::SqliteConnection,
    user: &User,
    i: NewItem,
) -> Result<ContentItem, Error> {
    if i.owner_id != user.id || !user.role.can_publish() {
        return Err(Error::permission_denied());
    }
    let exists = sqlx::query("SELECT 1 FROM items WHERE id = ?")
        .bind(i.id.0.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("checking whether item id is already used")?;
    if exists.is_some() {
        return Err(Error::uuid_already_used(i.id.0));
    }
    let item = ContentItem::from(i);
    sqlx::query(
        "INSERT INTO items (id, kind, owner_id, date, revision, body) VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(item.id.0.to_string())
    .bind(item.kind.as_str())
    .bind(item.owner_id.0.to_string())
    .bind(date_column(&item.date))
    .bind(serde_json::to_string(&item).context("serializing item")?)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting item {:?}", item.id))?;
    tracing::info!(item = ?item.id, kind = item.kind.as_str(), owner = ?item.owner_id, "item published");
    Ok(item)
}

/// Applies `e` to the latest stored version of its item. Authorization is
/// checked against that same version, and the write only goes through if
/// nobody updated the item in-between.
pub async fn submit_event(
    conn: &mut sqlx::SqliteConnection,
    user: &User,
    e: &Event,
) -> Result<ContentItem, Error> {
    if e.owner_id != user.id {
        return Err(Error::permission_denied());
    }
    for attempt in 0..MAX_CAS_ATTEMPTS {
        let (mut item, revision) = fetch_item_and_revision(&mut *conn, e.kind, e.item_id).await?;
        item.submit(e)?;
        let res = sqlx::query(
            "UPDATE items SET body = ?, revision = revision + 1 WHERE id = ? AND revision = ?",
        )
        .bind(serde_json::to_string(&item).context("serializing item")?)
        .bind(item.id.0.to_string())
        .bind(revision)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("updating item {:?}", item.id))?;
        if res.rows_affected() == 1 {
            return Ok(item);
        }
        tracing::warn!(item = ?e.item_id, attempt, "item changed while applying event, retrying");
    }
    Err(Error::Anyhow(anyhow!(
        "gave up applying event to {:?} after {MAX_CAS_ATTEMPTS} concurrent updates",
        e.item_id
    )))
}

pub async fn delete_item(
    conn: &mut sqlx::SqliteConnection,
    user: &User,
    kind: ContentKind,
    id: ItemId,
) -> Result<(), Error> {
    let (item, _) = fetch_item_and_revision(&mut *conn, kind, id).await?;
    if !item.is_owned_by(&user.id) {
        return Err(Error::permission_denied());
    }
    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id.0.to_string())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("deleting item {id:?}"))?;
    tracing::info!(item = ?id, kind = kind.as_str(), "item deleted");
    Ok(())
}

/// Only publishers may store blobs, and a path stays with whoever first
/// uploaded to it
pub async fn put_blob(
    conn: &mut sqlx::SqliteConnection,
    user: &User,
    handle: &BlobHandle,
    data: &[u8],
) -> Result<(), Error> {
    if !user.role.can_publish() {
        return Err(Error::permission_denied());
    }
    let owner = sqlx::query("SELECT owner_id FROM blobs WHERE path = ?")
        .bind(&handle.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("checking owner of blob {:?}", handle.0))?;
    if let Some(row) = owner {
        let owner: String = row
            .try_get("owner_id")
            .context("retrieving the owner_id field")?;
        if parse_uuid(&owner)? != user.id.0 {
            return Err(Error::permission_denied());
        }
    }
    sqlx::query("INSERT OR REPLACE INTO blobs (path, owner_id, data) VALUES (?, ?, ?)")
        .bind(&handle.0)
        .bind(user.id.0.to_string())
        .bind(data)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("storing blob {:?}", handle.0))?;
    Ok(())
}

pub async fn get_blob(
    conn: &mut sqlx::SqliteConnection,
    handle: &BlobHandle,
) -> Result<Vec<u8>, Error> {
    let row = sqlx::query("SELECT data FROM blobs WHERE path = ?")
        .bind(&handle.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching blob {:?}", handle.0))?
        .ok_or_else(|| Error::blob_not_found(&handle.0))?;
    Ok(row.try_get("data").context("retrieving the data field")?)
}
