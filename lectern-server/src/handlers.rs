use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, Query},
    Json,
};
use lectern_api::{
    Action, AuthToken, BlobHandle, ContentItem, ContentKind, ItemFilter, ItemId, NewSession,
    NewUser, ProfileUpdate, User, UserId, Uuid,
};

use crate::{db, extractors::*, Error};

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: DbConn,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    let (id, role) = (data.id, data.role);
    db::create_user(&mut *conn, data).await?;
    tracing::info!(user = ?id, role = role.as_str(), "created user");
    Ok(())
}

pub async fn admin_delete_user(
    AdminAuth: AdminAuth,
    mut conn: DbConn,
    Json(id): Json<UserId>,
) -> Result<(), Error> {
    db::delete_user(&mut *conn, id).await
}

pub async fn auth(
    mut conn: DbConn,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate_except_pow()?;
    // in test setup, also allow the "empty" pow to work
    #[cfg(test)]
    if !data.verify_pow() && !data.pow.is_empty() {
        return Err(Error::invalid_pow());
    }
    #[cfg(not(test))]
    if !data.verify_pow() {
        return Err(Error::invalid_pow());
    }
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn unauth(user: PreAuth, mut conn: DbConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::authentication_required()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<User> {
    Json(user)
}

pub async fn update_profile(
    Auth(user): Auth,
    mut conn: DbConn,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, Error> {
    update.validate()?;
    let user = db::update_profile(&mut *conn, &user, update)
        .await
        .context("updating profile")?;
    tracing::info!(user = ?user.id, "updated profile");
    Ok(Json(user))
}

pub async fn fetch_users(Auth(user): Auth, mut conn: DbConn) -> Result<Json<Vec<User>>, Error> {
    Ok(Json(db::fetch_users(&mut *conn).await.with_context(
        || format!("fetching user list for {:?}", user.id),
    )?))
}

#[derive(Debug, serde::Deserialize)]
pub struct ListQuery {
    owner: Option<Uuid>,
}

pub async fn list_items(
    Auth(user): Auth,
    Path(kind): Path<ContentKind>,
    Query(q): Query<ListQuery>,
    mut conn: DbConn,
) -> Result<Json<Vec<ContentItem>>, Error> {
    let filter = ItemFilter {
        owner: q.owner.map(UserId),
    };
    Ok(Json(
        db::list_items(&mut *conn, kind, &filter)
            .await
            .with_context(|| format!("listing {} for {:?}", kind.collection(), user.id))?,
    ))
}

pub async fn fetch_item(
    Auth(_): Auth,
    Path((kind, id)): Path<(ContentKind, Uuid)>,
    mut conn: DbConn,
) -> Result<Json<ContentItem>, Error> {
    Ok(Json(db::fetch_item(&mut *conn, kind, ItemId(id)).await?))
}

/// Returns the item as stored after the action, or `null` if it got deleted
pub async fn submit_action(
    Auth(user): Auth,
    mut conn: DbConn,
    Json(a): Json<Action>,
) -> Result<Json<Option<ContentItem>>, Error> {
    a.validate()?;
    Ok(Json(match a {
        Action::NewItem(i) => Some(db::create_item(&mut *conn, &user, i).await?),
        Action::NewEvent(e) => Some(db::submit_event(&mut *conn, &user, &e).await?),
        Action::DeleteItem(kind, id) => {
            db::delete_item(&mut *conn, &user, kind, id).await?;
            None
        }
    }))
}

#[derive(Debug, serde::Deserialize)]
pub struct BlobQuery {
    path: String,
}

pub async fn upload_blob(
    Auth(user): Auth,
    Query(q): Query<BlobQuery>,
    mut conn: DbConn,
    body: Bytes,
) -> Result<Json<BlobHandle>, Error> {
    let handle = BlobHandle::parse(&q.path)?;
    db::put_blob(&mut *conn, &user, &handle, &body).await?;
    tracing::info!(path = %handle.0, len = body.len(), "stored blob");
    Ok(Json(handle))
}

pub async fn fetch_blob(Path(path): Path<String>, mut conn: DbConn) -> Result<Vec<u8>, Error> {
    let handle = BlobHandle::parse(path.trim_start_matches('/'))?;
    db::get_blob(&mut *conn, &handle).await
}
