use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use lectern_api::{AuthToken, User, Uuid};

use crate::{db, Error};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: DbPool,
    pub admin_token: Option<AuthToken>,
}

#[derive(Clone)]
pub struct DbPool(sqlx::SqlitePool);

impl DbPool {
    pub fn new(pool: sqlx::SqlitePool) -> DbPool {
        DbPool(pool)
    }

    pub async fn acquire(&self) -> Result<DbConn, Error> {
        Ok(DbConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }
}

pub struct DbConn(sqlx::pool::PoolConnection<sqlx::Sqlite>);

#[async_trait]
impl FromRequestParts<AppState> for DbConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<DbConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for DbConn {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DbConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Bearer token of the request, not checked against the sessions yet
pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::authentication_required()),
            Some(auth) => {
                let auth = auth
                    .to_str()
                    .map_err(|_| Error::authentication_required())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::authentication_required())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::authentication_required());
                }
                let token = auth.next().ok_or(Error::authentication_required())?;
                if !auth.next().is_none() {
                    return Err(Error::authentication_required());
                }
                let token =
                    Uuid::try_from(token).map_err(|_| Error::authentication_required())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

/// The signed-in user making the request
pub struct Auth(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let mut conn = DbConn::from_request_parts(req, state).await?;
        Ok(Auth(db::recover_session(&mut *conn, token).await?))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}
