//! Routes open to everyone.

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{blocking, AppState};
use crate::auth::{check_credentials, create_account, NewAccount, Session};
use crate::error::Result;
use crate::model::{
    new_id, normalize_email, Location, Message, MessageInput, Role, Service, User, UserProfile,
};
use crate::scheduling::Scheduler;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-up", post(sign_up))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/auth/me", get(me))
        .route("/api/locations", get(locations))
        .route("/api/services", get(services))
        .route("/api/availability", get(availability))
        .route("/api/contact", post(contact))
}

#[derive(Debug, Deserialize)]
struct SignIn {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct Me {
    user: Option<UserProfile>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    service_id: String,
    location_id: String,
    from: NaiveDate,
    to: Option<NaiveDate>,
}

/// `Set-Cookie` value starting a session for `user`.
fn session_cookie(state: &AppState, user: &User, now: DateTime<Utc>) -> Result<String> {
    let claims = state.sessions.claims_for(&user.id, user.role, now);
    let token = state.sessions.issue(&claims)?;
    Ok(state.sessions.set_cookie(&token))
}

async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<NewAccount>,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let user = blocking(move || body.into_user(Role::Patient, now)).await?;
    create_account(&*state.storage.lock().await, &user)?;
    let cookie = session_cookie(&state, &user, now)?;
    Ok((StatusCode::CREATED, [(SET_COOKIE, cookie)], Json(user.profile())))
}

async fn sign_in(
    State(state): State<AppState>,
    Json(body): Json<SignIn>,
) -> Result<impl IntoResponse> {
    let found = state
        .storage
        .lock()
        .await
        .get_user_by_email(&normalize_email(&body.email))?;
    let user = blocking(move || check_credentials(found, &body.password)).await?;
    info!(user = %user.id, role = %user.role, "Signed in");
    let cookie = session_cookie(&state, &user, Utc::now())?;
    Ok(([(SET_COOKIE, cookie)], Json(user.profile())))
}

async fn sign_out(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, state.sessions.clear_cookie())],
    )
}

async fn me(State(state): State<AppState>, session: Option<Session>) -> Result<Json<Me>> {
    let user = match session {
        Some(session) => state.storage.lock().await.get_user(&session.user_id)?,
        None => None,
    };
    Ok(Json(Me {
        user: user.map(|u| u.profile()),
    }))
}

async fn locations(State(state): State<AppState>) -> Result<Json<Vec<Location>>> {
    Ok(Json(state.storage.lock().await.list_locations(true)?))
}

async fn services(State(state): State<AppState>) -> Result<Json<Vec<Service>>> {
    Ok(Json(state.storage.lock().await.list_services(true)?))
}

async fn availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>> {
    let to = query.to.unwrap_or(query.from);
    let storage = state.storage.lock().await;
    let slots = Scheduler::new(&storage, &state.config).available_slots(
        &query.service_id,
        &query.location_id,
        query.from,
        to,
        Utc::now(),
    )?;
    Ok(Json(json!({ "slots": slots })))
}

async fn contact(
    State(state): State<AppState>,
    Json(body): Json<MessageInput>,
) -> Result<(StatusCode, Json<Message>)> {
    let message = body.into_message(new_id(), Utc::now())?;
    state.storage.lock().await.insert_message(&message)?;
    info!(message = %message.id, "Contact message received");
    Ok((StatusCode::CREATED, Json(message)))
}
