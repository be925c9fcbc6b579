//! Patient routes under `/api/patient`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{blocking, AppState};
use crate::auth::{hash_password, optional_phone, validate_password, verify_password, Session};
use crate::error::{Error, Result};
use crate::model::{
    new_id, renewal_due, require_text, Appointment, HealthHistory, HealthHistoryInput, Receipt,
    Role, UserProfile,
};
use crate::scheduling::{AppointmentRequest, Scheduler};
use crate::storage::Storage;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile).put(update_profile))
        .route("/password", put(change_password))
        .route("/appointments", get(appointments).post(request_appointment))
        .route(
            "/appointments/{id}/reschedule",
            post(begin_rescheduling)
                .put(complete_rescheduling)
                .delete(abandon_rescheduling),
        )
        .route("/appointments/{id}/cancel", post(cancel))
        .route(
            "/health-history",
            get(health_history).post(submit_health_history),
        )
        .route("/receipts", get(receipts))
        .route("/receipts/{id}", get(receipt))
}

#[derive(Debug, Deserialize)]
struct ProfileUpdate {
    first_name: String,
    last_name: String,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PasswordChange {
    current_password: String,
    new_password: String,
}

#[derive(Debug, Deserialize)]
struct NewTime {
    starts_at: DateTime<Utc>,
}

/// A patient's health history records, newest first.
#[derive(Debug, Serialize)]
pub(super) struct HealthHistoryView {
    latest: Option<HealthHistory>,
    renewal_due: bool,
    history: Vec<HealthHistory>,
}

impl HealthHistoryView {
    pub(super) fn load(storage: &Storage, patient_id: &str, now: DateTime<Utc>) -> Result<Self> {
        let history = storage.list_health_histories(patient_id)?;
        let latest = history.first().cloned();
        Ok(Self {
            renewal_due: renewal_due(latest.as_ref(), now),
            latest,
            history,
        })
    }
}

async fn profile(State(state): State<AppState>, session: Session) -> Result<Json<UserProfile>> {
    let user = state
        .storage
        .lock()
        .await
        .get_user(&session.user_id)?
        .ok_or(Error::Unauthenticated)?;
    Ok(Json(user.profile()))
}

async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    let first_name = require_text("first_name", &body.first_name)?;
    let last_name = require_text("last_name", &body.last_name)?;
    let phone = optional_phone(body.phone.as_deref())?;

    let storage = state.storage.lock().await;
    if !storage.update_profile(&session.user_id, &first_name, &last_name, phone.as_deref())? {
        return Err(Error::Unauthenticated);
    }
    let user = storage
        .get_user(&session.user_id)?
        .ok_or(Error::Unauthenticated)?;
    Ok(Json(user.profile()))
}

async fn change_password(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<PasswordChange>,
) -> Result<StatusCode> {
    validate_password(&body.new_password)?;
    let user = state
        .storage
        .lock()
        .await
        .get_user(&session.user_id)?
        .ok_or(Error::Unauthenticated)?;
    let stored = user.password_hash;
    let new_hash = blocking(move || {
        if !verify_password(&body.current_password, &stored) {
            return Err(Error::forbidden("current password is incorrect"));
        }
        hash_password(&body.new_password)
    })
    .await?;
    state
        .storage
        .lock()
        .await
        .update_password_hash(&user.id, &new_hash)?;
    info!(user = %user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

async fn appointments(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Appointment>>> {
    let storage = state.storage.lock().await;
    Ok(Json(storage.list_appointments_for_patient(&session.user_id)?))
}

async fn request_appointment(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<AppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>)> {
    let outcome = {
        let storage = state.storage.lock().await;
        Scheduler::new(&storage, &state.config).request_appointment(
            &session.user_id,
            body,
            Utc::now(),
        )?
    };
    state.send(&outcome.emails).await;
    Ok((StatusCode::CREATED, Json(outcome.appointment)))
}

async fn begin_rescheduling(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<Appointment>> {
    let outcome = {
        let storage = state.storage.lock().await;
        Scheduler::new(&storage, &state.config).begin_rescheduling(
            &session.user_id,
            &id,
            Utc::now(),
        )?
    };
    state.send(&outcome.emails).await;
    Ok(Json(outcome.appointment))
}

async fn complete_rescheduling(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<NewTime>,
) -> Result<Json<Appointment>> {
    let outcome = {
        let storage = state.storage.lock().await;
        Scheduler::new(&storage, &state.config).complete_rescheduling(
            &session.user_id,
            &id,
            body.starts_at,
            Utc::now(),
        )?
    };
    state.send(&outcome.emails).await;
    Ok(Json(outcome.appointment))
}

async fn abandon_rescheduling(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<Appointment>> {
    let outcome = {
        let storage = state.storage.lock().await;
        Scheduler::new(&storage, &state.config).abandon_rescheduling(
            &session.user_id,
            &id,
            Utc::now(),
        )?
    };
    Ok(Json(outcome.appointment))
}

async fn cancel(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<Appointment>> {
    let outcome = {
        let storage = state.storage.lock().await;
        Scheduler::new(&storage, &state.config).cancel_appointment(
            &session.user_id,
            Role::Patient,
            &id,
            Utc::now(),
        )?
    };
    state.send(&outcome.emails).await;
    Ok(Json(outcome.appointment))
}

async fn health_history(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<HealthHistoryView>> {
    let storage = state.storage.lock().await;
    Ok(Json(HealthHistoryView::load(
        &storage,
        &session.user_id,
        Utc::now(),
    )?))
}

async fn submit_health_history(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<HealthHistoryInput>,
) -> Result<(StatusCode, Json<HealthHistory>)> {
    let record = body.into_record(new_id(), session.user_id, Utc::now())?;
    state.storage.lock().await.insert_health_history(&record)?;
    info!(patient = %record.patient_id, "Health history submitted");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn receipts(State(state): State<AppState>, session: Session) -> Result<Json<Vec<Receipt>>> {
    let storage = state.storage.lock().await;
    Ok(Json(storage.list_receipts_for_patient(&session.user_id)?))
}

async fn receipt(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<Receipt>> {
    let receipt = state
        .storage
        .lock()
        .await
        .get_receipt(&id)?
        .filter(|r| r.patient_id == session.user_id)
        .ok_or_else(|| Error::not_found("receipt", &id))?;
    Ok(Json(receipt))
}
