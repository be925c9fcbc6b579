//! Practitioner routes under `/api/rmt`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::patient::HealthHistoryView;
use super::AppState;
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::jobs::{run_job_once, JobKind, JobReport};
use crate::model::{
    new_id, Appointment, AppointmentStatus, Location, LocationInput, Message, Receipt, Role,
    Service, ServiceInput, UserProfile,
};
use crate::scheduling::{check_range, Scheduler, SlotRules};
use crate::storage::{Storage, StorageStats};

const DEFAULT_MESSAGE_LIMIT: usize = 100;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(appointments))
        .route("/appointments/{id}/confirm", post(confirm))
        .route("/appointments/{id}/complete", post(complete))
        .route("/appointments/{id}/cancel", post(cancel))
        .route("/patients", get(patients))
        .route("/patients/{id}/health-history", get(patient_health_history))
        .route("/patients/{id}/receipts", get(patient_receipts))
        .route("/locations", get(all_locations).post(create_location))
        .route(
            "/locations/{id}",
            put(update_location).delete(deactivate_location),
        )
        .route("/services", get(all_services).post(create_service))
        .route(
            "/services/{id}",
            put(update_service).delete(deactivate_service),
        )
        .route("/messages", get(messages))
        .route("/messages/{id}/read", post(mark_read))
        .route("/messages/{id}", delete(delete_message))
        .route("/jobs/{kind}", post(run_job))
        .route("/stats", get(stats))
}

#[derive(Debug, Deserialize)]
struct AppointmentQuery {
    from: NaiveDate,
    to: Option<NaiveDate>,
    status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(default)]
    unread_only: bool,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Completion {
    appointment: Appointment,
    receipt: Receipt,
}

/// Look up a patient account, treating other roles as missing.
fn require_patient(storage: &Storage, id: &str) -> Result<()> {
    match storage.get_user(id)? {
        Some(user) if user.role == Role::Patient => Ok(()),
        _ => Err(Error::not_found("patient", id)),
    }
}

async fn appointments(
    State(state): State<AppState>,
    Query(query): Query<AppointmentQuery>,
) -> Result<Json<Vec<Appointment>>> {
    let to = query.to.unwrap_or(query.from);
    check_range(query.from, to)?;
    let (start, end) =
        SlotRules::from_config(&state.config.scheduling).day_bounds(query.from, to)?;
    let storage = state.storage.lock().await;
    Ok(Json(storage.list_appointments_between(
        start,
        end,
        query.status,
    )?))
}

async fn confirm(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Appointment>> {
    let outcome = {
        let storage = state.storage.lock().await;
        Scheduler::new(&storage, &state.config).confirm_appointment(&id, Utc::now())?
    };
    state.send(&outcome.emails).await;
    Ok(Json(outcome.appointment))
}

async fn complete(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Completion>> {
    let outcome = {
        let storage = state.storage.lock().await;
        Scheduler::new(&storage, &state.config).complete_appointment(&id, Utc::now())?
    };
    state.send(&outcome.emails).await;
    Ok(Json(Completion {
        appointment: outcome.appointment,
        receipt: outcome.receipt,
    }))
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
            Role::Rmt,
            &id,
            Utc::now(),
        )?
    };
    state.send(&outcome.emails).await;
    Ok(Json(outcome.appointment))
}

async fn patients(State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>> {
    let patients = state.storage.lock().await.list_patients()?;
    Ok(Json(patients.iter().map(|u| u.profile()).collect()))
}

async fn patient_health_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HealthHistoryView>> {
    let storage = state.storage.lock().await;
    require_patient(&storage, &id)?;
    Ok(Json(HealthHistoryView::load(&storage, &id, Utc::now())?))
}

async fn patient_receipts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Receipt>>> {
    let storage = state.storage.lock().await;
    require_patient(&storage, &id)?;
    Ok(Json(storage.list_receipts_for_patient(&id)?))
}

async fn all_locations(State(state): State<AppState>) -> Result<Json<Vec<Location>>> {
    Ok(Json(state.storage.lock().await.list_locations(false)?))
}

async fn create_location(
    State(state): State<AppState>,
    Json(body): Json<LocationInput>,
) -> Result<(StatusCode, Json<Location>)> {
    let location = body.into_location(new_id())?;
    state.storage.lock().await.upsert_location(&location)?;
    info!(location = %location.id, "Location created");
    Ok((StatusCode::CREATED, Json(location)))
}

async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LocationInput>,
) -> Result<Json<Location>> {
    let location = body.into_location(id)?;
    let storage = state.storage.lock().await;
    if storage.get_location(&location.id)?.is_none() {
        return Err(Error::not_found("location", location.id));
    }
    storage.upsert_location(&location)?;
    Ok(Json(location))
}

async fn deactivate_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.storage.lock().await.deactivate_location(&id)? {
        return Err(Error::not_found("location", id));
    }
    info!(location = %id, "Location deactivated");
    Ok(StatusCode::NO_CONTENT)
}

async fn all_services(State(state): State<AppState>) -> Result<Json<Vec<Service>>> {
    Ok(Json(state.storage.lock().await.list_services(false)?))
}

async fn create_service(
    State(state): State<AppState>,
    Json(body): Json<ServiceInput>,
) -> Result<(StatusCode, Json<Service>)> {
    let service = body.into_service(new_id())?;
    state.storage.lock().await.upsert_service(&service)?;
    info!(service = %service.id, "Service created");
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ServiceInput>,
) -> Result<Json<Service>> {
    let service = body.into_service(id)?;
    let storage = state.storage.lock().await;
    if storage.get_service(&service.id)?.is_none() {
        return Err(Error::not_found("service", service.id));
    }
    storage.upsert_service(&service)?;
    Ok(Json(service))
}

async fn deactivate_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.storage.lock().await.deactivate_service(&id)? {
        return Err(Error::not_found("service", id));
    }
    info!(service = %id, "Service deactivated");
    Ok(StatusCode::NO_CONTENT)
}

async fn messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>> {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    Ok(Json(
        state
            .storage
            .lock()
            .await
            .list_messages(query.unread_only, limit)?,
    ))
}

async fn mark_read(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    if !state.storage.lock().await.mark_message_read(&id)? {
        return Err(Error::not_found("message", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.storage.lock().await.delete_message(&id)? {
        return Err(Error::not_found("message", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn run_job(
    State(state): State<AppState>,
    session: Session,
    Path(kind): Path<String>,
) -> Result<Json<JobReport>> {
    let kind: JobKind = kind.parse()?;
    info!(job = %kind, user = %session.user_id, "Job run on demand");
    Ok(Json(run_job_once(kind, &state.job_context(), Utc::now()).await?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StorageStats>> {
    Ok(Json(state.storage.lock().await.stats()?))
}
