use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use raft3d_core::{Command, Filament, JobStatus, PrintJob, Printer, Validator};

use crate::dispatch::{ensure_leader, submit};
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/printers", post(create_printer).get(list_printers))
        .route("/api/v1/printers/{id}", get(get_printer))
        .route("/api/v1/filaments", post(create_filament).get(list_filaments))
        .route("/api/v1/filaments/{id}", get(get_filament))
        .route("/api/v1/print_jobs", post(create_print_job).get(list_print_jobs))
        .route("/api/v1/print_jobs/{id}", get(get_print_job))
        .route("/api/v1/print_jobs/{job_id}/status", post(update_status))
}

fn record_id(id: Option<String>) -> String {
    id.filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[derive(Deserialize)]
struct NewPrinter {
    id: Option<String>,
    company: String,
    model: String,
}

#[derive(Deserialize)]
struct NewFilament {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    color: String,
    total_weight_grams: u32,
    /// Defaults to a full spool.
    remaining_weight_grams: Option<u32>,
}

#[derive(Deserialize)]
struct NewPrintJob {
    id: Option<String>,
    printer_id: String,
    filament_id: String,
    #[serde(rename = "filepath", alias = "file_path")]
    file_path: String,
    print_weight_grams: u32,
    status: Option<String>,
}

#[derive(Deserialize)]
struct StatusQuery {
    status: Option<String>,
}

async fn create_printer(
    State(state): State<AppState>,
    Json(body): Json<NewPrinter>,
) -> Result<(StatusCode, Json<Printer>), ApiError> {
    ensure_leader(&state)?;

    let printer = Printer::new(record_id(body.id), body.company, body.model);
    if state.machine.printer(&printer.id).is_some() {
        return Err(ApiError::AlreadyExists {
            kind: "Printer",
            id: printer.id,
        });
    }
    Validator::validate_printer(&printer)?;

    submit(&state, Command::AddPrinter(printer.clone()))?;
    Ok((StatusCode::CREATED, Json(printer)))
}

async fn list_printers(State(state): State<AppState>) -> Json<BTreeMap<String, Printer>> {
    Json(state.machine.view(|s| {
        s.printers().map(|p| (p.id.clone(), p.clone())).collect()
    }))
}

async fn get_printer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Printer>, ApiError> {
    state
        .machine
        .printer(&id)
        .map(Json)
        .ok_or(ApiError::NotFound { kind: "Printer", id })
}

async fn create_filament(
    State(state): State<AppState>,
    Json(body): Json<NewFilament>,
) -> Result<(StatusCode, Json<Filament>), ApiError> {
    ensure_leader(&state)?;

    let remaining = body.remaining_weight_grams.unwrap_or(body.total_weight_grams);
    let filament = Filament::new(
        record_id(body.id),
        body.kind,
        body.color,
        body.total_weight_grams,
        remaining,
    );
    if state.machine.filament(&filament.id).is_some() {
        return Err(ApiError::AlreadyExists {
            kind: "Filament",
            id: filament.id,
        });
    }
    Validator::validate_filament(&filament)?;

    submit(&state, Command::AddFilament(filament.clone()))?;
    Ok((StatusCode::CREATED, Json(filament)))
}

async fn list_filaments(State(state): State<AppState>) -> Json<BTreeMap<String, Filament>> {
    Json(state.machine.view(|s| {
        s.filaments().map(|f| (f.id.clone(), f.clone())).collect()
    }))
}

async fn get_filament(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Filament>, ApiError> {
    state
        .machine
        .filament(&id)
        .map(Json)
        .ok_or(ApiError::NotFound { kind: "Filament", id })
}

async fn create_print_job(
    State(state): State<AppState>,
    Json(body): Json<NewPrintJob>,
) -> Result<(StatusCode, Json<PrintJob>), ApiError> {
    ensure_leader(&state)?;

    let status = match body.status.as_deref() {
        Some(s) => s.parse::<JobStatus>()?,
        None => JobStatus::Queued,
    };
    let job = PrintJob::new(
        record_id(body.id),
        body.printer_id,
        body.filament_id,
        body.file_path,
        body.print_weight_grams,
    )
    .with_status(status);

    state.machine.view(|s| -> Result<(), ApiError> {
        if s.print_job(&job.id).is_some() {
            return Err(ApiError::AlreadyExists {
                kind: "Print job",
                id: job.id.clone(),
            });
        }
        Validator::validate_new_job(s, &job)?;
        Ok(())
    })?;

    submit(&state, Command::UpsertPrintJob(job.clone()))?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn list_print_jobs(State(state): State<AppState>) -> Json<BTreeMap<String, PrintJob>> {
    Json(state.machine.view(|s| {
        s.print_jobs().map(|j| (j.id.clone(), j.clone())).collect()
    }))
}

async fn get_print_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PrintJob>, ApiError> {
    state
        .machine
        .print_job(&id)
        .map(Json)
        .ok_or(ApiError::NotFound { kind: "Print job", id })
}

async fn update_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<PrintJob>, ApiError> {
    ensure_leader(&state)?;

    let requested = query
        .status
        .ok_or_else(|| ApiError::BadRequest("missing status query parameter".to_string()))?;
    let updated = state
        .machine
        .view(|s| Validator::validate_transition(s, &job_id, &requested))?;

    submit(&state, Command::UpsertPrintJob(updated.clone()))?;
    Ok(Json(updated))
}
