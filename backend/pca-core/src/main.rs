// src/main.rs
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, path::PathBuf};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod attendance;
#[cfg(test)]
mod attendance_tests;
mod punch_import;
mod report_export;
mod store;
#[cfg(test)]
mod store_tests;

use attendance::{
    detect_period, summarize_period, Adjustment, AdjustmentScope, AttendanceSettings, PunchRecord,
    ReportError, ReportPeriod,
};
use punch_import::{
    filter_punches, parse_punch_csv, scan_open_days, write_clean_csv, ImportError, OpenDay,
    PunchFilter,
};
use report_export::{
    drilldown_csv, drilldown_filename, payroll_csv, payroll_filename, sanitize_filename,
    summary_csv, summary_filename, ExportError,
};
use store::{
    AttendanceStore, HolidayDoc, LogBatchInfo, SavedReport, SavedReportInfo, StoreConfig,
    StoreError, StoreStats, DEFAULT_DATA_DIR,
};

// --- Configuration ---

#[derive(Parser, Debug)]
#[command(name = "pca-core")]
#[command(version, about = "Punch-clock attendance and payroll reporting service", long_about = None)]
struct Args {
    /// Socket address to listen on
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Directory for stored settings, punch logs and reports
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// TLS certificate in PEM format; the server speaks plain HTTP
    /// when no certificate is configured
    #[arg(long)]
    cert: Option<PathBuf>,

    /// TLS private key in PEM format
    #[arg(long)]
    key: Option<PathBuf>,
}

/// Environment overrides for the CLI flags, parsed from PCA_ADDR,
/// PCA_DATA_DIR, CERT_PATH and KEY_PATH. Flags win when both are set.
#[derive(Debug, Deserialize)]
struct EnvConfig {
    pca_addr: Option<SocketAddr>,
    pca_data_dir: Option<PathBuf>,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct ServerConfig {
    addr: SocketAddr,
    data_dir: PathBuf,
    tls: Option<(PathBuf, PathBuf)>,
}

fn load_server_config(args: Args) -> Result<ServerConfig, AppError> {
    let env_config: EnvConfig = envy::from_env()?;

    let addr = args
        .addr
        .or(env_config.pca_addr)
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
    let data_dir = args
        .data_dir
        .or(env_config.pca_data_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let tls = match (args.cert.or(env_config.cert_path), args.key.or(env_config.key_path)) {
        (Some(cert), Some(key)) => Some((cert, key)),
        (None, None) => None,
        _ => {
            return Err(AppError::TlsConfig(
                "cert and key must both be set for TLS".to_string(),
            ))
        }
    };

    Ok(ServerConfig {
        addr,
        data_dir,
        tls,
    })
}

// --- Error Handling ---

#[derive(Error, Debug)]
enum AppError {
    #[error("Environment configuration error: {0}")]
    Env(#[from] envy::Error),
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Punch import error: {0}")]
    Import(#[from] ImportError),
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {:?}", self);
        let (status_code, error_message) = match &self {
            AppError::Env(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server configuration error.".to_string(),
            ),
            AppError::TlsConfig(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server TLS configuration error.".to_string(),
            ),
            AppError::Store(store_err) => match store_err {
                StoreError::NotFound { what, id } => {
                    (StatusCode::NOT_FOUND, format!("{} not found: {}", what, id))
                }
                StoreError::Corrupt { path, .. } => {
                    error!("Stored document is corrupt: {}", path);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "A stored document is corrupt. Check server logs.".to_string(),
                    )
                }
                StoreError::Io(_) | StoreError::Encode(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error (Store I/O).".to_string(),
                ),
            },
            AppError::Import(import_err) => match import_err {
                ImportError::MissingColumn(column) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("Uploaded CSV is missing a required column: {}", column),
                ),
                ImportError::NoRows => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Uploaded CSV contained no usable punch rows.".to_string(),
                ),
                ImportError::Csv(_) => (
                    StatusCode::BAD_REQUEST,
                    "Uploaded file is not readable as CSV.".to_string(),
                ),
                ImportError::Io(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error (Import I/O).".to_string(),
                ),
            },
            AppError::Report(report_err) => match report_err {
                ReportError::NoPunches => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "No punch records to summarize.".to_string(),
                ),
                ReportError::InvalidPeriod { start, end } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("Invalid report period: {} is after {}.", start, end),
                ),
            },
            AppError::Export(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error (CSV export).".to_string(),
            ),
            AppError::BadRequest(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
            }
        };
        (status_code, Json(json!({ "error": error_message }))).into_response()
    }
}

// --- Shared Application State ---

#[derive(Clone)]
struct AppState {
    store: AttendanceStore,
}

// --- API Request & Response Shapes ---

#[derive(Debug, Deserialize)]
struct UploadParams {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogBatchDetail {
    #[serde(flatten)]
    info: LogBatchInfo,
    punches: Vec<PunchRecord>,
    open_days: Vec<OpenDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateHolidayRequest {
    date: NaiveDate,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReportRequest {
    batch_id: String,
    title: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    service: &'static str,
    version: &'static str,
    server_time: DateTime<Utc>,
    store: StoreStats,
}

// --- Main Application Logic ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;
    info!("Tracing subscriber initialized.");

    let config = load_server_config(Args::parse())?;
    info!(
        "Server configuration loaded. Data dir: {}",
        config.data_dir.display()
    );

    let store = AttendanceStore::new(StoreConfig {
        data_dir: config.data_dir.clone(),
    })?;
    let state = AppState { store };
    info!("Application state initialized.");

    let log_routes = Router::new()
        .route("/", get(list_log_batches))
        .route("/upload", post(upload_log_batch))
        .route("/{id}", get(get_log_batch).delete(delete_log_batch))
        .route("/{id}/export", get(export_log_batch));
    let holiday_routes = Router::new()
        .route("/", get(list_holidays).post(create_holiday))
        .route("/{id}", delete(delete_holiday));
    let adjustment_routes = Router::new()
        .route("/", get(list_adjustments).post(create_adjustment))
        .route("/{id}", delete(delete_adjustment));
    let report_routes = Router::new()
        .route("/", post(create_report).get(list_reports))
        .route("/{id}", get(get_report).delete(delete_report))
        .route("/{id}/export/summary", get(export_report_summary))
        .route("/{id}/export/payroll", get(export_report_payroll))
        .route("/{id}/drilldown/{employee_id}", get(export_report_drilldown));
    let api_routes = Router::new()
        .nest("/logs", log_routes)
        .route("/settings", get(get_settings).put(update_settings))
        .nest("/holidays", holiday_routes)
        .nest("/adjustments", adjustment_routes)
        .nest("/reports", report_routes);

    let app = Router::new()
        .nest("/api", api_routes)
        .route("/status", get(handle_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match &config.tls {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| AppError::TlsConfig(format!("Failed to load TLS cert/key: {}", e)))?;
            info!("TLS configuration loaded.");
            info!("Starting server on https://{}", config.addr);
            axum_server::bind_rustls(config.addr, tls_config)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            info!("Starting server on http://{}", config.addr);
            axum_server::bind(config.addr)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }
    }

    Ok(())
}

/// CSV download response with the filename in Content-Disposition.
fn csv_response(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

// --- Web Handlers: Status ---

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let stats = state.store.stats()?;
    Ok(Json(StatusResponse {
        service: "pca-core",
        version: env!("CARGO_PKG_VERSION"),
        server_time: Utc::now(),
        store: stats,
    }))
}

// --- Web Handlers: Punch Logs ---

async fn upload_log_batch(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<LogBatchInfo>), AppError> {
    let outcome = parse_punch_csv(&body)?;
    let period = detect_period(&outcome.punches).ok_or(ReportError::NoPunches)?;
    let name = params
        .name
        .unwrap_or_else(|| format!("Upload {}", period.label()));
    let batch = state
        .store
        .save_log_batch(&name, period, outcome.punches, outcome.skipped_rows)?;
    info!("Stored punch log batch {} ({} rows).", batch.id, batch.row_count);
    Ok((StatusCode::CREATED, Json(batch.info())))
}

async fn list_log_batches(
    State(state): State<AppState>,
) -> Result<Json<Vec<LogBatchInfo>>, AppError> {
    Ok(Json(state.store.list_log_batches()?))
}

async fn get_log_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filter): Query<PunchFilter>,
) -> Result<Json<LogBatchDetail>, AppError> {
    let batch = state.store.load_log_batch(&id)?;
    let info = batch.info();
    let punches = if filter.is_empty() {
        batch.punches
    } else {
        filter_punches(&batch.punches, &filter)
    };
    let open_days = scan_open_days(&punches);
    Ok(Json(LogBatchDetail {
        info,
        punches,
        open_days,
    }))
}

async fn delete_log_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_log_batch(&id)?;
    info!("Deleted punch log batch {}.", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn export_log_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let batch = state.store.load_log_batch(&id)?;
    let csv = write_clean_csv(&batch.punches)?;
    let mut base = sanitize_filename(&batch.name);
    if base.is_empty() {
        base = batch.id.clone();
    }
    Ok(csv_response(&format!("{}_clean.csv", base), csv))
}

// --- Web Handlers: Settings ---

async fn get_settings(State(state): State<AppState>) -> Result<Json<AttendanceSettings>, AppError> {
    Ok(Json(state.store.load_settings()?))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<AttendanceSettings>,
) -> Result<Json<AttendanceSettings>, AppError> {
    if settings.normal_shift_hours <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "normalShiftHours must be positive".to_string(),
        ));
    }
    if settings.night_start == settings.night_end {
        return Err(AppError::BadRequest(
            "nightStart and nightEnd cannot be equal".to_string(),
        ));
    }
    if settings.transport_allowance < Decimal::ZERO
        || settings.attendance_allowance < Decimal::ZERO
    {
        return Err(AppError::BadRequest(
            "allowances cannot be negative".to_string(),
        ));
    }
    state.store.save_settings(&settings)?;
    info!("Attendance settings updated.");
    Ok(Json(settings))
}

// --- Web Handlers: Holidays ---

async fn list_holidays(State(state): State<AppState>) -> Result<Json<Vec<HolidayDoc>>, AppError> {
    Ok(Json(state.store.load_holidays()?))
}

async fn create_holiday(
    State(state): State<AppState>,
    Json(request): Json<CreateHolidayRequest>,
) -> Result<(StatusCode, Json<HolidayDoc>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "holiday name cannot be empty".to_string(),
        ));
    }
    let holiday = state.store.add_holiday(request.date, &request.name)?;
    Ok((StatusCode::CREATED, Json(holiday)))
}

async fn delete_holiday(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.remove_holiday(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Web Handlers: Adjustments ---

async fn list_adjustments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Adjustment>>, AppError> {
    Ok(Json(state.store.load_adjustments()?))
}

async fn create_adjustment(
    State(state): State<AppState>,
    Json(adjustment): Json<Adjustment>,
) -> Result<(StatusCode, Json<Adjustment>), AppError> {
    if adjustment.scope == AdjustmentScope::Employee && adjustment.employee_id.is_none() {
        return Err(AppError::BadRequest(
            "employee-scoped adjustments need an employeeId".to_string(),
        ));
    }
    if adjustment.hours < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "adjustment hours cannot be negative; use kind subtractHours".to_string(),
        ));
    }
    let stored = state.store.add_adjustment(adjustment)?;
    info!("Recorded payroll adjustment {}.", stored.id);
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn delete_adjustment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.remove_adjustment(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Web Handlers: Reports ---

async fn create_report(
    State(state): State<AppState>,
    Json(request): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<SavedReportInfo>), AppError> {
    let batch = state.store.load_log_batch(&request.batch_id)?;

    // Explicit period wins; otherwise the window detected at upload.
    let period = match (request.start, request.end) {
        (Some(start), Some(end)) => ReportPeriod::new(start, end)?,
        (None, None) => batch.period,
        _ => {
            return Err(AppError::BadRequest(
                "start and end must be given together".to_string(),
            ))
        }
    };

    let mut settings = state.store.load_settings()?;
    settings.holidays.extend(state.store.holiday_dates()?);
    let adjustments = state.store.load_adjustments()?;

    let report = summarize_period(&batch.punches, &settings, &adjustments, period)?;
    let title = request
        .title
        .unwrap_or_else(|| format!("Attendance {}", period.label()));
    let saved = state.store.save_report(&title, &batch.id, report)?;
    info!("Generated report {} from batch {}.", saved.id, batch.id);
    Ok((StatusCode::CREATED, Json(saved.info())))
}

async fn list_reports(
    State(state): State<AppState>,
) -> Result<Json<Vec<SavedReportInfo>>, AppError> {
    Ok(Json(state.store.list_reports()?))
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SavedReport>, AppError> {
    Ok(Json(state.store.load_report(&id)?))
}

async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_report(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_report_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let saved = state.store.load_report(&id)?;
    let csv = summary_csv(&saved.report)?;
    Ok(csv_response(&summary_filename(&saved.report.period), csv))
}

async fn export_report_payroll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let saved = state.store.load_report(&id)?;
    let csv = payroll_csv(&saved.report)?;
    Ok(csv_response(&payroll_filename(&saved.report.period), csv))
}

async fn export_report_drilldown(
    State(state): State<AppState>,
    Path((id, employee_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let saved = state.store.load_report(&id)?;
    let summary = saved
        .report
        .summary_for(&employee_id)
        .ok_or_else(|| StoreError::NotFound {
            what: "employee",
            id: employee_id.clone(),
        })?;
    let csv = drilldown_csv(&saved.report, summary)?;
    Ok(csv_response(
        &drilldown_filename(summary, &saved.report.period),
        csv,
    ))
}
