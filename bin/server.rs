// Opsboard - Web Server
// JSON API over the monthly store with Axum

use axum::{
    extract::{
        multipart::{Multipart, MultipartError},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use opsboard::logging::init_logging;
use opsboard::{
    build_dashboard, cash_flow_report, import_workbook, pl_report, plan_fact_report,
    record_expenses, record_sales, seed_database, unit_economics, AppConfig, EntryError,
    ExpenseEntry, ImportConfig, ImportError, MonthlyStore, SalesEntry, SqliteStore, Workbook,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    import: Arc<ImportConfig>,
}

impl AppState {
    fn new(store: SqliteStore, import: ImportConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            import: Arc::new(import),
        }
    }

    /// A handler that panicked mid-request leaves the store usable
    fn store(&self) -> MutexGuard<'_, SqliteStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (StatusCode::OK, Json(ApiResponse { success: true, data })).into_response()
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "error": message })),
    )
        .into_response()
}

fn internal_error(what: &str, err: anyhow::Error) -> Response {
    error!(error = %format!("{:#}", err), "{} failed", what);
    failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err))
}

fn entry_error(err: EntryError) -> Response {
    match err {
        EntryError::MissingIds => failure(StatusCode::BAD_REQUEST, err.to_string()),
        EntryError::Store(e) => internal_error("data entry", e),
    }
}

fn respond<T: Serialize>(what: &str, result: anyhow::Result<T>) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => internal_error(what, e),
    }
}

#[derive(Deserialize)]
struct MonthlyQuery {
    period_id: Option<i64>,
}

#[derive(Deserialize)]
struct SettingUpdate {
    value: String,
    description: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok(serde_json::json!({ "status": "OK", "version": opsboard::VERSION }))
}

/// GET /api/dashboard - KPIs for the latest period
async fn get_dashboard(State(state): State<AppState>) -> Response {
    let store = state.store();
    match build_dashboard(&*store) {
        Ok(Some(summary)) => ApiResponse::ok(summary),
        Ok(None) => failure(StatusCode::NOT_FOUND, "No periods found".to_string()),
        Err(e) => internal_error("dashboard", e),
    }
}

/// GET /api/regions
async fn get_regions(State(state): State<AppState>) -> Response {
    respond("list regions", state.store().list_regions())
}

/// GET /api/periods
async fn get_periods(State(state): State<AppState>) -> Response {
    respond("list periods", state.store().list_periods())
}

/// GET /api/monthly?period_id= - Monthly rows of one period
async fn get_monthly(State(state): State<AppState>, Query(query): Query<MonthlyQuery>) -> Response {
    match query.period_id {
        Some(period_id) => respond("monthly data", state.store().monthly_for_period(period_id)),
        None => failure(StatusCode::BAD_REQUEST, "period_id is required".to_string()),
    }
}

/// GET /api/monthly/:region_id/:period_id/events - Data-entry history of one row
async fn get_monthly_events(
    State(state): State<AppState>,
    Path((region_id, period_id)): Path<(i64, i64)>,
) -> Response {
    let entity_id = format!("{}:{}", region_id, period_id);
    respond(
        "monthly events",
        state.store().events_for_entity("monthly_data", &entity_id),
    )
}

/// GET /api/events/:event_type - e.g. `import_completed`
async fn get_events(State(state): State<AppState>, Path(event_type): Path<String>) -> Response {
    respond("events", state.store().events_of_type(&event_type))
}

/// POST /api/sales
async fn post_sales(State(state): State<AppState>, Json(entry): Json<SalesEntry>) -> Response {
    match record_sales(&mut *state.store(), &entry) {
        Ok(row) => ApiResponse::ok(row),
        Err(e) => entry_error(e),
    }
}

/// POST /api/expenses
async fn post_expenses(State(state): State<AppState>, Json(entry): Json<ExpenseEntry>) -> Response {
    match record_expenses(&mut *state.store(), &entry) {
        Ok(row) => ApiResponse::ok(row),
        Err(e) => entry_error(e),
    }
}

/// First multipart field named `file`, as (file name, bytes)
async fn read_upload(multipart: &mut Multipart) -> Result<Option<(String, Vec<u8>)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok(Some((file_name, bytes.to_vec())));
    }
    Ok(None)
}

fn import_failure(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// POST /api/import - multipart upload with a `file` field (xlsx, xls, ods, csv or json)
async fn post_import(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let (file_name, bytes) = match read_upload(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return import_failure(StatusCode::BAD_REQUEST, "No file uploaded"),
        Err(e) => {
            warn!(error = %e, "malformed upload");
            return import_failure(e.status(), &e.body_text());
        }
    };
    info!(file = %file_name, size = bytes.len(), "workbook uploaded");

    let workbook = match Workbook::from_bytes(&file_name, bytes) {
        Ok(workbook) => workbook,
        Err(e) => {
            let err = ImportError::Failed(e);
            error!(error = %err, "workbook upload unreadable");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(err.to_response())).into_response();
        }
    };

    let mut store = state.store();
    match import_workbook(&workbook, &mut *store, &state.import) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(e.to_response())).into_response(),
    }
}

/// GET /api/reports/pl
async fn get_pl_report(State(state): State<AppState>) -> Response {
    respond("P&L report", pl_report(&*state.store()))
}

/// GET /api/reports/unit-economics
async fn get_unit_economics(State(state): State<AppState>) -> Response {
    respond("unit economics", unit_economics(&*state.store()))
}

/// GET /api/reports/cash-flow
async fn get_cash_flow(State(state): State<AppState>) -> Response {
    respond("cash flow", cash_flow_report(&*state.store()))
}

/// GET /api/reports/plan-fact
async fn get_plan_fact(State(state): State<AppState>) -> Response {
    respond("plan-fact", plan_fact_report(&*state.store()))
}

/// GET /api/settings/:key
async fn get_setting(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.store().read_setting(&key) {
        Ok(Some(setting)) => ApiResponse::ok(setting),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("Setting not found: {}", key)),
        Err(e) => internal_error("read setting", e),
    }
}

/// PUT /api/settings/:key
async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(update): Json<SettingUpdate>,
) -> Response {
    respond(
        "write setting",
        state
            .store()
            .write_setting(&key, &update.value, update.description.as_deref()),
    )
}

/// POST /api/seed
async fn post_seed(State(state): State<AppState>) -> Response {
    respond("seed", seed_database(&mut *state.store()))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/regions", get(get_regions))
        .route("/periods", get(get_periods))
        .route("/monthly", get(get_monthly))
        .route("/monthly/:region_id/:period_id/events", get(get_monthly_events))
        .route("/events/:event_type", get(get_events))
        .route("/sales", post(post_sales))
        .route("/expenses", post(post_expenses))
        .route("/import", post(post_import))
        .route("/reports/pl", get(get_pl_report))
        .route("/reports/unit-economics", get(get_unit_economics))
        .route("/reports/cash-flow", get(get_cash_flow))
        .route("/reports/plan-fact", get(get_plan_fact))
        .route("/settings/:key", get(get_setting).put(put_setting))
        .route("/seed", post(post_seed))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info", false);

    let config = AppConfig::load()?;
    let store = SqliteStore::open(&config.database_path)?;
    info!(path = %config.database_path.display(), "database opened");

    let app = router(AppState::new(store, config.import.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "server listening");
    println!("🚀 Opsboard API running on http://{}/api", config.bind_addr);
    println!("   Press Ctrl+C to stop");

    axum::serve(listener, app).await?;
    Ok(())
}
