use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::catalog::{
    CatalogError, ClusterTemplate, HardwareType, ImageType, Provider, Service,
};
use crate::cluster::{Cluster, ClusterRequest, ClusterStoreError, Node};
use crate::layout::{solve_cluster_nodes, SolverError};
use crate::server::state::AppState;
use crate::task::{
    plan_provision_tasks, AttemptStatus, ClusterTask, FinishOutcome, PlannerError, TaskError,
    TaskHandoff,
};

// ============================================================================
// Error mapping
// ============================================================================

/// A handler error carrying the HTTP status it maps to. Solver and catalog
/// validation problems are the caller's fault (400), lookups that miss are
/// 404, and worker protocol violations are 409.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<SolverError> for ApiError {
    fn from(err: SolverError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let status = match err {
            CatalogError::InvalidEntity(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::NOT_FOUND,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        let status = match err {
            TaskError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<ClusterStoreError> for ApiError {
    fn from(err: ClusterStoreError) -> Self {
        let status = match err {
            ClusterStoreError::ClusterNotFound(_) => StatusCode::NOT_FOUND,
            ClusterStoreError::ClusterExists(_) => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<PlannerError> for ApiError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::Catalog(e) => e.into(),
            PlannerError::Task(e) => e.into(),
        }
    }
}

#[derive(Serialize)]
struct Ack {
    success: bool,
}

const ACK: Ack = Ack { success: true };

// ============================================================================
// Catalog CRUD
// ============================================================================

pub async fn write_provider(
    State(state): State<AppState>,
    Json(provider): Json<Provider>,
) -> impl IntoResponse {
    state.catalog.write_provider(provider);
    Json(ACK)
}

pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.list_providers())
}

pub async fn get_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Provider>, ApiError> {
    state
        .catalog
        .get_provider(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Provider '{}' not found", name)))
}

pub async fn delete_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.catalog.delete_provider(&name)?;
    Ok(Json(ACK))
}

pub async fn write_hardware_type(
    State(state): State<AppState>,
    Json(hardware_type): Json<HardwareType>,
) -> impl IntoResponse {
    state.catalog.write_hardware_type(hardware_type);
    Json(ACK)
}

pub async fn list_hardware_types(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.list_hardware_types())
}

pub async fn get_hardware_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<HardwareType>, ApiError> {
    state
        .catalog
        .get_hardware_type(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Hardware type '{}' not found", name)))
}

pub async fn delete_hardware_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.catalog.delete_hardware_type(&name)?;
    Ok(Json(ACK))
}

pub async fn write_image_type(
    State(state): State<AppState>,
    Json(image_type): Json<ImageType>,
) -> impl IntoResponse {
    state.catalog.write_image_type(image_type);
    Json(ACK)
}

pub async fn list_image_types(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.list_image_types())
}

pub async fn get_image_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ImageType>, ApiError> {
    state
        .catalog
        .get_image_type(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Image type '{}' not found", name)))
}

pub async fn delete_image_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.catalog.delete_image_type(&name)?;
    Ok(Json(ACK))
}

pub async fn write_service(
    State(state): State<AppState>,
    Json(service): Json<Service>,
) -> impl IntoResponse {
    state.catalog.write_service(service);
    Json(ACK)
}

pub async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.list_services())
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Service>, ApiError> {
    state
        .catalog
        .get_service(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Service '{}' not found", name)))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.catalog.delete_service(&name)?;
    Ok(Json(ACK))
}

pub async fn write_template(
    State(state): State<AppState>,
    Json(template): Json<ClusterTemplate>,
) -> Result<Json<Ack>, ApiError> {
    state.catalog.write_template(template)?;
    Ok(Json(ACK))
}

pub async fn list_templates(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.list_templates())
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClusterTemplate>, ApiError> {
    state
        .catalog
        .get_template(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Cluster template '{}' not found", name)))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.catalog.delete_template(&name)?;
    Ok(Json(ACK))
}

// ============================================================================
// Clusters
// ============================================================================

#[derive(Serialize)]
pub struct ClusterResponse {
    pub cluster: Cluster,
    pub nodes: Vec<Node>,
}

/// Create a cluster: solve the layout, commit it, and queue the
/// provisioning tasks for workers. Solver failures return 400 with zero
/// nodes committed.
pub async fn create_cluster(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ClusterRequest>,
) -> Result<(StatusCode, Json<ClusterResponse>), ApiError> {
    let owner = headers
        .get("x-corral-user")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("admin")
        .to_string();

    let id = state.next_cluster_id();
    let lock = state.clusters.lock_for(&id);
    let _guard = lock.lock().await;

    let snapshot = state.catalog.snapshot();

    let mut cluster = Cluster::new(id.clone(), owner, request.name.clone());
    cluster.description = request.description.clone();
    cluster.cluster_template = Some(request.cluster_template.clone());
    cluster.provider = request.provider.clone().or_else(|| {
        snapshot
            .template(&request.cluster_template)
            .ok()
            .and_then(|t| t.defaults.provider.clone())
    });

    let nodes = solve_cluster_nodes(&cluster, &request, &snapshot)?;
    cluster.services = nodes
        .values()
        .flat_map(|n| n.services.iter().cloned())
        .collect();
    cluster.nodes = nodes.keys().cloned().collect();

    let planned = plan_provision_tasks(&cluster, &nodes, &snapshot, state.registry())?;

    state.clusters.insert_cluster(cluster.clone())?;
    state.clusters.commit_nodes(&id, &nodes);
    for task in &planned {
        state.scheduler.enqueue(&task.id)?;
    }

    info!(
        cluster = %id,
        nodes = nodes.len(),
        tasks = planned.len(),
        "Cluster created and queued for provisioning"
    );

    let response = ClusterResponse {
        cluster,
        nodes: nodes.into_values().collect(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_clusters(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.clusters.list_clusters())
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClusterResponse>, ApiError> {
    let cluster = state
        .clusters
        .get_cluster(&id)
        .ok_or_else(|| ApiError::not_found(format!("Cluster '{}' not found", id)))?;
    let nodes = state.clusters.list_nodes(&id);
    Ok(Json(ClusterResponse { cluster, nodes }))
}

/// Delete a cluster: abandon its outstanding tasks so workers stop getting
/// them, then drop the cluster and its nodes.
pub async fn delete_cluster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let lock = state.clusters.lock_for(&id);
    let _guard = lock.lock().await;

    state.scheduler.abandon_cluster(&id);
    state.clusters.delete_cluster(&id)?;
    info!(cluster = %id, "Cluster deleted");
    Ok(Json(ACK))
}

pub async fn list_cluster_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ClusterTask>>, ApiError> {
    if state.clusters.get_cluster(&id).is_none() {
        return Err(ApiError::not_found(format!("Cluster '{}' not found", id)));
    }
    Ok(Json(state.registry().list_for_cluster(&id)))
}

// ============================================================================
// Worker task protocol
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct TakeRequest {
    /// Worker-supplied identity; assigned when absent
    #[serde(rename = "workerId")]
    #[serde(default)]
    pub worker_id: Option<String>,
}

#[derive(Serialize)]
pub struct TakeResponse {
    #[serde(rename = "workerId")]
    pub worker_id: String,
    #[serde(flatten)]
    pub handoff: TaskHandoff,
}

/// A worker polls for its next task. 204 when the queue is empty.
pub async fn take_task(
    State(state): State<AppState>,
    Json(request): Json<TakeRequest>,
) -> Result<Response, ApiError> {
    let worker_id = request
        .worker_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match state.scheduler.take()? {
        Some(handoff) => {
            info!(worker = %worker_id, task = %handoff.task_id, "Task taken");
            Ok(Json(TakeResponse { worker_id, handoff }).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "statusCode")]
    #[serde(default)]
    pub status_code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A worker reports mid-flight progress on its current attempt.
pub async fn progress_task(
    State(state): State<AppState>,
    Json(request): Json<ProgressRequest>,
) -> Result<Json<Ack>, ApiError> {
    state
        .scheduler
        .progress(&request.task_id, request.status_code, request.message)?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
pub struct FinishRequest {
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Terminal status: COMPLETE or FAILED
    pub status: AttemptStatus,
    #[serde(rename = "statusCode")]
    #[serde(default)]
    pub status_code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct FinishResponse {
    pub success: bool,
    pub outcome: FinishOutcome,
}

/// A worker reports a terminal result; the scheduler decides retry,
/// rollback or abandonment.
pub async fn finish_task(
    State(state): State<AppState>,
    Json(request): Json<FinishRequest>,
) -> Result<Json<FinishResponse>, ApiError> {
    let outcome = state.scheduler.finish(
        &request.task_id,
        request.status,
        request.status_code,
        request.message,
    )?;
    Ok(Json(FinishResponse {
        success: true,
        outcome,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClusterTask>, ApiError> {
    state
        .registry()
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Task '{}' not found", id)))
}

// ============================================================================
// Health and status
// ============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Serialize)]
struct ServerStatus {
    providers: usize,
    #[serde(rename = "hardwareTypes")]
    hardware_types: usize,
    #[serde(rename = "imageTypes")]
    image_types: usize,
    services: usize,
    templates: usize,
    clusters: usize,
    #[serde(rename = "queuedTasks")]
    queued_tasks: usize,
}

/// Server status endpoint
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = ServerStatus {
        providers: state.catalog.list_providers().len(),
        hardware_types: state.catalog.list_hardware_types().len(),
        image_types: state.catalog.list_image_types().len(),
        services: state.catalog.list_services().len(),
        templates: state.catalog.list_templates().len(),
        clusters: state.clusters.list_clusters().len(),
        queued_tasks: state.scheduler.queued_len(),
    };
    Json(status)
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/status", get(status))
        .route(
            "/v1/corral/providers",
            get(list_providers).post(write_provider),
        )
        .route(
            "/v1/corral/providers/{name}",
            get(get_provider).delete(delete_provider),
        )
        .route(
            "/v1/corral/hardwaretypes",
            get(list_hardware_types).post(write_hardware_type),
        )
        .route(
            "/v1/corral/hardwaretypes/{name}",
            get(get_hardware_type).delete(delete_hardware_type),
        )
        .route(
            "/v1/corral/imagetypes",
            get(list_image_types).post(write_image_type),
        )
        .route(
            "/v1/corral/imagetypes/{name}",
            get(get_image_type).delete(delete_image_type),
        )
        .route(
            "/v1/corral/services",
            get(list_services).post(write_service),
        )
        .route(
            "/v1/corral/services/{name}",
            get(get_service).delete(delete_service),
        )
        .route(
            "/v1/corral/clustertemplates",
            get(list_templates).post(write_template),
        )
        .route(
            "/v1/corral/clustertemplates/{name}",
            get(get_template).delete(delete_template),
        )
        .route(
            "/v1/corral/clusters",
            get(list_clusters).post(create_cluster),
        )
        .route(
            "/v1/corral/clusters/{id}",
            get(get_cluster).delete(delete_cluster),
        )
        .route("/v1/corral/clusters/{id}/tasks", get(list_cluster_tasks))
        .route("/v1/corral/tasks/take", post(take_task))
        .route("/v1/corral/tasks/progress", post(progress_task))
        .route("/v1/corral/tasks/finish", post(finish_task))
        .route("/v1/corral/tasks/{id}", get(get_task))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
