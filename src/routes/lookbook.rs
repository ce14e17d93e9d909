use super::{AppError, AppJson};
use crate::{
    archetype::Archetype,
    compose::Compositor,
    generation::{run_generation, GenerationStore, ImageData, ItemStatus},
    state::{AppState, RunRecord},
};
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use utoipa::ToSchema;
use uuid::Uuid;

const OPENAPI_TAG: &str = "Lookbook";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRunPayload {
    /// Source photo, sent to the remote generator once per archetype.
    image: ImageData,
    /// Archetypes to generate. Defaults to the full set.
    #[serde(default)]
    archetypes: Option<Vec<Archetype>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunResponse {
    id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunStatus {
    id: Uuid,
    #[schema(value_type = HashMap<String, ItemStatus>)]
    items: HashMap<Archetype, ItemStatus>,
}

/// Start a run
///
/// Dispatch one generation request per archetype for the uploaded photo
/// and return the run id to poll.
#[utoipa::path(
    post,
    path = "/lookbook",
    request_body(content=CreateRunPayload, content_type="application/json"),
    responses((
        status = OK,
        body = RunResponse
    ), (
        status = BAD_REQUEST,
        description = "Unreadable source image or duplicate archetypes.",
        body = String
    )),
    security(("basic_auth" = [])),
    tag = OPENAPI_TAG
)]
pub async fn create_run(
    State(app_state): State<Arc<AppState>>,
    AppJson(data): AppJson<CreateRunPayload>,
) -> Result<AppJson<RunResponse>, AppError> {
    // Reject unreadable uploads before any remote call is dispatched.
    image::load_from_memory(&data.image.data)
        .map_err(|error| AppError::BadRequest(format!("cannot decode source image: {error}")))?;

    let archetypes = data.archetypes.unwrap_or_else(|| Archetype::ALL.to_vec());
    let store = Arc::new(GenerationStore::new());
    store.initialize(&archetypes).await?;

    let record = RunRecord::new(data.image, store.clone(), archetypes.clone());
    let source = record.source();
    let id = app_state.runs().write().await.add(record);

    let client = app_state.client();
    let policy = app_state.retry_policy();
    let worker_count = app_state.config().worker_count;
    tokio::spawn(async move {
        run_generation(store, client, policy, source, archetypes, worker_count).await;
    });

    Ok(AppJson(RunResponse { id }))
}

/// Check a run
///
/// Per-archetype status of a run, with image payloads stripped.
#[utoipa::path(
    get,
    path = "/lookbook/{id}",
    responses((
        status = OK,
        body = RunStatus
    ), (
        status = NOT_FOUND,
        description = "Run not found.",
        body = String
    )),
    security(("basic_auth" = [])),
    tag = OPENAPI_TAG
)]
pub async fn check_run(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<AppJson<RunStatus>, AppError> {
    let record = find_run(&app_state, &id).await?;
    let snapshot = record.store().snapshot().await;
    let items = snapshot
        .into_iter()
        .map(|(archetype, status)| (archetype, status.without_payload()))
        .collect();
    Ok(AppJson(RunStatus { id, items }))
}

/// Regenerate one archetype
///
/// Reset a finished or failed archetype back to pending and dispatch a
/// fresh attempt. Rejected while an attempt is still in flight.
#[utoipa::path(
    post,
    path = "/lookbook/{id}/regenerate/{archetype}",
    responses((
        status = OK,
        body = RunResponse
    ), (
        status = NOT_FOUND,
        description = "Run or archetype not found.",
        body = String
    ), (
        status = CONFLICT,
        description = "An attempt for this archetype is already in flight.",
        body = String
    )),
    security(("basic_auth" = [])),
    tag = OPENAPI_TAG
)]
pub async fn regenerate_item(
    State(app_state): State<Arc<AppState>>,
    Path((id, archetype)): Path<(Uuid, String)>,
) -> Result<AppJson<RunResponse>, AppError> {
    let archetype: Archetype = archetype
        .parse()
        .map_err(|error: crate::archetype::UnknownArchetype| AppError::BadRequest(error.to_string()))?;

    let record = find_run(&app_state, &id).await?;
    let store = record.store();
    store.reset(archetype).await?;

    let source = record.source();
    let client = app_state.client();
    let policy = app_state.retry_policy();
    tokio::spawn(async move {
        run_generation(store, client, policy, source, vec![archetype], 1).await;
    });

    Ok(AppJson(RunResponse { id }))
}

/// Download one image
///
/// The generated image for a single archetype, as soon as that archetype
/// is done. Unlike the composed page, this does not wait for the
/// rest of the run.
#[utoipa::path(
    get,
    path = "/lookbook/{id}/image/{archetype}",
    responses((
        status = OK,
        description = "The generated image bytes.",
        body = Vec<u8>,
        content_type = "image/png"
    ), (
        status = NOT_FOUND,
        description = "Run or archetype not found.",
        body = String
    ), (
        status = CONFLICT,
        description = "This archetype has not finished.",
        body = String
    )),
    security(("basic_auth" = [])),
    tag = OPENAPI_TAG
)]
pub async fn download_item(
    State(app_state): State<Arc<AppState>>,
    Path((id, archetype)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let archetype: Archetype = archetype
        .parse()
        .map_err(|error: crate::archetype::UnknownArchetype| AppError::BadRequest(error.to_string()))?;

    let record = find_run(&app_state, &id).await?;
    match record.store().get(archetype).await {
        Some(ItemStatus::Done(image)) => Ok((
            [(header::CONTENT_TYPE, image.media_type)],
            image.data,
        )),
        Some(ItemStatus::Error(message)) => Err(AppError::Conflict(format!(
            "archetype '{archetype}' failed: {message}"
        ))),
        Some(_) => Err(AppError::Conflict(format!(
            "archetype '{archetype}' has not finished"
        ))),
        None => Err(AppError::NotFoundError(anyhow::anyhow!(
            "archetype '{archetype}' is not part of this run"
        ))),
    }
}

/// Render the page
///
/// Compose the original photo and every generated image into one A4
/// portrait JPEG. Available only once every archetype is done.
#[utoipa::path(
    get,
    path = "/lookbook/{id}/page",
    responses((
        status = OK,
        description = "The composed page as a JPEG.",
        body = Vec<u8>,
        content_type = "image/jpeg"
    ), (
        status = NOT_FOUND,
        description = "Run not found.",
        body = String
    ), (
        status = CONFLICT,
        description = "Not every archetype is done yet.",
        body = String
    )),
    security(("basic_auth" = [])),
    tag = OPENAPI_TAG
)]
pub async fn render_page(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = find_run(&app_state, &id).await?;
    let store = record.store();

    let Some(images) = store.done_images().await else {
        let snapshot = store.snapshot().await;
        let done = snapshot
            .values()
            .filter(|status| matches!(status, ItemStatus::Done(_)))
            .count();
        return Err(AppError::Conflict(format!(
            "page needs every archetype done, have {done} of {}",
            snapshot.len()
        )));
    };

    let mut panels: Vec<(String, ImageData)> = Vec::with_capacity(images.len() + 1);
    panels.push(("original".to_string(), record.source().as_ref().clone()));
    for (archetype, image) in images {
        panels.push((archetype.label().to_string(), image));
    }

    let font_path = app_state.config().caption_font_path.clone();
    let font_bytes = tokio::fs::read(&font_path).await.map_err(|error| {
        AppError::InternalServerError(anyhow::anyhow!(
            "cannot read caption font '{font_path}': {error}"
        ))
    })?;

    // Rendering a full A4 canvas on the CPU takes long enough to move off
    // the async runtime.
    let page = tokio::task::spawn_blocking(move || {
        let compositor = Compositor::new(font_bytes);
        compositor.compose(&panels, &mut rand::rng())
    })
    .await
    .map_err(|error| AppError::InternalServerError(error.into()))??;

    Ok((
        [(header::CONTENT_TYPE, page.media_type.clone())],
        page.data,
    ))
}

async fn find_run(app_state: &AppState, id: &Uuid) -> Result<RunRecord, AppError> {
    let runs = app_state.runs();
    let runs = runs.read().await;
    runs.get(id)
        .cloned()
        .ok_or_else(|| AppError::NotFoundError(anyhow::anyhow!("run not found")))
}

pub fn lookbook_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_run))
        .route("/:id", get(check_run))
        .route("/:id/regenerate/:archetype", post(regenerate_item))
        .route("/:id/image/:archetype", get(download_item))
        .route("/:id/page", get(render_page))
}
