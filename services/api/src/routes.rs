//! API service routes

use std::collections::HashMap;

use auth::{
    Claims,
    models::{LoginCredentials, NewUser},
};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    middleware::dispatch,
    models::{
        Page,
        catalog::{CatalogItem, Movie},
    },
    query::{CatalogQuery, Resource},
    state::AppState,
};

/// Create the router for the API service
///
/// The pipeline wraps the fallback as well, so unmatched paths are logged
/// and, under `/api`, still rate limited and key checked.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/protected", get(protected))
        .route("/api/movies", get(list_movies))
        .route("/api/movies/:id", get(get_movie))
        .route("/api/tvshows", get(list_tv_shows))
        .route("/api/actors", get(list_actors))
        .route("/api/directors", get(list_directors))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), dispatch))
        .with_state(state)
}

/// Liveness probe
pub async fn root() -> &'static str {
    "Catalog API is running..."
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.catalog.ping().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "service": "catalog-api",
            "database": if database { "connected" } else { "unreachable" },
        })),
    )
}

/// Register a new user
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<NewUser>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let user = state.authenticator.register(payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

/// Exchange email and password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(credentials), _): WithRejection<Json<LoginCredentials>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let token = state.authenticator.login(credentials).await?;
    Ok(Json(json!({ "token": token })))
}

pub async fn protected(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    info!("User {} accessed the protected route", claims.user_id);
    Json(json!({
        "message": "Access granted",
        "userId": claims.user_id,
    }))
}

async fn list(
    state: &AppState,
    resource: Resource,
    params: &HashMap<String, String>,
) -> ApiResult<Json<Page<CatalogItem>>> {
    let query = CatalogQuery::from_params(resource, params)?;
    let (data, total_results) = state.catalog.list(&query).await?;

    Ok(Json(Page {
        page: query.page,
        limit: query.limit,
        total_results,
        data,
    }))
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Page<CatalogItem>>> {
    list(&state, Resource::Movies, &params).await
}

pub async fn list_tv_shows(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Page<CatalogItem>>> {
    list(&state, Resource::TvShows, &params).await
}

pub async fn list_actors(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Page<CatalogItem>>> {
    list(&state, Resource::Actors, &params).await
}

pub async fn list_directors(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Page<CatalogItem>>> {
    list(&state, Resource::Directors, &params).await
}

/// Get a movie by ID
pub async fn get_movie(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i32>, ApiError>,
) -> ApiResult<Json<Movie>> {
    state
        .catalog
        .find_movie(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Movie not found".to_string()))
}

/// Fallback for unmatched routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
