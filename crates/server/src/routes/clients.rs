use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use democrm_api::service;
use democrm_api::{
    ClientListQuery, DuplicateField, Field, OkResponse, Record, ServiceError, TOTAL_COUNT_HEADER,
};
use democrm_core::query::query_page;

use super::auth::AuthUser;
use crate::error::ApiErr;
use crate::storage::ClientStore;

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/clients?_page=&_limit=&q=: one page of the filtered, name-sorted
/// collection. `X-Total-Count` carries the post-filter match count.
pub async fn list_clients(
    _user: AuthUser,
    State(store): State<ClientStore>,
    query: Result<Query<ClientListQuery>, QueryRejection>,
) -> Result<Response, ApiErr> {
    let Query(q) = query.map_err(|e| ApiErr::bad_request(e.body_text()))?;
    let req = q.to_page_request()?;

    let records = store.load().await.map_err(ApiErr::from_db("load clients"))?;
    let page = query_page(records, &req);

    tracing::debug!(
        cursor = req.cursor(),
        page_size = req.page_size(),
        filtered = req.filter().is_some(),
        total = page.total_matches,
        "list clients"
    );
    Ok(with_total_count(page.items, page.total_matches))
}

/// GET /api/clients/all: the whole collection, unfiltered and unpaginated.
pub async fn all_clients(
    _user: AuthUser,
    State(store): State<ClientStore>,
) -> Result<Response, ApiErr> {
    let records = store.load().await.map_err(ApiErr::from_db("load clients"))?;
    let total = records.len() as u64;
    Ok(with_total_count(records, total))
}

/// GET /api/clients/{id}
pub async fn get_client(
    _user: AuthUser,
    State(store): State<ClientStore>,
    Path(id): Path<String>,
) -> Result<Json<Record>, ApiErr> {
    store
        .load()
        .await
        .map_err(ApiErr::from_db("load clients"))?
        .into_iter()
        .find(|r| r.id == id)
        .map(Json)
        .ok_or_else(|| ApiErr::not_found(format!("client {id} not found")))
}

fn with_total_count(records: Vec<Record>, total: u64) -> Response {
    let mut resp = Json(records).into_response();
    resp.headers_mut().insert(
        HeaderName::from_static(TOTAL_COUNT_HEADER),
        HeaderValue::from(total),
    );
    resp
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// POST /api/clients: validate, check uniqueness, append. An empty id is
/// replaced with a fresh UUID.
pub async fn create_client(
    _user: AuthUser,
    State(store): State<ClientStore>,
    payload: Result<Json<Record>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), ApiErr> {
    let Json(record) = payload.map_err(|e| ApiErr::bad_request(e.body_text()))?;
    let mut record = service::prepare_record(record)?;
    if record.id.trim().is_empty() {
        record.id = Uuid::new_v4().to_string();
    }

    let created = store
        .mutate(|clients| {
            if clients.iter().any(|c| c.id == record.id) {
                return Err(ServiceError::Duplicate(DuplicateField {
                    field: Field::Id,
                    conflicting_id: record.id.clone(),
                }));
            }
            service::ensure_unique(clients, &record)?;
            clients.push(record.clone());
            Ok(record)
        })
        .await?;

    tracing::info!(id = %created.id, "client created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/clients/{id}: replace a record. The path id wins over any id in
/// the body.
pub async fn update_client(
    _user: AuthUser,
    State(store): State<ClientStore>,
    Path(id): Path<String>,
    payload: Result<Json<Record>, JsonRejection>,
) -> Result<Json<Record>, ApiErr> {
    let Json(mut record) = payload.map_err(|e| ApiErr::bad_request(e.body_text()))?;
    record.id = id;
    let record = service::prepare_record(record)?;

    let updated = store
        .mutate(|clients| {
            let slot = clients
                .iter()
                .position(|c| c.id == record.id)
                .ok_or_else(|| ServiceError::NotFound(format!("client {} not found", record.id)))?;
            service::ensure_unique(clients, &record)?;
            clients[slot] = record.clone();
            Ok(record)
        })
        .await?;

    tracing::info!(id = %updated.id, "client updated");
    Ok(Json(updated))
}

/// DELETE /api/clients/{id}
pub async fn delete_client(
    _user: AuthUser,
    State(store): State<ClientStore>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    store
        .mutate(|clients| {
            let slot = clients
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| ServiceError::NotFound(format!("client {id} not found")))?;
            clients.remove(slot);
            Ok(())
        })
        .await?;

    tracing::info!(%id, "client deleted");
    Ok(Json(OkResponse { ok: true }))
}
