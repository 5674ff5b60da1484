//! The HTTP/WebSocket façade (spec.md §6). State is passed as an
//! explicit `axum::extract::State<AppState>` value rather than the
//! process-wide router singleton spec.md §9 flags as a redesign target.

mod error;
pub mod ws;

use crate::coordinator::Coordinator;
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use error::{ApiError, ApiResult};
use manager_api::query::{Request, Response as QueryResponse};
use manager_api::types::{Device, Product, Protocol};
use manager_api::Error;
use manager_bus::topic;
use manager_datastore::ExportFormat;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let state = AppState { coordinator };

    Router::new()
        .route("/protocols", get(list_protocols))
        .route("/protocols/:id", get(get_protocol))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/devices", get(list_devices).post(create_device))
        .route("/devices/:id", get(get_device).put(update_device).delete(delete_device))
        .route("/devices/:id/properties", get(watch_properties))
        .route("/devices/:id/properties/:pid", get(read_property).put(write_property))
        .route("/devices/:id/methods/:mid", post(call_method))
        .route("/devices/:id/events/:eid", get(watch_events))
        .route("/devices/:id/properties:history", post(properties_history))
        .route("/devices/:id/events:history", post(events_history))
        .route("/db/data:export", get(export_data))
        .route("/ms/topic:watch", get(watch_topic))
        .with_state(state)
}

// ---- protocols ---------------------------------------------------------

async fn list_protocols(State(state): State<AppState>) -> Json<Vec<Protocol>> {
    Json(state.coordinator.active_protocols().await)
}

async fn get_protocol(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Protocol>> {
    state
        .coordinator
        .protocol(&id)
        .await
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("no live protocol {id}")).into())
}

// ---- products -----------------------------------------------------------

#[derive(Deserialize)]
struct ProductsQuery {
    #[serde(rename = "protocol-id")]
    protocol_id: Option<String>,
}

async fn list_products(State(state): State<AppState>, Query(q): Query<ProductsQuery>) -> ApiResult<Json<Vec<Product>>> {
    let protocol_id = q.protocol_id.ok_or_else(|| Error::bad_request("missing protocol-id query parameter"))?;
    let products = state.coordinator.metastore().list_products(&protocol_id).await?;
    Ok(Json(products))
}

#[derive(Deserialize)]
struct NewProduct {
    id: String,
    protocol_id: String,
}

async fn create_product(State(state): State<AppState>, Json(body): Json<NewProduct>) -> ApiResult<Json<Product>> {
    let product = state.coordinator.create_product(&body.protocol_id, &body.id).await?;
    Ok(Json(product))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Product>> {
    Ok(Json(state.coordinator.metastore().get_product(&id).await?))
}

async fn update_product(State(state): State<AppState>, Path(id): Path<String>, Json(mut product): Json<Product>) -> ApiResult<StatusCode> {
    product.id = id;
    state.coordinator.update_product(product).await?;
    Ok(StatusCode::OK)
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.coordinator.delete_product(&id).await?;
    Ok(StatusCode::OK)
}

// ---- devices --------------------------------------------------------------

#[derive(Deserialize)]
struct DevicesQuery {
    #[serde(rename = "product-id")]
    product_id: Option<String>,
}

async fn list_devices(State(state): State<AppState>, Query(q): Query<DevicesQuery>) -> ApiResult<Json<Vec<Device>>> {
    let product_id = q.product_id.ok_or_else(|| Error::bad_request("missing product-id query parameter"))?;
    let devices = state.coordinator.metastore().list_devices(&product_id).await?;
    Ok(Json(devices))
}

#[derive(Deserialize)]
struct NewDevice {
    id: String,
    product_id: String,
}

async fn create_device(State(state): State<AppState>, Json(body): Json<NewDevice>) -> ApiResult<Json<Device>> {
    let device = state.coordinator.create_device(&body.product_id, &body.id).await?;
    Ok(Json(device))
}

async fn get_device(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Device>> {
    Ok(Json(state.coordinator.metastore().get_device(&id).await?))
}

async fn update_device(State(state): State<AppState>, Path(id): Path<String>, Json(mut device): Json<Device>) -> ApiResult<StatusCode> {
    device.id = id;
    let product = state.coordinator.metastore().get_product(&device.product_id).await?;
    state.coordinator.update_device(&product.protocol_id, device).await?;
    Ok(StatusCode::OK)
}

async fn delete_device(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let (protocol_id, _product_id) = state.coordinator.trace(&id).await?;
    state.coordinator.delete_device(&protocol_id, &id).await?;
    Ok(StatusCode::OK)
}

// ---- device properties / methods / events ----------------------------------

async fn watch_properties(State(state): State<AppState>, Path(device_id): Path<String>, ws: WebSocketUpgrade) -> ApiResult<Response> {
    let (protocol_id, product_id) = state.coordinator.trace(&device_id).await?;
    let sub = state
        .coordinator
        .service()
        .device_props(&protocol_id, &product_id, &device_id, topic::WILDCARD)
        .await?;

    Ok(ws.on_upgrade(move |socket| ws::relay(socket, Box::new(ws::PropsSource(sub)))).into_response())
}

#[derive(Deserialize)]
struct ReadQuery {
    #[serde(rename = "type", default = "default_read_type")]
    kind: String,
}

fn default_read_type() -> String {
    "soft".to_string()
}

async fn read_property(
    State(state): State<AppState>,
    Path((device_id, property_id)): Path<(String, String)>,
    Query(q): Query<ReadQuery>,
) -> ApiResult<Json<manager_api::types::device::Value>> {
    let (protocol_id, _product_id) = state.coordinator.trace(&device_id).await?;
    let value = match q.kind.as_str() {
        "soft" => state.coordinator.client().read(&protocol_id, &device_id, &property_id).await?,
        "hard" => state.coordinator.client().hard_read(&protocol_id, &device_id, &property_id).await?,
        other => return Err(Error::bad_request(format!("unknown read type {other}, expected soft or hard")).into()),
    };
    Ok(Json(value))
}

async fn write_property(
    State(state): State<AppState>,
    Path((device_id, property_id)): Path<(String, String)>,
    Json(body): Json<manager_api::types::DeviceDataMap>,
) -> ApiResult<StatusCode> {
    let (protocol_id, _product_id) = state.coordinator.trace(&device_id).await?;
    let data = body
        .get(&property_id)
        .ok_or_else(|| Error::bad_request(format!("request body has no entry for property {property_id}")))?;
    state
        .coordinator
        .client()
        .write(&protocol_id, &device_id, &property_id, data.value.clone())
        .await?;
    Ok(StatusCode::OK)
}

async fn call_method(
    State(state): State<AppState>,
    Path((device_id, method_id)): Path<(String, String)>,
    Json(args): Json<manager_api::types::DeviceDataMap>,
) -> ApiResult<Json<manager_api::types::DeviceDataMap>> {
    let (protocol_id, _product_id) = state.coordinator.trace(&device_id).await?;
    let result = state.coordinator.client().call_method(&protocol_id, &device_id, &method_id, args).await?;
    Ok(Json(result))
}

async fn watch_events(
    State(state): State<AppState>,
    Path((device_id, event_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let (protocol_id, product_id) = state.coordinator.trace(&device_id).await?;
    let sub = state
        .coordinator
        .service()
        .device_event(&protocol_id, &product_id, &device_id, &event_id)
        .await?;

    Ok(ws.on_upgrade(move |socket| ws::relay(socket, Box::new(ws::EventSource(sub)))).into_response())
}

// ---- history & export ------------------------------------------------------

async fn properties_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(mut req): Json<Request>,
) -> ApiResult<Json<QueryResponse>> {
    let (protocol_id, product_id) = state.coordinator.trace(&device_id).await?;
    if req.from.is_empty() {
        req.from = format!("{protocol_id}_{product_id}");
    }
    Ok(Json(state.coordinator.datastore().query(&req).await?))
}

async fn events_history(
    State(state): State<AppState>,
    Path(_device_id): Path<String>,
    Json(req): Json<Request>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.coordinator.datastore().query(&req).await?))
}

#[derive(Deserialize)]
struct ExportQuery {
    #[serde(rename = "export-format")]
    export_format: String,
    #[serde(rename = "raw-query")]
    raw_query: Option<String>,
}

async fn export_data(State(state): State<AppState>, Query(q): Query<ExportQuery>) -> ApiResult<Response> {
    let format = ExportFormat::parse(&q.export_format)?;
    let req = Request {
        raw: q.raw_query,
        ..Request::default()
    };
    let response = state.coordinator.datastore().query(&req).await?;

    let mut buf = Vec::new();
    state.coordinator.datastore().export(&response, format, &mut buf)?;

    let ext = match format {
        ExportFormat::ArrowParquet => "parquet",
        ExportFormat::Csv => "csv",
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"export.{ext}\""))
        .body(axum::body::Body::from(buf))
        .map_err(|e| Error::internal(format!("building export response: {e}")))?)
}

#[derive(Deserialize)]
struct TopicQuery {
    topic: String,
}

async fn watch_topic(State(state): State<AppState>, Query(q): Query<TopicQuery>, ws: WebSocketUpgrade) -> ApiResult<Response> {
    let sub = state.coordinator.bus().subscribe(&q.topic).await?;
    Ok(ws.on_upgrade(move |socket| ws::relay(socket, Box::new(ws::TopicSource(sub)))).into_response())
}
