//! HTTP surface for the tracking service
//!
//! Hand-rolled routing over hyper http1, one spawned task per
//! connection. JSON endpoints cover ingest, snapshots and health; the
//! stream endpoints hand the connection to a `StreamSession` whose
//! frames are fed through a bounded channel into a streaming body.

use crate::domain::{epoch_ms, EventType};
use crate::infra::{Audience, Config, EventBus};
use crate::io::sse::{StreamSession, LOCATION_EVENTS};
use crate::services::booking::{BookingRoute, InMemoryBookingDirectory};
use crate::services::ingest::{IngestOutcome, LocationIngestCoordinator};
use crate::services::location_store::LocationStore;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{error, info, warn};

type ResponseBody = BoxBody<Bytes, Infallible>;

/// Process-wide singletons, constructed once at startup and passed into
/// request handling explicitly so tests can build isolated instances.
pub struct AppContext {
    pub store: Arc<LocationStore>,
    pub bus: Arc<EventBus>,
    pub coordinator: Arc<LocationIngestCoordinator>,
    /// Dev/test stand-in for the external booking store, reachable via
    /// `PUT /api/bookings/{id}/route`
    pub directory: Arc<InMemoryBookingDirectory>,
    pub heartbeat: Duration,
}

#[derive(Debug, Deserialize)]
struct TrackingRequest {
    technician_id: String,
    booking_id: String,
}

fn json_response(status: StatusCode, body: &Value) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())).boxed())
        .expect("static response should not fail")
}

fn error_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
    json_response(status, &json!({ "error": message }))
}

fn not_found() -> Response<ResponseBody> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Subscribe, spawn the stream session and wire its frames into a
/// streaming response body. Dropping the response body ends the session.
fn sse_response(
    ctx: &AppContext,
    audience: Audience,
    scope: &str,
    filter: Option<&'static [EventType]>,
    shutdown: watch::Receiver<bool>,
) -> Response<ResponseBody> {
    let sub = ctx.bus.subscribe(audience, scope);
    let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(32);

    let session = StreamSession::new(sub, frame_tx, ctx.heartbeat, filter);
    tokio::spawn(session.run(shutdown));

    let stream = futures::stream::unfold(frame_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(Frame::data(chunk)), rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(StreamBody::new(stream).boxed())
        .expect("static response should not fail")
}

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<ResponseBody>> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Failed to read request body"))?;
    serde_json::from_slice(&body.to_bytes())
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid request body"))
}

async fn handle_ingest(
    ctx: &AppContext,
    req: Request<Incoming>,
) -> Response<ResponseBody> {
    let report = match read_json(req).await {
        Ok(report) => report,
        Err(response) => return response,
    };

    match ctx.coordinator.ingest(&report).await {
        Ok(IngestOutcome::Accepted { presence, distance_m, arrived }) => json_response(
            StatusCode::OK,
            &json!({
                "status": "success",
                "message": "Location updated",
                "technician_id": presence.technician_id,
                "booking_id": presence.booking_id,
                "distance": distance_m,
                "arrived": arrived,
            }),
        ),
        Ok(IngestOutcome::Throttled { presence }) => json_response(
            StatusCode::OK,
            &json!({
                "status": "throttled",
                "message": "Location received but throttled (update too frequent)",
                "technician_id": presence.technician_id,
                "booking_id": presence.booking_id,
            }),
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn handle_tracking_start(
    ctx: &AppContext,
    req: Request<Incoming>,
) -> Response<ResponseBody> {
    let body: TrackingRequest = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    if body.technician_id.is_empty() || body.booking_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing technician_id or booking_id");
    }

    match ctx.coordinator.start_tracking(&body.technician_id, &body.booking_id).await {
        Ok(()) => json_response(StatusCode::OK, &json!({ "status": "Tracking started" })),
        Err(e) => {
            warn!(booking_id = %body.booking_id, error = %e, "tracking_start_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn handle_tracking_stop(
    ctx: &AppContext,
    req: Request<Incoming>,
) -> Response<ResponseBody> {
    let body: TrackingRequest = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    if body.technician_id.is_empty() || body.booking_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing technician_id or booking_id");
    }

    ctx.coordinator.stop_tracking(&body.technician_id, &body.booking_id);
    json_response(StatusCode::OK, &json!({ "status": "Tracking stopped" }))
}

fn handle_get_location(ctx: &AppContext, technician_id: &str) -> Response<ResponseBody> {
    match ctx.store.get(technician_id) {
        Some(presence) => json_response(
            StatusCode::OK,
            &serde_json::to_value(&presence).unwrap_or(Value::Null),
        ),
        None => error_response(StatusCode::NOT_FOUND, "Technician location not found"),
    }
}

fn handle_list_locations(ctx: &AppContext) -> Response<ResponseBody> {
    let technicians = ctx.store.list_active();
    json_response(
        StatusCode::OK,
        &json!({
            "count": technicians.len(),
            "technicians": technicians,
        }),
    )
}

fn handle_booking_location(ctx: &AppContext, booking_id: &str) -> Response<ResponseBody> {
    let technicians = ctx.store.list_by_booking(booking_id);
    match technicians.first() {
        Some(presence) => json_response(
            StatusCode::OK,
            &serde_json::to_value(presence).unwrap_or(Value::Null),
        ),
        None => error_response(StatusCode::NOT_FOUND, "No technician assigned to this booking"),
    }
}

fn handle_health(ctx: &AppContext) -> Response<ResponseBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "service": "location-tracker",
            "status": "healthy",
            "active_technicians": ctx.store.list_active().len(),
            "timestamp": epoch_ms(),
        }),
    )
}

fn handle_bus_stats(ctx: &AppContext) -> Response<ResponseBody> {
    let stats = ctx.bus.stats();
    json_response(StatusCode::OK, &serde_json::to_value(stats).unwrap_or(Value::Null))
}

async fn handle_route_upsert(
    ctx: &AppContext,
    booking_id: &str,
    req: Request<Incoming>,
) -> Response<ResponseBody> {
    let route: BookingRoute = match read_json(req).await {
        Ok(route) => route,
        Err(response) => return response,
    };
    ctx.directory.upsert(booking_id, route);
    json_response(StatusCode::OK, &json!({ "status": "ok" }))
}

async fn handle_request(
    req: Request<Incoming>,
    ctx: Arc<AppContext>,
    shutdown: watch::Receiver<bool>,
) -> Result<Response<ResponseBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/api/location") => handle_ingest(&ctx, req).await,
        (&Method::POST, "/api/tracking/start") => handle_tracking_start(&ctx, req).await,
        (&Method::POST, "/api/tracking/stop") => handle_tracking_stop(&ctx, req).await,
        (&Method::GET, "/api/locations") => handle_list_locations(&ctx),
        (&Method::GET, "/api/health/location") => handle_health(&ctx),
        (&Method::GET, "/api/admin/events/stats") => handle_bus_stats(&ctx),
        (&Method::GET, "/api/admin/locations/stream") => {
            sse_response(&ctx, Audience::Admin, "", Some(LOCATION_EVENTS), shutdown)
        }
        (&Method::GET, path) => route_get_with_params(&ctx, path, shutdown),
        (&Method::PUT, path) => match path
            .strip_prefix("/api/bookings/")
            .and_then(|rest| rest.strip_suffix("/route"))
        {
            Some(booking_id) if !booking_id.is_empty() && !booking_id.contains('/') => {
                handle_route_upsert(&ctx, booking_id, req).await
            }
            _ => not_found(),
        },
        _ => not_found(),
    };

    Ok(response)
}

/// GET routes with a path parameter in the middle or tail
fn route_get_with_params(
    ctx: &AppContext,
    path: &str,
    shutdown: watch::Receiver<bool>,
) -> Response<ResponseBody> {
    if let Some(technician_id) = path.strip_prefix("/api/location/") {
        if !technician_id.is_empty() && !technician_id.contains('/') {
            return handle_get_location(ctx, technician_id);
        }
    }

    if let Some(rest) = path.strip_prefix("/api/bookings/") {
        if let Some(booking_id) = rest.strip_suffix("/tech-location") {
            if !booking_id.is_empty() && !booking_id.contains('/') {
                return handle_booking_location(ctx, booking_id);
            }
        }
        if let Some(booking_id) = rest.strip_suffix("/location/stream") {
            if !booking_id.is_empty() && !booking_id.contains('/') {
                return sse_response(
                    ctx,
                    Audience::Customer,
                    booking_id,
                    Some(LOCATION_EVENTS),
                    shutdown,
                );
            }
        }
    }

    if let Some(rest) = path.strip_prefix("/api/tech/") {
        if let Some(technician_id) = rest.strip_suffix("/events/stream") {
            if !technician_id.is_empty() && !technician_id.contains('/') {
                // Technicians get their full event feed, unfiltered
                return sse_response(ctx, Audience::Technician, technician_id, None, shutdown);
            }
        }
    }

    not_found()
}

/// Run the HTTP server until the shutdown signal flips
pub async fn start_server(
    config: &Config,
    ctx: Arc<AppContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address(), config.port()).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, ctx.clone(), shutdown.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                // A closed shutdown channel counts as shutdown
                if changed.is_err() || *shutdown.borrow() {
                    info!("server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
