use log::warn;
use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, guard, http::Method, web};
use actix_ws::{Message, MessageStream, Session};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::error::AppError;
use crate::events::EdgeEvent;
use crate::gpio::{Direction, PinOption, Trigger};
use crate::manager::GpioManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<GpioManager>,
}

#[derive(Deserialize)]
struct OpenPayload {
    direction: u8,
    option: Option<u8>,
}

#[derive(Deserialize, Default)]
struct WatcherPayload {
    trigger: Option<u8>,
}

#[derive(Deserialize, Default)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn handle_event_websocket(
    mut session: Session,
    mut client_stream: MessageStream,
    rx: broadcast::Receiver<EdgeEvent>,
) {
    let mut events = BroadcastStream::new(rx);

    loop {
        tokio::select! {
            msg = client_stream.recv() => {
                let Some(msg) = msg else { break; };

                match msg {
                    Ok(Message::Ping(bytes)) => {
                        let _ = session.pong(&bytes).await;
                    }
                    Ok(Message::Close(reason)) => {
                        let _ = session.close(reason).await;
                        break;
                    }
                    Ok(Message::Text(_))
                    | Ok(Message::Binary(_))
                    | Ok(Message::Pong(_))
                    | Ok(Message::Continuation(_))
                    | Ok(Message::Nop) => {}
                    Err(_) => break,
                }
            }
            event = events.next() => {
                let Some(event) = event else { break; };

                match event {
                    Ok(event) => {
                        if let Ok(text) = serde_json::to_string(&event) {
                            if session.text(text).await.is_err() {
                                warn!("WebSocket client disconnected");
                                break;
                            }
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        if session.text(AppError::Gpio(format!("Event stream lagged by {n} messages")).to_string()).await.is_err() {
                            warn!("WebSocket client lagged and disconnected");
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl AppState {
    pub fn api_scope(&self, base_path: &str) -> actix_web::Scope {
        web::scope(base_path)
            .service(
                web::resource("/gpios")
                    .route(web::get().to(list_gpios))
                    .route(web::delete().to(close_all))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::DELETE]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpios/reset")
                    .route(web::post().to(reset))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpios/events")
                    .route(web::get().to(events_ws_all))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}")
                    .route(web::get().to(get_pin))
                    .route(web::post().to(open_pin))
                    .route(web::delete().to(close_pin))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[
                                Method::GET,
                                Method::POST,
                                Method::DELETE,
                            ]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}/value")
                    .route(web::get().to(get_value))
                    .route(web::post().to(set_value))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}/watcher")
                    .route(web::post().to(set_watcher))
                    .route(web::delete().to(unset_watcher))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::POST, Method::DELETE]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}/event")
                    .route(web::get().to(get_last_event))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}/events")
                    .route(web::get().to(get_events))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
    }
}

async fn list_gpios(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let pins = state.manager.list_pins().await;

    Ok(web::Json(pins))
}

async fn close_all(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    state.manager.close_all().await?;

    Ok(HttpResponse::Ok())
}

async fn reset(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    state.manager.reset().await?;

    Ok(HttpResponse::Ok())
}

async fn get_pin(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;
    let config = state.manager.get_pin(pin_id).await?;

    Ok(web::Json(config))
}

async fn open_pin(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;
    let (direction, option) = parse_open_payload(&body)?;

    let config = state.manager.open_pin(pin_id, direction, option).await?;

    Ok(web::Json(config))
}

async fn close_pin(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    state.manager.close_pin(pin_id).await?;

    Ok(HttpResponse::Ok())
}

async fn get_value(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    let value = state.manager.read_value(pin_id).await?;

    Ok(web::Json(value))
}

async fn set_value(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;
    let value = parse_value_payload(&body)?;

    state.manager.write_value(pin_id, value).await?;

    Ok(HttpResponse::Ok())
}

async fn set_watcher(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;
    let trigger = parse_watcher_payload(&body)?;

    let config = state.manager.set_watcher(pin_id, trigger).await?;

    Ok(web::Json(config))
}

async fn unset_watcher(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    state.manager.unset_watcher(pin_id).await?;

    Ok(HttpResponse::Ok())
}

async fn get_last_event(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    let last = state.manager.get_last_event(pin_id).await;

    match last {
        Some(event) => Ok(HttpResponse::Ok().json(event)),
        None => Ok(HttpResponse::Ok().finish()),
    }
}

async fn get_events(
    req: HttpRequest,
    query: web::Query<EventsQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let pin_id = parse_pin_id(&req)?;

    let events = state.manager.get_events(pin_id, query.limit).await;

    Ok(web::Json(events))
}

async fn events_ws_all(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let rx = state.manager.subscribe_events();
    let (response, session, client_stream) = actix_ws::handle(&req, stream)
        .map_err(|e| AppError::Gpio(format!("Websocket error: {e}")))?;

    actix_web::rt::spawn(async move {
        handle_event_websocket(session, client_stream, rx).await;
    });

    Ok(response)
}

fn parse_value_payload(body: &[u8]) -> Result<u8, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidValue("Empty value payload".into()));
    }

    match std::str::from_utf8(body) {
        Ok(text) => text
            .trim()
            .parse::<u8>()
            .map_err(|_| AppError::InvalidValue("Value must be an integer".into())),
        _ => Err(AppError::InvalidValue(
            "Value payload must be valid UTF-8".into(),
        )),
    }
}

fn parse_open_payload(body: &[u8]) -> Result<(Direction, PinOption), AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidValue("Empty open payload".into()));
    }

    let payload: OpenPayload = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidValue(format!("Invalid open payload: {e}")))?;
    let direction = Direction::try_from(payload.direction)?;

    Ok((direction, PinOption::from_raw(direction, payload.option)))
}

fn parse_watcher_payload(body: &[u8]) -> Result<Option<Trigger>, AppError> {
    let payload: WatcherPayload = if body.is_empty() {
        WatcherPayload::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidValue(format!("Invalid watcher payload: {e}")))?
    };

    payload.trigger.map(Trigger::try_from).transpose()
}

fn parse_pin_id(req: &HttpRequest) -> Result<u32, AppError> {
    let pin_id = req
        .match_info()
        .get("pin_id")
        .ok_or_else(|| AppError::InvalidValue("Missing pin id".into()))?;
    let pin_id = pin_id
        .parse::<u32>()
        .map_err(|_| AppError::InvalidValue("Invalid pin id".into()))?;

    Ok(pin_id)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(methods: &[Method]) -> impl guard::Guard {
    let allowed: Vec<Method> = methods.to_vec();
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}
