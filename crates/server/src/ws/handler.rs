// WebSocket endpoint for the live session. A connection declares its role
// with its first frame (join for respondents, presenter_join for the
// presenter view), receives a current_state replay, and from then on is
// driven by engine broadcasts plus, for respondents, submit_answer frames.

use super::protocol as ws_protocol;
use crate::engine::PollEngine;
use crate::error::{
    current_request_id, request_id_from_headers_or_generate, with_request_id_scope, ErrorCode,
};
use crate::validation::{check_ws_frame_size, MAX_WS_FRAME_BYTES};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use livepoll_common::protocol::ws::WsMessage;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub(crate) const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

enum Role {
    Respondent { respondent_id: Uuid },
    Presenter,
}

pub fn router(engine: PollEngine) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(engine)
}

pub async fn ws_upgrade(
    State(engine): State<PollEngine>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_frame_size(MAX_WS_FRAME_BYTES).on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handle_socket(engine, socket)).await;
    })
}

fn frame_size_exceeded_reason() -> String {
    format!("websocket frame exceeds maximum size of {MAX_WS_FRAME_BYTES} bytes")
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
        || message.contains("size limit")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: frame_size_exceeded_reason().into(),
        })))
        .await;
}

fn rejection(code: ErrorCode, message: impl Into<String>) -> WsMessage {
    WsMessage::Rejected {
        code: code.as_str().to_string(),
        message: message.into(),
        retryable: code.retryable(),
    }
}

async fn handle_socket(engine: PollEngine, mut socket: WebSocket) {
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());
    let connection_id = Uuid::new_v4();
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<WsMessage>();

    // First frame declares the role; anything else is rejected and the
    // socket closed before it is attached to the engine.
    let (role, replay) = match socket.recv().await {
        Some(Ok(Message::Text(raw_message))) => {
            if check_ws_frame_size(raw_message.len()).is_err() {
                close_frame_too_large(&mut socket).await;
                return;
            }
            match ws_protocol::decode_message(&raw_message) {
                Ok(WsMessage::Join { respondent_id, name }) => {
                    if name.trim().is_empty() {
                        let _ = ws_protocol::send_ws_message(
                            &mut socket,
                            &rejection(ErrorCode::ValidationFailed, "name must not be empty"),
                        )
                        .await;
                        let _ = socket.send(Message::Close(None)).await;
                        return;
                    }
                    let replay = engine
                        .attach_respondent(respondent_id, &name, connection_id, outbound_sender)
                        .await;
                    (Role::Respondent { respondent_id }, replay)
                }
                Ok(WsMessage::PresenterJoin) => {
                    let replay = engine.attach_presenter(connection_id, outbound_sender).await;
                    (Role::Presenter, replay)
                }
                _ => {
                    let _ = ws_protocol::send_ws_message(
                        &mut socket,
                        &rejection(
                            ErrorCode::ValidationFailed,
                            "first frame must be join or presenter_join",
                        ),
                    )
                    .await;
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            }
        }
        Some(Err(error)) if is_frame_size_violation(&error) => {
            close_frame_too_large(&mut socket).await;
            return;
        }
        _ => return,
    };

    if ws_protocol::send_ws_message(&mut socket, &replay).await.is_err() {
        detach(&engine, &role, connection_id).await;
        return;
    }

    // Heartbeat: server pings every HEARTBEAT_INTERVAL_MS, disconnects if
    // no pong arrives within HEARTBEAT_TIMEOUT_MS of the next tick.
    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    heartbeat_interval.reset(); // skip immediate first tick
    let mut last_pong = Instant::now();
    let heartbeat_timeout = std::time::Duration::from_millis(HEARTBEAT_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_pong.elapsed()
                    > heartbeat_timeout + std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS)
                {
                    warn!(
                        %connection_id,
                        request_id = %request_id,
                        "heartbeat timeout, disconnecting"
                    );
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                let Some(outbound_message) = maybe_outbound else {
                    break;
                };
                let is_removal = matches!(outbound_message, WsMessage::Removed { .. });
                if ws_protocol::send_ws_message(&mut socket, &outbound_message).await.is_err() {
                    break;
                }
                if is_removal {
                    // The engine already dropped this identity; close out.
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        if check_ws_frame_size(raw_message.len()).is_err() {
                            close_frame_too_large(&mut socket).await;
                            break;
                        }
                        let inbound = match ws_protocol::decode_message(&raw_message) {
                            Ok(message) => message,
                            Err(_) => {
                                let reject = rejection(
                                    ErrorCode::ValidationFailed,
                                    "invalid websocket frame payload",
                                );
                                if ws_protocol::send_ws_message(&mut socket, &reject)
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                                continue;
                            }
                        };

                        let reply = handle_inbound(&engine, &role, inbound).await;
                        if ws_protocol::send_ws_message(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        if is_frame_size_violation(&error) {
                            close_frame_too_large(&mut socket).await;
                        }
                        break;
                    }
                }
            }
        }
    }

    detach(&engine, &role, connection_id).await;
    info!(%connection_id, request_id = %request_id, "websocket connection closed");
}

async fn handle_inbound(engine: &PollEngine, role: &Role, inbound: WsMessage) -> WsMessage {
    match (role, inbound) {
        (Role::Respondent { respondent_id }, WsMessage::SubmitAnswer { respondent_id: claimed, option }) => {
            // A connection can only answer as the identity it joined with.
            if claimed != *respondent_id {
                return rejection(
                    ErrorCode::ValidationFailed,
                    "respondent_id does not match this connection",
                );
            }
            match engine.submit_answer(claimed, option).await {
                Ok(option) => WsMessage::AnswerAccepted { option },
                Err(error) => error.to_ws_rejection(),
            }
        }
        (Role::Presenter, WsMessage::SubmitAnswer { .. }) => {
            rejection(ErrorCode::ValidationFailed, "presenters cannot submit answers")
        }
        (_, WsMessage::Join { .. }) | (_, WsMessage::PresenterJoin) => {
            rejection(ErrorCode::ValidationFailed, "connection has already joined")
        }
        _ => rejection(ErrorCode::ValidationFailed, "unsupported message type"),
    }
}

async fn detach(engine: &PollEngine, role: &Role, connection_id: Uuid) {
    match role {
        Role::Respondent { respondent_id } => {
            engine.detach_respondent(*respondent_id, connection_id).await;
        }
        Role::Presenter => engine.detach_presenter(connection_id).await,
    }
}
