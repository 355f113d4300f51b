use std::net::IpAddr;
use std::sync::Arc;

use application::{DeliveryService, ServerEvent, SessionContext, SessionHandle};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 客户端上行事件 `{"event": "...", "data": {...}}`
#[derive(Debug, Deserialize)]
struct ClientEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn parse_data<T: DeserializeOwned + Default>(data: serde_json::Value) -> Result<T, serde_json::Error> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data)
}

/// WebSocket 连接
///
/// 一个连接就是一个会话：写任务把会话下行事件写入 socket，
/// 读任务按顺序处理客户端请求。任一任务结束即视为断开，并从注册表解绑。
pub struct WebSocketConnection {
    service: Arc<DeliveryService>,
    ctx: SessionContext,
    outbound: mpsc::Receiver<ServerEvent>,
}

impl WebSocketConnection {
    pub fn new(state: AppState, identity: UserId, credential: String, remote_ip: IpAddr) -> Self {
        let (handle, outbound) = SessionHandle::new(Utc::now());
        let ctx = SessionContext {
            handle,
            identity,
            credential,
            remote_addr: Some(remote_ip),
        };

        Self {
            service: state.delivery_service,
            ctx,
            outbound,
        }
    }

    pub async fn run(self, socket: WebSocket) {
        let Self {
            service,
            ctx,
            mut outbound,
        } = self;
        let (mut sender, mut incoming) = socket.split();

        service.connected(&ctx);

        let (pong_tx, mut pong_rx) = mpsc::channel::<Vec<u8>>(8);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(data) = pong_rx.recv() => WsMessage::Pong(data.into()),
                    event = outbound.recv() => {
                        let Some(event) = event else { break };
                        match event.to_json() {
                            Ok(json) => WsMessage::Text(json.into()),
                            Err(err) => {
                                tracing::warn!(error = %err, event = event.name(), "failed to serialize websocket payload");
                                continue;
                            }
                        }
                    }
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!("WebSocket write failed");
                    break;
                }
            }
        });

        // 接收任务：同一会话的请求按到达顺序逐个处理
        let mut recv_task = {
            let service = service.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    match message {
                        WsMessage::Text(text) => dispatch(&service, &ctx, text.as_str()).await,
                        WsMessage::Binary(_) => {
                            service.report_malformed(&ctx, "binary frames are not supported");
                        }
                        WsMessage::Ping(data) => {
                            if pong_tx.send(data.to_vec()).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {}
                        WsMessage::Close(_) => break,
                    }
                }
            })
        };

        tokio::select! {
            _ = &mut recv_task => send_task.abort(),
            // 写端失败后读端很快也会结束，等待正在处理的请求完成
            _ = &mut send_task => {
                let _ = recv_task.await;
            }
        }

        service.disconnect(&ctx).await;
        tracing::info!(session_id = %ctx.handle.id(), user_id = %ctx.identity, "websocket disconnected");
    }
}

async fn dispatch(service: &DeliveryService, ctx: &SessionContext, text: &str) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            service.report_malformed(ctx, format!("invalid JSON: {err}"));
            return;
        }
    };

    let event = envelope.event;
    let outcome = match event.as_str() {
        "join" => match parse_data(envelope.data) {
            Ok(request) => service.join(ctx, request).await.map(|_| ()),
            Err(err) => Err(service.report_malformed(ctx, format!("join: {err}"))),
        },
        "send_message" => match parse_data(envelope.data) {
            Ok(request) => service.send_message(ctx, request).await.map(|_| ()),
            Err(err) => Err(service.report_malformed(ctx, format!("send_message: {err}"))),
        },
        "mark_as_read" => match parse_data(envelope.data) {
            Ok(request) => service.mark_as_read(ctx, request).await.map(|_| ()),
            Err(err) => Err(service.report_malformed(ctx, format!("mark_as_read: {err}"))),
        },
        other => Err(service.report_malformed(ctx, format!("unknown event: {other}"))),
    };

    // 失败已经以 error 事件回复给客户端
    if let Err(err) = outcome {
        tracing::debug!(session_id = %ctx.handle.id(), event = %event, error = %err, "client request failed");
    }
}
