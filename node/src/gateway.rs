//! HTTP surface: the adapter websocket plus health and metrics endpoints.
//!
//! A chat-platform adapter connects to `/ws` with the shared bearer token, streams [Inbound]
//! events as JSON text frames, and receives [crate::wire::Outbound] messages back. Replies go to
//! the connection that caused them; expiry announcements go to every connected adapter.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use socialcredit_execution::{Notice, Store};
use std::{sync::Arc, time::Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{
    dispatch::Dispatcher,
    metrics::Counter,
    wire::{Inbound, Outbound, Outbox},
};

const NOTICE_BUFFER: usize = 256;

pub struct Gateway<S: Store> {
    dispatcher: Arc<Dispatcher<S>>,
    token: String,
    notices: broadcast::Sender<Outbound>,
}

impl<S: Store> Gateway<S> {
    pub fn new(dispatcher: Arc<Dispatcher<S>>, token: String) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);
        Self {
            dispatcher,
            token,
            notices,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<S>> {
        &self.dispatcher
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token.trim() == self.token)
    }

    /// Renders expiry notices and fans them out to every connected adapter.
    pub async fn run_notices(self: Arc<Self>, mut notices: mpsc::UnboundedReceiver<Notice>) {
        let (outbox, mut rendered) = Outbox::channel();
        while let Some(notice) = notices.recv().await {
            self.dispatcher.announce(&notice, &outbox);
            while let Ok(outbound) = rendered.try_recv() {
                if self.notices.send(outbound).is_err() {
                    warn!(session = %notice.session(), "no adapter connected, notice dropped");
                }
            }
        }
        info!("notice stream ended");
    }
}

pub fn router<S: Store>(gateway: Arc<Gateway<S>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::<S>))
        .route("/ws", get(adapter_ws::<S>))
        .with_state(gateway)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics<S: Store>(State(gateway): State<Arc<Gateway<S>>>) -> Json<Value> {
    let dispatcher = &gateway.dispatcher;
    let economy = dispatcher.economy();
    Json(json!({
        "counters": dispatcher.metrics().snapshot(),
        "open_sessions": economy.open_sessions().await,
        "price_multiplier_bps": economy.prices().multiplier_bps(),
    }))
}

async fn adapter_ws<S: Store>(
    State(gateway): State<Arc<Gateway<S>>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !gateway.authorized(&headers) {
        warn!("adapter connection rejected: bad or missing token");
        return (StatusCode::UNAUTHORIZED, "invalid gateway token").into_response();
    }
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, gateway))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket<S: Store>(socket: WebSocket, gateway: Arc<Gateway<S>>) {
    let metrics = gateway.dispatcher.metrics().clone();
    metrics.inc(Counter::Connections);
    info!("adapter connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let outbox = Outbox::new(out_tx.clone());
    let mut notices = gateway.notices.subscribe();

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let text = match serde_json::to_string(&outbound) {
                Ok(text) => text,
                Err(err) => {
                    warn!(%err, "failed to encode outbound message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                warn!("failed to send to adapter, closing connection");
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let inbound = match serde_json::from_str::<Inbound>(&text) {
                            Ok(inbound) => inbound,
                            Err(err) => {
                                metrics.inc(Counter::Malformed);
                                warn!(%err, "malformed adapter event");
                                continue;
                            }
                        };
                        let dispatcher = gateway.dispatcher.clone();
                        let outbox = outbox.clone();
                        tokio::spawn(async move {
                            let started = Instant::now();
                            dispatcher.handle(inbound, &outbox).await;
                            dispatcher.metrics().record_event(started.elapsed());
                        });
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("adapter closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "adapter socket error");
                        break;
                    }
                    None => {
                        debug!("adapter stream ended");
                        break;
                    }
                }
            }
            notice = notices.recv() => {
                match notice {
                    Ok(outbound) => {
                        let _ = out_tx.send(outbound);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "adapter lagged behind notices");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    drop(outbox);
    drop(out_tx);
    let _ = writer.await;
    info!("adapter disconnected");
}
