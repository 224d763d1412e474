use super::connection::Outbound;
use super::protocol::{CloseReason, ProtocolHandler};
use crate::config::WebSocketConfig;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// WebSocket actor: one per accepted socket.
///
/// Reads client frames into the protocol handler and drains the connection's
/// outbound queue onto the socket.
pub struct WsSession {
    protocol: ProtocolHandler,
    outbound: Option<UnboundedReceiver<Outbound>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    close_reason: CloseReason,
}

impl WsSession {
    pub fn new(
        protocol: ProtocolHandler,
        outbound: UnboundedReceiver<Outbound>,
        config: &WebSocketConfig,
    ) -> Self {
        Self {
            protocol,
            outbound: Some(outbound),
            hb: Instant::now(),
            heartbeat_interval: config.heartbeat_interval,
            client_timeout: config.client_timeout,
            close_reason: CloseReason::TransportError,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    user_id = act.protocol.user_id(),
                    "WebSocket heartbeat failed, disconnecting"
                );
                act.close_reason = CloseReason::HeartbeatTimeout;
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        if let Err(e) = self.protocol.open() {
            tracing::warn!(
                user_id = self.protocol.user_id(),
                error = %e,
                "WebSocket session failed to open"
            );
            ctx.stop();
            return;
        }

        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.protocol.close(self.close_reason);
    }
}

// Frames queued for this socket by the dispatcher or the protocol handler.
impl StreamHandler<Outbound> for WsSession {
    fn handle(&mut self, item: Outbound, ctx: &mut Self::Context) {
        match item {
            Outbound::Text(text) => ctx.text(text),
            Outbound::Close => {
                self.close_reason = CloseReason::ServerClosed;
                ctx.close(Some(ws::CloseCode::Normal.into()));
                ctx.stop();
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.protocol.handle_text(&text);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(
                    user_id = self.protocol.user_id(),
                    "WebSocket close message received: {:?}",
                    reason
                );
                self.close_reason = CloseReason::ClientClosed;
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(
                    user_id = self.protocol.user_id(),
                    error = %e,
                    "WebSocket protocol error"
                );
                self.close_reason = CloseReason::TransportError;
                ctx.stop();
            }
        }
    }
}
