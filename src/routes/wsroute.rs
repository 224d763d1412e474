use crate::state::AppState;
use crate::websocket::{parse_user_id, Connection, ProtocolHandler, WsSession};
use actix_web::{web, Error, HttpRequest, HttpResponse, ResponseError};
use actix_web_actors::ws;

/// Upgrades `GET {path}?userId=<id>` to a push socket.
///
/// The handshake is refused with 400 before anything is registered when the
/// user id is missing or not an integer.
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let user_id = match parse_user_id(req.query_string()) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(query = req.query_string(), error = %e, "Rejecting WebSocket handshake");
            return Ok(e.error_response());
        }
    };

    let (connection, outbound) = Connection::open(user_id);
    let protocol = ProtocolHandler::new(state.registry.clone(), connection);
    let session = WsSession::new(protocol, outbound, &state.config.websocket);

    ws::start(session, &req, stream)
}

pub fn register_routes(cfg: &mut web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::get().to(ws_handler)));
}
