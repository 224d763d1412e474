//! HTTP surface for other services: presence lookup and push submission.

use crate::error::PushError;
use crate::state::AppState;
use crate::websocket::{OutboundMessage, UserId};
use actix_web::{web, HttpResponse};
use serde_json::{json, Value};

/// Endpoint: GET /api/v1/push/status/{user_id}
///
/// Reports whether the user holds a socket on *this* instance only.
pub async fn push_status(path: web::Path<UserId>, state: web::Data<AppState>) -> HttpResponse {
    let user_id = path.into_inner();

    HttpResponse::Ok().json(json!({
        "userId": user_id,
        "connected": state.dispatcher.is_online(user_id),
        "instanceId": state.instance_id.as_str(),
    }))
}

/// Endpoint: POST /api/v1/push/{user_id}
///
/// Body is the frame to deliver and must be an object with a string `type`.
/// Accepted means handed to the publisher; delivery stays best-effort.
pub async fn push_to_user(
    path: web::Path<UserId>,
    body: web::Json<Value>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, PushError> {
    let user_id = path.into_inner();
    let message = OutboundMessage::from_value(body.into_inner())?;

    tracing::debug!(user_id, kind = %message.kind, "Push accepted");
    state.publisher.publish(user_id, &message);

    Ok(HttpResponse::Accepted().json(json!({
        "success": true,
        "targetUserId": user_id,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/push")
            .route("/status/{user_id}", web::get().to(push_status))
            .route("/{user_id}", web::post().to(push_to_user)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pubsub::InMemoryBroadcastChannel;
    use crate::websocket::{Connection, Outbound};
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        AppState::with_channel(
            Config::default(),
            Arc::new(InMemoryBroadcastChannel::new("test")),
        )
    }

    #[actix_web::test]
    async fn test_status_reflects_registry() {
        let state = state();
        let (conn, _rx) = Connection::open(42);
        state.registry.register(conn);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/push/status/42").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["connected"], json!(true));

        let req = test::TestRequest::get().uri("/api/v1/push/status/7").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["connected"], json!(false));
    }

    #[actix_web::test]
    async fn test_push_is_delivered_to_local_socket() {
        let state = state();
        let (conn, mut rx) = Connection::open(42);
        state.registry.register(conn);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/push/42")
            .set_json(json!({"type": "audit_result", "noteId": 5, "approved": true}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out");
        let Some(Outbound::Text(text)) = frame else {
            panic!("expected a text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "audit_result");
        assert_eq!(value["noteId"], 5);
    }

    #[actix_web::test]
    async fn test_push_without_type_is_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/push/42")
            .set_json(json!({"v": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
