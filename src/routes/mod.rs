pub mod realtime;
pub mod trips;

use axum::{
    extract::FromRequest,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::{error::AppError, state::AppState};

/// `axum::Json` whose rejections render as `{"message": ...}` like every other error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `{"data": ..., "message"?: ...}`, the envelope most trip routes answer with.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            message: None,
            data,
        }
    }

    pub fn with_message(message: &'static str, data: T) -> Self {
        Self {
            message: Some(message),
            data,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.frontend_url.as_deref());
    Router::new()
        .route("/", get(liveness))
        .route("/ws", get(realtime::upgrade))
        .nest("/api/v1/trips", trips::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn liveness() -> &'static str {
    "Triptab API is running"
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let Some(url) = frontend_url else {
        return CorsLayer::permissive();
    };
    match HeaderValue::from_str(url.trim_end_matches('/')) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(err) => {
            warn!(frontend_url = url, error = %err, "unusable FRONTEND_URL, allowing any origin");
            CorsLayer::permissive()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth, config::AppConfig, db, realtime::hub::ChatHub,
        services::trip_service::TripService,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::{IntoResponse, Response},
    };
    use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        cookie_key: Key,
        alice: String,
        bob: String,
    }

    async fn app() -> TestApp {
        let config = AppConfig::in_memory();
        let pool = db::init_pool(&config.database_url).await.unwrap();
        db::migrate(&pool).await.unwrap();
        let trips = TripService::new(pool.clone(), ChatHub::default(), config.chat_history_limit);
        let alice = trips
            .directory()
            .register_user("Alice", "alice@x.com")
            .await
            .unwrap();
        let bob = trips
            .directory()
            .register_user("Bob", "bob@x.com")
            .await
            .unwrap();
        let alice = auth::create_session(&pool, &alice.id, None).await.unwrap().id;
        let bob = auth::create_session(&pool, &bob.id, None).await.unwrap().id;
        let state = AppState::new(config, pool, trips);
        TestApp {
            cookie_key: state.cookie_key.clone(),
            router: create_router(state),
            alice,
            bob,
        }
    }

    impl TestApp {
        async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<&str>) -> Response {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let body = match body {
                Some(body) => {
                    request = request.header(header::CONTENT_TYPE, "application/json");
                    Body::from(body.to_string())
                }
                None => Body::empty(),
            };
            self.send(request.body(body).unwrap()).await
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        /// `name=value` pair of an encrypted session cookie, as a browser would send it back.
        fn session_cookie(&self, token: &str) -> String {
            let jar = PrivateCookieJar::new(self.cookie_key.clone())
                .add(Cookie::new(auth::SESSION_COOKIE, token.to_string()));
            let response = jar.into_response();
            let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
            set_cookie.split(';').next().unwrap().to_string()
        }
    }

    fn websocket_handshake(uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const GOA: &str = r#"{"name":"Goa","destination":"Goa","startDate":"2024-12-20","endDate":"2024-12-27"}"#;

    #[tokio::test]
    async fn liveness_needs_no_identity() {
        let app = app().await;
        let response = app.call("GET", "/", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn trip_routes_require_identity() {
        let app = app().await;
        let response = app.call("GET", "/api/v1/trips", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app.call("GET", "/api/v1/trips", Some("bogus"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app.call("GET", "/ws", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_then_fetch_trip() {
        let app = app().await;
        let response = app.call("POST", "/api/v1/trips", Some(&app.alice), Some(GOA)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let trip_id = created["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["data"]["visibility"], "group");
        assert_eq!(created["data"]["participants"].as_array().unwrap().len(), 1);

        let response = app
            .call("GET", &format!("/api/v1/trips/{trip_id}"), Some(&app.alice), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let detail = json_body(response).await;
        assert_eq!(detail["creator"]["displayName"], "Alice");

        let response = app
            .call("GET", &format!("/api/v1/trips/{trip_id}"), Some(&app.bob), None)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await, json!({"message": "Access denied"}));
    }

    #[tokio::test]
    async fn bad_input_maps_to_400_and_unknown_trip_to_404() {
        let app = app().await;
        let response = app
            .call("POST", "/api/v1/trips", Some(&app.alice), Some("{not json"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["message"].is_string());

        let response = app
            .call("POST", "/api/v1/trips", Some(&app.alice), Some(r#"{"name":"Goa"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .call("GET", "/api/v1/trips/missing/stats", Some(&app.alice), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await, json!({"message": "Trip not found"}));
    }

    #[tokio::test]
    async fn chat_over_http() {
        let app = app().await;
        let created = json_body(app.call("POST", "/api/v1/trips", Some(&app.alice), Some(GOA)).await).await;
        let trip_id = created["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/trips/{trip_id}/messages");

        let response = app.call("POST", &uri, Some(&app.alice), Some(r#"{"text":"hi all"}"#)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = app.call("POST", &uri, Some(&app.alice), Some(r#"{"text":"  "}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let history = json_body(app.call("GET", &format!("{uri}?limit=10"), Some(&app.alice), None).await).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["text"], "hi all");
        assert_eq!(history[0]["author"]["email"], "alice@x.com");
    }

    #[tokio::test]
    async fn session_cookie_identifies_the_caller() {
        let app = app().await;
        let cookie = app.session_cookie(&app.alice);
        assert!(!cookie.contains(&app.alice), "cookie value must be encrypted");

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/trips")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(GOA))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let request = Request::builder()
            .uri("/api/v1/trips")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let listed = json_body(app.send(request).await).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);

        let forged = format!("{}={}", auth::SESSION_COOKIE, app.alice);
        let request = Request::builder()
            .uri("/api/v1/trips")
            .header(header::COOKIE, forged)
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn websocket_handshake_checks_the_query_token() {
        let app = app().await;

        let refused = app
            .send(websocket_handshake("/ws?token=bogus").body(Body::empty()).unwrap())
            .await;
        assert_eq!(refused.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(refused).await, json!({"message": "Not authorized"}));

        // A test request carries no connection to upgrade, so a valid token ends at the upgrade step.
        let accepted = app
            .send(
                websocket_handshake(&format!("/ws?token={}", app.alice))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_ne!(accepted.status(), StatusCode::UNAUTHORIZED);

        let by_cookie = app
            .send(
                websocket_handshake("/ws")
                    .header(header::COOKIE, app.session_cookie(&app.bob))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_ne!(by_cookie.status(), StatusCode::UNAUTHORIZED);

        let blank_query_falls_back = app
            .send(
                websocket_handshake("/ws?token=")
                    .header(header::AUTHORIZATION, format!("Bearer {}", app.bob))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_ne!(blank_query_falls_back.status(), StatusCode::UNAUTHORIZED);
    }
}
