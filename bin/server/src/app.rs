//! HTTP router.

use axum::{
    Extension, Router,
    routing::{get, post},
};
use csdt_access::{Requirement, Role};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};

/// Builds the application router.
///
/// Each protected route carries its requirement as an `Extension` layer,
/// read by the [`Authorized`](crate::auth::Authorized) extractor.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(auth::health))
        .route(
            "/auth/me",
            get(auth::me).layer(Extension(Requirement::authenticated())),
        )
        .route(
            "/auth/logout",
            post(auth::logout).layer(Extension(Requirement::authenticated())),
        )
        .route(
            "/auth/sessions",
            post(auth::open_session).layer(Extension(Requirement::role(
                Role::AdministradorGeneral,
            ))),
        )
        .route(
            "/auth/sessions/{subject_id}",
            get(auth::find_session).layer(Extension(Requirement::role(Role::Administrador))),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use chrono::{Duration, TimeZone, Utc};
    use csdt_access::{
        AccessPolicy, ManualClock, MemoryAuditLog, MemorySessionStore, OpenSession, Outcome,
        PermissionMap, Severity, SubjectKind,
    };
    use csdt_core::SubjectId;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        store: MemorySessionStore,
        audit: MemoryAuditLog,
        clock: ManualClock,
    }

    fn test_app() -> TestApp {
        let store = MemorySessionStore::new();
        let audit = MemoryAuditLog::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 1, 14, 0, 0).unwrap());
        let state = Arc::new(AppState::new(
            Arc::new(store.clone()),
            Arc::new(audit.clone()),
            Arc::new(clock.clone()),
            Arc::new(AccessPolicy::standard()),
            Duration::minutes(120),
        ));
        TestApp {
            router: router(state.clone()),
            state,
            store,
            audit,
            clock,
        }
    }

    async fn login(app: &TestApp, role: Role) -> (SubjectId, String) {
        let subject_id = SubjectId::new();
        let session = app
            .state
            .issuer
            .open(OpenSession {
                subject_id,
                subject_kind: SubjectKind::Operator,
                role,
                overrides: PermissionMap::new(),
                client_ip: None,
                user_agent: None,
            })
            .await
            .expect("open session");
        (subject_id, session.token().as_str().to_string())
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    fn post_json(uri: &str, token: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_needs_no_session() {
        let app = test_app();
        let response = app
            .router
            .oneshot(get_with("/health", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.audit.entries().is_empty());
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let app = test_app();
        let response = app
            .router
            .clone()
            .oneshot(get_with("/auth/me", None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "UNAUTHORIZED");

        let entries = app.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Critical);
        assert_eq!(entries[0].request.url, "/auth/me");
    }

    #[tokio::test]
    async fn non_bearer_header_is_unauthenticated() {
        let app = test_app();
        let request = Request::builder()
            .uri("/auth/me")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .expect("request");
        let response = app.router.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn me_returns_identity() {
        let app = test_app();
        let (subject_id, token) = login(&app, Role::Operador).await;

        let response = app
            .router
            .clone()
            .oneshot(get_with("/auth/me", Some(&token)))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["role"], "operador");
        assert_eq!(body["data"]["access_level"], 2);
        assert_eq!(
            body["data"]["subject_id"],
            serde_json::to_value(subject_id).expect("serialize")
        );

        let entries = app.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, Outcome::Authorized);
        assert_eq!(entries[0].severity, Severity::Normal);
    }

    #[tokio::test]
    async fn operator_cannot_reach_administrator_route() {
        let app = test_app();
        let (subject_id, token) = login(&app, Role::Operador).await;

        let response = app
            .router
            .clone()
            .oneshot(get_with(
                &format!("/auth/sessions/{subject_id}"),
                Some(&token),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error_code"], "INSUFFICIENT_ROLE");

        let entries = app.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, Outcome::Denied);
        assert_eq!(entries[0].reason.as_deref(), Some("INSUFFICIENT_ROLE"));
    }

    #[tokio::test]
    async fn administrator_looks_up_active_session() {
        let app = test_app();
        let (_, admin_token) = login(&app, Role::Administrador).await;
        let (subject_id, _) = login(&app, Role::Cliente).await;

        let response = app
            .router
            .clone()
            .oneshot(get_with(
                &format!("/auth/sessions/{subject_id}"),
                Some(&admin_token),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["role"], "cliente");
        assert_eq!(body["data"]["state"], "activa");
        assert_eq!(body["data"]["expired"], false);
        assert!(body["data"].get("token").is_none());

        let missing = app
            .router
            .clone()
            .oneshot(get_with(
                &format!("/auth/sessions/{}", SubjectId::new()),
                Some(&admin_token),
            ))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = app
            .router
            .clone()
            .oneshot(get_with("/auth/sessions/not-an-id", Some(&admin_token)))
            .await
            .expect("response");
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn general_administrator_opens_sessions() {
        let app = test_app();
        let (_, root_token) = login(&app, Role::AdministradorGeneral).await;
        let subject_id = SubjectId::new();

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/auth/sessions",
                &root_token,
                &json!({
                    "subject_id": subject_id,
                    "subject_kind": "cliente",
                    "role": "cliente",
                    "permissions": { "pqrsfd.crear": true }
                }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["data"]["access_level"], 1);
        assert_eq!(body["data"]["permissions"]["pqrsfd.crear"], true);
        let token = body["data"]["token"].as_str().expect("token").to_string();

        let me = app
            .router
            .clone()
            .oneshot(get_with("/auth/me", Some(&token)))
            .await
            .expect("response");
        assert_eq!(me.status(), StatusCode::OK);
        assert_eq!(json_body(me).await["data"]["role"], "cliente");
    }

    #[tokio::test]
    async fn opening_a_session_for_an_unknown_role_fails() {
        let app = test_app();
        let (_, root_token) = login(&app, Role::AdministradorGeneral).await;

        let response = app
            .router
            .oneshot(post_json(
                "/auth/sessions",
                &root_token,
                &json!({
                    "subject_id": SubjectId::new(),
                    "subject_kind": "operador",
                    "role": "visitante"
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(
            body["message"]
                .as_str()
                .expect("message")
                .contains("visitante")
        );
    }

    #[tokio::test]
    async fn opening_a_session_with_a_malformed_permission_fails() {
        let app = test_app();
        let (_, root_token) = login(&app, Role::AdministradorGeneral).await;

        for permissions in [
            json!({ "veedurias": true }),
            json!({ "veedurias.borradores.ver": true }),
        ] {
            let response = app
                .router
                .clone()
                .oneshot(post_json(
                    "/auth/sessions",
                    &root_token,
                    &json!({
                        "subject_id": SubjectId::new(),
                        "subject_kind": "operador",
                        "role": "operador",
                        "permissions": permissions
                    }),
                ))
                .await
                .expect("response");
            assert!(response.status().is_client_error(), "{permissions}");
        }
        // Only the administrator's own session exists.
        assert_eq!(app.store.len(), 1);
    }

    #[tokio::test]
    async fn logout_invalidates_the_token() {
        let app = test_app();
        let (_, token) = login(&app, Role::Cliente).await;

        let request = Request::builder()
            .method("POST")
            .uri("/auth/logout")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request");
        let response = app.router.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let after = app
            .router
            .clone()
            .oneshot(get_with("/auth/me", Some(&token)))
            .await
            .expect("response");
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(after).await["error_code"], "INVALID_SESSION");
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let app = test_app();
        let (_, token) = login(&app, Role::Operador).await;
        app.clock.advance(Duration::minutes(121));

        let response = app
            .router
            .clone()
            .oneshot(get_with("/auth/me", Some(&token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "SESSION_EXPIRED");
    }
}
