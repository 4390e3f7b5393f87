use crate::{
    api::{attendance, health, user},
    auth::{
        handlers,
        middleware::{auth_middleware, optional_auth_middleware},
    },
    config::Config,
    error::AppError,
    gate::middleware::{admin_override_marker, network_gate, require_user_agent},
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{
    middleware::{DefaultHeaders, from_fn},
    web,
};
use std::sync::Arc;
use tracing::warn;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let burst = requests_per_min.max(1);
    let per_ms = 60_000 / u64::from(burst);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| {
            warn!(requests_per_min, "Invalid rate limit, using governor defaults");
            Default::default()
        });

    Governor::new(&cfg)
}

/// Malformed JSON bodies answer with the usual envelope instead of plain text.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid request body: {err}")).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid query string: {err}")).into())
}

fn attendance_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add(("X-GPS-Required", "true"))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(admin_override_marker))
            .app_data(json_config())
            .app_data(query_config())
            .service(web::resource("/health").route(web::get().to(health::health)))
            // Public routes
            .service(
                web::scope("/auth")
                    .service(
                        web::resource("/login")
                            .wrap(login_limiter.clone())
                            .route(web::post().to(handlers::login)),
                    )
                    .service(
                        web::resource("/register")
                            .wrap(register_limiter)
                            .route(web::post().to(handlers::register)),
                    )
                    .service(
                        web::resource("/refresh")
                            .wrap(refresh_limiter)
                            .route(web::post().to(handlers::refresh_token)),
                    )
                    .service(
                        web::resource("/logout")
                            .wrap(login_limiter)
                            .route(web::post().to(handlers::logout)),
                    ),
            )
            // Protected routes: auth runs first, then the network gate
            .service(
                web::scope("/user")
                    .wrap(from_fn(network_gate))
                    .wrap(from_fn(auth_middleware))
                    .wrap(protected_limiter.clone())
                    .service(
                        web::resource("/profile")
                            .route(web::get().to(user::get_profile))
                            .route(web::put().to(user::update_profile)),
                    )
                    .service(web::resource("/change-password").route(web::post().to(user::change_password)))
                    .service(web::resource("/deactivate").route(web::post().to(user::deactivate))),
            )
            .service(
                web::scope("/attendance")
                    .wrap(from_fn(require_user_agent))
                    .wrap(from_fn(network_gate))
                    .wrap(from_fn(auth_middleware))
                    .wrap(protected_limiter)
                    .wrap(attendance_headers())
                    .service(web::resource("/checkin").route(web::post().to(attendance::check_in)))
                    .service(web::resource("/checkout").route(web::post().to(attendance::check_out)))
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/history").route(web::get().to(attendance::history)))
                    .service(web::resource("/stats").route(web::get().to(attendance::stats))),
            )
            .service(
                web::scope("/testing")
                    .wrap(from_fn(optional_auth_middleware))
                    .service(web::resource("/users").route(web::get().to(user::list_users))),
            ),
    );
}

// LOGIN
//  ├─ access_token (24 h)
//  └─ refresh_token (7 days)

// ATTENDANCE REQUEST
//  └─ Authorization: Bearer access_token
//       └─ network gate (IP, WiFi, carrier) → location gate (spoof, country, radius)

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{AttendanceStore, repository::memory::MemoryRepository};
    use crate::gate::{location::LocationGate, network::build_pipeline};
    use actix_web::{App, http::StatusCode, test};
    use sqlx::{MySqlPool, mysql::MySqlPoolOptions};
    use std::time::Duration;

    fn config() -> Config {
        Config::from_lookup(&|key| match key {
            "DATABASE_URL" => Some("mysql://root@127.0.0.1:1/presensi".into()),
            "JWT_SECRET" => Some("routes-secret".into()),
            "RATE_PROTECTED_PER_MIN" => Some("1000".into()),
            _ => None,
        })
        .unwrap()
    }

    fn unreachable_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy("mysql://root@127.0.0.1:1/presensi")
            .unwrap()
    }

    macro_rules! app {
        () => {{
            let config = config();
            let policies = config.policies.clone();
            test::init_service(
                App::new()
                    .app_data(web::Data::new(unreachable_pool()))
                    .app_data(web::Data::new(config.clone()))
                    .app_data(web::Data::new(build_pipeline(&policies.network)))
                    .app_data(web::Data::new(LocationGate::from_policies(&policies)))
                    .app_data(web::Data::new(AttendanceStore::new(
                        Arc::new(MemoryRepository::default()),
                        policies.school.clone(),
                    )))
                    .app_data(web::Data::new(policies))
                    .configure(|cfg| configure(cfg, config)),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn attendance_requires_bearer_token() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/v1/attendance/today")
            .peer_addr("10.0.0.5:5000".parse().unwrap())
            .insert_header(("User-Agent", "PresensiApp/2.1"))
            .to_request();

        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers().get("x-gps-required").unwrap(), "true");
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "Authorization header is required");
    }

    #[actix_web::test]
    async fn malformed_json_uses_envelope() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .peer_addr("10.0.0.5:5000".parse().unwrap())
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();

        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn health_reports_database_down() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/v1/health")
            .peer_addr("10.0.0.5:5000".parse().unwrap())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
