use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::AUTHORIZATION,
    middleware::Next,
    web::Data,
};
use sqlx::MySqlPool;
use tracing::{debug, warn};

use crate::auth::{auth::AuthUser, jwt::verify_token};
use crate::config::Config;
use crate::error::AppError;
use crate::model::user::User;
use crate::models::TokenType;

/// Pulls the bearer token out of the Authorization header.
pub fn bearer_token(req: &ServiceRequest) -> Result<&str, AppError> {
    let header_value = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Authorization header is required".into()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header encoding".into()))?;

    match header_value.strip_prefix("Bearer ").map(str::trim) {
        Some("") => Err(AppError::Unauthorized("Token is required".into())),
        Some(token) => Ok(token),
        None => Err(AppError::Unauthorized("Invalid token format. Use 'Bearer <token>'".into())),
    }
}

async fn authenticate(req: &ServiceRequest) -> Result<AuthUser, AppError> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("App config missing".into()))?;
    let pool = req
        .app_data::<Data<MySqlPool>>()
        .ok_or_else(|| AppError::Internal("Database pool missing".into()))?;

    let token = bearer_token(req)?;

    let claims = verify_token(token, &config.jwt_secret).map_err(|e| {
        debug!(error = %e, "Token rejected");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;

    if claims.token_type != TokenType::Access {
        return Err(AppError::Unauthorized("Invalid or expired token".into()));
    }

    match User::find_active(pool.get_ref(), claims.user_id).await? {
        Some(user) => Ok(user.into()),
        None => {
            warn!(user_id = claims.user_id, "Token for unknown or inactive user");
            Err(AppError::NotFoundOrInactive)
        }
    }
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let auth_user = match authenticate(&req).await {
        Ok(user) => user,
        Err(e) => {
            let resp = e.error_response();
            return Ok(req.into_response(resp));
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

/// Like [`auth_middleware`] but never rejects: requests without a usable
/// token simply carry no [`AuthUser`].
pub async fn optional_auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    if req.headers().contains_key(AUTHORIZATION) {
        match authenticate(&req).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) => debug!(error = %e, "Optional auth ignored"),
        }
    }

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{auth::MaybeAuthUser, jwt::{generate_access_token, generate_refresh_token}};
    use actix_web::{App, HttpResponse, http::StatusCode, middleware::from_fn, test, web};
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;

    fn config() -> Config {
        Config::from_lookup(&|key| match key {
            "DATABASE_URL" => Some("mysql://root@127.0.0.1:1/presensi".into()),
            "JWT_SECRET" => Some("middleware-secret".into()),
            _ => None,
        })
        .unwrap()
    }

    /// Points at a closed port so every query fails fast.
    fn unreachable_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy("mysql://root@127.0.0.1:1/presensi")
            .unwrap()
    }

    async fn whoami(user: MaybeAuthUser) -> HttpResponse {
        match user.0 {
            Some(u) => HttpResponse::Ok().body(u.email),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    macro_rules! app {
        ($mw:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new(config()))
                    .app_data(Data::new(unreachable_pool()))
                    .service(
                        web::resource("/me")
                            .wrap(from_fn($mw))
                            .route(web::get().to(whoami)),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_header_is_unauthorized() {
        let app = app!(auth_middleware);
        let res = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "Authorization header is required");
    }

    #[actix_web::test]
    async fn malformed_and_refresh_tokens_are_unauthorized() {
        let app = app!(auth_middleware);

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", "Token abc"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let (refresh, _) = generate_refresh_token(1, "a@b.id", "middleware-secret", 60).unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn database_outage_is_service_unavailable() {
        let app = app!(auth_middleware);
        let token = generate_access_token(1, "a@b.id", "middleware-secret", 60).unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn optional_auth_lets_anonymous_through() {
        let app = app!(optional_auth_middleware);

        let res = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(test::read_body(res).await, "anonymous");

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(test::read_body(res).await, "anonymous");
    }
}
