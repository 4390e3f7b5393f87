use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::AppError,
    model::user::{User, UserPublic},
    models::{AuthResponse, LoginReqDto, RegisterReq, TokenPair, TokenType},
    utils::{
        email_cache, email_filter,
        response::{created, ok},
        sanitize::{sanitize_email, sanitize_input, sanitize_phone},
        validation::Validator,
    },
};
use actix_web::{HttpRequest, HttpResponse, http::header::AUTHORIZATION, web};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> Result<bool, AppError> {
    // Cuckoo filter: a miss is definitive
    if !email_filter::might_exist(email) {
        return Ok(true);
    }

    // Moka cache: a hit is definitive
    if email_cache::is_taken(email).await {
        return Ok(false);
    }

    let exists = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)")
        .bind(email)
        .fetch_one(pool)
        .await?
        > 0;

    if exists {
        email_cache::mark_taken(email).await;
    }

    Ok(!exists)
}

/// Signs an access/refresh pair and records the refresh `jti`.
async fn issue_tokens(user_id: u64, email: &str, pool: &MySqlPool, config: &Config) -> Result<TokenPair, AppError> {
    let access_token = generate_access_token(user_id, email, &config.jwt_secret, config.access_token_ttl)
        .map_err(|e| AppError::Internal(format!("access token: {e}")))?;

    let (refresh_token, refresh_claims) =
        generate_refresh_token(user_id, email, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(|e| AppError::Internal(format!("refresh token: {e}")))?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Register a new student
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered"),
        (status = 503, description = "Database unavailable")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, config, payload), fields(email = %payload.email))]
pub async fn register(
    payload: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let req = payload.into_inner();

    Validator::new()
        .length("nis", &req.nis, 3, Some(20))
        .length("name", &req.name, 2, Some(100))
        .length("class_name", &req.class_name, 1, Some(50))
        .length("major", &req.major, 2, Some(100))
        .email("email", &req.email)
        .length("password", &req.password, 6, None)
        .optional_length("phone", req.phone.as_deref(), 10, Some(15))
        .finish()?;

    let email = sanitize_email(&req.email)
        .ok_or_else(|| AppError::Validation(vec!["email must be a valid email".into()]))?;
    let nis = sanitize_input(&req.nis);
    let name = sanitize_input(&req.name);
    let class_name = sanitize_input(&req.class_name);
    let major = sanitize_input(&req.major);
    let phone = req
        .phone
        .as_deref()
        .map(sanitize_phone)
        .filter(|p| !p.is_empty());

    Validator::new()
        .stored_length("nis", &nis, 20)
        .stored_length("name", &name, 100)
        .stored_length("class_name", &class_name, 50)
        .stored_length("major", &major, 100)
        .stored_length("phone", phone.as_deref().unwrap_or_default(), 20)
        .finish()?;

    if !is_email_available(&email, pool.get_ref()).await? {
        info!("Registration rejected: email taken");
        return Err(AppError::AlreadyExists("Email already registered".into()));
    }

    let hashed = hash_password(&req.password).map_err(|e| AppError::Internal(format!("hash: {e}")))?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (nis, name, class_name, major, email, password, phone, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, TRUE, UTC_TIMESTAMP(), UTC_TIMESTAMP())
        "#,
    )
    .bind(nis)
    .bind(name)
    .bind(class_name)
    .bind(major)
    .bind(&email)
    .bind(hashed)
    .bind(phone)
    .execute(pool.get_ref())
    .await;

    let user_id = match result {
        Ok(done) => done.last_insert_id(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            email_filter::insert(&email);
            email_cache::mark_taken(&email).await;
            return Err(AppError::AlreadyExists("Email already registered".into()));
        }
        Err(e) => {
            error!(error = %e, "Failed to insert user");
            return Err(e.into());
        }
    };

    // keep the filter and cache in step with the table
    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;

    let user = User::find_active(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("user {user_id} missing after insert")))?;

    let tokens = issue_tokens(user.id, &user.email, pool.get_ref(), &config).await?;

    info!(user_id, "Registration successful");

    Ok(created(
        "Registration successful",
        AuthResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: UserPublic::from(user),
        },
    ))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, user), fields(email = %user.email))]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    info!("Login request received");

    Validator::new()
        .email("email", &user.email)
        .length("password", &user.password, 6, None)
        .finish()?;

    let email = sanitize_email(&user.email).unwrap_or_default();

    debug!("Fetching user from database");

    let db_user = match User::find_active_by_email(pool.get_ref(), &email).await {
        Ok(Some(found)) => {
            debug!(user_id = found.id, "User found");
            found
        }
        Ok(None) => {
            info!("Invalid credentials: no active user");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return Err(e.into());
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let tokens = issue_tokens(db_user.id, &db_user.email, pool.get_ref(), &config).await?;

    if let Err(e) = sqlx::query("UPDATE users SET updated_at = UTC_TIMESTAMP() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        // intentionally not failing login
        error!(error = %e, "Failed to touch updated_at");
    }

    info!(user_id = db_user.id, "Login successful");

    Ok(ok(
        "Login successful",
        AuthResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: UserPublic::from(db_user),
        },
    ))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "Token refreshed", body = TokenPair),
        (status = 401, description = "Invalid, revoked or expired refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let invalid = || AppError::Unauthorized("Invalid or expired refresh token".into());

    let token = bearer(&req).ok_or_else(invalid)?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|_| invalid())?;

    if claims.token_type != TokenType::Refresh {
        return Err(invalid());
    }

    let record = sqlx::query_as::<_, (u64, u64, bool)>(
        r#"
        SELECT id, user_id, revoked
        FROM refresh_tokens
        WHERE jti = ?
        "#,
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await?;

    let (record_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        _ => return Err(invalid()),
    };

    let user = User::find_active(pool.get_ref(), user_id)
        .await?
        .ok_or(AppError::NotFoundOrInactive)?;

    // revoke old refresh token; a concurrent rotation wins only once
    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ? AND revoked = FALSE")
        .bind(record_id)
        .execute(pool.get_ref())
        .await?;

    if revoked.rows_affected() == 0 {
        warn!(user_id, "Refresh token reused during rotation");
        return Err(invalid());
    }

    let tokens = issue_tokens(user.id, &user.email, pool.get_ref(), &config).await?;

    Ok(ok("Token refreshed", tokens))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Logged out (idempotent)")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    // success even if the token didn't exist
    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;

    fn config() -> Config {
        Config::from_lookup(&|key| match key {
            "DATABASE_URL" => Some("mysql://root@127.0.0.1:1/presensi".into()),
            "JWT_SECRET" => Some("handler-secret".into()),
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
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(config()))
                    .app_data(web::Data::new(unreachable_pool()))
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh_token))
                    .route("/logout", web::post().to(logout)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn register_reports_all_validation_errors() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(serde_json::json!({
                "nis": "1",
                "name": "S",
                "class_name": "XII",
                "major": "RPL",
                "email": "nope",
                "password": "123",
            }))
            .to_request();

        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["data"]["errors"].as_array().unwrap().len(), 4);
    }

    #[actix_web::test]
    async fn register_rejects_names_that_outgrow_the_column_when_escaped() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(serde_json::json!({
                "nis": "2024001",
                "name": "<".repeat(30),
                "class_name": "XII",
                "major": "RPL",
                "email": "siti@sekolah.sch.id",
                "password": "Rahasia#123",
            }))
            .to_request();

        // 400 before the email lookup, so the unreachable pool is never hit
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(
            body["data"]["errors"][0],
            "name is too long after escaping special characters"
        );
    }

    #[actix_web::test]
    async fn login_requires_plausible_credentials() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(serde_json::json!({"email": "", "password": ""}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn refresh_rejects_access_tokens() {
        let app = app!();
        let access = generate_access_token(1, "a@b.id", "handler-secret", 60).unwrap();
        let req = test::TestRequest::post()
            .uri("/refresh")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn logout_is_idempotent_without_token() {
        let app = app!();
        let req = test::TestRequest::post().uri("/logout").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::post()
            .uri("/logout")
            .insert_header(("Authorization", "Bearer garbage"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    }
}
