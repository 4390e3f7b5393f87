use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::{
    auth::{
        auth::{AuthUser, MaybeAuthUser},
        password::{hash_password, verify_password},
    },
    error::AppError,
    model::user::{User, UserPublic},
    models::{ChangePasswordReq, UpdateProfileReq},
    utils::{
        db_utils::{SqlValue, build_update_sql, execute_update},
        response::{empty, ok},
        sanitize::{sanitize_input, sanitize_phone, sanitize_url},
        validation::{Validator, password_strength},
    },
};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserPublic>,
    pub count: usize,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Column/value pairs for the non-empty fields of an update, already
/// sanitized.
/// `users` column widths for the fields a profile update can touch.
const PROFILE_COLUMN_LIMITS: [(&str, usize); 5] =
    [("name", 100), ("class_name", 50), ("major", 100), ("phone", 20), ("avatar", 512)];

fn check_stored_lengths(fields: &[(&'static str, SqlValue)]) -> Result<(), AppError> {
    let mut v = Validator::new();
    for (column, value) in fields {
        let limit = PROFILE_COLUMN_LIMITS.iter().find(|(name, _)| name == column);
        if let (Some((_, max)), SqlValue::Text(text)) = (limit, value) {
            v.stored_length(column, text, *max);
        }
    }
    v.finish()
}

fn profile_changes(req: &UpdateProfileReq) -> Vec<(&'static str, SqlValue)> {
    let mut fields = Vec::new();

    if let Some(name) = non_blank(&req.name) {
        fields.push(("name", SqlValue::Text(sanitize_input(name))));
    }
    if let Some(class_name) = non_blank(&req.class_name) {
        fields.push(("class_name", SqlValue::Text(sanitize_input(class_name))));
    }
    if let Some(major) = non_blank(&req.major) {
        fields.push(("major", SqlValue::Text(sanitize_input(major))));
    }
    if let Some(phone) = non_blank(&req.phone) {
        fields.push(("phone", SqlValue::Text(sanitize_phone(phone))));
    }
    if let Some(avatar) = non_blank(&req.avatar).and_then(sanitize_url) {
        fields.push(("avatar", SqlValue::Text(avatar)));
    }

    fields
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/v1/user/profile",
    responses(
        (status = 200, description = "Profile retrieved", body = UserPublic),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn get_profile(auth: AuthUser) -> HttpResponse {
    ok("Profile retrieved successfully", auth.profile)
}

/// Update name, class, major, phone or avatar
#[utoipa::path(
    put,
    path = "/api/v1/user/profile",
    request_body = UpdateProfileReq,
    responses(
        (status = 200, description = "Profile updated", body = UserPublic),
        (status = 400, description = "Validation failed or nothing to update"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
#[instrument(name = "user_update_profile", skip_all, fields(user_id = auth.user_id))]
pub async fn update_profile(
    auth: AuthUser,
    payload: web::Json<UpdateProfileReq>,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    let req = payload.into_inner();

    Validator::new()
        .optional_length("name", req.name.as_deref(), 2, Some(100))
        .optional_length("class_name", req.class_name.as_deref(), 1, Some(50))
        .optional_length("major", req.major.as_deref(), 2, Some(100))
        .optional_length("phone", req.phone.as_deref(), 10, Some(15))
        .optional_url("avatar", req.avatar.as_deref())
        .finish()?;

    let mut fields = profile_changes(&req);
    if fields.is_empty() {
        return Err(AppError::BadRequest("No fields provided for update".into()));
    }
    check_stored_lengths(&fields)?;
    fields.push(("updated_at", SqlValue::DateTime(Utc::now())));

    let update = build_update_sql("users", fields, "id", auth.user_id)?;
    execute_update(pool.get_ref(), update).await?;

    let user = User::find_active(pool.get_ref(), auth.user_id)
        .await?
        .ok_or(AppError::NotFoundOrInactive)?;

    info!("Profile updated");
    Ok(ok("Profile updated successfully", UserPublic::from(user)))
}

/// Change password after verifying the current one
#[utoipa::path(
    post,
    path = "/api/v1/user/change-password",
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Weak password or wrong current password"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
#[instrument(name = "user_change_password", skip_all, fields(user_id = auth.user_id))]
pub async fn change_password(
    auth: AuthUser,
    payload: web::Json<ChangePasswordReq>,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    let req = payload.into_inner();

    Validator::new()
        .length("current_password", &req.current_password, 1, None)
        .extend(password_strength(&req.new_password))
        .finish()?;

    let user = User::find_active(pool.get_ref(), auth.user_id)
        .await?
        .ok_or(AppError::NotFoundOrInactive)?;

    if verify_password(&req.current_password, &user.password).is_err() {
        info!("Password change rejected: current password mismatch");
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let hashed = hash_password(&req.new_password).map_err(|e| AppError::Internal(format!("hash: {e}")))?;

    sqlx::query("UPDATE users SET password = ?, updated_at = UTC_TIMESTAMP() WHERE id = ?")
        .bind(hashed)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    // outstanding refresh tokens die with the old password
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh tokens");
    }

    info!("Password changed");
    Ok(empty("Password changed successfully"))
}

/// Soft-delete the current account
#[utoipa::path(
    post,
    path = "/api/v1/user/deactivate",
    responses(
        (status = 200, description = "Account deactivated"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
#[instrument(name = "user_deactivate", skip_all, fields(user_id = auth.user_id))]
pub async fn deactivate(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, AppError> {
    let update = build_update_sql(
        "users",
        vec![
            ("is_active", SqlValue::Bool(false)),
            ("updated_at", SqlValue::DateTime(Utc::now())),
        ],
        "id",
        auth.user_id,
    )?;
    execute_update(pool.get_ref(), update).await?;

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    info!("Account deactivated");
    Ok(empty("Account deactivated successfully"))
}

/// All active users
#[utoipa::path(
    get,
    path = "/api/v1/testing/users",
    responses(
        (status = 200, description = "Active users", body = UserListResponse),
        (status = 503, description = "Database unavailable")
    ),
    tag = "User"
)]
pub async fn list_users(viewer: MaybeAuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, AppError> {
    let users: Vec<UserPublic> = User::list_active(pool.get_ref())
        .await?
        .into_iter()
        .map(UserPublic::from)
        .collect();

    info!(
        viewer = ?viewer.0.as_ref().map(|u| u.user_id),
        count = users.len(),
        "Listing active users"
    );

    Ok(ok(
        "Users retrieved successfully",
        UserListResponse {
            count: users.len(),
            users,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_non_blank_fields_are_written() {
        let req = UpdateProfileReq {
            name: Some("  Siti <b>Rahma</b> ".into()),
            class_name: Some("   ".into()),
            phone: Some("0812-3456-7890".into()),
            ..UpdateProfileReq::default()
        };

        let fields = profile_changes(&req);
        let columns: Vec<_> = fields.iter().map(|(c, _)| *c).collect();
        assert_eq!(columns, vec!["name", "phone"]);
        assert_eq!(
            fields[0].1,
            SqlValue::Text("Siti &lt;b&gt;Rahma&lt;/b&gt;".into())
        );
    }

    #[test]
    fn empty_update_has_no_changes() {
        assert!(profile_changes(&UpdateProfileReq::default()).is_empty());
    }

    #[test]
    fn escaped_fields_must_fit_their_columns() {
        let req = UpdateProfileReq {
            class_name: Some("\"".repeat(20)),
            major: Some("Rekayasa Perangkat Lunak".into()),
            ..UpdateProfileReq::default()
        };
        match check_stored_lengths(&profile_changes(&req)) {
            Err(AppError::Validation(errors)) => assert_eq!(
                errors,
                vec!["class_name is too long after escaping special characters"]
            ),
            other => panic!("unexpected {other:?}"),
        }

        let req = UpdateProfileReq {
            class_name: Some("XII RPL 2".into()),
            ..UpdateProfileReq::default()
        };
        assert!(check_stored_lengths(&profile_changes(&req)).is_ok());
    }

    #[test]
    fn avatar_must_be_http_url() {
        let req = UpdateProfileReq {
            avatar: Some("javascript:alert(1)".into()),
            ..UpdateProfileReq::default()
        };
        assert!(profile_changes(&req).is_empty());

        let req = UpdateProfileReq {
            avatar: Some("https://cdn.school.sch.id/a.png".into()),
            ..UpdateProfileReq::default()
        };
        assert_eq!(profile_changes(&req)[0].0, "avatar");
    }
}
