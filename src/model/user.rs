use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::ToSchema;

/// Student account row. `password` holds the argon2 PHC string.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub nis: String,
    pub name: String,
    pub class_name: String,
    pub major: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What other people may see about a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "2200123")]
    pub nis: String,
    #[schema(example = "Siti Rahma")]
    pub name: String,
    #[schema(example = "XII RPL 1")]
    pub class_name: String,
    #[schema(example = "Rekayasa Perangkat Lunak")]
    pub major: String,
    #[schema(example = "siti@school.sch.id", format = "email")]
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            nis: user.nis,
            name: user.name,
            class_name: user.class_name,
            major: user.major,
            email: user.email,
            phone: user.phone,
            avatar: user.avatar,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

pub const USER_COLUMNS: &str = "id, nis, name, class_name, major, email, password, phone, avatar, \
                                is_active, created_at, updated_at";

impl User {
    pub async fn find_active(pool: &MySqlPool, id: u64) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND is_active = TRUE");
        sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(pool).await
    }

    pub async fn find_active_by_email(pool: &MySqlPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? AND is_active = TRUE");
        sqlx::query_as::<_, User>(&sql).bind(email).fetch_optional(pool).await
    }

    pub async fn list_active(pool: &MySqlPool) -> Result<Vec<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE is_active = TRUE ORDER BY id");
        sqlx::query_as::<_, User>(&sql).fetch_all(pool).await
    }
}
