use crate::auth::auth::AuthUser;
use crate::auth::password::hash_password;
use crate::model::role::Role;
use crate::utils::db_utils::{build_update_sql, execute_update};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{MySqlPool, prelude::FromRow};
use tracing::error;
use utoipa::ToSchema;

#[derive(Serialize, FromRow, ToSchema)]
pub struct UserResponse {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Siti Rahma")]
    pub name: String,
    #[schema(example = "EMP-0001")]
    pub employee_number: String,
    #[schema(example = 3)]
    pub role_id: u8,
    pub is_active: bool,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "Siti Rahma")]
    pub name: String,
    #[schema(example = "EMP-0001")]
    pub employee_number: String,
    #[schema(example = "s3cret!")]
    pub password: String,
    #[schema(example = 3)]
    pub role_id: u8,
    pub is_active: Option<bool>,
}

const USER_COLUMNS: &str = "id, name, employee_number, role_id, is_active, last_login_at";

// Columns an admin may touch through the partial-update endpoint. Password
// goes through its own hashing path, never through the generic payload.
const UPDATABLE_COLUMNS: &[&str] = &["name", "employee_number", "role_id", "is_active"];

/// SQLSTATE 23000: unique key violation, here only `employee_number`.
fn duplicate_employee_number(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23000"))
}

/// List users (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    responses(
        (status = 200, description = "All user accounts", body = Object, example = json!({
            "success": true,
            "data": []
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    auth.require_user_directory()?;

    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC");
    let users = sqlx::query_as::<_, UserResponse>(&sql)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to list users");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": users,
    })))
}

/// Get a single user (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_user_directory()?;

    let id = path.into_inner();
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, UserResponse>(&sql)
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, id, "Failed to fetch user");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": user}))),
        None => Ok(HttpResponse::NotFound().json(json!({"message": "User not found"}))),
    }
}

/// Create a user account (Admin only)
#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = Object, example = json!({
            "message": "User created successfully."
        })),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Employee number already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> actix_web::Result<impl Responder> {
    auth.require_user_admin()?;

    let name = payload.name.trim();
    let employee_number = payload.employee_number.trim();

    if name.is_empty() || employee_number.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "name and employee_number must not be empty"
        })));
    }
    if payload.password.len() < 6 {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "password must be at least 6 characters"
        })));
    }
    if Role::from_id(payload.role_id).is_none() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Unknown role_id"
        })));
    }

    let hashed = hash_password(&payload.password);
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, employee_number, password, role_id, is_active)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(employee_number)
    .bind(&hashed)
    .bind(payload.role_id)
    .bind(payload.is_active.unwrap_or(true))
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => Ok(HttpResponse::Created().json(json!({
            "message": "User created successfully."
        }))),
        Err(e) => {
            if duplicate_employee_number(&e) {
                return Ok(HttpResponse::Conflict().json(json!({
                    "message": "Employee number already exists"
                })));
            }
            error!(error = %e, "Failed to create user");
            Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Internal Server Error"
            })))
        }
    }
}

/// Update a user account (Admin only)
///
/// Partial update: any subset of name, employee_number, role_id, is_active,
/// plus an optional password which is re-hashed.
#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    request_body(content = Object, description = "Subset of user fields", content_type = "application/json"),
    responses(
        (status = 200, description = "User updated"),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Employee number already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_user_admin()?;

    let id = path.into_inner();
    let mut payload = payload.into_inner();

    if let Some(role_id) = payload.get("role_id").and_then(Value::as_u64) {
        if Role::from_id(role_id as u8).is_none() {
            return Ok(HttpResponse::BadRequest().json(json!({"message": "Unknown role_id"})));
        }
    }

    // Pull the password out and hash it; everything else flows through the
    // whitelisted dynamic update.
    let hashed_password = match payload.as_object_mut().and_then(|o| o.remove("password")) {
        Some(Value::String(p)) if p.len() >= 6 => Some(hash_password(&p)),
        Some(_) => {
            return Ok(HttpResponse::BadRequest().json(json!({
                "message": "password must be a string of at least 6 characters"
            })));
        }
        None => None,
    };

    // rows_affected can't distinguish "no such user" from "values unchanged"
    // on MySQL, so existence is checked up front; an idempotent re-submit of
    // the same fields is a success, not a 404.
    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, id, "Failed to look up user");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;
    if exists.is_none() {
        return Ok(HttpResponse::NotFound().json(json!({"message": "User not found"})));
    }

    if payload.as_object().is_some_and(|o| !o.is_empty()) {
        let update = build_update_sql("users", &payload, UPDATABLE_COLUMNS, "id", id)?;
        if let Err(e) = execute_update(pool.get_ref(), update).await {
            if duplicate_employee_number(&e) {
                return Ok(HttpResponse::Conflict().json(json!({
                    "message": "Employee number already exists"
                })));
            }
            error!(error = %e, id, "Failed to update user");
            return Err(actix_web::error::ErrorInternalServerError("Internal Server Error"));
        }
    } else if hashed_password.is_none() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "No fields provided for update"
        })));
    }

    if let Some(hashed) = hashed_password {
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(&hashed)
            .bind(id)
            .execute(pool.get_ref())
            .await
            .map_err(|e| {
                error!(error = %e, id, "Failed to update password");
                actix_web::error::ErrorInternalServerError("Internal Server Error")
            })?;
    }

    Ok(HttpResponse::Ok().json(json!({"message": "User updated successfully."})))
}

/// Delete a user account (Admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_user_admin()?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, id, "Failed to delete user");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    if result.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({"message": "User not found"})));
    }

    Ok(HttpResponse::Ok().json(json!({"message": "User deleted successfully."})))
}
