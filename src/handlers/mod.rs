pub mod bookings;
pub mod health;
pub mod reschedule;
pub mod schedule;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::http::HeaderMap;
use chrono::NaiveDateTime;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{CurrentUser, Role};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let token = header(headers, "authorization")
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Resolves the caller from the gateway's identity headers. Admins must also present the
/// admin bearer token.
pub fn current_user(headers: &HeaderMap, config: &AppConfig) -> Result<CurrentUser, AppError> {
    let id = header(headers, "x-user-id").ok_or(AppError::Unauthorized)?;
    let role = header(headers, "x-user-role")
        .and_then(Role::parse)
        .ok_or(AppError::Unauthorized)?;

    if role == Role::Admin {
        check_auth(headers, &config.admin_token)?;
    }

    Ok(CurrentUser::new(id, role))
}

pub fn require_role(user: &CurrentUser, role: Role) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::forbidden(format!(
            "this action requires the {} role",
            role.as_str()
        )));
    }
    Ok(())
}

/// Unwraps a JSON body, turning extractor rejections into the usual error body.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::validation(e.body_text()))
}

pub fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|Query(q)| q)
        .map_err(|e| AppError::validation(e.body_text()))
}

/// Slot times are wall-clock times in the school's zone, so "now" is local too.
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> AppConfig {
        AppConfig {
            port: 3000,
            database_url: ":memory:".to_string(),
            admin_token: "secret".to_string(),
            notify_webhook_url: String::new(),
            notify_webhook_secret: String::new(),
        }
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_current_user_from_headers() {
        let user = current_user(
            &headers(&[("x-user-id", "student-1"), ("x-user-role", "Student")]),
            &config(),
        )
        .unwrap();
        assert_eq!(user, CurrentUser::new("student-1", Role::Student));
    }

    #[test]
    fn test_missing_identity_is_unauthorized() {
        assert!(matches!(
            current_user(&headers(&[("x-user-role", "reader")]), &config()),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            current_user(
                &headers(&[("x-user-id", "u1"), ("x-user-role", "janitor")]),
                &config()
            ),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_admin_needs_bearer_token() {
        let without = headers(&[("x-user-id", "a1"), ("x-user-role", "admin")]);
        assert!(matches!(current_user(&without, &config()), Err(AppError::Unauthorized)));

        let wrong = headers(&[
            ("x-user-id", "a1"),
            ("x-user-role", "admin"),
            ("authorization", "Bearer nope"),
        ]);
        assert!(matches!(current_user(&wrong, &config()), Err(AppError::Unauthorized)));

        let right = headers(&[
            ("x-user-id", "a1"),
            ("x-user-role", "admin"),
            ("authorization", "Bearer secret"),
        ]);
        assert!(current_user(&right, &config()).unwrap().is_admin());
    }

    #[test]
    fn test_require_role() {
        let reader = CurrentUser::new("r1", Role::Reader);
        assert!(require_role(&reader, Role::Reader).is_ok());
        assert!(matches!(
            require_role(&reader, Role::Student),
            Err(AppError::Forbidden(_))
        ));
    }
}
