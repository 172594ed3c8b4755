use std::sync::Arc;

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::auth::bearer_token;
use crate::error::AppError;
use crate::models::user::{Identity, Role};
use crate::models::UserId;
use crate::state::AppState;

/// Caller identity taken from the `Authorization` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Identity);

impl AuthUser {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if self.0.is_admin() || self.0.has_role(allowed) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {} may not perform this action",
                self.0.role.as_str()
            )))
        }
    }

    /// Admins may act for anyone; everyone else only for themselves.
    pub fn require_self(&self, user_id: UserId) -> Result<(), AppError> {
        if self.0.is_admin() || self.0.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "cannot act on behalf of another user".to_string(),
            ))
        }
    }

    /// Role published with a chat send. Non-admins always speak as their own
    /// role and may not claim another; admins may label the send freely.
    pub fn attributed_role(&self, claimed: &str) -> Result<String, AppError> {
        let claimed = claimed.trim();
        let own = self.0.role.as_str().to_string();
        if claimed.is_empty() {
            return Ok(own);
        }
        if self.0.is_admin() {
            return Ok(claimed.to_string());
        }

        match Role::parse(claimed) {
            Some(role) if role == self.0.role => Ok(own),
            _ => Err(AppError::Forbidden(format!(
                "cannot send as {claimed:?} with role {own}"
            ))),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed authorization header".to_string()))?;

        let token = bearer_token(header)?;
        state.authenticator.authenticate(token).map(AuthUser)
    }
}

/// `Json` body whose rejections surface as `AppError::InvalidInput`.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| JsonBody(value))
            .map_err(|rejection: JsonRejection| AppError::InvalidInput(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::AuthUser;
    use crate::error::AppError;
    use crate::models::user::{Identity, Role};

    fn user(user_id: u64, role: Role) -> AuthUser {
        AuthUser(Identity { user_id, role })
    }

    #[test]
    fn sender_role_follows_the_caller() {
        let courier = user(21, Role::Kurir);

        assert_eq!(courier.attributed_role("").unwrap(), "kurir");
        assert_eq!(courier.attributed_role("Courier").unwrap(), "kurir");
        assert!(matches!(
            courier.attributed_role("customer"),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            user(7, Role::Customer).attributed_role("admin"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_may_label_sends() {
        let admin = user(1, Role::Admin);
        assert_eq!(admin.attributed_role("support").unwrap(), "support");
        assert_eq!(admin.attributed_role(" ").unwrap(), "admin");
    }

    #[test]
    fn self_and_role_checks() {
        let customer = user(7, Role::Customer);
        assert!(customer.require_self(7).is_ok());
        assert!(customer.require_self(8).is_err());
        assert!(customer.require_role(&[Role::Kurir]).is_err());
        assert!(user(1, Role::Admin).require_role(&[Role::Kurir]).is_ok());
    }
}
