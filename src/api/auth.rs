// Authentication endpoints: register, token login, current-user lookup.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Role, User};

use super::ApiClient;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterData {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
}

impl ApiClient {
    /// Register a new user account.
    pub async fn register(&self, data: &RegisterData) -> Result<User, ApiError> {
        let user: User = self.post_json("/api/users/users/", data).await?;
        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Exchange credentials for a bearer token and install it on the client.
    ///
    /// The token endpoint takes form-encoded credentials, not JSON.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let form = [("username", username), ("password", password)];
        let auth: AuthResponse = self.post_form("/api/token", &form).await?;
        self.set_token(&auth.access_token);
        info!("Logged in as {}", username);
        Ok(auth)
    }

    /// Fetch the profile of the user the current token belongs to.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        if !self.has_token() {
            return Err(ApiError::NotAuthenticated);
        }
        self.get_json("/api/users/users/me/").await
    }
}
