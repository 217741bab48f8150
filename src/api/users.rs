// User directory endpoints.

use async_trait::async_trait;

use crate::directory::DirectoryGateway;
use crate::error::ApiError;
use crate::models::{User, UserId};

use super::ApiClient;

impl ApiClient {
    /// Fetch the full user directory.
    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("/api/users/users/").await
    }

    /// Fetch a single user record.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, ApiError> {
        self.get_json(&format!("/api/users/users/{}", user_id)).await
    }
}

#[async_trait]
impl DirectoryGateway for ApiClient {
    async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        self.list_users().await
    }
}
