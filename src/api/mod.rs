// HTTP client for the TutorLink backend
// This file owns the shared client state; each backend service area
// (auth, users, messages, tutors) lives in its own submodule.

use std::sync::RwLock;
use std::time::Duration;

use log::{debug, error};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;

pub mod auth;
pub mod messages;
pub mod tutors;
pub mod users;

/// Matches the 10 second timeout the web client used for every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the marketplace HTTP API. Attaches the bearer token to every
/// request once one is set; base URL and token handling live here so the
/// stores never see transport details.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    /// Install the bearer token used for subsequent requests.
    pub fn set_token(&self, token: &str) {
        *self.token.write().expect("token lock poisoned") = Some(token.to_string());
    }

    pub fn clear_token(&self) {
        *self.token.write().expect("token lock poisoned") = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().expect("token lock poisoned").is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().expect("token lock poisoned");
        match token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self
            .authorize(builder.timeout(REQUEST_TIMEOUT))
            .send()
            .await
            .map_err(|e| {
                error!("Request to {} failed: {}", path, e);
                ApiError::Transport {
                    path: path.to_string(),
                    source: e,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("{} returned HTTP {}", path, status);
            return Err(ApiError::Status {
                path: path.to_string(),
                status,
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!("Could not decode response from {}: {}", path, e);
            ApiError::Decode {
                path: path.to_string(),
                source: e,
            }
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("GET {}", path);
        self.execute_json(path, self.http.get(self.url(path))).await
    }

    pub(crate) async fn get_json_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        debug!("GET {} ({} query params)", path, query.len());
        self.execute_json(path, self.http.get(self.url(path)).query(query))
            .await
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!("POST {}", path);
        self.execute_json(path, self.http.post(self.url(path)).json(body))
            .await
    }

    pub(crate) async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        debug!("POST {} (form)", path);
        self.execute_json(path, self.http.post(self.url(path)).form(form))
            .await
    }

    pub(crate) async fn patch_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!("PATCH {}", path);
        self.execute_json(path, self.http.patch(self.url(path)).json(body))
            .await
    }

    /// PATCH where the caller only cares about success, not the body.
    pub(crate) async fn patch_unit(&self, path: &str) -> Result<(), ApiError> {
        debug!("PATCH {}", path);
        let response = self
            .authorize(self.http.patch(self.url(path)).timeout(REQUEST_TIMEOUT))
            .send()
            .await
            .map_err(|e| {
                error!("Request to {} failed: {}", path, e);
                ApiError::Transport {
                    path: path.to_string(),
                    source: e,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("{} returned HTTP {}", path, status);
            return Err(ApiError::Status {
                path: path.to_string(),
                status,
            });
        }
        Ok(())
    }
}
