use thiserror::Error;

use crate::models::UserId;

/// Failures at the HTTP boundary. These never cross the store boundary
/// untranslated; the stores wrap them into `StoreError`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned HTTP {status}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
    },

    #[error("could not decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("not logged in")]
    NotAuthenticated,
}

/// Error taxonomy of the conversation core. Nothing here is fatal to the
/// process: every variant degrades to stale or partial data on screen.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Conversation fetch failed; the previous in-memory state for that
    /// counterparty is left untouched.
    #[error("failed to load conversation with user {counterparty}: {source}")]
    LoadFailed {
        counterparty: UserId,
        #[source]
        source: ApiError,
    },

    /// Send failed; the optimistic message stays visible, flagged unsent,
    /// so the user can retry.
    #[error("failed to send message to user {recipient}: {source}")]
    SendFailed {
        recipient: UserId,
        #[source]
        source: ApiError,
    },

    /// Fetching the conversation index failed; every existing conversation
    /// is left untouched.
    #[error("failed to refresh conversations: {0}")]
    RefreshFailed(#[source] ApiError),

    /// Blank or whitespace-only content, rejected before any network call.
    #[error("message content is empty")]
    EmptyMessage,

    /// Directory warm-up failed. Non-fatal: lookups fall back to
    /// placeholder display names.
    #[error("user directory warm-up failed: {0}")]
    DirectoryWarmupFailed(#[source] ApiError),
}
