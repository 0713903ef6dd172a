//! Room access tokens.

use livekit_api::access_token::{AccessToken, VideoGrants};

use crate::error::{RelayError, Result};

const MEET_URL: &str = "https://meet.livekit.io/custom";

/// A join-only token for one participant in one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Participant identity.
    pub identity: String,
    /// Display name; defaults to the identity.
    pub name: Option<String>,
    /// Room to join.
    pub room: String,
}

impl TokenRequest {
    /// Request a token for `identity` in `room`.
    pub fn new(identity: impl Into<String>, room: impl Into<String>) -> Self {
        Self { identity: identity.into(), name: None, room: room.into() }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sign the token with the server's API key pair.
    pub fn mint(&self, api_key: &str, api_secret: &str) -> Result<String> {
        let name = self.name.as_deref().unwrap_or(&self.identity);
        AccessToken::with_api_key(api_key, api_secret)
            .with_identity(&self.identity)
            .with_name(name)
            .with_grants(VideoGrants {
                room_join: true,
                room: self.room.clone(),
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| RelayError::room(format!("failed to mint access token: {e}")))
    }
}

/// Browser URL that joins `server_url` with `token` through LiveKit Meet.
pub fn listener_url(server_url: &str, token: &str) -> String {
    format!("{MEET_URL}?liveKitUrl={server_url}&token={token}")
}
