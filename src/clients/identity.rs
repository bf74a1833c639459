use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    clients::ProfileDirectory,
    config::IdentityConfig,
    error::DirectoryError,
    models::profile::{Profile, UserRepresentation},
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Profile lookups against the identity provider's admin API.
pub struct IdentityClient {
    http_client: Client,
    config: IdentityConfig,
}

impl IdentityClient {
    pub fn new(config: IdentityConfig) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        info!(users_url = %config.users_url, "Identity client initialized");

        Ok(Self { http_client, config })
    }

    async fn ensure_success(response: Response) -> Result<Response, DirectoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(DirectoryError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ProfileDirectory for IdentityClient {
    async fn access_token(&self) -> Result<String, DirectoryError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        let token: TokenResponse = Self::ensure_success(response).await?.json().await?;

        debug!("Identity access token obtained");
        Ok(token.access_token)
    }

    async fn profile(&self, token: &str, user_id: &str) -> Result<Profile, DirectoryError> {
        let url = format!("{}/{}", self.config.users_url.trim_end_matches('/'), user_id);

        let response = self.http_client.get(&url).bearer_auth(token).send().await?;
        let user: UserRepresentation = Self::ensure_success(response).await?.json().await?;

        debug!(user_id, "Profile resolved");
        Profile::try_from(user)
    }
}
