use anyhow::Context;
use axum::http::{header, HeaderMap};
use expensa_core::config::Settings;
use expensa_core::error::{ServiceError, ServiceResult};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

const AUTH_TIMEOUT_SECS: u64 = 10;

/// Resolves a user JWT through the Supabase auth endpoint.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
}

impl SupabaseAuth {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_supabase_url()?.to_string();
        let api_key = settings.require_supabase_api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(AUTH_TIMEOUT_SECS))
            .build()
            .context("failed to build auth http client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub async fn user_id(&self, headers: &HeaderMap) -> ServiceResult<Uuid> {
        let token = bearer_token(headers)?;
        let url = format!("{}/auth/v1/user", self.base_url.trim_end_matches('/'));

        let res = self
            .http
            .get(url)
            .header("apikey", self.api_key.as_str())
            .bearer_auth(token)
            .send()
            .await
            .context("auth request failed")?;

        let status = res.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ServiceError::Authentication("invalid or expired token".to_string()));
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("auth endpoint returned HTTP {status}").into());
        }

        let user = res
            .json::<AuthUser>()
            .await
            .context("failed to decode auth user")?;
        Ok(user.id)
    }
}

fn bearer_token(headers: &HeaderMap) -> ServiceResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Authentication("missing bearer token".to_string()))
}
