/// GitHub OAuth adapter
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ProviderSettings;
use crate::error::{AuthError, Result};

use super::{select_primary_email, ExternalIdentity, IdentityProvider, ProviderEmail};

const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

pub struct GithubProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

impl GithubProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.http_timeout_secs))
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { settings, http })
    }

    /// Browser URL that starts the authorization flow. `state` is the
    /// caller's CSRF token and round-trips through the callback.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&scope=read:user%20user:email&state={}",
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.redirect_uri),
            urlencoding::encode(state)
        )
    }

    fn exchange_error(&self, message: impl Into<String>) -> AuthError {
        AuthError::ProviderExchangeFailed {
            provider: self.name().to_string(),
            message: message.into(),
        }
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String> {
        let response = self
            .http
            .post(TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("code", code),
                ("client_id", &self.settings.client_id),
                ("client_secret", &self.settings.client_secret),
                ("redirect_uri", &self.settings.redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| self.exchange_error(e.to_string()))?
            .json::<TokenResponse>()
            .await
            .map_err(|e| self.exchange_error(e.to_string()))?;

        response.access_token.ok_or_else(|| {
            self.exchange_error(
                response
                    .error_description
                    .unwrap_or_else(|| "No access token in response".to_string()),
            )
        })
    }

    async fn fetch_user(&self, access_token: &str) -> Result<(GithubUser, serde_json::Value)> {
        let raw = self
            .http
            .get(USER_URL)
            .bearer_auth(access_token)
            .header("User-Agent", "accounts-service")
            .send()
            .await
            .map_err(|e| self.exchange_error(e.to_string()))?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| self.exchange_error(e.to_string()))?;

        let user: GithubUser = serde_json::from_value(raw.clone())
            .map_err(|e| self.exchange_error(format!("Unexpected profile shape: {e}")))?;
        Ok((user, raw))
    }

    /// The profile `email` is often null; the emails endpoint is the
    /// authoritative list. A failure here degrades to the profile email
    /// rather than failing the whole exchange.
    async fn fetch_emails(&self, access_token: &str) -> Vec<ProviderEmail> {
        let result = self
            .http
            .get(EMAILS_URL)
            .bearer_auth(access_token)
            .header("User-Agent", "accounts-service")
            .send()
            .await;

        match result {
            Ok(response) => response.json::<Vec<ProviderEmail>>().await.unwrap_or_else(|e| {
                warn!("Failed to parse GitHub emails response: {e}");
                Vec::new()
            }),
            Err(e) => {
                warn!("GitHub emails request failed: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity> {
        let access_token = self.fetch_access_token(code).await?;
        let (user, raw_metadata) = self.fetch_user(&access_token).await?;

        let primary_email = match select_primary_email(&self.fetch_emails(&access_token).await) {
            Some(email) => Some(email),
            None => user.email.clone(),
        };

        let (first_name, last_name) = split_name(user.name.as_deref());
        debug!(provider_id = user.id, login = %user.login, "GitHub identity normalized");

        Ok(ExternalIdentity {
            provider_name: self.name().to_string(),
            provider_id: user.id.to_string(),
            primary_email,
            display_name: user.name.clone().or(Some(user.login)),
            first_name,
            last_name,
            avatar_url: user.avatar_url,
            raw_metadata,
        })
    }
}

fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    let name = match name {
        Some(n) if !n.trim().is_empty() => n.trim(),
        _ => return (None, None),
    };
    match name.split_once(' ') {
        Some((first, rest)) => (Some(first.to_string()), Some(rest.trim().to_string())),
        None => (Some(name.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_escapes_state() {
        let provider = GithubProvider::new(ProviderSettings {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            http_timeout_secs: 10,
        })
        .unwrap();

        let url = provider.authorize_url("a b&c");
        assert!(url.starts_with("https://github.com/login/oauth/authorize?client_id=cid"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback"));
        assert!(url.contains("state=a%20b%26c"));
    }

    #[test]
    fn name_splits_on_first_space() {
        assert_eq!(
            split_name(Some("Ada Lovelace King")),
            (Some("Ada".to_string()), Some("Lovelace King".to_string()))
        );
        assert_eq!(split_name(Some("mononym")), (Some("mononym".to_string()), None));
        assert_eq!(split_name(Some("  ")), (None, None));
        assert_eq!(split_name(None), (None, None));
    }
}
