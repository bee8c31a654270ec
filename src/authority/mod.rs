//! Client for the external authentication authority.

use crate::{config::GateConfig, APP_USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(3);

/// Session data the authority hands back in exchange for a one-time token.
///
/// `logged_in` is the only field the gate interprets; a body without it does
/// not parse. Everything else rides along in `extra` and becomes visible to
/// the protected site through `CurrentUser`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub logged_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid authority url")]
    AuthorityUrl(#[from] url::ParseError),
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("exchange request failed")]
    Transport(#[source] reqwest::Error),
    #[error("authority answered with status {0}")]
    Status(StatusCode),
    #[error("authority answered with an unreadable body")]
    Body(#[source] reqwest::Error),
}

/// Outbound half of the gate: owns the HTTP client and the authority URLs,
/// all parsed once at construction.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    client: Client,
    base: Url,
    session_info: Url,
    redirector: Url,
}

impl AuthorityClient {
    /// Build the client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the authority domain and paths do not combine
    /// into parseable URLs, or the HTTP client cannot be built.
    pub fn new(config: &GateConfig) -> Result<Self, Error> {
        let base = Url::parse(&format!("{}://{}", config.scheme(), config.authority()))?;
        let session_info = join(&base, config.session_path())?;
        let redirector = join(&base, config.redirector_path())?;

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .map_err(Error::Client)?;

        Ok(Self {
            client,
            base,
            session_info,
            redirector,
        })
    }

    /// Any path on the authority origin, pure URL construction, no I/O.
    ///
    /// # Errors
    ///
    /// Returns an error when `path` does not combine with the origin into a
    /// parseable URL.
    pub fn authority_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.base, path)
    }

    /// Exchange URL for a one-time token: `{session_path}?basic=true&token=…`.
    #[must_use]
    pub fn session_info_url(&self, token: &str) -> Url {
        let mut url = self.session_info.clone();
        url.query_pairs_mut()
            .append_pair("basic", "true")
            .append_pair("token", token);
        url
    }

    /// Login-redirect URL carrying the page to come back to, urlencoded.
    #[must_use]
    pub fn redirector_url(&self, return_to: &str) -> Url {
        let mut url = self.redirector.clone();
        url.query_pairs_mut().append_pair("redirect", return_to);
        url
    }

    /// Trade a verified one-time token for the authority's session data.
    ///
    /// Exactly one attempt, bounded by the client timeout. The authority is
    /// the only party that can replay-check the token, so a failure here is
    /// final; callers restart the login flow instead of retrying.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be sent, the authority
    /// answers with a non-200 status, or the body is not a session payload.
    pub async fn exchange(&self, token: &str) -> Result<SessionClaims, Error> {
        debug!("exchanging one-time token with the authority");

        let response = self
            .client
            .get(self.session_info_url(token))
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Status(status));
        }

        response.json::<SessionClaims>().await.map_err(Error::Body)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, Error> {
    let origin = base.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{origin}{path}"))?)
}
