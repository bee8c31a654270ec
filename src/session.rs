//! Client-held state: the session credential and the saved return URL.
//!
//! Both cookies carry a base64url JSON envelope with an optional embedded
//! expiry, checked server-side on every read. The browser's own `Max-Age`
//! handling is treated as advisory only.

use crate::{authority::SessionClaims, config::GateConfig};
use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// How long a saved return URL stays usable.
pub const RETURN_URL_TTL_SECONDS: i64 = 120;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("cookie value rejected")]
    Header(#[from] InvalidHeaderValue),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    payload: T,
}

/// Wall-clock seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

/// Codec for the `{prefix}session` cookie holding the session credential.
#[derive(Debug, Clone)]
pub struct SessionStore {
    cookie_name: String,
    ttl_seconds: i64,
    secure: bool,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: &GateConfig) -> Self {
        Self {
            cookie_name: config.session_cookie_name(),
            ttl_seconds: config.session_expire_seconds(),
            secure: config.use_tls(),
        }
    }

    /// Build the `Set-Cookie` value carrying freshly exchanged session data.
    ///
    /// A zero TTL produces a session-scoped cookie with no embedded expiry;
    /// a positive TTL sets `Max-Age` and embeds `expires_at = now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error when the claims cannot be encoded or the resulting
    /// value is not a legal header.
    pub fn write(&self, claims: &SessionClaims, now: i64) -> Result<HeaderValue, Error> {
        let expires_at = (self.ttl_seconds > 0).then(|| now + self.ttl_seconds);
        let blob = encode(&Envelope {
            expires_at,
            payload: claims,
        })?;

        let mut cookie = format!(
            "{}={blob}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name
        );
        if self.ttl_seconds > 0 {
            cookie.push_str(&format!("; Max-Age={}", self.ttl_seconds));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// Decode the session credential, if present and still valid.
    ///
    /// Missing, malformed and expired credentials all read as `None`; none
    /// of them may ever pass for an authenticated session.
    #[must_use]
    pub fn read(&self, headers: &HeaderMap, now: i64) -> Option<SessionClaims> {
        let raw = cookie_value(headers, &self.cookie_name)?;
        let envelope: Envelope<SessionClaims> = decode(&raw)?;
        if let Some(expires_at) = envelope.expires_at {
            if now >= expires_at {
                return None;
            }
        }
        Some(envelope.payload)
    }

    /// Whether the cookie arrived at all, valid or not.
    #[must_use]
    pub fn cookie_present(&self, headers: &HeaderMap) -> bool {
        cookie_value(headers, &self.cookie_name).is_some()
    }

    /// Removal cookie for sign-out and for actively clearing bad state.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not a legal header.
    pub fn clear(&self) -> Result<HeaderValue, Error> {
        Ok(removal_cookie(&self.cookie_name, self.secure)?)
    }
}

/// Codec for the `{prefix}session_return_url` cookie remembering where the
/// visitor was headed before the login round trip.
#[derive(Debug, Clone)]
pub struct ReturnUrlGuard {
    cookie_name: String,
    secure: bool,
}

impl ReturnUrlGuard {
    #[must_use]
    pub fn new(config: &GateConfig) -> Self {
        Self {
            cookie_name: config.return_url_cookie_name(),
            secure: config.use_tls(),
        }
    }

    /// Build the `Set-Cookie` value saving `url` for the next 120 seconds.
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be encoded into a header.
    pub fn save(&self, url: &str, now: i64) -> Result<HeaderValue, Error> {
        let blob = encode(&Envelope {
            expires_at: Some(now + RETURN_URL_TTL_SECONDS),
            payload: url,
        })?;

        let mut cookie = format!(
            "{}={blob}; Path=/; HttpOnly; SameSite=Lax; Max-Age={RETURN_URL_TTL_SECONDS}",
            self.cookie_name
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// Read the saved URL if it has not aged out. Callers pair this with
    /// `removal_cookie` so a value is only ever used once.
    #[must_use]
    pub fn consume(&self, headers: &HeaderMap, now: i64) -> Option<String> {
        let raw = cookie_value(headers, &self.cookie_name)?;
        let envelope: Envelope<String> = decode(&raw)?;
        match envelope.expires_at {
            Some(expires_at) if now < expires_at => Some(envelope.payload),
            _ => None,
        }
    }

    #[must_use]
    pub fn cookie_present(&self, headers: &HeaderMap) -> bool {
        cookie_value(headers, &self.cookie_name).is_some()
    }

    /// Removal cookie for the delete half of read-then-delete.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not a legal header.
    pub fn removal_cookie(&self) -> Result<HeaderValue, Error> {
        Ok(removal_cookie(&self.cookie_name, self.secure)?)
    }
}

fn encode<T: Serialize>(envelope: &Envelope<T>) -> Result<String, Error> {
    let json = serde_json::to_vec(envelope)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn decode<T: DeserializeOwned>(raw: &str) -> Option<Envelope<T>> {
    let bytes = Base64UrlUnpadded::decode_vec(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn removal_cookie(name: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
            continue;
        };
        if key.trim() == name {
            return Some(val.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn config() -> GateConfig {
        GateConfig::new(
            "auth.example.test".to_string(),
            "/redirector".to_string(),
            "/session-info".to_string(),
            SecretString::from("s3cret".to_string()),
            "auth.example.test".to_string(),
        )
    }

    fn claims() -> SessionClaims {
        let mut extra = serde_json::Map::new();
        extra.insert("email".to_string(), json!("user@example.test"));
        SessionClaims {
            logged_in: true,
            return_url: Some("/docs".to_string()),
            extra,
        }
    }

    // Turn a Set-Cookie value back into the Cookie header a browser would send.
    fn request_headers(set_cookie: &HeaderValue) -> HeaderMap {
        let value = set_cookie.to_str().expect("ascii cookie");
        let pair = value.split(';').next().expect("cookie pair");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(pair).expect("header value"),
        );
        headers
    }

    #[test]
    fn session_scoped_cookie_never_expires_server_side() -> Result<(), Error> {
        let store = SessionStore::new(&config());
        let set_cookie = store.write(&claims(), NOW)?;

        let no_max_age = set_cookie
            .to_str()
            .expect("ascii")
            .split(';')
            .skip(1)
            .all(|attr| !attr.trim().starts_with("Max-Age"));
        assert!(no_max_age);

        let headers = request_headers(&set_cookie);
        let read = store.read(&headers, NOW + 10_000_000).expect("session");
        assert!(read.logged_in);
        assert_eq!(read.extra.get("email"), Some(&json!("user@example.test")));
        Ok(())
    }

    #[test]
    fn positive_ttl_is_enforced_on_read() -> Result<(), Error> {
        let store = SessionStore::new(&config().with_session_expire_seconds(60));
        let set_cookie = store.write(&claims(), NOW)?;

        assert!(set_cookie.to_str().expect("ascii").contains("Max-Age=60"));

        let headers = request_headers(&set_cookie);
        assert!(store.read(&headers, NOW + 59).is_some());
        assert!(store.read(&headers, NOW + 60).is_none());
        assert!(store.cookie_present(&headers));
        Ok(())
    }

    #[test]
    fn malformed_credentials_read_as_absent() {
        let store = SessionStore::new(&config());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("_pordisto_session=%%%not-base64%%%"),
        );
        assert!(store.read(&headers, NOW).is_none());
        assert!(store.cookie_present(&headers));

        // Valid base64, wrong shape inside.
        let blob = Base64UrlUnpadded::encode_string(b"{\"payload\":42}");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("_pordisto_session={blob}")).expect("header"),
        );
        assert!(store.read(&headers, NOW).is_none());
    }

    #[test]
    fn clear_cookie_expires_immediately() -> Result<(), Error> {
        let store = SessionStore::new(&config());
        let cleared = store.clear()?;
        let value = cleared.to_str().expect("ascii");

        assert!(value.starts_with("_pordisto_session=;"));
        assert!(value.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn secure_attribute_follows_tls_flag() -> Result<(), Error> {
        let store = SessionStore::new(&config().with_use_tls(true));
        let set_cookie = store.write(&claims(), NOW)?;
        assert!(set_cookie.to_str().expect("ascii").ends_with("; Secure"));

        let store = SessionStore::new(&config());
        let set_cookie = store.write(&claims(), NOW)?;
        assert!(!set_cookie.to_str().expect("ascii").ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn return_url_round_trip_honors_ttl() -> Result<(), Error> {
        let guard = ReturnUrlGuard::new(&config());
        let set_cookie = guard.save("http://site.test/docs?page=2", NOW)?;

        assert!(set_cookie
            .to_str()
            .expect("ascii")
            .starts_with("_pordisto_session_return_url="));

        let headers = request_headers(&set_cookie);
        assert_eq!(
            guard.consume(&headers, NOW + RETURN_URL_TTL_SECONDS - 1),
            Some("http://site.test/docs?page=2".to_string())
        );
        assert_eq!(guard.consume(&headers, NOW + RETURN_URL_TTL_SECONDS), None);
        Ok(())
    }

    #[test]
    fn removed_cookie_reads_as_absent() -> Result<(), Error> {
        let guard = ReturnUrlGuard::new(&config());
        let removal = guard.removal_cookie()?;

        // A browser that still sends the emptied value gets nothing back.
        let headers = request_headers(&removal);
        assert_eq!(guard.consume(&headers, NOW), None);
        Ok(())
    }

    #[test]
    fn cookie_parsing_skips_malformed_pairs() -> Result<(), Error> {
        let store = SessionStore::new(&config());
        let set_cookie = store.write(&claims(), NOW)?;
        let pair = set_cookie
            .to_str()
            .expect("ascii")
            .split(';')
            .next()
            .expect("pair")
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("junk; {pair}; other=1")).expect("header"),
        );
        assert!(store.read(&headers, NOW).is_some());
        Ok(())
    }
}
