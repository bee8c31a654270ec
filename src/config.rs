//! Gate configuration and startup validation.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const DEFAULT_COOKIE_PREFIX: &str = "_pordisto_";
const DEFAULT_SESSION_EXPIRE_SECONDS: i64 = 0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration options: {}", options.join(", "))]
    Invalid { options: Vec<&'static str> },
}

/// Settings the gate needs to talk to the authentication authority and to
/// manage its own cookies. An instance is only usable after `validate()`
/// passes; the gate refuses to construct otherwise.
#[derive(Clone, Debug)]
pub struct GateConfig {
    authority: String,
    redirector_path: String,
    session_path: String,
    secret: SecretString,
    issuer: String,
    cookie_prefix: String,
    session_expire_seconds: i64,
    use_tls: bool,
    allow_external_return: bool,
}

impl GateConfig {
    #[must_use]
    pub fn new(
        authority: String,
        redirector_path: String,
        session_path: String,
        secret: SecretString,
        issuer: String,
    ) -> Self {
        Self {
            authority,
            redirector_path,
            session_path,
            secret,
            issuer,
            cookie_prefix: DEFAULT_COOKIE_PREFIX.to_string(),
            session_expire_seconds: DEFAULT_SESSION_EXPIRE_SECONDS,
            use_tls: false,
            allow_external_return: false,
        }
    }

    #[must_use]
    pub fn with_cookie_prefix(mut self, prefix: String) -> Self {
        self.cookie_prefix = prefix;
        self
    }

    #[must_use]
    pub fn with_session_expire_seconds(mut self, seconds: i64) -> Self {
        self.session_expire_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    #[must_use]
    pub fn with_allow_external_return(mut self, allow: bool) -> Self {
        self.allow_external_return = allow;
        self
    }

    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    #[must_use]
    pub fn redirector_path(&self) -> &str {
        &self.redirector_path
    }

    #[must_use]
    pub fn session_path(&self) -> &str {
        &self.session_path
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn cookie_prefix(&self) -> &str {
        &self.cookie_prefix
    }

    #[must_use]
    pub fn session_expire_seconds(&self) -> i64 {
        self.session_expire_seconds
    }

    #[must_use]
    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    #[must_use]
    pub fn allow_external_return(&self) -> bool {
        self.allow_external_return
    }

    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.use_tls { "https" } else { "http" }
    }

    #[must_use]
    pub fn session_cookie_name(&self) -> String {
        format!("{}session", self.cookie_prefix)
    }

    #[must_use]
    pub fn return_url_cookie_name(&self) -> String {
        format!("{}session_return_url", self.cookie_prefix)
    }

    /// Check every field and report the names of the ones that are unusable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` listing each offending option so the
    /// operator can fix them all in one pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut options = Vec::new();

        if !non_blank(&self.authority) {
            options.push("authority");
        }
        if !absolute_path(&self.redirector_path) {
            options.push("redirector_path");
        }
        if !absolute_path(&self.session_path) {
            options.push("session_path");
        }
        if !non_blank(self.secret.expose_secret()) {
            options.push("secret");
        }
        if !non_blank(&self.issuer) {
            options.push("issuer");
        }
        if !non_blank(&self.cookie_prefix) {
            options.push("cookie_prefix");
        }
        if self.session_expire_seconds < 0 {
            options.push("session_expire");
        }

        if options.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { options })
        }
    }
}

fn non_blank(value: &str) -> bool {
    Regex::new(r"^\S+$").map_or(false, |re| re.is_match(value))
}

fn absolute_path(value: &str) -> bool {
    Regex::new(r"^/\S+$").map_or(false, |re| re.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GateConfig {
        GateConfig::new(
            "auth.example.test".to_string(),
            "/redirector".to_string(),
            "/session-info".to_string(),
            SecretString::from("s3cret".to_string()),
            "auth.example.test".to_string(),
        )
    }

    #[test]
    fn defaults_and_overrides() {
        let config = config();

        assert_eq!(config.cookie_prefix(), DEFAULT_COOKIE_PREFIX);
        assert_eq!(config.session_expire_seconds(), 0);
        assert!(!config.use_tls());
        assert!(!config.allow_external_return());
        assert_eq!(config.scheme(), "http");
        assert_eq!(config.session_cookie_name(), "_pordisto_session");
        assert_eq!(
            config.return_url_cookie_name(),
            "_pordisto_session_return_url"
        );

        let config = config
            .with_cookie_prefix("_gate_".to_string())
            .with_session_expire_seconds(3600)
            .with_use_tls(true)
            .with_allow_external_return(true);

        assert_eq!(config.cookie_prefix(), "_gate_");
        assert_eq!(config.session_expire_seconds(), 3600);
        assert!(config.use_tls());
        assert!(config.allow_external_return());
        assert_eq!(config.scheme(), "https");
        assert_eq!(config.session_cookie_name(), "_gate_session");
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn validate_reports_every_bad_option() {
        let config = GateConfig::new(
            "auth example".to_string(),
            "redirector".to_string(),
            "/ ".to_string(),
            SecretString::from(String::new()),
            String::new(),
        )
        .with_session_expire_seconds(-1);

        let err = config.validate().unwrap_err();
        let ConfigError::Invalid { options } = err;
        assert_eq!(
            options,
            vec![
                "authority",
                "redirector_path",
                "session_path",
                "secret",
                "issuer",
                "session_expire",
            ]
        );
    }

    #[test]
    fn validate_rejects_blank_cookie_prefix() {
        let config = config().with_cookie_prefix("has space".to_string());
        let ConfigError::Invalid { options } = config.validate().unwrap_err();
        assert_eq!(options, vec!["cookie_prefix"]);
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let printed = format!("{:?}", config());
        assert!(!printed.contains("s3cret"));
    }
}
