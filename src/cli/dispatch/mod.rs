use crate::cli::actions::Action;
use crate::config::GateConfig;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Turn parsed matches into a runnable action carrying a gate configuration.
///
/// # Errors
///
/// Returns an error when a required argument is missing or the resulting
/// configuration does not validate.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .map(ToString::to_string)
            .with_context(|| format!("missing required argument: --{name}"))
    };

    let mut config = GateConfig::new(
        required("authority")?,
        required("redirector-path")?,
        required("session-path")?,
        SecretString::from(required("secret")?),
        required("issuer")?,
    )
    .with_use_tls(matches.get_flag("use-tls"))
    .with_allow_external_return(matches.get_flag("allow-external-return"));

    if let Some(prefix) = matches.get_one::<String>("cookie-prefix") {
        config = config.with_cookie_prefix(prefix.to_string());
    }
    if let Some(seconds) = matches.get_one::<i64>("session-expire") {
        config = config.with_session_expire_seconds(*seconds);
    }

    // Fail closed before anything starts listening.
    config.validate()?;

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        config,
    })
}
