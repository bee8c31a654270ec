//! # Pordisto (External Authentication Gate)
//!
//! `pordisto` puts a site behind an external authentication authority. Every
//! request to a wrapped router must prove it belongs to an established
//! session; requests that cannot are sent to the authority to sign in, and
//! come back carrying a short-lived HS256 token that the gate verifies and
//! exchanges for session data.
//!
//! ## Flow
//!
//! - A request with a valid `{prefix}session` cookie passes straight
//!   through, the session claims exposed as a [`gate::CurrentUser`]
//!   request extension.
//! - A request carrying a `?token=` parameter has the token verified (HS256
//!   only, configured issuer, zero clock leeway) and exchanged with the
//!   authority over HTTP; success establishes the session cookie and sends
//!   the visitor back to the page it originally wanted.
//! - Anything else is redirected to the authority's sign-in redirector, with
//!   the original URL saved in a 120 second cookie for the trip back.
//!
//! The gate never issues tokens and keeps no server-side session state; all
//! credentials are client-held cookies. The token exchange with the
//! authority is the only outbound call, and the authority is the only party
//! that can reject a replayed token.

pub mod authority;
pub mod cli;
pub mod config;
pub mod gate;
pub mod server;
pub mod session;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
