//! The authentication gate itself: one decision per request.
//!
//! Order of evaluation never changes: a valid session credential lets the
//! request through, a presented one-time token gets verified and exchanged,
//! anything else is sent to the authority to sign in.

use crate::{
    authority::{self, AuthorityClient, SessionClaims},
    config::{ConfigError, GateConfig},
    session::{self, unix_now, ReturnUrlGuard, SessionStore},
    token,
};
use axum::{
    extract::{Request, State},
    http::{
        header::{HOST, SET_COOKIE},
        HeaderMap, HeaderValue, Uri,
    },
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    Router,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration invalid: {0}")]
    Configuration(#[from] ConfigError),
    #[error("authority client: {0}")]
    Authority(#[from] authority::Error),
}

/// Why a presented token did not turn into a session. Collapsed into one
/// user-visible outcome; only the logs tell them apart.
#[derive(Debug, Error)]
enum Denied {
    #[error("verification failed: {0}")]
    Verification(#[from] token::Error),
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("exchange failed: {0}")]
    Exchange(#[from] authority::Error),
    #[error("authority reports the user is not logged in")]
    NotLoggedIn,
    #[error("session credential could not be stored: {0}")]
    Session(#[from] session::Error),
}

/// Authenticated session data for the request being served. The gate inserts
/// one into the request extensions whenever a valid credential was presented;
/// handlers that see no `CurrentUser` are serving an anonymous request, which
/// the gate never lets happen for wrapped routes.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    claims: Arc<SessionClaims>,
}

impl CurrentUser {
    fn new(claims: SessionClaims) -> Self {
        Self {
            claims: Arc::new(claims),
        }
    }

    /// Look up a claim by name. `logged_in` and `return_url` resolve to the
    /// typed fields, anything else to the authority's extension map.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "logged_in" => Some(serde_json::Value::Bool(self.claims.logged_in)),
            "return_url" => self
                .claims
                .return_url
                .clone()
                .map(serde_json::Value::String),
            _ => self.claims.extra.get(name).cloned(),
        }
    }

    /// String form of a claim, `None` when absent or not a string.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<String> {
        match self.claim(name)? {
            serde_json::Value::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }
}

struct GateState {
    config: GateConfig,
    authority: AuthorityClient,
    sessions: SessionStore,
    return_urls: ReturnUrlGuard,
}

/// The gate. Cheap to clone; every clone shares the same immutable state.
#[derive(Clone)]
pub struct Gate {
    state: Arc<GateState>,
}

impl Gate {
    /// Validate the configuration and construct the gate.
    ///
    /// Fails closed: an unusable configuration refuses to build instead of
    /// letting requests through unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the authority
    /// client cannot be built from it.
    pub fn new(config: GateConfig) -> Result<Self, Error> {
        config.validate()?;
        let authority = AuthorityClient::new(&config)?;
        let sessions = SessionStore::new(&config);
        let return_urls = ReturnUrlGuard::new(&config);

        Ok(Self {
            state: Arc::new(GateState {
                config,
                authority,
                sessions,
                return_urls,
            }),
        })
    }

    /// Put every route of `router` behind the gate.
    #[must_use]
    pub fn wrap(&self, router: Router) -> Router {
        router.layer(middleware::from_fn_with_state(
            self.state.clone(),
            gatekeeper,
        ))
    }

    /// Response ending the session: clears the credential cookie and sends
    /// the client to `return_to`. The embedding site owns the route.
    #[must_use]
    pub fn sign_out_response(&self, return_to: &str) -> Response {
        let mut response = Redirect::to(return_to).into_response();
        if let Ok(cookie) = self.state.sessions.clear() {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }
}

async fn gatekeeper(
    State(state): State<Arc<GateState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = unix_now();

    if let Some(claims) = state.sessions.read(request.headers(), now) {
        debug!("valid session credential, request passes");
        request.extensions_mut().insert(CurrentUser::new(claims));
        return next.run(request).await;
    }

    let current_url = current_request_url(&state.config, &request);

    if let Some(token) = query_param(request.uri(), "token") {
        match present_token(&state, &token, request.headers(), &current_url, now).await {
            Ok(response) => return response,
            // Every denial looks the same from outside: back to sign-in.
            Err(denied) => warn!("sign-in token rejected: {denied}"),
        }
    }

    redirect_to_authority(&state, &current_url, request.headers(), now)
}

/// The token leg: verify, check the issuer, exchange, establish a session
/// and bounce the client back to where it was headed.
async fn present_token(
    state: &GateState,
    token: &str,
    headers: &HeaderMap,
    current_url: &str,
    now: i64,
) -> Result<Response, Denied> {
    let claims = token::verify_hs256(
        token,
        state.config.secret().expose_secret().as_bytes(),
        now,
    )?;

    // A token without an issuer counts as a mismatch.
    if claims.iss.as_deref() != Some(state.config.issuer()) {
        return Err(Denied::IssuerMismatch);
    }

    let session = state.authority.exchange(token).await?;
    if !session.logged_in {
        return Err(Denied::NotLoggedIn);
    }

    // The saved cookie wins over the URL embedded in the token.
    let target = state
        .return_urls
        .consume(headers, now)
        .or(claims.return_url)
        .unwrap_or_else(|| "/".to_string());
    let target = safe_return_target(&state.config, current_url, &target);

    let session_cookie = state.sessions.write(&session, now)?;
    let mut response = Redirect::to(&target).into_response();
    response.headers_mut().append(SET_COOKIE, session_cookie);
    if state.return_urls.cookie_present(headers) {
        if let Ok(removal) = state.return_urls.removal_cookie() {
            response.headers_mut().append(SET_COOKIE, removal);
        }
    }

    debug!("session established, returning client to its page");
    Ok(response)
}

/// The sign-in leg: remember where the client was headed, then send it to
/// the authority's redirector.
fn redirect_to_authority(
    state: &GateState,
    current_url: &str,
    headers: &HeaderMap,
    now: i64,
) -> Response {
    let login = state.authority.redirector_url(current_url);
    let mut response = Redirect::to(login.as_str()).into_response();

    match state.return_urls.save(current_url, now) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => warn!("failed to save the return url: {err}"),
    }

    // A credential that is present but unreadable or expired gets cleared
    // on the way out.
    if state.sessions.cookie_present(headers) {
        if let Ok(removal) = state.sessions.clear() {
            response.headers_mut().append(SET_COOKIE, removal);
        }
    }

    response
}

/// Reconstruct the URL the client asked for: scheme from configuration,
/// host from the `Host` header with the URI authority as fallback.
fn current_request_url<B>(config: &GateConfig, request: &axum::http::Request<B>) -> String {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| request.uri().authority().map(ToString::to_string));

    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), |pq| pq.to_string());

    match host {
        Some(host) => format!("{}://{host}{path_and_query}", config.scheme()),
        None => {
            warn!("request carried no host, using a relative return target");
            path_and_query
        }
    }
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Decide whether `target` is a safe place to send an authenticated client.
///
/// Rooted paths pass. Scheme-relative and non-http(s) URLs never pass.
/// Absolute URLs must point back at the requesting host and port unless
/// external return targets were explicitly allowed. Anything rejected
/// degrades to the site root; the visitor is signed in either way.
fn safe_return_target(config: &GateConfig, current_url: &str, target: &str) -> String {
    if target.starts_with("//") {
        warn!("rejecting scheme-relative return target");
        return "/".to_string();
    }
    if target.starts_with('/') {
        if HeaderValue::from_str(target).is_ok() {
            return target.to_string();
        }
        warn!("rejecting return target that does not fit a header");
        return "/".to_string();
    }

    let Ok(parsed) = Url::parse(target) else {
        warn!("rejecting unparseable return target");
        return "/".to_string();
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        warn!("rejecting return target with scheme {}", parsed.scheme());
        return "/".to_string();
    }
    if config.allow_external_return() {
        return parsed.to_string();
    }

    let same_site = Url::parse(current_url).map_or(false, |current| {
        current.host_str() == parsed.host_str()
            && current.port_or_known_default() == parsed.port_or_known_default()
    });
    if same_site {
        parsed.to_string()
    } else {
        warn!("rejecting return target pointing off-site");
        "/".to_string()
    }
}
