//! Bearer-token lifecycle for the discovery portal.
//!
//! The portal only accepts requests carrying a bearer token. A token is
//! either handed to the client up front or acquired lazily the first
//! time a request is about to be issued. Acquisition is an ordered list
//! of [`TokenSource`] strategies tried in sequence; the first one that
//! yields a token wins:
//!
//! 1. [`HubExchangeSource`] — one-shot OAuth token exchange against a
//!    JupyterHub-style hub API (notebook environments).
//! 2. [`TokenFileSource`] — first line of a token file named by the
//!    environment (CERN DLaaS notebooks).
//! 3. [`PromptSource`] — interactive prompt on the controlling terminal.
//!
//! Transport problems while exchanging degrade to "no token yet" and the
//! chain continues; exhausting every strategy is a fatal configuration
//! error.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// JupyterHub environment values used for the token exchange.
pub const HUB_API_URL_ENV: &str = "JUPYTERHUB_API_URL";
pub const HUB_API_TOKEN_ENV: &str = "JUPYTERHUB_API_TOKEN";
/// Path of a local file holding a token (DLaaS convention).
pub const TOKEN_FILE_ENV: &str = "RUCIO_OIDC_FILE_NAME";

/// Minimum remaining lifetime before a token counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Check whether `token` is still usable for portal requests.
///
/// A token is usable when it is JWT-shaped and its `exp` claim lies more
/// than [`EXPIRY_MARGIN_SECS`] in the future. Tokens that are absent or
/// not JWT-shaped are simply not valid and trigger re-acquisition. A
/// JWT-shaped token whose payload cannot be decoded or carries no `exp`
/// claim is a configuration error.
pub fn is_valid_token(token: Option<&str>) -> Result<bool> {
    let Some(token) = token else {
        return Ok(false);
    };

    let mut segments = token.split('.');
    let payload_b64 = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Ok(false),
    };

    // base64url without padding is the JWT norm; pad back to a multiple
    // of four before decoding.
    let padding = "=".repeat((4 - payload_b64.len() % 4) % 4);
    let padded = format!("{payload_b64}{padding}");

    let claims: serde_json::Value = URL_SAFE
        .decode(padded.as_bytes())
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| anyhow!("invalid JWT format: payload is not base64url-encoded JSON"))?;

    let exp = claims
        .get("exp")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("invalid JWT format: no exp claim in token payload"))?;

    Ok(exp > chrono::Utc::now().timestamp() + EXPIRY_MARGIN_SECS)
}

/// One strategy for obtaining a bearer token.
///
/// `Ok(None)` means the strategy does not apply in this environment (for
/// example, the hub variables are not set); the caller moves on to the
/// next strategy. Errors abort acquisition.
pub trait TokenSource: Send + Sync {
    /// One-line description used in warnings and errors.
    fn description(&self) -> &str;

    fn acquire(&self, http: &reqwest::blocking::Client) -> Result<Option<String>>;
}

/// Exchange a hub API token for an audience-scoped access token.
///
/// Issues `GET <hub_api_url>/user` with `Authorization: token <t>` and
/// extracts `auth_state.exchanged_tokens[<audience>]` from the response.
/// A hub without auth-state, or without an entry for the audience, is
/// logged and treated as "no token yet".
pub struct HubExchangeSource {
    api_url: Option<String>,
    api_token: Option<String>,
    audience: String,
}

impl HubExchangeSource {
    pub fn new(
        api_url: impl Into<String>,
        api_token: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            api_url: Some(api_url.into()),
            api_token: Some(api_token.into()),
            audience: audience.into(),
        }
    }

    /// Read the hub endpoint from `JUPYTERHUB_API_URL` / `JUPYTERHUB_API_TOKEN`.
    pub fn from_env(audience: impl Into<String>) -> Self {
        Self {
            api_url: std::env::var(HUB_API_URL_ENV).ok(),
            api_token: std::env::var(HUB_API_TOKEN_ENV).ok(),
            audience: audience.into(),
        }
    }
}

impl TokenSource for HubExchangeSource {
    fn description(&self) -> &str {
        "hub token exchange"
    }

    fn acquire(&self, http: &reqwest::blocking::Client) -> Result<Option<String>> {
        let (Some(api_url), Some(api_token)) = (&self.api_url, &self.api_token) else {
            return Ok(None);
        };

        let response = match http
            .get(format!("{}/user", api_url.trim_end_matches('/')))
            .header(reqwest::header::AUTHORIZATION, format!("token {api_token}"))
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                eprintln!("Warning: hub token exchange failed: {e}");
                return Ok(None);
            }
        };

        let body: serde_json::Value = match response.error_for_status().and_then(|r| r.json()) {
            Ok(body) => body,
            Err(e) => {
                eprintln!("Warning: hub token exchange failed: {e}");
                return Ok(None);
            }
        };

        match body
            .pointer("/auth_state/exchanged_tokens")
            .and_then(|tokens| tokens.get(&self.audience))
            .and_then(|t| t.as_str())
        {
            Some(token) => Ok(Some(token.to_string())),
            None => {
                eprintln!(
                    "Warning: hub has no exchanged token for audience '{}' (auth-state disabled?)",
                    self.audience
                );
                Ok(None)
            }
        }
    }
}

/// Read a token from the first line of a locally provisioned file.
pub struct TokenFileSource {
    path: Option<PathBuf>,
}

impl TokenFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Read the file path from `RUCIO_OIDC_FILE_NAME`.
    pub fn from_env() -> Self {
        Self {
            path: std::env::var(TOKEN_FILE_ENV).ok().map(PathBuf::from),
        }
    }
}

impl TokenSource for TokenFileSource {
    fn description(&self) -> &str {
        "token file"
    }

    fn acquire(&self, _http: &reqwest::blocking::Client) -> Result<Option<String>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        // The path was explicitly configured, so failing to read it is
        // a real error rather than a fall-through.
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file: {}", path.display()))?;

        match content.lines().next().map(str::trim) {
            Some(line) if !line.is_empty() => Ok(Some(line.to_string())),
            _ => Ok(None),
        }
    }
}

/// Prompt for a token on the controlling terminal.
///
/// Skipped entirely when stdin is not a tty, so scripted runs fail fast
/// with a configuration error instead of blocking on a read.
pub struct PromptSource;

impl TokenSource for PromptSource {
    fn description(&self) -> &str {
        "interactive prompt"
    }

    fn acquire(&self, _http: &reqwest::blocking::Client) -> Result<Option<String>> {
        if !atty::is(atty::Stream::Stdin) {
            return Ok(None);
        }

        eprint!("Enter your ESAP access token: ");
        std::io::stderr().flush().ok();

        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read token from terminal")?;

        let token = line.trim();
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(token.to_string()))
        }
    }
}

/// The standard acquisition chain: hub exchange, token file, prompt.
pub fn default_sources(audience: &str) -> Vec<Box<dyn TokenSource>> {
    vec![
        Box::new(HubExchangeSource::from_env(audience)),
        Box::new(TokenFileSource::from_env()),
        Box::new(PromptSource),
    ]
}

/// Run the acquisition chain, returning the first token found.
pub fn acquire_token(
    http: &reqwest::blocking::Client,
    sources: &[Box<dyn TokenSource>],
) -> Result<String> {
    for source in sources {
        if let Some(token) = source.acquire(http)? {
            return Ok(token);
        }
    }
    bail!(
        "no token found: set {HUB_API_URL_ENV}/{HUB_API_TOKEN_ENV} or {TOKEN_FILE_ENV}, \
         or run interactively"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a JWT-shaped token with the given payload JSON.
    fn token_with_payload(payload: &str) -> String {
        format!("head.{}.sig", URL_SAFE.encode(payload.as_bytes()))
    }

    fn token_with_exp(exp: i64) -> String {
        token_with_payload(&format!(r#"{{"exp":{exp}}}"#))
    }

    #[test]
    fn absent_or_non_jwt_tokens_are_invalid_not_fatal() {
        assert!(!is_valid_token(None).unwrap());
        assert!(!is_valid_token(Some("opaque-token")).unwrap());
        assert!(!is_valid_token(Some("two.parts")).unwrap());
    }

    #[test]
    fn future_exp_is_valid() {
        let token = token_with_exp(chrono::Utc::now().timestamp() + 3600);
        assert!(is_valid_token(Some(&token)).unwrap());
    }

    #[test]
    fn expired_or_nearly_expired_is_invalid() {
        let now = chrono::Utc::now().timestamp();
        assert!(!is_valid_token(Some(&token_with_exp(now - 100))).unwrap());
        // Inside the 10 second margin counts as expired.
        assert!(!is_valid_token(Some(&token_with_exp(now + 5))).unwrap());
    }

    #[test]
    fn missing_exp_claim_is_fatal() {
        let token = token_with_payload(r#"{"sub":"someone"}"#);
        assert!(is_valid_token(Some(&token)).is_err());
    }

    #[test]
    fn undecodable_payload_is_fatal() {
        assert!(is_valid_token(Some("head.@@not-base64@@.sig")).is_err());
    }

    #[test]
    fn unpadded_payload_decodes() {
        // Strip the padding the encoder added, as real JWTs do.
        let padded = token_with_exp(chrono::Utc::now().timestamp() + 3600);
        let unpadded: String = padded
            .split('.')
            .map(|s| s.trim_end_matches('='))
            .collect::<Vec<_>>()
            .join(".");
        assert!(is_valid_token(Some(&unpadded)).unwrap());
    }

    #[test]
    fn token_file_source_reads_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "file-token\nsecond line\n").unwrap();

        let http = reqwest::blocking::Client::new();
        let source = TokenFileSource::new(&path);
        assert_eq!(
            source.acquire(&http).unwrap().as_deref(),
            Some("file-token")
        );
    }

    #[test]
    fn empty_token_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "\n").unwrap();

        let http = reqwest::blocking::Client::new();
        assert!(TokenFileSource::new(&path).acquire(&http).unwrap().is_none());
    }

    #[test]
    fn missing_token_file_is_an_error() {
        let http = reqwest::blocking::Client::new();
        let source = TokenFileSource::new("/nonexistent/token-file");
        assert!(source.acquire(&http).is_err());
    }

    #[test]
    fn exhausted_chain_is_a_configuration_error() {
        let http = reqwest::blocking::Client::new();
        let sources: Vec<Box<dyn TokenSource>> = vec![];
        let err = acquire_token(&http, &sources).unwrap_err();
        assert!(err.to_string().contains("no token found"));
    }
}
