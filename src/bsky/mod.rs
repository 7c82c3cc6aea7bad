//! Upstream access: the Bluesky XRPC endpoints the poller needs.
//!
//! This module defines the two seams a poll cycle talks to,
//! [`SessionProvider`] and [`FeedFetcher`], plus [`XrpcClient`], the HTTP
//! implementation of both.  Cycle tests substitute in-memory doubles.
//!
//! ## For contributors
//!
//! None of these calls retry.  A failed call aborts the current cycle and
//! the next scheduled tick starts over from handle resolution.

mod author_feed;
mod feed_item;
mod session;

pub use feed_item::{FeedItem, FeedSnapshot};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

/// Upper bound on one request, body included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by the upstream calls.  Each one aborts the cycle.
#[derive(Debug, Error)]
pub enum BskyError {
    #[error("could not resolve handle {handle:?}: {reason}")]
    Resolution { handle: String, reason: String },

    #[error("session creation rejected: {0}")]
    Auth(String),

    #[error("author feed fetch failed: {0}")]
    Fetch(String),
}

/// Stable account identifier (a DID) returned by handle resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bearer token for a single cycle.
///
/// Deliberately not `Clone`: the cycle that creates it owns it and drops
/// it when done.
pub struct SessionCredential {
    access_jwt: String,
}

impl SessionCredential {
    pub fn new(access_jwt: impl Into<String>) -> Self {
        Self {
            access_jwt: access_jwt.into(),
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_jwt)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCredential(..)")
    }
}

/// A secret string (the app password) that never shows up in logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Handle resolution and credential exchange.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Map a handle such as `alice.bsky.social` to its account identifier.
    async fn resolve_identity(&self, handle: &str) -> Result<AccountId, BskyError>;

    /// Exchange an account identifier and app password for a bearer token.
    async fn create_session(
        &self,
        account: &AccountId,
        secret: &Secret,
    ) -> Result<SessionCredential, BskyError>;
}

/// Single-page author feed retrieval.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch at most `limit` items of `actor`'s feed.  One page only.
    async fn fetch_author_feed(
        &self,
        actor: &AccountId,
        credential: &SessionCredential,
        limit: u32,
    ) -> Result<FeedSnapshot, BskyError>;
}

/// HTTP client for the XRPC endpoints of one service host.
pub struct XrpcClient {
    client: Client,
    base_url: String,
    /// Log raw response bodies (the per-target `debug` option).
    verbose: bool,
}

impl XrpcClient {
    /// `timeout` bounds every request so a stalled connection fails the
    /// cycle instead of holding the target's poller forever.
    pub fn new(base_url: &str, verbose: bool, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            verbose,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, method)
    }

    /// Diagnostic hook run on every response.
    fn log_response(&self, method: &str, status: StatusCode, body: &str) {
        tracing::info!(method, status = status.as_u16(), "request status");
        if self.verbose {
            tracing::info!(method, body, "response body");
        }
    }

    /// Read a response to text, logging it, and reject non-2xx statuses.
    ///
    /// The error string carries the status and the body so the host's
    /// error log shows what upstream said.
    async fn read_body(&self, method: &str, resp: reqwest::Response) -> Result<String, String> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {e}"))?;
        self.log_response(method, status, &body);

        if !status.is_success() {
            return Err(format!("{status}: {body}"));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_by(client: &XrpcClient, body: &str) -> String {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            client.log_response("app.bsky.feed.getAuthorFeed", StatusCode::OK, body);
        });
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn status_is_always_logged_but_body_only_when_verbose() {
        let quiet = XrpcClient::new("http://localhost", false, DEFAULT_REQUEST_TIMEOUT).unwrap();
        let verbose = XrpcClient::new("http://localhost", true, DEFAULT_REQUEST_TIMEOUT).unwrap();

        let out = logged_by(&quiet, "feed-body-marker");
        assert!(out.contains("request status"), "{out}");
        assert!(out.contains("200"), "{out}");
        assert!(!out.contains("feed-body-marker"), "{out}");

        let out = logged_by(&verbose, "feed-body-marker");
        assert!(out.contains("request status"), "{out}");
        assert!(out.contains("feed-body-marker"), "{out}");
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = XrpcClient::new("https://bsky.social/", false, DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(
            client.endpoint("com.atproto.identity.resolveHandle"),
            "https://bsky.social/xrpc/com.atproto.identity.resolveHandle"
        );
    }

    #[test]
    fn secrets_and_credentials_are_redacted_in_debug() {
        let secret = Secret::new("abcd-efgh-ijkl-mnop");
        let cred = SessionCredential::new("eyJhbGciOi");

        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert!(!format!("{cred:?}").contains("eyJ"));
        assert_eq!(cred.bearer(), "Bearer eyJhbGciOi");
    }

    #[test]
    fn blank_secret_is_empty() {
        assert!(Secret::new("  ").is_empty());
        assert!(!Secret::new("x").is_empty());
    }
}
