//! Per-page authorization decision.

use crate::auth::digest::{self, Credential};
use crate::routing::PageAuth;
use crate::session::Session;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    /// Serve the login flow for the requested URI.
    LoginRequired,
    /// Answer 401 with a digest challenge.
    DigestChallenge,
}

/// Authorization state in effect for one request.
#[derive(Debug, Clone, Copy)]
pub struct AuthGate<'a> {
    /// An administrative password is configured.
    pub password_set: bool,
    /// Global digest credential; `None` means the credentials file is absent.
    pub credential: Option<&'a Credential>,
    pub realm: &'a str,
}

impl AuthGate<'_> {
    pub fn check(
        &self,
        auth: PageAuth,
        session: Option<&Session>,
        method: &str,
        authorization: Option<&str>,
        now_secs: u64,
    ) -> AuthDecision {
        match auth {
            PageAuth::None => AuthDecision::Allow,
            PageAuth::Cookie => {
                if !self.password_set || session.is_some() {
                    AuthDecision::Allow
                } else {
                    AuthDecision::LoginRequired
                }
            }
            PageAuth::FileDigest => match self.credential {
                None => AuthDecision::Allow,
                Some(credential) => {
                    let credentials = std::slice::from_ref(credential);
                    if digest::verify(credentials, method, authorization, self.realm, now_secs) {
                        AuthDecision::Allow
                    } else {
                        AuthDecision::DigestChallenge
                    }
                }
            },
        }
    }
}
