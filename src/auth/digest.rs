//! HTTP digest authentication (RFC 2617, MD5).
//!
//! # Responsibilities
//! - Credentials file lines (`user:realm:md5(user:realm:password)`)
//! - Challenge header generation with time based nonces
//! - Authorization header parsing and verification
//! - Maintenance of the global credentials file

use std::io;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tokio::sync::watch;

/// The single administrative user name.
pub const ADMIN_USER: &str = "admin";

/// Nonces older than this are rejected.
const NONCE_LIFETIME_SECS: u64 = 3600;

/// Lowercase hex MD5 of `input`.
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// One credentials file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub realm: String,
    /// `md5(user:realm:password)`
    pub ha1: String,
}

impl Credential {
    pub fn new(user: &str, realm: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            realm: realm.to_string(),
            ha1: md5_hex(&format!("{user}:{realm}:{password}")),
        }
    }

    /// The administrative credential for `password`, or none when it is empty.
    pub fn admin(realm: &str, password: &str) -> Option<Self> {
        (!password.is_empty()).then(|| Self::new(ADMIN_USER, realm, password))
    }

    pub fn line(&self) -> String {
        format!("{}:{}:{}", self.user, self.realm, self.ha1)
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(3, ':');
        let user = parts.next().filter(|u| !u.is_empty())?;
        let realm = parts.next()?;
        let ha1 = parts.next().filter(|h| h.len() == 32)?;
        Some(Self {
            user: user.to_string(),
            realm: realm.to_string(),
            ha1: ha1.to_ascii_lowercase(),
        })
    }
}

/// Parse a credentials file, skipping malformed lines.
pub fn parse_credentials(text: &str) -> Vec<Credential> {
    text.lines().filter_map(Credential::parse_line).collect()
}

/// `WWW-Authenticate` value for a digest challenge.
pub fn challenge(realm: &str, now_secs: u64) -> String {
    format!("Digest qop=\"auth\", realm=\"{realm}\", nonce=\"{now_secs:x}\"")
}

/// Fields of a digest `Authorization` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestAuthorization {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl DigestAuthorization {
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut auth = Self::default();
        for (key, value) in split_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "username" => auth.username = value,
                "realm" => auth.realm = value,
                "nonce" => auth.nonce = value,
                "uri" => auth.uri = value,
                "response" => auth.response = value.to_ascii_lowercase(),
                "qop" => auth.qop = Some(value),
                "nc" => auth.nc = Some(value),
                "cnonce" => auth.cnonce = Some(value),
                _ => {}
            }
        }

        if auth.username.is_empty() || auth.nonce.is_empty() || auth.response.is_empty() {
            return None;
        }
        Some(auth)
    }

    /// Expected response for `ha1` and request method.
    pub fn expected_response(&self, ha1: &str, method: &str) -> String {
        let ha2 = md5_hex(&format!("{method}:{}", self.uri));
        match (&self.qop, &self.nc, &self.cnonce) {
            (Some(qop), Some(nc), Some(cnonce)) => {
                md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}", self.nonce))
            }
            _ => md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce)),
        }
    }

    fn nonce_is_fresh(&self, now_secs: u64) -> bool {
        match u64::from_str_radix(&self.nonce, 16) {
            Ok(issued) => issued <= now_secs && now_secs - issued <= NONCE_LIFETIME_SECS,
            Err(_) => false,
        }
    }
}

/// Split `key=value, key="quoted, value"` pairs.
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = params.trim();

    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_string();
        let after = after.trim_start();

        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };

        pairs.push((key, value.trim().to_string()));
        rest = remaining.trim_start().trim_start_matches(',').trim_start();
    }
    pairs
}

/// Check an `Authorization` header against a set of credentials.
pub fn verify(
    credentials: &[Credential],
    method: &str,
    header: Option<&str>,
    realm: &str,
    now_secs: u64,
) -> bool {
    let Some(auth) = header.and_then(DigestAuthorization::parse) else {
        return false;
    };
    if auth.realm != realm || !auth.nonce_is_fresh(now_secs) {
        return false;
    }
    credentials
        .iter()
        .filter(|c| c.user == auth.username && c.realm == realm)
        .any(|c| auth.expected_response(&c.ha1, method) == auth.response)
}

/// Bring the global credentials file in line with the administrative password.
///
/// Writes the admin line when a credential is given, removes the file otherwise.
pub async fn sync_global_auth_file(path: &Path, credential: Option<Credential>) -> io::Result<()> {
    match credential {
        Some(credential) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, format!("{}\n", credential.line())).await?;
            tracing::debug!(path = %path.display(), "Global credentials file written");
        }
        None => match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Global credentials file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        },
    }
    Ok(())
}

type FileState = Option<(PathBuf, Option<Credential>)>;

/// Single writer for the global credentials file.
///
/// Requests are applied in order by one task; pending requests collapse into the latest.
#[derive(Debug)]
pub struct GlobalFileWriter {
    state: watch::Sender<FileState>,
}

impl GlobalFileWriter {
    /// Start the writer task on `runtime`.
    pub fn spawn(runtime: &tokio::runtime::Handle) -> Self {
        let (state, mut requests) = watch::channel::<FileState>(None);
        runtime.spawn(async move {
            while requests.changed().await.is_ok() {
                let Some((path, credential)) = requests.borrow_and_update().clone() else {
                    continue;
                };
                if let Err(e) = sync_global_auth_file(&path, credential).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to update global credentials file"
                    );
                }
            }
        });
        Self { state }
    }

    /// Ask for `path` to hold `credential` (or not exist for `None`).
    pub fn request(&self, path: PathBuf, credential: Option<Credential>) {
        self.state.send_replace(Some((path, credential)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Build an Authorization header the way a browser would.
    fn client_header(user: &str, password: &str, realm: &str, nonce: &str, method: &str, uri: &str) -> String {
        let ha1 = md5_hex(&format!("{user}:{realm}:{password}"));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let response = md5_hex(&format!("{ha1}:{nonce}:00000001:0a4f113b:auth:{ha2}"));
        format!(
            "Digest username=\"{user}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", \
             qop=auth, nc=00000001, cnonce=\"0a4f113b\", response=\"{response}\""
        )
    }

    #[test]
    fn credential_line_format() {
        let credential = Credential::new("admin", "webconsole", "secret");
        let line = credential.line();
        assert!(line.starts_with("admin:webconsole:"));
        assert_eq!(line.len(), "admin:webconsole:".len() + 32);
        assert_eq!(Credential::parse_line(&line), Some(credential));
        assert!(Credential::admin("webconsole", "").is_none());
    }

    #[test]
    fn rfc2617_example_response() {
        let header = "Digest username=\"Mufasa\", realm=\"testrealm@host.com\", \
            nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", uri=\"/dir/index.html\", \
            qop=auth, nc=00000001, cnonce=\"0a4f113b\", \
            response=\"6629fae49393a05397450978507c4ef1\", opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"";
        let auth = DigestAuthorization::parse(header).unwrap();
        let ha1 = md5_hex("Mufasa:testrealm@host.com:Circle Of Life");
        assert_eq!(auth.expected_response(&ha1, "GET"), auth.response);
    }

    #[test]
    fn verifies_fresh_nonce_and_rejects_old_or_wrong() {
        let credentials = vec![Credential::new("admin", "car", "pw")];
        let now = 1_700_000_000u64;
        let nonce = format!("{:x}", now - 10);

        let good = client_header("admin", "pw", "car", &nonce, "GET", "/sd/log.txt");
        assert!(verify(&credentials, "GET", Some(&good), "car", now));

        let wrong_pw = client_header("admin", "nope", "car", &nonce, "GET", "/sd/log.txt");
        assert!(!verify(&credentials, "GET", Some(&wrong_pw), "car", now));

        let stale = format!("{:x}", now - 7200);
        let old = client_header("admin", "pw", "car", &stale, "GET", "/sd/log.txt");
        assert!(!verify(&credentials, "GET", Some(&old), "car", now));

        let future = format!("{:x}", now + 60);
        let early = client_header("admin", "pw", "car", &future, "GET", "/sd/log.txt");
        assert!(!verify(&credentials, "GET", Some(&early), "car", now));

        assert!(!verify(&credentials, "GET", Some(&good), "other", now));
        assert!(!verify(&credentials, "GET", None, "car", now));
        assert!(!verify(&credentials, "GET", Some("Basic YWRtaW46cHc="), "car", now));
    }

    #[test]
    fn quoted_values_may_contain_commas() {
        let auth = DigestAuthorization::parse(
            "Digest username=\"admin\", uri=\"/a?x=1,2\", nonce=\"1\", response=\"ab\"",
        )
        .unwrap();
        assert_eq!(auth.uri, "/a?x=1,2");
        assert_eq!(auth.qop, None);
    }

    #[test]
    fn challenge_header() {
        assert_eq!(
            challenge("car", 255),
            "Digest qop=\"auth\", realm=\"car\", nonce=\"ff\""
        );
    }

    #[tokio::test]
    async fn global_file_written_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store/.htpasswd");

        sync_global_auth_file(&path, Credential::admin("car", "pw")).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(parse_credentials(&text), vec![Credential::new("admin", "car", "pw")]);

        sync_global_auth_file(&path, None).await.unwrap();
        assert!(!path.exists());
        sync_global_auth_file(&path, None).await.unwrap();
    }

    /// Wait until `done` holds, then make sure it keeps holding.
    async fn settles(done: impl Fn() -> bool) {
        for _ in 0..200 {
            if done() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(done());
    }

    #[tokio::test]
    async fn writer_applies_latest_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store/.htpasswd");
        let writer = GlobalFileWriter::spawn(&tokio::runtime::Handle::current());

        writer.request(path.clone(), Credential::admin("car", "first"));
        writer.request(path.clone(), None);
        writer.request(path.clone(), Credential::admin("car", "second"));
        let expected = format!("{}\n", Credential::new("admin", "car", "second").line());
        settles(|| std::fs::read_to_string(&path).ok().as_deref() == Some(expected.as_str())).await;

        writer.request(path.clone(), Credential::admin("car", "third"));
        writer.request(path.clone(), None);
        settles(|| !path.exists()).await;
    }
}
