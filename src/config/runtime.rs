//! Server runtime configuration.
//!
//! The reactor's private view of the `http.server.*` keys, rebuilt in full
//! whenever the configuration changes. Never shared with other threads.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::config::schema::ServerConfig;

/// Percent-decode a request path the way the file system will see it.
///
/// `None` for invalid UTF-8, NUL bytes or `..` anywhere in the decoded path.
pub fn decode_path(uri: &str) -> Option<String> {
    let decoded = percent_decode_str(uri).decode_utf8().ok()?;
    if decoded.contains('\0') || decoded.contains("..") {
        return None;
    }
    Some(decoded.into_owned())
}

/// File serving and digest options in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub file_serving: bool,
    pub directory_listing: bool,
    pub document_root: PathBuf,
    pub auth_domain: String,
    pub auth_file: String,
    pub global_auth: bool,
    pub global_auth_file: PathBuf,
    pub protected_paths: Vec<String>,
}

impl RuntimeConfig {
    pub fn from_config(config: &ServerConfig) -> Self {
        let http = &config.http_server;
        Self {
            file_serving: http.enable_files,
            directory_listing: http.enable_dirlist,
            document_root: PathBuf::from(&http.docroot),
            auth_domain: http.auth_domain.clone(),
            auth_file: http.auth_file.clone(),
            global_auth: http.auth_global,
            global_auth_file: PathBuf::from(&http.global_auth_file),
            protected_paths: http.protected_paths.clone(),
        }
    }

    /// URIs that must never reach the file system. Patterns match the decoded path.
    pub fn is_protected(&self, uri: &str) -> bool {
        let Some(path) = decode_path(uri) else {
            return true;
        };
        self.protected_paths
            .iter()
            .filter(|pattern| !pattern.is_empty())
            .any(|pattern| path.contains(pattern.as_str()) || uri.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_http_server_keys() {
        let mut config = ServerConfig::default();
        config.http_server.enable_dirlist = false;
        config.http_server.docroot = "/www".into();

        let runtime = RuntimeConfig::from_config(&config);
        assert!(runtime.file_serving);
        assert!(!runtime.directory_listing);
        assert_eq!(runtime.document_root, PathBuf::from("/www"));
        assert_eq!(runtime.auth_file, ".htpasswd");
    }

    #[test]
    fn protected_paths() {
        let runtime = RuntimeConfig::from_config(&ServerConfig::default());
        assert!(runtime.is_protected("/store/config/ovms"));
        assert!(runtime.is_protected("/docs/../etc/passwd"));
        assert!(!runtime.is_protected("/docs/readme.txt"));
    }

    #[test]
    fn encoded_paths_are_checked_decoded() {
        let runtime = RuntimeConfig::from_config(&ServerConfig::default());
        assert!(runtime.is_protected("/store%2Fconfig/ovms"));
        assert!(runtime.is_protected("/st%6Fre/config/ovms"));
        assert!(runtime.is_protected("/docs/%2e%2e/etc/passwd"));
        assert!(runtime.is_protected("/docs/a%00b"));
        assert!(!runtime.is_protected("/docs/read%20me.txt"));
    }

    #[test]
    fn decode_rejects_traversal_and_nul() {
        assert_eq!(decode_path("/priv%61te/x.txt").as_deref(), Some("/private/x.txt"));
        assert_eq!(decode_path("/%2e%2e/x"), None);
        assert_eq!(decode_path("/a%00"), None);
        assert_eq!(decode_path("/%ff"), None);
    }
}
