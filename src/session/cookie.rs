//! Session cookie encoding.

use crate::session::store::SessionId;

/// Extract the session id from a `Cookie` header.
///
/// Missing cookie, malformed hex and zero all mean "no session".
pub fn session_id_from_header(cookie_header: &str, name: &str) -> Option<SessionId> {
    cookie_header
        .split(';')
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == name).then_some(value)
        })
        .and_then(|value| value.trim().parse().ok())
}

/// `Set-Cookie` value carrying a session id.
pub fn set_cookie(name: &str, id: SessionId) -> String {
    format!("{name}={id}; path=/")
}

/// `Set-Cookie` value removing the session cookie.
pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; path=/; Max-Age=0")
}
