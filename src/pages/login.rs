//! Login and logout.
//!
//! Login is reached two ways: directly at `/login`, or as the stand-in for a
//! Cookie-protected page requested without a session. In the second case the
//! form posts back to the requested URI so a successful login lands there.

use axum::http::{header, StatusCode};

use crate::auth::digest::ADMIN_USER;
use crate::config::ServerConfig;
use crate::http::RequestContext;
use crate::pages::{html, LOGIN_URI};
use crate::routing::PageDescriptor;
use crate::session::cookie;

/// Accept when no password is set, else only the admin user with the password.
pub fn check_login(config: &ServerConfig, user: &str, password: &str) -> bool {
    if !config.password.is_set() {
        return true;
    }
    user == ADMIN_USER && password == config.password.module
}

/// Where a successful login continues.
pub fn login_target(requested: &str, password_changed: bool) -> &str {
    if !password_changed {
        return "/cfg/password";
    }
    match requested {
        "/login" | "/logout" | "/" => "/home",
        other => other,
    }
}

pub fn handle_login(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    let requested = ctx.uri().to_string();

    if ctx.is_post() {
        let user = ctx.var("username").unwrap_or_default();
        let password = ctx.var("password").unwrap_or_default();

        if check_login(ctx.config(), &user, &password) {
            let session = ctx.create_session();
            let config = ctx.config();
            let set_cookie = cookie::set_cookie(&config.sessions.cookie_name, session.id);
            let target = login_target(&requested, config.password.changed).to_string();
            tracing::info!(user = %user, session = %session.id, "Login successful");

            ctx.head_with(StatusCode::OK, &[(header::SET_COOKIE, set_cookie)]);
            ctx.print(&html::redirect(&target));
            return;
        }

        tracing::warn!(user = %user, uri = %requested, "Login failed");
        ctx.head(StatusCode::FORBIDDEN);
        ctx.print(&html::error_list(&["Invalid username or password".to_string()]));
        ctx.print(&html::login_form(&requested));
        return;
    }

    if requested == LOGIN_URI {
        ctx.head(StatusCode::OK);
    } else {
        ctx.head(StatusCode::FORBIDDEN);
        ctx.print(&html::alert("warning", "Login required"));
    }
    ctx.print(&html::login_form(&requested));
}

pub fn handle_logout(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    if let Some(session) = ctx.session().copied() {
        ctx.destroy_session(session.id);
        tracing::info!(session = %session.id, "Logout");
    }
    let clear = cookie::clear_cookie(&ctx.config().sessions.cookie_name);
    ctx.head_with(StatusCode::OK, &[(header::SET_COOKIE, clear)]);
    ctx.print(&html::redirect("/home"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_system_accepts_anyone() {
        let config = ServerConfig::default();
        assert!(check_login(&config, "anyone", ""));
    }

    #[test]
    fn admin_with_password_only() {
        let mut config = ServerConfig::default();
        config.password.module = "secret".into();
        assert!(check_login(&config, "admin", "secret"));
        assert!(!check_login(&config, "admin", "wrong"));
        assert!(!check_login(&config, "root", "secret"));
    }

    #[test]
    fn targets() {
        assert_eq!(login_target("/status", false), "/cfg/password");
        assert_eq!(login_target("/status", true), "/status");
        assert_eq!(login_target("/login", true), "/home");
        assert_eq!(login_target("/logout", true), "/home");
        assert_eq!(login_target("/", true), "/home");
    }
}
