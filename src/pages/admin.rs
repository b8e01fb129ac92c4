//! Shell and configuration pages.

use axum::http::StatusCode;

use crate::config::{ConfigError, ConfigParam};
use crate::http::RequestContext;
use crate::pages::html::{self, escape};
use crate::routing::PageDescriptor;

/// Shortest administrative password accepted.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Run the `command` variable and stream its output as plain text.
pub fn execute(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    let Some(command) = ctx.var("command").filter(|c| !c.trim().is_empty()) else {
        ctx.send_error(StatusCode::BAD_REQUEST, "Missing command");
        return;
    };
    tracing::info!(command = %command, "Executing console command");
    let output = ctx.execute(command.trim());
    ctx.stream_text(StatusCode::OK, "text/plain; charset=utf-8", output);
}

pub fn shell(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    let form = concat!(
        "<form method=\"post\" action=\"/api/execute\" onsubmit=\"return runCommand(this)\">",
        "<input type=\"text\" name=\"command\" size=\"60\" autofocus>",
        "<button type=\"submit\">Execute</button></form>",
        "<pre id=\"output\" class=\"output\"></pre>",
        "<script src=\"/assets/script.js\"></script>"
    );
    ctx.head(StatusCode::OK);
    ctx.print(&html::panel("Shell", form));
}

/// Check a password change. Empty `new` clears the password.
pub fn password_errors(current: &str, old: &str, new: &str, confirm: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if !current.is_empty() && old != current {
        errors.push("The old password is not correct".to_string());
    }
    if new != confirm {
        errors.push("The new passwords do not match".to_string());
    }
    if !new.is_empty() && new.len() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "The new password must have at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    errors
}

pub fn password(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    let password_set = ctx.config().password.is_set();

    if ctx.is_post() {
        let old = ctx.var("oldpass").unwrap_or_default();
        let new = ctx.var("newpass1").unwrap_or_default();
        let confirm = ctx.var("newpass2").unwrap_or_default();

        let mut errors = password_errors(&ctx.config().password.module, &old, &new, &confirm);
        if errors.is_empty() {
            let result = ctx.config_store().update(ConfigParam::Password, |config| {
                config.password.module = new;
                config.password.changed = true;
            });
            match result {
                Ok(()) => {
                    tracing::info!("Administrator password changed");
                    ctx.head(StatusCode::OK);
                    ctx.print(&html::alert("success", "Password changed."));
                    return;
                }
                Err(e) => errors.push(config_error(&e)),
            }
        }

        ctx.head(StatusCode::BAD_REQUEST);
        ctx.print(&html::error_list(&errors));
    } else {
        ctx.head(StatusCode::OK);
    }

    let mut form = String::from("<form method=\"post\" action=\"/cfg/password\">");
    if password_set {
        form.push_str("<label>Old password <input type=\"password\" name=\"oldpass\"></label>");
    }
    form.push_str(concat!(
        "<label>New password <input type=\"password\" name=\"newpass1\"></label>",
        "<label>Repeat new password <input type=\"password\" name=\"newpass2\"></label>",
        "<button type=\"submit\">Save</button></form>"
    ));
    ctx.print(&html::panel("Administrator password", &form));
}

pub fn webserver(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    if ctx.is_post() {
        let enable_files = ctx.var("enable_files").is_some();
        let enable_dirlist = ctx.var("enable_dirlist").is_some();
        let auth_global = ctx.var("auth_global").is_some();
        let docroot = ctx.var("docroot").unwrap_or_default();
        let auth_domain = ctx.var("auth_domain").unwrap_or_default();
        let auth_file = ctx.var("auth_file").unwrap_or_default();

        let result = ctx.config_store().update(ConfigParam::HttpServer, |config| {
            let http = &mut config.http_server;
            http.enable_files = enable_files;
            http.enable_dirlist = enable_dirlist;
            http.auth_global = auth_global;
            http.docroot = docroot.trim().to_string();
            http.auth_domain = auth_domain.trim().to_string();
            http.auth_file = auth_file.trim().to_string();
        });
        match result {
            Ok(()) => {
                ctx.head(StatusCode::OK);
                ctx.print(&html::alert("success", "Web server configuration saved."));
                return;
            }
            Err(e) => {
                ctx.head(StatusCode::BAD_REQUEST);
                ctx.print(&html::error_list(&[config_error(&e)]));
            }
        }
    } else {
        ctx.head(StatusCode::OK);
    }

    let http = ctx.config().http_server.clone();
    let checked = |on: bool| if on { " checked" } else { "" };
    let form = format!(
        concat!(
            "<form method=\"post\" action=\"/cfg/webserver\">",
            "<label><input type=\"checkbox\" name=\"enable_files\" value=\"yes\"{}> Serve files</label>",
            "<label><input type=\"checkbox\" name=\"enable_dirlist\" value=\"yes\"{}> Directory listings</label>",
            "<label>Document root <input type=\"text\" name=\"docroot\" value=\"{}\"></label>",
            "<label>Auth realm <input type=\"text\" name=\"auth_domain\" value=\"{}\"></label>",
            "<label>Directory auth file <input type=\"text\" name=\"auth_file\" value=\"{}\"></label>",
            "<label><input type=\"checkbox\" name=\"auth_global\" value=\"yes\"{}> Protect files with the admin password</label>",
            "<button type=\"submit\">Save</button></form>"
        ),
        checked(http.enable_files),
        checked(http.enable_dirlist),
        escape(&http.docroot),
        escape(&http.auth_domain),
        escape(&http.auth_file),
        checked(http.auth_global),
    );
    ctx.print(&html::panel("Web server", &form));
}

fn config_error(error: &ConfigError) -> String {
    match error {
        ConfigError::Validation(errors) => errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
