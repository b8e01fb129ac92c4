//! Console frame, menu, home, status and embedded assets.

use std::fmt::Write as _;

use axum::http::StatusCode;
use bytes::Bytes;

use crate::http::RequestContext;
use crate::pages::html::{self, escape};
use crate::routing::{PageDescriptor, PageMenu};

const STYLE_CSS: &str = r#"body { font-family: sans-serif; margin: 0; background: #f4f4f4; }
#menu { float: left; width: 180px; height: 100vh; border: 0; background: #263238; }
#main { margin-left: 180px; height: 100vh; width: calc(100% - 180px); border: 0; }
.menu { color: #eceff1; padding: 8px; }
.menu a { color: #eceff1; display: block; padding: 4px 8px; text-decoration: none; }
.menu h4 { margin: 12px 0 4px; text-transform: uppercase; font-size: 11px; color: #90a4ae; }
.panel { background: #fff; margin: 16px; border: 1px solid #ddd; }
.panel-heading { padding: 8px 12px; border-bottom: 1px solid #ddd; font-weight: bold; }
.panel-body { padding: 12px; }
.alert { margin: 16px; padding: 8px 12px; border: 1px solid; }
.alert-danger { color: #a94442; background: #f2dede; }
.alert-warning { color: #8a6d3b; background: #fcf8e3; }
.alert-success { color: #3c763d; background: #dff0d8; }
form label { display: block; margin: 6px 0; }
pre.output { background: #111; color: #0f0; padding: 8px; min-height: 4em; }
"#;

const SCRIPT_JS: &str = r#"function runCommand(form) {
  var out = document.getElementById("output");
  var body = new URLSearchParams(new FormData(form));
  fetch(form.action, { method: "POST", body: body, credentials: "same-origin" })
    .then(function (r) { return r.text(); })
    .then(function (t) { out.textContent += t; });
  return false;
}
"#;

/// Console frame: menu on the left, pages on the right.
pub fn root(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    ctx.head(StatusCode::OK);
    ctx.print(concat!(
        "<!DOCTYPE html><html><head><title>Web Console</title>",
        "<link rel=\"stylesheet\" href=\"/assets/style.css\">",
        "<script src=\"/assets/script.js\"></script></head><body>",
        "<iframe id=\"menu\" src=\"/menu\"></iframe>",
        "<iframe id=\"main\" name=\"main\" src=\"/home\"></iframe>",
        "</body></html>"
    ));
}

pub fn style(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    ctx.stream_bytes(StatusCode::OK, "text/css", Bytes::from_static(STYLE_CSS.as_bytes()));
}

pub fn script(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    ctx.stream_bytes(
        StatusCode::OK,
        "application/javascript",
        Bytes::from_static(SCRIPT_JS.as_bytes()),
    );
}

/// Menu built from the registry in registration order.
pub fn menu(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    let mut body = String::from(
        "<!DOCTYPE html><html><head><link rel=\"stylesheet\" href=\"/assets/style.css\"></head>\
         <body class=\"menu\"><a href=\"/home\" target=\"main\">Home</a>",
    );

    for (category, title) in [
        (PageMenu::Main, "Main"),
        (PageMenu::Config, "Config"),
        (PageMenu::Vehicle, "Vehicle"),
    ] {
        let mut entries = ctx.registry().iter().filter(|p| p.menu == category).peekable();
        if entries.peek().is_none() {
            continue;
        }
        let _ = write!(body, "<h4>{title}</h4>");
        for page in entries {
            let _ = write!(
                body,
                "<a href=\"{}\" target=\"main\">{}</a>",
                escape(&page.uri),
                escape(&page.label)
            );
        }
    }

    if ctx.session().is_some() {
        body.push_str("<h4>Session</h4><a href=\"/logout\" target=\"main\">Logout</a>");
    } else if ctx.config().password.is_set() {
        body.push_str("<h4>Session</h4><a href=\"/login\" target=\"main\">Login</a>");
    }
    body.push_str("</body></html>");

    ctx.head(StatusCode::OK);
    ctx.print(&body);
}

pub fn home(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    let config = ctx.config();
    let mut body = String::new();
    if !config.password.is_set() {
        body.push_str(&html::alert(
            "warning",
            "No administrator password is set. The console is open to everyone on this network.",
        ));
    }
    let serial = if config.device.serial.is_empty() {
        "unknown"
    } else {
        config.device.serial.as_str()
    };
    body.push_str(&html::panel(
        "Web Console",
        &format!(
            "<p>Device <strong>{}</strong></p><p>Use the menu to inspect and configure the device.</p>",
            escape(serial)
        ),
    ));

    ctx.head(StatusCode::OK);
    ctx.print(&body);
}

/// Server status.
pub fn status(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
    let uptime = ctx.uptime().as_secs();
    let config = ctx.config();
    let files = if config.http_server.enable_files {
        format!("enabled, root {}", escape(&config.http_server.docroot))
    } else {
        "disabled".to_string()
    };

    let rows = [
        ("Version", env!("CARGO_PKG_VERSION").to_string()),
        (
            "Uptime",
            format!("{}d {:02}:{:02}:{:02}", uptime / 86400, uptime / 3600 % 24, uptime / 60 % 60, uptime % 60),
        ),
        (
            "Sessions",
            format!("{} / {}", ctx.active_sessions(), ctx.session_capacity()),
        ),
        ("WebSocket clients", ctx.websocket_clients().to_string()),
        ("File serving", files),
    ];

    let mut table = String::from("<table class=\"status\">");
    for (name, value) in rows {
        let _ = write!(table, "<tr><th>{name}</th><td>{value}</td></tr>");
    }
    table.push_str("</table>");

    ctx.head(StatusCode::OK);
    ctx.print(&html::panel("Server status", &table));
}
