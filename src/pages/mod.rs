//! Standard console pages.
//!
//! # Responsibilities
//! - Register the built-in pages in a fixed order
//! - Login/logout flow on top of the session store
//! - Console frame, menu, status and embedded assets
//! - Password and web server administration
//!
//! Pages only see a [`RequestContext`](crate::http::RequestContext); they never
//! touch the transport.

pub mod admin;
pub mod framework;
pub mod html;
pub mod login;

use crate::routing::{PageAuth, PageDescriptor, PageMenu, PageRegistry};

/// Page the dispatcher falls back to when a session is required.
pub const LOGIN_URI: &str = "/login";

/// Register the built-in pages. Order matters for the menu.
pub fn register_standard_pages(registry: &mut PageRegistry) {
    use PageAuth as A;
    use PageMenu as M;

    let pages = [
        PageDescriptor::new("/", "Console", framework::root, M::None, A::None),
        PageDescriptor::new("/assets/style.css", "Style", framework::style, M::None, A::None),
        PageDescriptor::new("/assets/script.js", "Script", framework::script, M::None, A::None),
        PageDescriptor::new("/menu", "Menu", framework::menu, M::None, A::None),
        PageDescriptor::new("/home", "Home", framework::home, M::None, A::None),
        PageDescriptor::new(LOGIN_URI, "Login", login::handle_login, M::None, A::None),
        PageDescriptor::new("/logout", "Logout", login::handle_logout, M::None, A::None),
        PageDescriptor::new("/api/execute", "Execute", admin::execute, M::None, A::Cookie),
        PageDescriptor::new("/status", "Status", framework::status, M::Main, A::Cookie),
        PageDescriptor::new("/shell", "Shell", admin::shell, M::Main, A::Cookie),
        PageDescriptor::new("/cfg/password", "Password", admin::password, M::Config, A::Cookie),
        PageDescriptor::new("/cfg/webserver", "Web server", admin::webserver, M::Config, A::Cookie),
    ];
    for page in pages {
        registry.register(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_pages_in_order() {
        let mut registry = PageRegistry::new();
        register_standard_pages(&mut registry);

        let uris: Vec<_> = registry.iter().map(|p| p.uri.as_str()).collect();
        assert_eq!(uris[0], "/");
        assert_eq!(uris[5], LOGIN_URI);
        assert_eq!(uris.len(), 12);

        let status = registry.find("/status").unwrap();
        assert_eq!(status.menu, PageMenu::Main);
        assert_eq!(status.auth, PageAuth::Cookie);
        assert_eq!(registry.find("/login").unwrap().auth, PageAuth::None);
    }

    #[test]
    fn registering_twice_keeps_first() {
        let mut registry = PageRegistry::new();
        register_standard_pages(&mut registry);
        register_standard_pages(&mut registry);
        assert_eq!(registry.len(), 12);
    }
}
