//! Page registry.
//!
//! # Responsibilities
//! - Map exact URIs to page descriptors
//! - Keep insertion order (menus are rendered in registration order)
//! - Reject duplicate registrations

use std::fmt;
use std::sync::Arc;

use crate::http::context::RequestContext;

/// Menu category a page is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMenu {
    /// Not listed.
    None,
    Main,
    Config,
    Vehicle,
}

/// Authentication a page requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAuth {
    None,
    /// Session cookie, only while an administrative password is set.
    Cookie,
    /// HTTP digest against the global credentials.
    FileDigest,
}

/// Routine that renders a page.
pub trait PageHandler: Send + Sync {
    fn serve(&self, page: &PageDescriptor, ctx: &mut RequestContext<'_>);
}

impl<F> PageHandler for F
where
    F: Fn(&PageDescriptor, &mut RequestContext<'_>) + Send + Sync,
{
    fn serve(&self, page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
        self(page, ctx)
    }
}

/// A registered page. Immutable after registration.
#[derive(Clone)]
pub struct PageDescriptor {
    pub uri: String,
    pub label: String,
    pub menu: PageMenu,
    pub auth: PageAuth,
    pub handler: Arc<dyn PageHandler>,
}

impl PageDescriptor {
    pub fn new(
        uri: impl Into<String>,
        label: impl Into<String>,
        handler: impl PageHandler + 'static,
        menu: PageMenu,
        auth: PageAuth,
    ) -> Self {
        Self {
            uri: uri.into(),
            label: label.into(),
            menu,
            auth,
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("uri", &self.uri)
            .field("label", &self.label)
            .field("menu", &self.menu)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered table of pages keyed by exact URI.
#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: Vec<Arc<PageDescriptor>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page. Returns `false` and keeps the existing entry if the URI is taken.
    pub fn register(&mut self, page: PageDescriptor) -> bool {
        if self.find(&page.uri).is_some() {
            tracing::error!(uri = %page.uri, "Page already registered");
            return false;
        }
        tracing::debug!(uri = %page.uri, label = %page.label, "Page registered");
        self.pages.push(Arc::new(page));
        true
    }

    /// Remove the page for `uri`, if any.
    pub fn deregister(&mut self, uri: &str) -> bool {
        match self.pages.iter().position(|p| p.uri == uri) {
            Some(index) => {
                self.pages.remove(index);
                tracing::debug!(uri = %uri, "Page deregistered");
                true
            }
            None => false,
        }
    }

    /// Exact-match lookup.
    pub fn find(&self, uri: &str) -> Option<Arc<PageDescriptor>> {
        self.pages.iter().find(|p| p.uri == uri).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.pages.iter().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
