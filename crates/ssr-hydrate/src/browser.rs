//! `web-sys` document binding.

use crate::document::Document;

/// The live browser document.
#[derive(Debug, Clone)]
pub struct BrowserDocument {
    inner: web_sys::Document,
}

impl BrowserDocument {
    /// The document of the current window, if running in a browser.
    pub fn current() -> Option<Self> {
        let inner = web_sys::window()?.document()?;
        Some(Self { inner })
    }

    pub fn new(inner: web_sys::Document) -> Self {
        Self { inner }
    }
}

impl Document for BrowserDocument {
    fn text_content(&self, id: &str) -> Option<String> {
        let element = self.inner.get_element_by_id(id)?;
        Some(element.text_content().unwrap_or_default())
    }

    fn contains(&self, id: &str) -> bool {
        self.inner.get_element_by_id(id).is_some()
    }
}
