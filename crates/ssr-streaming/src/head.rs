//! Document metadata collected while rendering.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::template::{escape_attr, escape_html};

/// Head content and document attributes for one response.
///
/// Setters replace earlier values, so the innermost route that sets a title
/// or attribute wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentHead {
    /// Attributes of the `<html>` element (e.g. `lang`, `dir`).
    pub html_attrs: Vec<(String, String)>,
    /// Attributes of the `<body>` element.
    pub body_attrs: Vec<(String, String)>,
    /// Page title.
    pub title: Option<String>,
    /// Named meta tags.
    pub meta: Vec<(String, String)>,
    /// Link tags as `(rel, href)`.
    pub links: Vec<(String, String)>,
}

impl DocumentHead {
    /// Create new head content with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Set the title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Set an `<html>` attribute.
    pub fn set_html_attr(&mut self, name: &str, value: impl Into<String>) {
        upsert(&mut self.html_attrs, name, value.into());
    }

    /// Set a `<body>` attribute.
    pub fn set_body_attr(&mut self, name: &str, value: impl Into<String>) {
        upsert(&mut self.body_attrs, name, value.into());
    }

    /// Set a named meta tag.
    pub fn set_meta(&mut self, name: &str, content: impl Into<String>) {
        upsert(&mut self.meta, name, content.into());
    }

    /// Add a link tag.
    pub fn add_link(&mut self, rel: &str, href: &str) {
        let link = (rel.to_string(), href.to_string());
        if !self.links.contains(&link) {
            self.links.push(link);
        }
    }

    /// Add a meta tag.
    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.set_meta(name, content);
        self
    }

    /// Add an `<html>` attribute.
    pub fn with_html_attr(mut self, name: &str, value: &str) -> Self {
        self.set_html_attr(name, value);
        self
    }

    /// Add a `<body>` attribute.
    pub fn with_body_attr(mut self, name: &str, value: &str) -> Self {
        self.set_body_attr(name, value);
        self
    }

    /// Add a stylesheet link.
    pub fn with_stylesheet(mut self, href: &str) -> Self {
        self.add_link("stylesheet", href);
        self
    }

    /// Render `<html>` attributes, each with a leading space.
    pub fn render_html_attrs(&self) -> String {
        render_attrs(&self.html_attrs)
    }

    /// Render `<body>` attributes, each with a leading space.
    pub fn render_body_attrs(&self) -> String {
        render_attrs(&self.body_attrs)
    }

    /// Render title, meta and link tags.
    pub fn render_tags(&self) -> String {
        let mut html = String::new();

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
        }

        for (name, content) in &self.meta {
            html.push_str(&format!(
                r#"<meta name="{}" content="{}">"#,
                escape_attr(name),
                escape_attr(content)
            ));
            html.push('\n');
        }

        for (rel, href) in &self.links {
            html.push_str(&format!(
                r#"<link rel="{}" href="{}">"#,
                escape_attr(rel),
                escape_attr(href)
            ));
            html.push('\n');
        }

        html
    }
}

fn upsert(list: &mut Vec<(String, String)>, name: &str, value: String) {
    match list.iter_mut().find(|(k, _)| k == name) {
        Some((_, v)) => *v = value,
        None => list.push((name.to_string(), value)),
    }
}

fn render_attrs(attrs: &[(String, String)]) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!(r#" {}="{}""#, escape_attr(k), escape_attr(v)))
        .collect()
}

/// Shared, request-scoped collector for [`DocumentHead`].
///
/// The renderer fills it while producing the shell; the coordinator reads it
/// when writing the head fragment.
#[derive(Debug, Clone, Default)]
pub struct MetaContext {
    head: Arc<Mutex<DocumentHead>>,
}

impl MetaContext {
    /// Create a collector seeded with defaults.
    pub fn new(defaults: DocumentHead) -> Self {
        Self {
            head: Arc::new(Mutex::new(defaults)),
        }
    }

    /// Mutate the collected head.
    pub fn update(&self, f: impl FnOnce(&mut DocumentHead)) {
        f(&mut self.lock());
    }

    /// Copy of the collected head.
    pub fn snapshot(&self) -> DocumentHead {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, DocumentHead> {
        self.head.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_values_win() {
        let ctx = MetaContext::new(DocumentHead::new("Default").with_html_attr("lang", "en"));
        ctx.update(|head| {
            head.set_title("Markets");
            head.set_html_attr("lang", "fr");
            head.set_html_attr("dir", "ltr");
        });

        let head = ctx.snapshot();
        assert_eq!(head.title.as_deref(), Some("Markets"));
        assert_eq!(head.render_html_attrs(), r#" lang="fr" dir="ltr""#);
    }

    #[test]
    fn test_tags_are_escaped() {
        let head = DocumentHead::new("A <b> & \"c\"").with_meta("description", "x\"><script>");
        let tags = head.render_tags();

        assert!(tags.contains("<title>A &lt;b&gt; &amp; \"c\"</title>"));
        assert!(tags.contains(r#"content="x&quot;&gt;&lt;script&gt;""#));
    }

    #[test]
    fn test_links_are_deduplicated() {
        let head = DocumentHead::default()
            .with_stylesheet("/app.css")
            .with_stylesheet("/app.css");
        assert_eq!(head.links.len(), 1);
    }
}
