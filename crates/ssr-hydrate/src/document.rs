//! Document access by element ID.

use std::collections::HashMap;

/// Read-only view of the elements the bootstrapper needs.
pub trait Document {
    /// Text content of the element with `id`, if present.
    fn text_content(&self, id: &str) -> Option<String>;

    /// Whether an element with `id` exists.
    fn contains(&self, id: &str) -> bool {
        self.text_content(id).is_some()
    }
}

/// In-memory document: element ID to text content.
#[derive(Debug, Clone, Default)]
pub struct StaticDocument {
    elements: HashMap<String, String>,
}

impl StaticDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element.
    pub fn with_element(mut self, id: &str, text: &str) -> Self {
        self.elements.insert(id.to_string(), text.to_string());
        self
    }

    /// Index the elements carrying an `id` attribute in server-rendered HTML.
    ///
    /// The content of an element is the raw markup up to its matching close
    /// tag, which is the text content for script elements. Nested elements
    /// with the same tag name are not balanced.
    pub fn from_html(html: &str) -> Self {
        let mut elements = HashMap::new();
        let mut rest = html;

        while let Some(open) = rest.find('<') {
            rest = &rest[open + 1..];
            let Some(tag_end) = rest.find('>') else {
                break;
            };
            let tag = &rest[..tag_end];
            let body = &rest[tag_end + 1..];

            let name: String = tag
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();
            if name.is_empty() {
                continue;
            }

            if let Some(id) = attribute(tag, "id") {
                let close = format!("</{}>", name);
                let content = body.find(&close).map(|end| &body[..end]).unwrap_or("");
                elements.entry(id.to_string()).or_insert_with(|| content.to_string());
            }
        }

        Self { elements }
    }
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

impl Document for StaticDocument {
    fn text_content(&self, id: &str) -> Option<String> {
        self.elements.get(id).cloned()
    }
}
