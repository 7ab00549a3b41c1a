//! Out-of-band JSON blobs embedded in the document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Element ID of the render mode flag script.
pub const APP_FLAG_ID: &str = "__APP_FLAG__";

/// Element ID of the dehydrated state script.
pub const QUERY_STATE_ID: &str = "__QUERY_STATE__";

/// Element ID of the root container the app is mounted into.
pub const ROOT_ID: &str = "root";

/// Render mode flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFlag {
    /// `true` when the markup was rendered by the server.
    #[serde(rename = "isSSR", default)]
    pub is_ssr: bool,
}

impl AppFlag {
    /// Flag for server-rendered documents.
    pub fn server_rendered() -> Self {
        Self { is_ssr: true }
    }

    /// Flag for documents the client renders from scratch.
    pub fn client_rendered() -> Self {
        Self { is_ssr: false }
    }
}

/// Error reading or writing an embedded blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("embedded state element is empty")]
    Empty,

    #[error("failed to serialize embedded state: {0}")]
    Serialize(String),

    #[error("failed to parse embedded state: {0}")]
    Parse(String),
}

/// Serialize a value for an inline `<script type="application/json">`.
///
/// `<`, `>` and `&` are written as unicode escapes so the payload cannot close
/// the script element; U+2028/U+2029 are escaped for older JS parsers.
pub fn to_script_json<T: Serialize>(value: &T) -> Result<String, StateError> {
    let json = serde_json::to_string(value).map_err(|e| StateError::Serialize(e.to_string()))?;

    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Parse the text content of an embedded script element.
pub fn parse_script_json<T: DeserializeOwned>(text: &str) -> Result<T, StateError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StateError::Empty);
    }
    serde_json::from_str(text).map_err(|e| StateError::Parse(e.to_string()))
}
