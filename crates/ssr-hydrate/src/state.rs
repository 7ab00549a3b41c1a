//! Embedded state read at startup.

use serde::de::DeserializeOwned;
use ssr_data::{parse_script_json, AppFlag, DehydratedState, StateError, APP_FLAG_ID, QUERY_STATE_ID};

use crate::document::Document;

/// The two blobs the server embeds in the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedState {
    pub flag: AppFlag,
    pub state: DehydratedState,
}

impl EmbeddedState {
    /// Read both blobs. Missing or malformed blobs fall back to client
    /// rendering and an empty cache.
    pub fn read(doc: &impl Document) -> Self {
        Self {
            flag: read_or_default(doc, APP_FLAG_ID),
            state: read_or_default(doc, QUERY_STATE_ID),
        }
    }
}

fn read_or_default<T: DeserializeOwned + Default>(doc: &impl Document, id: &str) -> T {
    let Some(text) = doc.text_content(id) else {
        tracing::debug!(element = id, "embedded state element missing");
        return T::default();
    };
    match parse_script_json::<T>(&text) {
        Ok(value) => value,
        Err(StateError::Empty) => {
            tracing::debug!(element = id, "embedded state element empty");
            T::default()
        }
        Err(err) => {
            tracing::warn!(element = id, error = %err, "ignoring malformed embedded state");
            T::default()
        }
    }
}
