//! Document template fragments.
//!
//! A response is `render_head` + renderer output + `render_tail`. The head
//! fragment leaves the root container open so the shell markup lands inside
//! it; the tail closes it and embeds the state the client needs to hydrate.

use ssr_data::{to_script_json, AppFlag, DehydratedState, StateError, APP_FLAG_ID, QUERY_STATE_ID, ROOT_ID};

use crate::assets::{Asset, AssetKind};
use crate::head::DocumentHead;

/// Heading of the notice shown to clients without JavaScript.
pub const NOSCRIPT_HEADING: &str = "JavaScript Required";

/// Body of the notice shown to clients without JavaScript.
pub const NOSCRIPT_MESSAGE: &str = "This application requires JavaScript to be enabled.";

/// Everything up to and including the opening root container.
pub fn render_head(head: &DocumentHead, assets: &[Asset]) -> String {
    let mut html = String::with_capacity(512);

    html.push_str("<!DOCTYPE html>\n");
    html.push_str(&format!("<html{}>\n", head.render_html_attrs()));
    html.push_str("<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&head.render_tags());

    for asset in assets.iter().filter(|a| a.kind == AssetKind::Script) {
        html.push_str(&format!(
            "<link rel=\"preload\" as=\"script\" href=\"{}\">\n",
            escape_attr(&asset.url)
        ));
    }
    for asset in assets.iter().filter(|a| a.kind == AssetKind::Style) {
        html.push_str(&format!(
            "<link rel=\"stylesheet\" href=\"{}\">\n",
            escape_attr(&asset.url)
        ));
    }

    html.push_str("</head>\n");
    html.push_str(&format!("<body{}>\n", head.render_body_attrs()));
    html.push_str(&format!("<div id=\"{ROOT_ID}\">"));
    html
}

/// Closing root container, embedded state, bundle scripts and document end.
///
/// The flag and state scripts precede every bundle script so they are in the
/// DOM before client code runs.
pub fn render_tail(
    flag: &AppFlag,
    state: &DehydratedState,
    assets: &[Asset],
) -> Result<String, StateError> {
    let mut html = String::with_capacity(256);

    html.push_str("</div>\n");
    html.push_str(&format!(
        "<script id=\"{APP_FLAG_ID}\" type=\"application/json\">{}</script>\n",
        to_script_json(flag)?
    ));
    html.push_str(&format!(
        "<script id=\"{QUERY_STATE_ID}\" type=\"application/json\">{}</script>\n",
        to_script_json(state)?
    ));

    for asset in assets.iter().filter(|a| a.kind == AssetKind::Script) {
        html.push_str(&format!(
            "<script defer src=\"{}\"></script>\n",
            escape_attr(&asset.url)
        ));
    }

    html.push_str(&format!(
        "<noscript>\n<div style=\"text-align: center; padding: 20px;\">\n\
         <h1>{NOSCRIPT_HEADING}</h1>\n<p>{NOSCRIPT_MESSAGE}</p>\n</div>\n</noscript>\n"
    ));
    html.push_str("</body>\n</html>\n");
    Ok(html)
}

/// Escape text content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape a double-quoted attribute value.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ssr_core::QueryKey;
    use ssr_data::{parse_script_json, QueryClient};

    fn assets() -> Vec<Asset> {
        vec![
            Asset { url: "/static/client.js".into(), kind: AssetKind::Script },
            Asset { url: "/static/client.css".into(), kind: AssetKind::Style },
            Asset { url: "/static/home.js".into(), kind: AssetKind::Script },
        ]
    }

    fn between<'a>(html: &'a str, open: &str, close: &str) -> &'a str {
        let start = html.find(open).map(|i| i + open.len()).unwrap();
        let end = start + html[start..].find(close).unwrap();
        &html[start..end]
    }

    // === Head Tests ===

    #[test]
    fn test_head_structure() {
        let head = DocumentHead::new("Coins")
            .with_html_attr("lang", "en")
            .with_body_attr("class", "home");
        let html = render_head(&head, &assets());

        assert!(html.starts_with("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">"));
        assert!(html.contains("<title>Coins</title>"));
        assert!(html.contains(r#"<link rel="stylesheet" href="/static/client.css">"#));
        assert!(html.contains(r#"<link rel="preload" as="script" href="/static/home.js">"#));
        assert!(html.ends_with("<body class=\"home\">\n<div id=\"root\">"));
    }

    #[test]
    fn test_head_without_metadata() {
        let html = render_head(&DocumentHead::default(), &[]);
        assert!(html.contains("<html>"));
        assert!(!html.contains("<title>"));
        assert!(html.ends_with("<body>\n<div id=\"root\">"));
    }

    // === Tail Tests ===

    #[test]
    fn test_tail_order() {
        let client = QueryClient::new();
        client.set_query_data(&QueryKey::named("home"), json!([{"name": "BTC"}]));
        let tail = render_tail(&AppFlag::server_rendered(), &client.dehydrate(), &assets()).unwrap();

        let flag = tail.find(APP_FLAG_ID).unwrap();
        let state = tail.find(QUERY_STATE_ID).unwrap();
        let first_bundle = tail.find("<script defer").unwrap();
        assert!(tail.starts_with("</div>\n"));
        assert!(flag < state && state < first_bundle);
        assert!(tail.find("client.js").unwrap() < tail.find("home.js").unwrap());
        assert!(!tail.contains("client.css"));
        assert!(tail.ends_with("</body>\n</html>\n"));
    }

    #[test]
    fn test_tail_ends_with_noscript_notice() {
        let tail = render_tail(&AppFlag::server_rendered(), &QueryClient::new().dehydrate(), &assets()).unwrap();

        let notice = tail.find("<noscript>").unwrap();
        assert!(tail.rfind("<script defer").unwrap() < notice);
        assert!(tail[notice..].starts_with(
            "<noscript>\n<div style=\"text-align: center; padding: 20px;\">\n\
             <h1>JavaScript Required</h1>\n\
             <p>This application requires JavaScript to be enabled.</p>\n</div>\n</noscript>\n"
        ));
    }

    #[test]
    fn test_tail_state_round_trips() {
        let client = QueryClient::new();
        client.set_query_data(&QueryKey::named("home"), json!({"note": "</script><b>"}));
        let tail = render_tail(&AppFlag::server_rendered(), &client.dehydrate(), &[]).unwrap();

        let text = between(&tail, "<script id=\"__QUERY_STATE__\" type=\"application/json\">", "</script>");
        let state: DehydratedState = parse_script_json(text).unwrap();
        assert_eq!(state, client.dehydrate());

        let flag_text = between(&tail, "<script id=\"__APP_FLAG__\" type=\"application/json\">", "</script>");
        assert_eq!(parse_script_json::<AppFlag>(flag_text).unwrap(), AppFlag::server_rendered());
    }

    #[test]
    fn test_escape_helpers() {
        assert_eq!(escape_html("<a & b>"), "&lt;a &amp; b&gt;");
        assert_eq!(escape_attr(r#"x" onload='y'"#), "x&quot; onload=&#39;y&#39;");
    }
}
