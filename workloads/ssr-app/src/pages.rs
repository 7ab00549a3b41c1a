//! Demo route table and page renderer.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use ssr_sdk::prelude::*;

/// Cache key of the home page coin list.
pub const HOME_KEY: &str = "home";

/// A listed coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub key: u32,
    pub content: String,
}

/// Loader for the home page list.
pub async fn load_coins(_params: RouteParams) -> Result<Vec<Coin>, LoaderError> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(["BTC", "ETH", "MEME", "DOGE"]
        .iter()
        .zip(1..)
        .map(|(content, key)| Coin {
            key,
            content: content.to_string(),
        })
        .collect())
}

/// Routes served by the app.
///
/// ```text
/// /:locale?        layout (document metadata)
///   (index)        home, prefetches `["home"]`
///   about          about
/// ```
pub fn routes() -> Result<RouteTable, RouteError> {
    RouteTable::new(vec![RouteDescriptor::new("/:locale?")
        .with_id("layout")
        .with_children(vec![
            RouteDescriptor::index()
                .with_id("home")
                .with_data(HOME_KEY, loader_fn(load_coins)),
            RouteDescriptor::new("about").with_id("about"),
        ])])
}

/// Asset manifest used when no build manifest is configured.
pub fn default_manifest(public_path: &str) -> AssetManifest {
    AssetManifest::default()
        .with_public_path(public_path)
        .with_chunk("client", &["client.js"])
        .with_chunk("home", &["home.js"])
        .with_chunk("about", &["about.js"])
        .with_entrypoint("client")
}

/// Renders the demo pages.
///
/// Every page streams a shell first; the home list follows as a separate
/// chunk, read from the prefetched cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoRenderer;

impl PageRenderer for DemoRenderer {
    fn render(&self, ctx: RenderContext) -> RenderStream {
        layout_head(&ctx);

        let signals = if ctx.matched("home") {
            home(&ctx)
        } else if ctx.matched("about") {
            about(&ctx)
        } else {
            not_found(&ctx)
        };
        stream::iter(signals).boxed()
    }
}

fn layout_head(ctx: &RenderContext) {
    let locale = ctx.params.get("locale").cloned();
    ctx.head.update(|head| {
        if let Some(locale) = locale {
            head.set_html_attr("lang", locale);
        }
        head.set_html_attr("dir", "ltr");
        head.set_body_attr("class", "dark");
        head.set_title("Streaming SSR");
        head.set_meta("description", "Streaming SSR");
    });
}

fn link(ctx: &RenderContext, to: &str) -> String {
    match ctx.params.get("locale") {
        Some(locale) => format!("/{}/{}", escape_attr(locale), to),
        None => format!("/{}", to),
    }
}

fn home(ctx: &RenderContext) -> Vec<RenderSignal> {
    ctx.chunks.mark("home");

    let shell = format!(
        "<main><header>header <a href=\"{}\">about</a></header><main>Home<ul>",
        link(ctx, "about")
    );

    let items = match ctx
        .client
        .get_query_data_as::<Vec<Coin>>(&QueryKey::named(HOME_KEY))
    {
        Some(coins) => coins
            .iter()
            .map(|coin| format!("<li data-key=\"{}\">{}</li>", coin.key, escape_html(&coin.content)))
            .collect(),
        None => "<li>Failed to load coins</li>".to_string(),
    };

    vec![
        RenderSignal::ShellReady(shell),
        RenderSignal::Chunk(items),
        RenderSignal::Chunk("</ul></main><footer>footer</footer></main>".to_string()),
        RenderSignal::AllReady,
    ]
}

fn about(ctx: &RenderContext) -> Vec<RenderSignal> {
    ctx.chunks.mark("about");
    ctx.head.update(|head| head.set_title("About - Streaming SSR"));

    vec![
        RenderSignal::ShellReady(format!(
            "<main><h1>About</h1><a href=\"{}\">home</a></main>",
            link(ctx, "")
        )),
        RenderSignal::AllReady,
    ]
}

fn not_found(ctx: &RenderContext) -> Vec<RenderSignal> {
    ctx.head.update(|head| head.set_title("Not Found - Streaming SSR"));

    vec![
        RenderSignal::ShellReady(format!(
            "<main><h1>Not Found</h1><p>{}</p></main>",
            escape_html(&ctx.path)
        )),
        RenderSignal::AllReady,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(ctx: RenderContext) -> Vec<RenderSignal> {
        DemoRenderer.render(ctx).collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_lists_prefetched_coins() {
        let table = routes().unwrap();
        let client = QueryClient::new();
        prefetch(&table, "/en", &client, &PrefetchOptions::default()).await;

        let matches = table.match_path("/en").unwrap();
        let ctx = RenderContext::new("/en", client).with_matches(&matches);
        let signals = collect(ctx.clone()).await;

        assert!(matches!(&signals[0], RenderSignal::ShellReady(s) if s.contains("href=\"/en/about\"")));
        assert_eq!(
            signals[1],
            RenderSignal::Chunk(
                "<li data-key=\"1\">BTC</li><li data-key=\"2\">ETH</li>\
                 <li data-key=\"3\">MEME</li><li data-key=\"4\">DOGE</li>"
                    .to_string()
            )
        );
        assert_eq!(signals.last(), Some(&RenderSignal::AllReady));

        let head = ctx.head.snapshot();
        assert_eq!(head.render_html_attrs(), r#" lang="en" dir="ltr""#);
        assert_eq!(head.render_body_attrs(), r#" class="dark""#);
        assert_eq!(ctx.chunks.used(), vec!["home"]);
    }

    #[tokio::test]
    async fn test_home_without_data_renders_fallback() {
        let table = routes().unwrap();
        let matches = table.match_path("/").unwrap();
        let ctx = RenderContext::new("/", QueryClient::new()).with_matches(&matches);

        let signals = collect(ctx).await;
        assert_eq!(
            signals[1],
            RenderSignal::Chunk("<li>Failed to load coins</li>".to_string())
        );
    }

    #[tokio::test]
    async fn test_about_and_not_found() {
        let table = routes().unwrap();

        let matches = table.match_path("/about").unwrap();
        let ctx = RenderContext::new("/about", QueryClient::new()).with_matches(&matches);
        let signals = collect(ctx.clone()).await;
        assert!(matches!(&signals[0], RenderSignal::ShellReady(s) if s.contains("<h1>About</h1>")));
        assert_eq!(ctx.head.snapshot().title.as_deref(), Some("About - Streaming SSR"));

        let ctx = RenderContext::new("/a/b/c", QueryClient::new());
        let signals = collect(ctx).await;
        assert!(matches!(&signals[0], RenderSignal::ShellReady(s) if s.contains("Not Found")));
    }

    #[test]
    fn test_about_is_not_a_locale() {
        let table = routes().unwrap();
        let ids: Vec<_> = table
            .match_path("/about")
            .unwrap()
            .iter()
            .filter_map(|m| m.route.id.clone())
            .collect();
        assert_eq!(ids, vec!["layout", "about"]);
    }
}
