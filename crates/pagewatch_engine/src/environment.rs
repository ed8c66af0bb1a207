//! The host-document capabilities the watcher core is polymorphic over.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use pagewatch_core::{LinkId, ProbeMethod, StylesheetLink};
use scraper::{Html, Selector};
use url::Url;
use watch_logging::{watch_debug, watch_info, watch_warn};

use crate::request::Requester;

/// Abstract document environment: where resources come from and where
/// reload/swap reactions land. The production implementation reads a live
/// page over HTTP; tests substitute a scripted fake.
#[async_trait::async_trait]
pub trait Environment: Send + Sync {
    /// The document's own URL.
    fn current_location(&self) -> Url;
    /// `src` attributes of the document's script tags.
    async fn list_scripts(&self) -> Vec<String>;
    /// The document's live stylesheet links, with identifiers stable within
    /// one listing.
    async fn list_stylesheets(&self) -> Vec<StylesheetLink>;
    /// Reload the whole document.
    async fn reload(&self);
    /// Point one stylesheet link at a fresh URL; returns false when the
    /// link no longer exists.
    async fn swap_stylesheet(&self, id: LinkId, href: &str) -> bool;
}

/// Reads a live document over HTTP and parses its script and stylesheet
/// references. Stylesheet swaps are tracked as href overrides so the
/// watcher's view of the document stays coherent between reloads.
pub struct PageEnvironment {
    page: Url,
    requester: Arc<dyn Requester>,
    swapped: Mutex<HashMap<LinkId, String>>,
}

impl PageEnvironment {
    pub fn new(page: Url, requester: Arc<dyn Requester>) -> Self {
        Self {
            page,
            requester,
            swapped: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch_document(&self) -> Option<String> {
        let headers = BTreeMap::new();
        match self
            .requester
            .request(ProbeMethod::Get, self.page.as_str(), &headers)
            .await
        {
            Ok(reply) => reply.body,
            Err(err) => {
                watch_warn!("Failed to fetch document {}: {}", self.page, err);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Environment for PageEnvironment {
    fn current_location(&self) -> Url {
        self.page.clone()
    }

    async fn list_scripts(&self) -> Vec<String> {
        match self.fetch_document().await {
            Some(html) => parse_scripts(&html),
            None => Vec::new(),
        }
    }

    async fn list_stylesheets(&self) -> Vec<StylesheetLink> {
        let hrefs = match self.fetch_document().await {
            Some(html) => parse_stylesheets(&html),
            None => Vec::new(),
        };
        let swapped = self.swapped.lock().expect("swapped hrefs lock");
        hrefs
            .into_iter()
            .enumerate()
            .map(|(index, href)| {
                let id = index as LinkId;
                StylesheetLink {
                    id,
                    href: swapped.get(&id).cloned().unwrap_or(href),
                }
            })
            .collect()
    }

    async fn reload(&self) {
        // The headless counterpart of a navigation: forget swap overrides
        // and pull the document again so the next scan sees a fresh view.
        self.swapped.lock().expect("swapped hrefs lock").clear();
        watch_info!("reloading {}", self.page);
        let _ = self.fetch_document().await;
    }

    async fn swap_stylesheet(&self, id: LinkId, href: &str) -> bool {
        watch_debug!("swapping stylesheet {} -> {}", id, href);
        self.swapped
            .lock()
            .expect("swapped hrefs lock")
            .insert(id, href.to_string());
        true
    }
}

fn parse_scripts(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script[src]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|node| node.value().attr("src"))
        .map(str::to_string)
        .collect()
}

fn parse_stylesheets(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"link[rel="stylesheet"][href]"#) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|node| node.value().attr("href"))
        .map(str::to_string)
        .collect()
}
