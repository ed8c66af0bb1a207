//! Candidate filtering, URL normalization and stylesheet link matching.
//!
//! Discovered resources are reduced to a normalized form before tracking:
//! cache-busting parameters stripped, same-origin URLs kept as
//! path-plus-query, cross-origin URLs prefixed with their origin unless a
//! host alias maps them back onto the page's own host.

use url::Url;

use crate::fingerprint::strip_query_cache_param;
use crate::options::Options;

/// Asset class of a discovered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Script,
    Stylesheet,
}

/// A raw candidate pulled from the document before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResource {
    pub kind: ResourceKind,
    pub href: String,
}

/// Identifier for one live stylesheet link, stable within a single listing.
pub type LinkId = u64;

/// A live stylesheet link as reported by the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetLink {
    pub id: LinkId,
    pub href: String,
}

/// Applies the discovery filter to one candidate: host allow-list (with
/// aliases), `.js`/`.css` extension, minified-path and test-library-path
/// exclusions. Returns the normalized tracking path, or `None` when the
/// candidate is ineligible.
pub fn candidate_path(origin: &Url, resource: &RawResource, options: &Options) -> Option<String> {
    match resource.kind {
        ResourceKind::Script if !options.watch_js => return None,
        ResourceKind::Stylesheet if !options.watch_css => return None,
        _ => {}
    }

    let resolved = origin.join(&resource.href).ok()?;
    let host = resolved.host_str()?;
    let origin_host = origin.host_str()?;
    let alias = options.host_alias.get(host).map(String::as_str);

    if !options.watch_hosts.is_empty() {
        let listed = |candidate: &str| options.watch_hosts.iter().any(|h| h == candidate);
        if !listed(host) && !alias.is_some_and(listed) {
            return None;
        }
    }

    if options.ignore_minified && resolved.path().contains(".min.") {
        return None;
    }

    let extension = path_extension(resolved.path());
    if extension != "js" && extension != "css" {
        return None;
    }

    // Third-party test-library assets are never watched.
    if resolved.path().contains("/jasmine/lib/") {
        return None;
    }

    let with_origin = host != origin_host && alias.map_or(true, |a| a != origin_host);
    Some(format_path(&resolved, with_origin))
}

/// Normalizes an explicitly declared URL without applying discovery
/// filters: declarations are trusted, only the path form is canonicalized.
pub fn normalize(origin: &Url, raw: &str, options: &Options) -> Option<String> {
    let resolved = origin.join(raw).ok()?;
    let host = resolved.host_str()?;
    let origin_host = origin.host_str()?;
    let alias = options.host_alias.get(host).map(String::as_str);
    let with_origin = host != origin_host && alias.map_or(true, |a| a != origin_host);
    Some(format_path(&resolved, with_origin))
}

/// The document's own tracking path: path plus query, cache-bust stripped,
/// never origin-prefixed.
pub fn document_path(location: &Url) -> String {
    format_path(location, false)
}

/// Whether a normalized tracking path refers to a stylesheet.
pub fn is_stylesheet(url: &str) -> bool {
    let path = url.split('?').next().unwrap_or(url);
    path_extension(path) == "css"
}

/// Finds the live links currently bound to `target` (a normalized tracking
/// path): pathname must match, the query must match once cache-busting is
/// stripped (only when the target has one), and the link host must equal
/// the target host directly or through the alias map.
pub fn matching_stylesheets<'a>(
    origin: &Url,
    target: &str,
    links: &'a [StylesheetLink],
    options: &Options,
) -> Vec<&'a StylesheetLink> {
    let Ok(target_url) = origin.join(target) else {
        return Vec::new();
    };
    let Some(target_host) = target_url.host_str().map(str::to_string) else {
        return Vec::new();
    };

    let mut hosts = vec![target_host.clone()];
    if let Some(alias) = options.host_alias.get(&target_host) {
        hosts.push(alias.clone());
    }

    let target_query = target_url
        .query()
        .map(strip_query_cache_param)
        .filter(|q| !q.is_empty());

    links
        .iter()
        .filter(|link| {
            let Ok(href) = origin.join(&link.href) else {
                return false;
            };
            if href.path() != target_url.path() {
                return false;
            }
            if let Some(expected) = &target_query {
                let query = href.query().map(strip_query_cache_param).unwrap_or_default();
                if query != *expected {
                    return false;
                }
            }
            let Some(link_host) = href.host_str() else {
                return false;
            };
            hosts.iter().any(|h| h == link_host)
                || options
                    .host_alias
                    .get(link_host)
                    .is_some_and(|alias| hosts.contains(alias))
        })
        .collect()
}

fn format_path(url: &Url, with_origin: bool) -> String {
    let mut out = String::new();
    if with_origin {
        out.push_str(&url.origin().ascii_serialization());
    }
    out.push_str(url.path());
    if let Some(query) = url.query() {
        let stripped = strip_query_cache_param(query);
        if !stripped.is_empty() {
            out.push('?');
            out.push_str(&stripped);
        }
    }
    out
}

fn path_extension(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or("")
}
