//! Short links with visit tracking.
//!
//! Storage sits behind [`LinkStore`]; [`MemoryLinkStore`] keeps everything in a
//! `tokio::sync::RwLock` for the lifetime of the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ::time::{format_description::well_known, OffsetDateTime};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::error::{LinkError, LinkResult};

pub const CODE_LEN: usize = 8;
const CODE_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Link {
    pub id: u64,
    pub code: String,
    pub original_url: String,
    pub created_at: String,
}

/// A link plus how many times it was followed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LinkSummary {
    #[serde(flatten)]
    pub link: Link,
    pub visit_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Visit {
    pub id: u64,
    pub link_code: String,
    pub ip_address: String,
    pub user_agent: String,
    pub referer: Option<String>,
    pub visited_at: String,
}

/// What the redirect handler knows about a visitor.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub ip_address: String,
    pub user_agent: String,
    pub referer: Option<String>,
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Fails with `CodeTaken` when `code` already exists.
    async fn insert_link(&self, code: &str, original_url: &str) -> LinkResult<Link>;
    async fn get_link(&self, code: &str) -> Option<Link>;
    /// Newest first.
    async fn list_links(&self) -> Vec<LinkSummary>;
    async fn insert_visit(&self, code: &str, visit: NewVisit) -> LinkResult<Visit>;
    /// Newest first.
    async fn visits(&self, code: &str) -> Vec<Visit>;
    /// Removes the link together with its visits.
    async fn delete_link(&self, code: &str) -> LinkResult<()>;
}

#[derive(Debug, Default)]
struct Tables {
    links: HashMap<String, Link>,
    visits: HashMap<String, Vec<Visit>>,
}

#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    tables: RwLock<Tables>,
    next_link_id: AtomicU64,
    next_visit_id: AtomicU64,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn insert_link(&self, code: &str, original_url: &str) -> LinkResult<Link> {
        let mut t = self.tables.write().await;
        if t.links.contains_key(code) {
            return Err(LinkError::CodeTaken(code.to_string()));
        }
        let link = Link {
            id: self.next_link_id.fetch_add(1, Ordering::Relaxed) + 1,
            code: code.to_string(),
            original_url: original_url.to_string(),
            created_at: now_rfc3339(),
        };
        t.links.insert(link.code.clone(), link.clone());
        Ok(link)
    }

    async fn get_link(&self, code: &str) -> Option<Link> {
        self.tables.read().await.links.get(code).cloned()
    }

    async fn list_links(&self) -> Vec<LinkSummary> {
        let t = self.tables.read().await;
        let mut out: Vec<LinkSummary> = t
            .links
            .values()
            .map(|link| LinkSummary {
                link: link.clone(),
                visit_count: t.visits.get(&link.code).map_or(0, Vec::len),
            })
            .collect();
        out.sort_by(|a, b| b.link.id.cmp(&a.link.id));
        out
    }

    async fn insert_visit(&self, code: &str, visit: NewVisit) -> LinkResult<Visit> {
        let mut t = self.tables.write().await;
        if !t.links.contains_key(code) {
            return Err(LinkError::NotFound);
        }
        let visit = Visit {
            id: self.next_visit_id.fetch_add(1, Ordering::Relaxed) + 1,
            link_code: code.to_string(),
            ip_address: visit.ip_address,
            user_agent: visit.user_agent,
            referer: visit.referer,
            visited_at: now_rfc3339(),
        };
        t.visits
            .entry(code.to_string())
            .or_default()
            .push(visit.clone());
        Ok(visit)
    }

    async fn visits(&self, code: &str) -> Vec<Visit> {
        let t = self.tables.read().await;
        t.visits
            .get(code)
            .map(|v| v.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    async fn delete_link(&self, code: &str) -> LinkResult<()> {
        let mut t = self.tables.write().await;
        t.links.remove(code).ok_or(LinkError::NotFound)?;
        t.visits.remove(code);
        Ok(())
    }
}

/// Accept `example.com/page` as well as full URLs; a missing scheme becomes `https://`.
pub fn normalize_url(raw: &str) -> LinkResult<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(LinkError::InvalidUrl("URL is required".into()));
    }
    let candidate = if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&candidate).map_err(|_| LinkError::InvalidUrl("invalid URL".into()))?;
    if !url.has_host() {
        return Err(LinkError::InvalidUrl("invalid URL".into()));
    }
    Ok(url.to_string())
}

/// Normalize the URL and store it under a fresh random code.
pub async fn create_link(store: &dyn LinkStore, raw_url: &str) -> LinkResult<Link> {
    let url = normalize_url(raw_url)?;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let code = nanoid::nanoid!(CODE_LEN);
        match store.insert_link(&code, &url).await {
            Ok(link) => {
                info!(code = %link.code, url = %link.original_url, "short link created");
                return Ok(link);
            }
            Err(LinkError::CodeTaken(code)) if attempt < CODE_ATTEMPTS => {
                debug!(%code, "short code collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(ip: &str) -> NewVisit {
        NewVisit {
            ip_address: ip.into(),
            user_agent: "test-agent".into(),
            referer: None,
        }
    }

    #[test]
    fn urls_get_a_scheme() {
        assert_eq!(normalize_url("example.com/a").unwrap(), "https://example.com/a");
        assert_eq!(normalize_url("http://example.com").unwrap(), "http://example.com/");
        assert!(matches!(normalize_url(""), Err(LinkError::InvalidUrl(_))));
        assert!(matches!(normalize_url("https://"), Err(LinkError::InvalidUrl(_))));
        assert!(matches!(normalize_url("exa mple.com"), Err(LinkError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn codes_are_eight_url_safe_chars() {
        let store = MemoryLinkStore::new();
        let link = create_link(&store, "example.com").await.unwrap();
        assert_eq!(link.code.len(), CODE_LEN);
        assert!(link
            .code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert_eq!(store.get_link(&link.code).await, Some(link));
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected() {
        let store = MemoryLinkStore::new();
        store.insert_link("abcdefgh", "https://a.example/").await.unwrap();
        assert!(matches!(
            store.insert_link("abcdefgh", "https://b.example/").await,
            Err(LinkError::CodeTaken(_))
        ));
    }

    #[tokio::test]
    async fn visits_are_counted_and_newest_first() {
        let store = MemoryLinkStore::new();
        store.insert_link("first000", "https://a.example/").await.unwrap();
        store.insert_link("second00", "https://b.example/").await.unwrap();
        store.insert_visit("first000", visit("10.0.0.1")).await.unwrap();
        store.insert_visit("first000", visit("10.0.0.2")).await.unwrap();

        let list = store.list_links().await;
        assert_eq!(list[0].link.code, "second00");
        assert_eq!(list[1].visit_count, 2);

        let visits = store.visits("first000").await;
        assert_eq!(visits[0].ip_address, "10.0.0.2");
        assert!(matches!(
            store.insert_visit("missing0", visit("10.0.0.3")).await,
            Err(LinkError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_removes_visits() {
        let store = MemoryLinkStore::new();
        store.insert_link("gone0000", "https://a.example/").await.unwrap();
        store.insert_visit("gone0000", visit("10.0.0.1")).await.unwrap();
        store.delete_link("gone0000").await.unwrap();

        assert!(store.get_link("gone0000").await.is_none());
        assert!(store.visits("gone0000").await.is_empty());
        assert!(matches!(store.delete_link("gone0000").await, Err(LinkError::NotFound)));
    }

    #[test]
    fn summary_flattens_link_fields() {
        let summary = LinkSummary {
            link: Link {
                id: 1,
                code: "abcdefgh".into(),
                original_url: "https://example.com/".into(),
                created_at: "2024-01-01T00:00:00Z".into(),
            },
            visit_count: 3,
        };
        let v = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["code"], "abcdefgh");
        assert_eq!(v["original_url"], "https://example.com/");
        assert_eq!(v["visit_count"], 3);
    }
}
