//! Page context for a widget instance: where it is embedded and what the page passes in.
//!
//! When running inside an iframe the interesting URL is the embedding page, which is
//! only readable same-origin. Each lookup is a capability query that may come back
//! empty; [`PageContext::page_url`] walks parent URL → referrer → own URL.

use anyhow::{Context, Result};
use reqwest::Url;

/// Query parameters forwarded to the webhook as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassThroughIds {
    pub user_id: Option<String>,
    pub module_id: Option<String>,
}

pub trait PageContext: Send + Sync {
    /// URL of the document the widget itself runs in (the iframe src when embedded).
    fn own_url(&self) -> Url;

    /// URL of the embedding document; `None` when top-level or when cross-origin
    /// access is denied.
    fn parent_url(&self) -> Option<Url>;

    /// The document referrer, if any.
    fn referrer(&self) -> Option<Url>;

    /// Best available page URL: parent, then referrer, then own.
    fn page_url(&self) -> Url {
        self.parent_url()
            .or_else(|| self.referrer())
            .unwrap_or_else(|| self.own_url())
    }

    /// Non-empty value of a query parameter on the widget's own URL.
    fn query_param(&self, name: &str) -> Option<String> {
        self.own_url()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn pass_through_ids(&self) -> PassThroughIds {
        PassThroughIds {
            user_id: self.query_param("user_id"),
            module_id: self.query_param("module_id"),
        }
    }

    /// Storage partition for this widget instance: the `id` parameter, else `instanceId`.
    fn instance_key(&self) -> Option<String> {
        self.query_param("id")
            .or_else(|| self.query_param("instanceId"))
    }
}

/// Plain-data page context, filled in by whatever hosts the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPage {
    own: Url,
    parent: Option<Url>,
    referrer: Option<Url>,
}

impl StaticPage {
    pub fn new(own: Url) -> Self {
        Self {
            own,
            parent: None,
            referrer: None,
        }
    }

    /// Parse the widget's own URL.
    pub fn parse(own: &str) -> Result<Self> {
        let url = Url::parse(own).with_context(|| format!("parsing page url {}", own))?;
        Ok(Self::new(url))
    }

    pub fn with_parent(mut self, parent: Option<Url>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_referrer(mut self, referrer: Option<Url>) -> Self {
        self.referrer = referrer;
        self
    }
}

impl PageContext for StaticPage {
    fn own_url(&self) -> Url {
        self.own.clone()
    }

    fn parent_url(&self) -> Option<Url> {
        self.parent.clone()
    }

    fn referrer(&self) -> Option<Url> {
        self.referrer.clone()
    }
}
