//! Platform primitives the engine consumes: the current document path, loading and fetching
//! resources, and the live document of attached style elements.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    trace,
};
use url::Url;

const USER_AGENT: &str = concat!("theme-engine/", env!("CARGO_PKG_VERSION"));

/// Access to the host environment. Injected so the engine can run against fakes in tests.
#[async_trait]
pub trait Platform: std::fmt::Debug + Send + Sync + 'static {
    /// Path component of the current document location.
    fn current_path(&self) -> String;

    /// The document that style elements are attached to.
    fn document(&self) -> Document;

    /// Loads a stylesheet. Resolves once the resource has either loaded or failed.
    async fn load_stylesheet(&self, href: &str) -> Result<Stylesheet, ResourceError>;

    /// Fetches the raw text of a resource.
    async fn fetch_text(&self, href: &str) -> Result<String, ResourceError>;
}

/// A loaded stylesheet resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stylesheet {
    pub href: String,
    pub css: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    #[error("request for {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("request for {url} failed: {message}")]
    Network {
        url: String,
        message: String,
        #[source]
        source: Option<Arc<reqwest::Error>>,
    },
    #[error("invalid resource url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ResourceError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    fn from_reqwest(url: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(u64);

/// Content of an attached style element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StyleSource {
    /// A linked stylesheet and the text it loaded.
    Linked { href: String, css: String },
    /// An inline style block.
    Inline { css: String },
}

impl StyleSource {
    pub fn css(&self) -> &str {
        match self {
            StyleSource::Linked { css, .. } | StyleSource::Inline { css } => css,
        }
    }
}

impl From<Stylesheet> for StyleSource {
    fn from(value: Stylesheet) -> Self {
        Self::Linked {
            href: value.href,
            css: value.css,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleElement {
    pub id: ElementId,
    pub key: Option<String>,
    pub source: StyleSource,
}

/// Ordered set of style elements. Later elements take precedence, like a document head.
///
/// Cloning yields another handle to the same document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    inner: Arc<Mutex<DocumentInner>>,
}

#[derive(Debug, Default)]
struct DocumentInner {
    next_id: u64,
    elements: Vec<StyleElement>,
}

impl DocumentInner {
    fn push(&mut self, key: Option<&str>, source: StyleSource) -> ElementId {
        self.next_id += 1;
        let id = ElementId(self.next_id);
        self.elements.push(StyleElement {
            id,
            key: key.map(String::from),
            source,
        });
        id
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an element.
    pub fn insert(&self, key: Option<&str>, source: StyleSource) -> ElementId {
        let id = self.inner.lock().push(key, source);
        trace!(?id, key, "inserted style element");
        id
    }

    /// Removes an element, returning whether it was attached.
    pub fn remove(&self, id: ElementId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.elements.len();
        inner.elements.retain(|e| e.id != id);
        let removed = inner.elements.len() != before;
        trace!(?id, removed, "removed style element");
        removed
    }

    /// Removes every element with `key`, then appends a new one with it.
    pub fn replace_keyed(&self, key: &str, source: StyleSource) -> ElementId {
        let mut inner = self.inner.lock();
        inner.elements.retain(|e| e.key.as_deref() != Some(key));
        let id = inner.push(Some(key), source);
        debug!(?id, key, "replaced keyed style element");
        id
    }

    /// Removes every element with `key`, returning whether any was attached.
    pub fn remove_keyed(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.elements.len();
        inner.elements.retain(|e| e.key.as_deref() != Some(key));
        inner.elements.len() != before
    }

    pub fn get(&self, id: ElementId) -> Option<StyleElement> {
        self.inner.lock().elements.iter().find(|e| e.id == id).cloned()
    }

    pub fn find_keyed(&self, key: &str) -> Option<StyleElement> {
        self.inner
            .lock()
            .elements
            .iter()
            .find(|e| e.key.as_deref() == Some(key))
            .cloned()
    }

    pub fn elements(&self) -> Vec<StyleElement> {
        self.inner.lock().elements.clone()
    }

    /// All attached css in document order.
    pub fn stylesheet_text(&self) -> String {
        self.inner
            .lock()
            .elements
            .iter()
            .map(|e| e.source.css())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// [Platform] backed by HTTP requests against a base url. The base url's path is the current
/// document path.
#[derive(Debug, Clone)]
pub struct HttpPlatform {
    client: reqwest::Client,
    base: Url,
    document: Document,
}

impl HttpPlatform {
    pub fn new(base: Url) -> Result<Self, ResourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ResourceError::from_reqwest(base.as_str(), err))?;
        Ok(Self::with_client(client, base))
    }

    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self {
            client,
            base,
            document: Document::new(),
        }
    }

    fn resolve(&self, href: &str) -> Result<Url, ResourceError> {
        self.base.join(href).map_err(|source| ResourceError::InvalidUrl {
            url: href.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    fn current_path(&self) -> String {
        self.base.path().to_string()
    }

    fn document(&self) -> Document {
        self.document.clone()
    }

    async fn load_stylesheet(&self, href: &str) -> Result<Stylesheet, ResourceError> {
        let css = self.fetch_text(href).await?;
        Ok(Stylesheet {
            href: href.to_string(),
            css,
        })
    }

    async fn fetch_text(&self, href: &str) -> Result<String, ResourceError> {
        let url = self.resolve(href)?;
        debug!(%url, "fetching resource");
        let res = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ResourceError::from_reqwest(url.as_str(), err))?;

        let status = res.status();
        if !status.is_success() {
            return Err(ResourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        res.text()
            .await
            .map_err(|err| ResourceError::from_reqwest(url.as_str(), err))
    }
}
