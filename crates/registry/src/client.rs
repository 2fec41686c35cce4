use crate::error::{ErrorKind, Result};
use crate::models::SourcePackage;
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

/// Outcome of fetching one package document.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Raw HTTP status of the metadata request.
    pub status: u16,
    /// `None` when the registry has no such package.
    pub package: Option<SourcePackage>,
}

impl Fetched {
    pub fn not_found(status: u16) -> Self {
        Self { status, package: None }
    }

    pub fn found(package: SourcePackage) -> Self {
        Self { status: StatusCode::OK.as_u16(), package: Some(package) }
    }
}

/// Resolves package names to upstream metadata.
///
/// "Not found" is reported through [`Fetched::package`], never as an error,
/// so callers can tell a missing package apart from a broken transport.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Human-readable name of the registry, used for logging.
    fn name(&self) -> &str;

    async fn fetch(&self, name: &str) -> Result<Fetched>;
}

/// Registry client speaking the npm-style JSON document protocol.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base: String,
    client: Client,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build().or_raise(|| ErrorKind::Client)?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        Self { base, client }
    }

    fn package_url(&self, name: &str) -> Result<Url> {
        let url = format!("{}/{}", self.base, encode_name(name));
        Url::parse(&url).or_raise(|| ErrorKind::InvalidUrl(url))
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    fn name(&self) -> &str {
        &self.base
    }

    #[tracing::instrument(skip(self), fields(registry = %self.base))]
    async fn fetch(&self, name: &str) -> Result<Fetched> {
        let url = self.package_url(name)?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .or_raise(|| ErrorKind::Network)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("Package not found upstream");
            return Ok(Fetched::not_found(status.as_u16()));
        }
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }

        let document: Value = response.json().await.or_raise(|| ErrorKind::Decode)?;
        // Some registries answer 200 with an error document instead of 404.
        if document.get("error").is_some() {
            tracing::debug!(error = %document["error"], "Registry returned an error document");
            return Ok(Fetched::not_found(status.as_u16()));
        }
        let package: SourcePackage = serde_json::from_value(document).or_raise(|| ErrorKind::Decode)?;
        tracing::debug!(versions = package.versions.len(), "Fetched package document");
        Ok(Fetched { status: status.as_u16(), package: Some(package) })
    }
}

/// Scoped names keep their `@` but the separating slash is escaped, so the
/// whole name is a single path segment.
fn encode_name(name: &str) -> String {
    if name.starts_with('@') { name.replacen('/', "%2f", 1) } else { name.to_string() }
}
