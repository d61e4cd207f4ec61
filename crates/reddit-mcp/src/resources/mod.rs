//! Resource catalog.
//!
//! A flat list of addressable content: static documents and credential-gated
//! upstream reads. Unknown URIs fail `not_found`; gated URIs without bound
//! credentials fail `authentication_required`.

use std::sync::Arc;

use crate::client::UpstreamApi;
use crate::error::McpError;
use crate::protocol::ResourceInfo;
use crate::server::session::CredentialSnapshot;

/// Community guidelines served to prompt templates and clients.
const GUIDELINES: &str = "\
# Posting guidelines

- Be specific: quote the content you are responding to.
- Keep replies civil and on-topic.
- Disclose automation: replies drafted by a bot must say so.
- Never include personal information.
";

/// How a resource body is produced.
enum ResourceKind {
    /// A fixed document.
    Static(&'static str),
    /// The authenticated user's identity, read from the upstream.
    Identity,
}

struct ResourceEntry {
    uri: &'static str,
    name: &'static str,
    mime_type: &'static str,
    requires_auth: bool,
    kind: ResourceKind,
}

/// Flat resource catalog.
pub struct ResourceRegistry {
    entries: Vec<ResourceEntry>,
    api: Arc<dyn UpstreamApi>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new(api: Arc<dyn UpstreamApi>) -> Self {
        Self {
            entries: vec![
                ResourceEntry {
                    uri: "reddit://guidelines",
                    name: "Posting guidelines",
                    mime_type: "text/markdown",
                    requires_auth: false,
                    kind: ResourceKind::Static(GUIDELINES),
                },
                ResourceEntry {
                    uri: "reddit://me",
                    name: "Authenticated identity",
                    mime_type: "application/json",
                    requires_auth: true,
                    kind: ResourceKind::Identity,
                },
            ],
            api,
        }
    }

    /// List the catalog.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceInfo> {
        self.entries
            .iter()
            .map(|e| ResourceInfo {
                uri: e.uri.to_string(),
                name: e.name.to_string(),
                mime_type: e.mime_type.to_string(),
            })
            .collect()
    }

    /// Read one resource body by URI.
    ///
    /// # Errors
    ///
    /// `not_found` for unknown URIs; `authentication_required` when a gated
    /// URI is read without credentials; `upstream_error` when the upstream
    /// read fails.
    pub async fn read(
        &self,
        uri: &str,
        credentials: Option<&CredentialSnapshot>,
    ) -> Result<String, McpError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.uri == uri)
            .ok_or_else(|| McpError::NotFound(uri.to_string()))?;

        if entry.requires_auth && credentials.is_none() {
            return Err(McpError::AuthenticationRequired);
        }

        match &entry.kind {
            ResourceKind::Static(body) => Ok((*body).to_string()),
            ResourceKind::Identity => {
                let creds = credentials.ok_or(McpError::AuthenticationRequired)?;
                let identity = self
                    .api
                    .identity(&creds.access_token)
                    .await
                    .map_err(|_| McpError::UpstreamError("identity read failed".into()))?;
                serde_json::to_string_pretty(&identity).map_err(|_| McpError::Internal)
            }
        }
    }

    /// The mime type of a known URI.
    #[must_use]
    pub fn mime_type(&self, uri: &str) -> Option<&'static str> {
        self.entries.iter().find(|e| e.uri == uri).map(|e| e.mime_type)
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry").field("entries", &self.entries.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::StubApi;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new(Arc::new(StubApi::default()))
    }

    fn credentials() -> CredentialSnapshot {
        CredentialSnapshot {
            user_id: "alice".into(),
            access_token: "A".into(),
            refresh_token: "R".into(),
            issued_at: 0,
        }
    }

    #[tokio::test]
    async fn test_list_is_flat_catalog() {
        let list = registry().list();
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|r| r.uri == "reddit://guidelines"));
    }

    #[tokio::test]
    async fn test_unknown_uri_not_found() {
        let err = registry().read("reddit://nope", None).await.unwrap_err();
        assert!(matches!(err, McpError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_static_read_needs_no_auth() {
        let body = registry().read("reddit://guidelines", None).await.unwrap();
        assert!(body.contains("Posting guidelines"));
    }

    #[tokio::test]
    async fn test_gated_read_requires_credentials() {
        let err = registry().read("reddit://me", None).await.unwrap_err();
        assert!(matches!(err, McpError::AuthenticationRequired));

        let creds = credentials();
        let body = registry().read("reddit://me", Some(&creds)).await.unwrap();
        assert!(body.contains("alice"));
    }
}
