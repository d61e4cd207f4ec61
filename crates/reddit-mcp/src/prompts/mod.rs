//! Prompt catalog.
//!
//! Each prompt is a message template with declared arguments. Rendering
//! substitutes `{{name}}` argument placeholders and injects resource bodies
//! under `{{resource_<key>}}` placeholders. Missing required arguments fail
//! the render; missing resource bodies are silently skipped.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{PromptArgumentInfo, PromptInfo};
use crate::resources::ResourceRegistry;
use crate::server::session::CredentialSnapshot;

/// One declared prompt argument.
struct PromptArgument {
    name: &'static str,
    description: &'static str,
    required: bool,
}

/// A prompt template with its declared arguments and resource references.
struct PromptTemplate {
    name: &'static str,
    description: &'static str,
    arguments: Vec<PromptArgument>,
    /// Resource placeholders: key → resource URI.
    resources: Vec<(&'static str, &'static str)>,
    template: &'static str,
}

/// Prompt catalog.
pub struct PromptRegistry {
    prompts: Vec<PromptTemplate>,
}

impl PromptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prompts: vec![
                PromptTemplate {
                    name: "summarize_subreddit",
                    description: "Summarize recent activity in a subreddit",
                    arguments: vec![
                        PromptArgument {
                            name: "subreddit",
                            description: "Subreddit name without the r/ prefix",
                            required: true,
                        },
                        PromptArgument {
                            name: "focus",
                            description: "Optional topic to focus the summary on",
                            required: false,
                        },
                    ],
                    resources: vec![],
                    template: "Summarize what is currently happening in r/{{subreddit}}. \
                               {{focus}}",
                },
                PromptTemplate {
                    name: "draft_reply",
                    description: "Draft a reply to a post, following the posting guidelines",
                    arguments: vec![
                        PromptArgument {
                            name: "post_title",
                            description: "Title of the post being replied to",
                            required: true,
                        },
                        PromptArgument {
                            name: "post_body",
                            description: "Body of the post being replied to",
                            required: true,
                        },
                    ],
                    resources: vec![("guidelines", "reddit://guidelines")],
                    template: "Draft a reply to the following post.\n\n\
                               Title: {{post_title}}\n\n{{post_body}}\n\n\
                               Follow these guidelines:\n{{resource_guidelines}}",
                },
            ],
        }
    }

    /// List the catalog.
    #[must_use]
    pub fn list(&self) -> Vec<PromptInfo> {
        self.prompts
            .iter()
            .map(|p| PromptInfo {
                name: p.name.to_string(),
                description: p.description.to_string(),
                arguments: p
                    .arguments
                    .iter()
                    .map(|a| PromptArgumentInfo {
                        name: a.name.to_string(),
                        description: a.description.to_string(),
                        required: a.required,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Render one prompt.
    ///
    /// # Errors
    ///
    /// `not_found` for an unknown prompt name; `invalid_arguments` naming
    /// each missing required argument. Resource injection is best-effort.
    pub async fn render(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
        resources: &ResourceRegistry,
        credentials: Option<&CredentialSnapshot>,
    ) -> Result<(String, String), McpError> {
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| McpError::NotFound(name.to_string()))?;

        let missing: Vec<String> = prompt
            .arguments
            .iter()
            .filter(|a| a.required && !arguments.contains_key(a.name))
            .map(|a| a.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(McpError::invalid_arguments(missing));
        }

        let mut text = prompt.template.to_string();
        for arg in &prompt.arguments {
            let value = arguments.get(arg.name).map(String::as_str).unwrap_or_default();
            text = text.replace(&format!("{{{{{}}}}}", arg.name), value);
        }

        for (key, uri) in &prompt.resources {
            let placeholder = format!("{{{{resource_{key}}}}}");
            match resources.read(uri, credentials).await {
                Ok(body) => text = text.replace(&placeholder, &body),
                Err(err) => {
                    tracing::debug!(prompt = %name, uri = %uri, error = %err, "Skipping resource injection");
                    text = text.replace(&placeholder, "");
                }
            }
        }

        Ok((prompt.description.to_string(), text))
    }

    /// Render a prompt into the `prompts/get` result shape.
    ///
    /// # Errors
    ///
    /// Same as [`Self::render`].
    pub async fn get(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
        resources: &ResourceRegistry,
        credentials: Option<&CredentialSnapshot>,
    ) -> Result<Value, McpError> {
        let (description, text) = self.render(name, arguments, resources, credentials).await?;
        Ok(serde_json::json!({
            "description": description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text }
            }]
        }))
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PromptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRegistry").field("prompts", &self.prompts.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::StubApi;
    use std::sync::Arc;

    fn resources() -> ResourceRegistry {
        ResourceRegistry::new(Arc::new(StubApi::default()))
    }

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[tokio::test]
    async fn test_list_declares_arguments() {
        let registry = PromptRegistry::new();
        let list = registry.list();
        let draft = list.iter().find(|p| p.name == "draft_reply").unwrap();
        assert!(draft.arguments.iter().all(|a| a.required));
    }

    #[tokio::test]
    async fn test_render_substitutes_arguments() {
        let registry = PromptRegistry::new();
        let (_, text) = registry
            .render(
                "summarize_subreddit",
                &args(&[("subreddit", "rust"), ("focus", "async")]),
                &resources(),
                None,
            )
            .await
            .unwrap();
        assert!(text.contains("r/rust"));
        assert!(text.contains("async"));
        assert!(!text.contains("{{"));
    }

    #[tokio::test]
    async fn test_missing_optional_argument_renders_empty() {
        let registry = PromptRegistry::new();
        let (_, text) = registry
            .render("summarize_subreddit", &args(&[("subreddit", "rust")]), &resources(), None)
            .await
            .unwrap();
        assert!(!text.contains("{{focus}}"));
    }

    #[tokio::test]
    async fn test_missing_required_argument_fails() {
        let registry = PromptRegistry::new();
        let err = registry
            .render("draft_reply", &args(&[("post_title", "T")]), &resources(), None)
            .await
            .unwrap_err();
        match err {
            McpError::InvalidArguments { paths } => assert_eq!(paths, vec!["post_body"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_resource_injection() {
        let registry = PromptRegistry::new();
        let (_, text) = registry
            .render(
                "draft_reply",
                &args(&[("post_title", "T"), ("post_body", "B")]),
                &resources(),
                None,
            )
            .await
            .unwrap();
        assert!(text.contains("Posting guidelines"));
        assert!(!text.contains("{{resource_guidelines}}"));
    }

    #[tokio::test]
    async fn test_unknown_prompt_not_found() {
        let registry = PromptRegistry::new();
        let err = registry.render("nope", &HashMap::new(), &resources(), None).await.unwrap_err();
        assert!(matches!(err, McpError::NotFound(_)));
    }
}
