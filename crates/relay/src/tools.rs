//! Registry of the tools a pipeline may offer to its chat model.
//!
//! A registry is assembled once at start-up with [`ToolRegistryBuilder`] and
//! frozen behind an `Arc`; after that it is only ever read, so concurrent turns
//! can share it freely.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

/// Extra output a tool can hand back next to its text result
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Image { data: Vec<u8>, mime_type: String },
}

impl Artifact {
    pub fn png(data: Vec<u8>) -> Self {
        Artifact::Image {
            data,
            mime_type: "image/png".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text fed back to the model as the tool result
    pub content: String,
    pub artifact: Option<Artifact>,
}

impl ToolOutput {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<Artifact>) -> Self {
        self.artifact = artifact;
        self
    }
}

/// The executable half of a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: &Value) -> AgentResult<ToolOutput>;
}

pub struct ToolRegistry {
    declarations: Vec<Tool>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            declarations: Vec::new(),
            handlers: HashMap::new(),
        })
    }

    /// Declarations in registration order
    pub fn declarations(&self) -> &[Tool] {
        &self.declarations
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run the tool named by the call
    pub async fn dispatch(&self, tool_call: &ToolCall) -> AgentResult<ToolOutput> {
        let handler = self
            .handlers
            .get(&tool_call.name)
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;
        handler.call(&tool_call.arguments).await
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<(Tool, Arc<dyn ToolHandler>)>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: Tool, handler: Arc<dyn ToolHandler>) -> Self {
        self.entries.push((tool, handler));
        self
    }

    /// Freeze the registry. Two tools with the same name is an error.
    pub fn build(self) -> AgentResult<Arc<ToolRegistry>> {
        let mut declarations = Vec::with_capacity(self.entries.len());
        let mut handlers = HashMap::with_capacity(self.entries.len());

        for (tool, handler) in self.entries {
            if handlers.contains_key(&tool.name) {
                return Err(AgentError::Internal(format!(
                    "Duplicate tool name: {}",
                    tool.name
                )));
            }
            handlers.insert(tool.name.clone(), handler);
            declarations.push(tool);
        }

        Ok(Arc::new(ToolRegistry {
            declarations,
            handlers,
        }))
    }
}

/// Pull a required string argument out of a tool call
pub fn required_str<'a>(arguments: &'a Value, key: &str) -> AgentResult<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing string argument '{}'", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, arguments: &Value) -> AgentResult<ToolOutput> {
            Ok(ToolOutput::text(required_str(arguments, "text")?))
        }
    }

    fn echo_tool(name: &str) -> Tool {
        Tool::new(name, "Echo the text back", json!({"type": "object"}))
    }

    #[tokio::test]
    async fn test_dispatch_runs_registered_handler() {
        let registry = ToolRegistry::builder()
            .register(echo_tool("echo"), Arc::new(Echo))
            .build()
            .unwrap();

        let output = registry
            .dispatch(&ToolCall::new("echo", json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::text("hi"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("echo"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::empty();
        let err = registry
            .dispatch(&ToolCall::new("missing", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::ToolNotFound("missing".into()));
    }

    #[tokio::test]
    async fn test_missing_argument_is_invalid_parameters() {
        let registry = ToolRegistry::builder()
            .register(echo_tool("echo"), Arc::new(Echo))
            .build()
            .unwrap();
        let err = registry
            .dispatch(&ToolCall::new("echo", json!({"other": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ToolRegistry::builder()
            .register(echo_tool("echo"), Arc::new(Echo))
            .register(echo_tool("echo"), Arc::new(Echo))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_declarations_keep_registration_order() {
        let registry = ToolRegistry::builder()
            .register(echo_tool("b"), Arc::new(Echo))
            .register(echo_tool("a"), Arc::new(Echo))
            .build()
            .unwrap();
        let names: Vec<_> = registry.declarations().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
