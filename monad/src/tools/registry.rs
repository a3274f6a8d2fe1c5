//! Tool registry: tools by id, first registration wins.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Tool, ToolCallContent, ToolCallContext, ToolError, ToolSpec};

/// Ordered registry of tools keyed by id.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Returns false (and keeps the existing tool) when the
    /// id is already taken; first seen wins.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let id = tool.id().to_string();
        if self.tools.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.tools.insert(id, tool);
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Tools in registration order.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.order
            .iter()
            .filter_map(|id| self.tools.get(id))
            .cloned()
            .collect()
    }

    /// Specs in registration order.
    pub fn list(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|id| self.tools.get(id))
            .map(|t| t.spec())
            .collect()
    }

    pub async fn call(
        &self,
        id: &str,
        args: serde_json::Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError> {
        let tool = self
            .get(id)
            .ok_or_else(|| ToolError::NotFound(id.to_string()))?;
        tool.call(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool {
        id: String,
        reply: String,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn id(&self) -> &str {
            &self.id
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.id.clone(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }
        }

        async fn call(
            &self,
            _args: serde_json::Value,
            _ctx: Option<&ToolCallContext>,
        ) -> Result<ToolCallContent, ToolError> {
            Ok(ToolCallContent {
                text: self.reply.clone(),
            })
        }
    }

    /// **Scenario**: First registration wins on id collisions.
    #[tokio::test]
    async fn first_seen_wins() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(EchoTool {
            id: "echo".into(),
            reply: "first".into(),
        })));
        assert!(!registry.register(Arc::new(EchoTool {
            id: "echo".into(),
            reply: "second".into(),
        })));

        let out = registry
            .call("echo", serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(out.text, "first");
        assert_eq!(registry.list().len(), 1);
    }

    /// **Scenario**: Calling an unknown id yields NotFound.
    #[tokio::test]
    async fn unknown_tool_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .call("ghost", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
