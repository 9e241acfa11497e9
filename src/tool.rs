use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DeskError, Result};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments, if the tool declares one.
    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, input: Value) -> Result<Value>;
}

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

/// Ordered set of tools. Registration order is the order advertised to the model.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registering a name twice replaces the earlier tool in place.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn with<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        self.tools
            .iter()
            .map(|t| ToolDescription {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    pub async fn call(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| DeskError::ToolNotFound(name.to_string()))?;
        tool.call(input)
            .await
            .map_err(|source| DeskError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(source),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "returns its own name"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Ok(json!(self.0))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(DeskError::Protocol("missing `x` for broken".into()))
        }
    }

    #[test]
    fn keeps_registration_order() {
        let registry = ToolRegistry::new()
            .with(Named("zeta"))
            .with(Named("alpha"))
            .with(Named("mid"));
        assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);

        let registry = registry.with(Named("alpha"));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let registry = ToolRegistry::new().with(Named("alpha"));
        let err = registry.call("beta", json!({})).await.unwrap_err();
        assert!(matches!(err, DeskError::ToolNotFound(name) if name == "beta"));
    }

    #[tokio::test]
    async fn wraps_tool_failures_with_the_tool_name() {
        let registry = ToolRegistry::new().with(Broken);
        let err = registry.call("broken", json!({})).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "tool `broken` invocation failed: protocol error: missing `x` for broken"
        );
    }
}
