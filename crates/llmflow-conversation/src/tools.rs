//! Tool handlers offered to `generate_with_tools` (`spec.md` §4.F). Tools
//! are registered, not hard-coded, mirroring the Task Queue's handler
//! registry pattern (`spec.md` §4.G) applied to this engine's tool loop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use llmflow_core::ToolDefinition;
use serde_json::Value;

/// Implemented by whatever executes a single tool call. Returning `Err`
/// does not abort the loop -- `engine::generate_with_tools` catches it and
/// folds the error's string form into the tool result, per `spec.md` §4.F's
/// pseudocode (`result <- handler.execute(args) or {error: str(exc)}`).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<Value, anyhow::Error>;
}

/// One entry per offerable tool: its schema (sent to the model) and the
/// handler invoked when the model calls it by name.
pub struct ToolRegistry {
    entries: HashMap<String, (ToolDefinition, Arc<dyn ToolHandler>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry { entries: HashMap::new() }
    }

    pub fn register(mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Self {
        self.entries.insert(definition.name.clone(), (definition, handler));
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.values().map(|(def, _)| def.clone()).collect()
    }

    pub fn handler(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.entries.get(name).map(|(_, handler)| handler)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
