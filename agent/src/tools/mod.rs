//! Tool capability and name-keyed registry.

pub mod smart_edit;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

use crate::context::TaskContext;
use crate::core::schema::ParamValidator;
use crate::core::types::ToolResult;
use crate::io::prompt::ToolSummary;

/// Parameter keys inspected, in order, to name what a call operates on.
const SUBJECT_KEYS: &[&str] = &["file_path", "path", "target_file", "project_path"];

/// Uniform capability implemented by every tool.
///
/// `execute` returning `Err` is a thrown failure: the pipeline reports it as
/// a tool error event and converts it to a failed [`ToolResult`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema (Draft 7) describing accepted parameters.
    fn parameter_schema(&self) -> Value;

    /// Short label for progress events, e.g. the file being edited.
    fn subject(&self, params: &Value) -> Option<String> {
        SUBJECT_KEYS
            .iter()
            .find_map(|key| params.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }

    fn validate(&self, validator: &dyn ParamValidator, params: &Value) -> Option<String> {
        validator.validate(&self.parameter_schema(), params)
    }

    async fn execute(&self, params: Value, ctx: Option<&TaskContext>) -> Result<ToolResult>;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            bail!("tool already registered: {name}");
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.tools
            .values()
            .map(|tool| ToolSummary {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
