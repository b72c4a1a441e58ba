//! Prompt templates rendered with minijinja.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const CONTINUE_TEMPLATE: &str = include_str!("prompts/continue.md");
const SMART_EDIT_TEMPLATE: &str = include_str!("prompts/smart_edit.md");

/// Tool entry listed in the task prompt.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// Inputs for the edit-planning prompt.
#[derive(Debug, Clone, Serialize)]
pub struct EditPromptInput<'a> {
    pub project_summary: &'a str,
    pub description: &'a str,
    pub scope: &'a str,
    pub target_files: &'a [String],
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("task", TASK_TEMPLATE)
            .context("load task template")?;
        env.add_template("continue", CONTINUE_TEMPLATE)
            .context("load continue template")?;
        env.add_template("smart_edit", SMART_EDIT_TEMPLATE)
            .context("load smart_edit template")?;
        Ok(Self { env })
    }

    /// First user message of a run.
    pub fn render_task(&self, request: &str, tools: &[ToolSummary]) -> Result<String> {
        let template = self.env.get_template("task")?;
        let rendered = template.render(context! {
            request => request.trim(),
            tools => tools,
        })?;
        Ok(rendered)
    }

    /// Synthesized user message that advances the model to the next step.
    pub fn render_continue(&self, turn: u32, max_turns: u32) -> Result<String> {
        let template = self.env.get_template("continue")?;
        Ok(template.render(context! { turn, max_turns })?)
    }

    pub fn render_smart_edit(&self, input: &EditPromptInput<'_>) -> Result<String> {
        let template = self.env.get_template("smart_edit")?;
        Ok(template.render(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_prompt_lists_tools() {
        let engine = PromptEngine::new().expect("templates");
        let tools = vec![ToolSummary {
            name: "smart_edit".to_string(),
            description: "plan and apply edits".to_string(),
        }];
        let rendered = engine
            .render_task("  build a blog  ", &tools)
            .expect("render");
        assert!(rendered.contains("## Request\n\nbuild a blog\n"));
        assert!(rendered.contains("- `smart_edit`: plan and apply edits"));
        assert!(rendered.contains("<tool_call>"));
    }

    #[test]
    fn task_prompt_without_tools_omits_section() {
        let engine = PromptEngine::new().expect("templates");
        let rendered = engine.render_task("hello", &[]).expect("render");
        assert!(!rendered.contains("## Tools"));
        assert!(rendered.contains("TASK_COMPLETE"));
    }

    #[test]
    fn continue_prompt_mentions_turns() {
        let engine = PromptEngine::new().expect("templates");
        let rendered = engine.render_continue(2, 20).expect("render");
        assert!(rendered.starts_with("Continue with the next step (turn 2 of at most 20)."));
    }

    #[test]
    fn smart_edit_prompt_includes_targets() {
        let engine = PromptEngine::new().expect("templates");
        let targets = vec!["src/lib.rs".to_string()];
        let rendered = engine
            .render_smart_edit(&EditPromptInput {
                project_summary: "Type: Rust",
                description: "add a health check",
                scope: "single_file",
                target_files: &targets,
            })
            .expect("render");
        assert!(rendered.contains("add a health check"));
        assert!(rendered.contains("Scope: single_file"));
        assert!(rendered.contains("- src/lib.rs"));
        assert!(rendered.contains("STEP n: action - file - description"));
    }
}
