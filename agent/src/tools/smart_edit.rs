//! Plan-based editing tool: ask the model for a plan, parse it, check it
//! against the project on disk.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::context::TaskContext;
use crate::core::plan::{self, EditStep, FallbackPlan};
use crate::core::types::ToolResult;
use crate::io::model::{self, ModelClient};
use crate::io::project::{ProjectAnalyzer, ProjectContext};
use crate::io::prompt::{EditPromptInput, PromptEngine};
use crate::tools::Tool;

pub const NAME: &str = "smart_edit";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    SingleFile,
    #[default]
    RelatedFiles,
    ProjectWide,
}

impl EditScope {
    /// Unrecognized values fall back to `related_files`.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("single_file") => Self::SingleFile,
            Some("project_wide") => Self::ProjectWide,
            _ => Self::RelatedFiles,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleFile => "single_file",
            Self::RelatedFiles => "related_files",
            Self::ProjectWide => "project_wide",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SmartEditParams {
    project_path: String,
    edit_description: String,
    #[serde(default)]
    target_files: Vec<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Edit accepted; content is produced by later model turns.
    Queued,
    /// Read-only step whose target was found.
    Verified,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: EditStep,
    pub status: StepStatus,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditPlan {
    pub description: String,
    pub scope: EditScope,
    pub project_type: String,
    pub steps: Vec<EditStep>,
    pub used_fallback: bool,
}

pub struct SmartEditTool {
    model: Arc<dyn ModelClient>,
    analyzer: Arc<dyn ProjectAnalyzer>,
    prompts: Arc<PromptEngine>,
    workspace_root: PathBuf,
    fallback: FallbackPlan,
}

impl SmartEditTool {
    pub fn new(
        model: Arc<dyn ModelClient>,
        analyzer: Arc<dyn ProjectAnalyzer>,
        prompts: Arc<PromptEngine>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model,
            analyzer,
            prompts,
            workspace_root: workspace_root.into(),
            fallback: FallbackPlan::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPlan) -> Self {
        self.fallback = fallback;
        self
    }

    async fn generate_plan(
        &self,
        params: &SmartEditParams,
        scope: EditScope,
        project: &ProjectContext,
    ) -> Result<EditPlan> {
        let summary = project.summary();
        let prompt = self.prompts.render_smart_edit(&EditPromptInput {
            project_summary: &summary,
            description: &params.edit_description,
            scope: scope.as_str(),
            target_files: &params.target_files,
        })?;
        let parsed = match model::ask(self.model.as_ref(), &prompt).await {
            Ok(reply) => plan::parse_plan(&reply),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "plan generation failed, using fallback");
                Vec::new()
            }
        };
        let used_fallback = parsed.is_empty();
        let steps = plan::plan_or_fallback(
            parsed,
            self.fallback,
            &params.edit_description,
            &params.target_files,
        );
        Ok(EditPlan {
            description: params.edit_description.clone(),
            scope,
            project_type: project.project_type.display_name().to_string(),
            steps,
            used_fallback,
        })
    }
}

#[async_trait]
impl Tool for SmartEditTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Analyze a project, plan the edits needed for a natural-language change request, and check the plan against the files on disk."
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_path": {
                    "type": "string",
                    "description": "Project directory, relative to the workspace root"
                },
                "edit_description": {
                    "type": "string",
                    "description": "Natural language description of the desired change"
                },
                "target_files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional files to focus on"
                },
                "scope": {
                    "type": "string",
                    "enum": ["single_file", "related_files", "project_wide"],
                    "description": "Edit scope. Default: related_files"
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Only return the plan. Default: false"
                }
            },
            "required": ["project_path", "edit_description"]
        })
    }

    #[instrument(skip_all, fields(tool = NAME))]
    async fn execute(&self, params: Value, _ctx: Option<&TaskContext>) -> Result<ToolResult> {
        let params: SmartEditParams =
            serde_json::from_value(params).context("parse smart_edit parameters")?;
        let scope = EditScope::parse(params.scope.as_deref());
        let root = resolve_under(&self.workspace_root, &params.project_path)?;
        info!(project = %root.display(), ?scope, dry_run = params.dry_run, "smart edit");

        let analyzer = Arc::clone(&self.analyzer);
        let walk_root = root.clone();
        let project = tokio::task::spawn_blocking(move || analyzer.analyze(&walk_root))
            .await
            .context("join project analysis")??;
        let plan = self.generate_plan(&params, scope, &project).await?;

        if params.dry_run {
            return Ok(ToolResult::success(
                format!(
                    "Dry run completed. Edit plan has {} step(s).",
                    plan.steps.len()
                ),
                json!({ "plan": plan }),
            ));
        }

        let outcomes: Vec<StepOutcome> = plan
            .steps
            .iter()
            .map(|step| check_step(&root, step))
            .collect();
        let count = |status: StepStatus| outcomes.iter().filter(|o| o.status == status).count();
        let summary = format!(
            "Smart edit planned {} step(s) for {}: {} queued, {} verified, {} skipped, {} failed.",
            outcomes.len(),
            params.project_path,
            count(StepStatus::Queued),
            count(StepStatus::Verified),
            count(StepStatus::Skipped),
            count(StepStatus::Failed),
        );
        Ok(ToolResult::success(
            summary,
            json!({ "plan": plan, "outcomes": outcomes }),
        ))
    }
}

/// Join `relative` under `root`, rejecting anything that climbs out.
fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let trimmed = relative.trim().trim_start_matches(['/', '\\']);
    let path = Path::new(trimmed);
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("path escapes the workspace: {relative}");
    }
    Ok(root.join(path))
}

fn check_step(root: &Path, step: &EditStep) -> StepOutcome {
    let outcome = |status, note: &str| StepOutcome {
        step: step.clone(),
        status,
        note: note.to_string(),
    };
    let target = if step.target_file.is_empty() {
        Ok(root.to_path_buf())
    } else {
        resolve_under(root, &step.target_file)
    };
    let Ok(target) = target else {
        return outcome(StepStatus::Failed, "target escapes the project");
    };
    match step.action.as_str() {
        "read" | "analyze" if target.exists() => outcome(StepStatus::Verified, "target found"),
        "read" | "analyze" => outcome(StepStatus::Failed, "target not found"),
        "edit" | "modify" | "update" if target.is_file() => {
            outcome(StepStatus::Queued, "edit queued")
        }
        "edit" | "modify" | "update" => outcome(StepStatus::Failed, "file to edit not found"),
        "create" if target.exists() => outcome(StepStatus::Failed, "file already exists"),
        "create" => outcome(StepStatus::Queued, "creation queued"),
        _ => outcome(StepStatus::Skipped, "unsupported action"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::project::FsProjectAnalyzer;
    use crate::test_support::{Reply, ScriptedModel, TestProject};

    fn tool(project: &TestProject, replies: Vec<Reply>) -> SmartEditTool {
        SmartEditTool::new(
            Arc::new(ScriptedModel::new(replies)),
            Arc::new(FsProjectAnalyzer::default()),
            Arc::new(PromptEngine::new().expect("templates")),
            project.workspace(),
        )
    }

    fn demo() -> TestProject {
        TestProject::new(
            "demo",
            &[("Cargo.toml", "[package]"), ("src/main.rs", "fn main() {}")],
        )
        .expect("project")
    }

    /// Records which thread ran the analysis.
    struct ThreadRecordingAnalyzer {
        inner: FsProjectAnalyzer,
        thread: std::sync::Mutex<Option<std::thread::ThreadId>>,
    }

    impl ProjectAnalyzer for ThreadRecordingAnalyzer {
        fn analyze(&self, root: &Path) -> Result<ProjectContext> {
            *self
                .thread
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) =
                Some(std::thread::current().id());
            self.inner.analyze(root)
        }
    }

    #[test]
    fn scope_parse_defaults_to_related() {
        assert_eq!(EditScope::parse(None), EditScope::RelatedFiles);
        assert_eq!(EditScope::parse(Some("bogus")), EditScope::RelatedFiles);
        assert_eq!(EditScope::parse(Some("project_wide")), EditScope::ProjectWide);
    }

    #[test]
    fn resolve_rejects_parent_components() {
        let root = Path::new("/ws");
        assert_eq!(
            resolve_under(root, "/demo/app").expect("resolve"),
            PathBuf::from("/ws/demo/app")
        );
        assert!(resolve_under(root, "../etc").is_err());
        assert!(resolve_under(root, "demo/../../x").is_err());
    }

    #[tokio::test]
    async fn executes_parsed_plan() {
        let project = demo();
        let reply = "STEP 1: read - src/main.rs - look at main\n\
                     STEP 2: edit - src/main.rs - add a route\n\
                     STEP 3: create - src/routes.rs - new module\n\
                     STEP 4: deploy - - ship it";
        let tool = tool(&project, vec![Reply::text(reply)]);
        let result = tool
            .execute(
                json!({ "project_path": "demo", "edit_description": "add a route" }),
                None,
            )
            .await
            .expect("execute");
        let ToolResult::Success { content, display } = result else {
            panic!("expected success");
        };
        assert_eq!(
            content,
            "Smart edit planned 4 step(s) for demo: 2 queued, 1 verified, 1 skipped, 0 failed."
        );
        assert_eq!(display["plan"]["used_fallback"], false);
        assert_eq!(display["plan"]["project_type"], "Rust");
        assert_eq!(display["outcomes"][3]["status"], "skipped");
    }

    /// Verifies the directory walk runs off the async runtime thread.
    #[tokio::test]
    async fn project_analysis_runs_on_blocking_pool() {
        let project = demo();
        let analyzer = Arc::new(ThreadRecordingAnalyzer {
            inner: FsProjectAnalyzer::default(),
            thread: std::sync::Mutex::new(None),
        });
        let tool = SmartEditTool::new(
            Arc::new(ScriptedModel::new([Reply::text("STEP 1: read - src/main.rs - look")])),
            analyzer.clone(),
            Arc::new(PromptEngine::new().expect("templates")),
            project.workspace(),
        );
        tool.execute(
            json!({ "project_path": "demo", "edit_description": "look", "dry_run": true }),
            None,
        )
        .await
        .expect("execute");

        let walked_on = analyzer.thread.lock().expect("lock").expect("analysis ran");
        assert_ne!(walked_on, std::thread::current().id());
    }

    #[tokio::test]
    async fn dry_run_returns_plan_only() {
        let project = demo();
        let tool = tool(&project, vec![Reply::text("STEP 1: edit - src/main.rs - x")]);
        let result = tool
            .execute(
                json!({ "project_path": "demo", "edit_description": "x", "dry_run": true }),
                None,
            )
            .await
            .expect("execute");
        assert!(result.observation().starts_with("Dry run completed."));
        let ToolResult::Success { display, .. } = result else {
            panic!("expected success");
        };
        assert!(display.get("outcomes").is_none());
        assert_eq!(display["plan"]["steps"][0]["target_file"], "src/main.rs");
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_target_files() {
        let project = demo();
        let tool = tool(&project, vec![Reply::Fail("overloaded".to_string())]);
        let result = tool
            .execute(
                json!({
                    "project_path": "demo",
                    "edit_description": "rename main",
                    "target_files": ["src/main.rs", "src/missing.rs"]
                }),
                None,
            )
            .await
            .expect("execute");
        assert_eq!(
            result.observation(),
            "Smart edit planned 2 step(s) for demo: 1 queued, 0 verified, 0 skipped, 1 failed."
        );
    }

    #[tokio::test]
    async fn unparseable_reply_uses_generic_step() {
        let project = demo();
        let tool = tool(&project, vec![Reply::text("I think you should refactor.")]);
        let result = tool
            .execute(json!({ "project_path": "demo", "edit_description": "tidy" }), None)
            .await
            .expect("execute");
        let ToolResult::Success { display, .. } = result else {
            panic!("expected success");
        };
        assert_eq!(display["plan"]["used_fallback"], true);
        assert_eq!(display["plan"]["steps"][0]["action"], "analyze");
        assert_eq!(display["outcomes"][0]["status"], "verified");
    }

    #[tokio::test]
    async fn no_steps_fallback_reports_empty_plan() {
        let project = demo();
        let tool = tool(&project, vec![Reply::text("nothing")]).with_fallback(FallbackPlan::NoSteps);
        let result = tool
            .execute(json!({ "project_path": "demo", "edit_description": "tidy" }), None)
            .await
            .expect("execute");
        assert!(result.observation().starts_with("Smart edit planned 0 step(s)"));
    }

    #[tokio::test]
    async fn missing_project_is_an_error() {
        let project = demo();
        let tool = tool(&project, Vec::new());
        let err = tool
            .execute(json!({ "project_path": "nope", "edit_description": "x" }), None)
            .await
            .expect_err("missing project");
        assert!(err.to_string().contains("project directory not found"));
    }
}
