//! Project analysis used to build tool prompts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

const MAX_DEPTH: usize = 4;
const MAX_FILES: usize = 200;
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "build", "dist", "__pycache__", "venv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProjectType {
    JavaMaven,
    JavaGradle,
    SpringBoot,
    NodeJs,
    React,
    Vue,
    Angular,
    NextJs,
    Python,
    Django,
    Flask,
    FastApi,
    DotNet,
    Go,
    Rust,
    Php,
    StaticHtml,
    Unknown,
}

impl ProjectType {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::JavaMaven => "Java Maven",
            Self::JavaGradle => "Java Gradle",
            Self::SpringBoot => "Spring Boot",
            Self::NodeJs => "Node.js",
            Self::React => "React",
            Self::Vue => "Vue.js",
            Self::Angular => "Angular",
            Self::NextJs => "Next.js",
            Self::Python => "Python",
            Self::Django => "Django",
            Self::Flask => "Flask",
            Self::FastApi => "FastAPI",
            Self::DotNet => "ASP.NET",
            Self::Go => "Go",
            Self::Rust => "Rust",
            Self::Php => "PHP",
            Self::StaticHtml => "Static HTML",
            Self::Unknown => "Unknown",
        }
    }

    pub fn language(self) -> &'static str {
        match self {
            Self::JavaMaven | Self::JavaGradle | Self::SpringBoot => "Java",
            Self::NodeJs | Self::React | Self::Vue | Self::Angular | Self::NextJs => "JavaScript",
            Self::Python | Self::Django | Self::Flask | Self::FastApi => "Python",
            Self::DotNet => "C#",
            Self::Go => "Go",
            Self::Rust => "Rust",
            Self::Php => "PHP",
            Self::StaticHtml => "HTML",
            Self::Unknown => "Unknown",
        }
    }

    pub fn package_manager(self) -> &'static str {
        match self {
            Self::JavaMaven | Self::SpringBoot => "Maven",
            Self::JavaGradle => "Gradle",
            Self::NodeJs | Self::React | Self::Vue | Self::Angular | Self::NextJs => "npm/yarn",
            Self::Python | Self::Django | Self::Flask | Self::FastApi => "pip",
            Self::DotNet => "NuGet",
            Self::Go => "go mod",
            Self::Rust => "Cargo",
            Self::Php => "Composer",
            Self::StaticHtml | Self::Unknown => "none",
        }
    }
}

/// Detect the project type from key files directly under `root`.
pub fn detect_project_type(root: &Path) -> ProjectType {
    let has = |name: &str| root.join(name).is_file();
    let read = |name: &str| fs::read_to_string(root.join(name)).unwrap_or_default();

    if has("Cargo.toml") {
        return ProjectType::Rust;
    }
    if has("pom.xml") {
        return if read("pom.xml").contains("spring-boot") {
            ProjectType::SpringBoot
        } else {
            ProjectType::JavaMaven
        };
    }
    if has("build.gradle") || has("build.gradle.kts") {
        return ProjectType::JavaGradle;
    }
    if has("package.json") {
        let manifest = read("package.json");
        return if manifest.contains("\"next\"") {
            ProjectType::NextJs
        } else if manifest.contains("\"@angular/core\"") {
            ProjectType::Angular
        } else if manifest.contains("\"vue\"") {
            ProjectType::Vue
        } else if manifest.contains("\"react\"") {
            ProjectType::React
        } else {
            ProjectType::NodeJs
        };
    }
    if has("manage.py") {
        return ProjectType::Django;
    }
    if has("requirements.txt") || has("pyproject.toml") {
        let requirements = read("requirements.txt").to_lowercase();
        return if requirements.contains("fastapi") {
            ProjectType::FastApi
        } else if requirements.contains("flask") {
            ProjectType::Flask
        } else {
            ProjectType::Python
        };
    }
    if has("go.mod") {
        return ProjectType::Go;
    }
    if has("composer.json") {
        return ProjectType::Php;
    }
    if has_extension(root, "csproj") {
        return ProjectType::DotNet;
    }
    if has("index.html") {
        return ProjectType::StaticHtml;
    }
    ProjectType::Unknown
}

fn has_extension(root: &Path, ext: &str) -> bool {
    fs::read_dir(root).is_ok_and(|entries| {
        entries
            .flatten()
            .any(|entry| entry.path().extension().is_some_and(|e| e == ext))
    })
}

/// Snapshot of a project handed to prompt builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub project_type: ProjectType,
    /// Relative paths, sorted, bounded in count.
    pub files: Vec<String>,
    pub truncated: bool,
}

impl ProjectContext {
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Project: {}\nType: {} (language: {}, package manager: {})\nFiles ({}{}):\n",
            self.root.display(),
            self.project_type.display_name(),
            self.project_type.language(),
            self.project_type.package_manager(),
            self.files.len(),
            if self.truncated { ", truncated" } else { "" },
        );
        for file in &self.files {
            out.push_str("- ");
            out.push_str(file);
            out.push('\n');
        }
        out
    }

    pub fn contains_file(&self, relative: &str) -> bool {
        self.files.iter().any(|f| f == relative)
    }
}

pub trait ProjectAnalyzer: Send + Sync {
    fn analyze(&self, root: &Path) -> Result<ProjectContext>;
}

/// Walks the project directory on disk.
#[derive(Debug, Clone, Copy)]
pub struct FsProjectAnalyzer {
    pub max_depth: usize,
    pub max_files: usize,
}

impl Default for FsProjectAnalyzer {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            max_files: MAX_FILES,
        }
    }
}

impl ProjectAnalyzer for FsProjectAnalyzer {
    #[instrument(skip_all, fields(root = %root.display()))]
    fn analyze(&self, root: &Path) -> Result<ProjectContext> {
        if !root.is_dir() {
            bail!("project directory not found: {}", root.display());
        }
        let mut files = Vec::new();
        let mut truncated = false;
        let walker = WalkDir::new(root)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry));
        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            if files.len() == self.max_files {
                truncated = true;
                break;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        files.sort();
        let project_type = detect_project_type(root);
        debug!(files = files.len(), truncated, ?project_type, "analyzed project");
        Ok(ProjectContext {
            root: root.to_path_buf(),
            project_type,
            files,
            truncated,
        })
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}
