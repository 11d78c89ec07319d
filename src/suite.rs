use crate::config::{DumpConfig, DumpOptions};
use crate::types::{TestCase, TestSuite};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    #[default]
    Pure,
    External,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalCfg {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout: Option<u64>, // seconds
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RawConfig {
    pub backend: Option<BackendChoice>,
    pub external: Option<ExternalCfg>,
    #[serde(default)]
    pub options: DumpOptions,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    Fast,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct RawCase {
    pub name: Option<String>,
    pub input: OneOrMany,
    #[serde(default)]
    pub names: Vec<String>,
    pub expect: String,
    #[serde(default)]
    pub options: DumpOptions,
    pub requires: Option<Requirement>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct RawSuite {
    pub config: Option<RawConfig>,
    pub tests: IndexMap<String, Vec<RawCase>>,
}

#[derive(Debug, Clone)]
pub struct SuiteWithConfig {
    pub suite: TestSuite,
    pub backend: BackendChoice,
    pub external: Option<ExternalCfg>,
}

fn suite_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for p in paths {
        if p.is_dir() {
            for entry in WalkDir::new(p).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() {
                    let path = entry.path();
                    if let Some(ext) = path.extension() {
                        if ext == "yaml" || ext == "yml" {
                            files.push(path.to_path_buf());
                        }
                    }
                }
            }
        } else {
            files.push(p.clone());
        }
    }
    Ok(files)
}

pub fn load_suites(paths: &[PathBuf]) -> Result<Vec<SuiteWithConfig>> {
    let mut out = Vec::new();
    for f in suite_files(paths)? {
        let content = fs::read_to_string(&f)
            .with_context(|| format!("Failed to read test file {}", f.display()))?;
        let swc = parse_suite(&content, &f)
            .with_context(|| format!("Invalid test file {}", f.display()))?;
        debug!(file = %f.display(), cases = swc.suite.cases.len(), "loaded suite");
        out.push(swc);
    }
    Ok(out)
}

/// Builds a suite from YAML text; `file` names the suite and anchors relative paths.
pub fn parse_suite(content: &str, file: &Path) -> Result<SuiteWithConfig> {
    let raw: RawSuite = serde_yaml::from_str(content)?;
    let cfg = raw.config.unwrap_or_default();
    let backend = cfg.backend.unwrap_or_default();
    if backend == BackendChoice::External && cfg.external.is_none() {
        bail!("Config.Backend is 'external' but Config.External is missing");
    }
    let external = cfg.external.map(|ext| ExternalCfg {
        cmd: resolve_relative(ext.cmd.trim(), file),
        args: ext
            .args
            .iter()
            .map(|a| resolve_relative(a, file))
            .collect(),
        timeout: ext.timeout,
    });

    let mut cases = Vec::new();
    for (group, raw_cases) in &raw.tests {
        let group = group.trim();
        for rc in raw_cases {
            let inputs = match &rc.input {
                OneOrMany::One(s) => vec![s.trim().to_string()],
                OneOrMany::Many(v) => v.iter().map(|s| s.trim().to_string()).collect(),
            };
            cases.push(TestCase {
                group: group.to_string(),
                label: rc
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                inputs,
                names: rc.names.clone(),
                // whitespace is significant here
                expect: rc.expect.clone(),
                config: DumpConfig::with(&[&cfg.options, &rc.options]),
                requires_fast: rc.requires == Some(Requirement::Fast),
            });
        }
    }

    let suite = TestSuite {
        name: file
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "suite".to_string()),
        cases,
    };
    Ok(SuiteWithConfig {
        suite,
        backend,
        external,
    })
}

/// Paths that exist next to the YAML file are taken relative to it;
/// anything else (e.g. `perl`, looked up on PATH) is kept as written.
fn resolve_relative(path: &str, yaml_file: &Path) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        return path.to_string();
    }
    match yaml_file.parent() {
        Some(dir) if dir.join(p).exists() => dir.join(p).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}
