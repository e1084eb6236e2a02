use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Timeout applied when neither the registry defaults nor the scenario set one, in seconds
const DEFAULT_TIMEOUT_S: u64 = 60;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read registry file '{path}'")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Registry file is not valid TOML: {0}")]
    Malformed(#[from] toml::de::Error),
    #[error("Scenario id '{0}' is registered more than once")]
    DuplicateId(String),
    #[error("Scenario id '{0}' is empty or contains characters outside [A-Za-z0-9._-]")]
    InvalidId(String),
    #[error("Scenario '{0}' has an empty command")]
    EmptyCommand(String),
    #[error("Scenario '{0}' has a zero timeout")]
    ZeroTimeout(String),
    #[error("Scenario '{0}' allows no exit codes, so it could never pass")]
    EmptyAllowedExitCodes(String),
    #[error("Registry contains no scenarios that are expected to run")]
    NoExpectedScenarios,
}

/// A single registered scenario, fully resolved against the registry defaults.
///
/// Immutable once the registry has been loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSpec {
    /// Unique name of the scenario, safe to use in file names
    pub id: String,
    /// The program to execute
    pub command: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Environment variables overlaid on the inherited environment
    pub env: HashMap<String, String>,
    /// Where to run the scenario
    ///
    /// When not set the scenario runs in a scratch directory of its own. Relative paths have
    /// already been resolved against the registry file's directory.
    pub working_dir: Option<PathBuf>,
    /// Hard limit on how long the scenario may run
    pub timeout: Duration,
    /// Exit codes that count as a pass
    pub allowed_exit_codes: Vec<i32>,
    /// Whether the scenario takes part in the run
    ///
    /// Disabled scenarios stay registered so their ids remain reserved, but they are not
    /// invoked and do not contribute to the verdict.
    pub expected: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryDefaults {
    timeout: Option<u64>,
    allowed_exit_codes: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioEntry {
    id: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    working_dir: Option<PathBuf>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    allowed_exit_codes: Option<Vec<i32>>,
    #[serde(default = "default_expected")]
    expected: bool,
}

fn default_expected() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    defaults: RegistryDefaults,
    #[serde(default, rename = "scenario")]
    scenarios: Vec<ScenarioEntry>,
}

/// The validated set of scenarios for a run.
///
/// Loaded once at startup. Every entry is checked before any scenario runs, so a malformed
/// registry aborts the run before any evidence can be produced.
#[derive(Debug, Clone)]
pub struct Registry {
    scenarios: Vec<ScenarioSpec>,
}

impl Registry {
    /// Load and validate a registry file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base_dir)
    }

    /// Parse registry content, resolving relative working directories against `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(content)?;

        let mut seen = HashSet::new();
        let mut scenarios = Vec::with_capacity(file.scenarios.len());
        for entry in file.scenarios {
            if !is_valid_id(&entry.id) {
                return Err(RegistryError::InvalidId(entry.id));
            }
            if !seen.insert(entry.id.clone()) {
                return Err(RegistryError::DuplicateId(entry.id));
            }
            if entry.command.is_empty() {
                return Err(RegistryError::EmptyCommand(entry.id));
            }

            let timeout_s = entry
                .timeout
                .or(file.defaults.timeout)
                .unwrap_or(DEFAULT_TIMEOUT_S);
            if timeout_s == 0 {
                return Err(RegistryError::ZeroTimeout(entry.id));
            }

            let allowed_exit_codes = entry
                .allowed_exit_codes
                .or_else(|| file.defaults.allowed_exit_codes.clone())
                .unwrap_or_else(|| vec![0]);
            if allowed_exit_codes.is_empty() {
                return Err(RegistryError::EmptyAllowedExitCodes(entry.id));
            }

            let working_dir = entry.working_dir.map(|dir| {
                if dir.is_absolute() {
                    dir
                } else {
                    base_dir.join(dir)
                }
            });

            scenarios.push(ScenarioSpec {
                id: entry.id,
                command: entry.command,
                args: entry.args,
                env: entry.env,
                working_dir,
                timeout: Duration::from_secs(timeout_s),
                allowed_exit_codes,
                expected: entry.expected,
            });
        }

        if !scenarios.iter().any(|spec| spec.expected) {
            return Err(RegistryError::NoExpectedScenarios);
        }

        Ok(Self { scenarios })
    }

    /// Every registered scenario, in registry order.
    pub fn scenarios(&self) -> &[ScenarioSpec] {
        &self.scenarios
    }

    /// The scenarios that take part in the run.
    pub fn expected(&self) -> impl Iterator<Item = &ScenarioSpec> {
        self.scenarios.iter().filter(|spec| spec.expected)
    }

    /// The scenarios that are registered but not expected to run.
    pub fn disabled(&self) -> impl Iterator<Item = &ScenarioSpec> {
        self.scenarios.iter().filter(|spec| !spec.expected)
    }

    /// The ids that must each produce exactly one result for the run to be complete.
    pub fn expected_ids(&self) -> Vec<String> {
        self.expected().map(|spec| spec.id.clone()).collect()
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
