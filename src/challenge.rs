use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ChallengeConfigError;

/// The two accepted spellings of a challenge descriptor's filename.
pub const CHALLENGE_YAML_NAMES: [&str; 2] = ["challenge.yml", "challenge.yaml"];

/// Returns the descriptor path under `dir` if one exists.
pub fn find_challenge_yaml(dir: &Path) -> Option<PathBuf> {
    CHALLENGE_YAML_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// The capability set spec.md 4.4/4.9 calls for: a script descriptor exposes only its command and
/// interval, regardless of how it was loaded.
pub trait ScriptDescriptor {
    fn command(&self) -> &str;
    fn interval(&self) -> Option<Duration>;
}

/// The capability set a challenge descriptor exposes to the core engine, independent of the
/// loader that produced it (spec.md §9 "polymorphism over configuration").
pub trait ChallengeDescriptor {
    fn name(&self) -> &str;
    fn cwd(&self) -> &Path;
    fn scripts(&self) -> &HashMap<String, ScriptConfig>;
}

/// A single script entry from a challenge descriptor.
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    pub command: String,
    pub interval: Option<Duration>,
}
impl ScriptDescriptor for ScriptConfig {
    fn command(&self) -> &str {
        &self.command
    }
    fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

/// The parsed form of a `challenge.yml`/`challenge.yaml` descriptor.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    pub name: String,
    pub cwd: PathBuf,
    pub scripts: HashMap<String, ScriptConfig>,
}
impl ChallengeDescriptor for ChallengeConfig {
    fn name(&self) -> &str {
        &self.name
    }
    fn cwd(&self) -> &Path {
        &self.cwd
    }
    fn scripts(&self) -> &HashMap<String, ScriptConfig> {
        &self.scripts
    }
}

#[derive(Deserialize)]
struct RawChallengeYaml {
    name: Option<String>,
    #[serde(default)]
    scripts: HashMap<String, RawScript>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScript {
    Command(String),
    Full {
        command: String,
        interval: Option<String>,
    },
}

/// Loads and parses a challenge descriptor file, resolving `name` to the challenge root's
/// basename when the descriptor doesn't set one explicitly.
pub trait ChallengeYamlLoader: Send + Sync {
    fn load(&self, path: &Path, root: &Path) -> Result<ChallengeConfig, ChallengeConfigError>;
}

/// The real loader, backed by `serde_yaml`.
pub struct YamlChallengeLoader;
impl ChallengeYamlLoader for YamlChallengeLoader {
    fn load(&self, path: &Path, root: &Path) -> Result<ChallengeConfig, ChallengeConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| ChallengeConfigError::ReadFailed {
                path: path.to_path_buf(),
                err,
            })?;
        let raw: RawChallengeYaml =
            serde_yaml::from_str(&contents).map_err(|err| ChallengeConfigError::ParseFailed {
                path: path.to_path_buf(),
                err,
            })?;

        let default_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut scripts = HashMap::new();
        for (script_name, raw_script) in raw.scripts {
            let (command, interval_str) = match raw_script {
                RawScript::Command(command) => (command, None),
                RawScript::Full { command, interval } => (command, interval),
            };
            let interval = match interval_str {
                Some(value) => {
                    let parsed =
                        humantime::parse_duration(&value).map_err(|err| {
                            ChallengeConfigError::InvalidInterval {
                                path: path.to_path_buf(),
                                script: script_name.clone(),
                                value: value.clone(),
                                err,
                            }
                        })?;
                    Some(parsed)
                }
                None => None,
            };
            scripts.insert(script_name, ScriptConfig { command, interval });
        }

        Ok(ChallengeConfig {
            name: raw.name.unwrap_or(default_name),
            cwd: root.to_path_buf(),
            scripts,
        })
    }
}
