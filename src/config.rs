use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;

use crate::console::DEFAULT_BANNER;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConsoleConfigSnapshot {
    pub source: Option<String>,
    pub banner: Vec<String>,
    pub aliases: HashMap<String, String>,
}

impl Default for ConsoleConfigSnapshot {
    fn default() -> Self {
        Self {
            source: None,
            banner: DEFAULT_BANNER.iter().map(|line| line.to_string()).collect(),
            aliases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleConfigWatcher {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KubeNexusConfigFile {
    #[serde(default)]
    banner: Option<Vec<String>>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl ConsoleConfigWatcher {
    pub fn discover() -> Self {
        Self {
            path: discover_config_path(),
            modified: None,
        }
    }

    pub fn load_current(&mut self) -> Result<ConsoleConfigSnapshot> {
        let Some(path) = self.path.clone() else {
            return Ok(ConsoleConfigSnapshot::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read console config {}", path.display()))?;
        // Remember the mtime even when parsing fails.
        self.modified = fs::metadata(&path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        let mut snapshot = parse_config(&raw)
            .with_context(|| format!("failed to parse console config {}", path.display()))?;
        snapshot.source = Some(path.display().to_string());
        Ok(snapshot)
    }

    /// Returns a fresh snapshot only when the file appeared, vanished, or
    /// changed since the last load.
    pub fn reload_if_changed(&mut self) -> Result<Option<ConsoleConfigSnapshot>> {
        let Some(current_path) = self.path.clone() else {
            self.path = discover_config_path();
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(None);
        };

        if !current_path.exists() {
            self.path = discover_config_path();
            self.modified = None;
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(Some(ConsoleConfigSnapshot::default()));
        }

        let modified = fs::metadata(&current_path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        if modified != self.modified {
            return self.load_current().map(Some);
        }

        Ok(None)
    }
}

fn parse_config(raw: &str) -> Result<ConsoleConfigSnapshot> {
    let parsed: KubeNexusConfigFile = if raw.trim().is_empty() {
        KubeNexusConfigFile::default()
    } else {
        serde_yaml::from_str(raw)?
    };

    let defaults = ConsoleConfigSnapshot::default();
    let aliases = parsed
        .aliases
        .into_iter()
        .map(|(alias, expansion)| (alias.trim().to_string(), expansion.trim().to_string()))
        .filter(|(alias, expansion)| {
            !alias.is_empty() && !alias.contains(char::is_whitespace) && !expansion.is_empty()
        })
        .collect::<HashMap<_, _>>();

    Ok(ConsoleConfigSnapshot {
        source: None,
        banner: parsed.banner.unwrap_or(defaults.banner),
        aliases,
    })
}

fn discover_config_path() -> Option<PathBuf> {
    if let Some(path) = env_config_path(std::env::var("KUBENEXUS_CONFIG").ok()) {
        return Some(path);
    }

    let cwd_candidates = [
        PathBuf::from("kubenexus.yaml"),
        PathBuf::from("kubenexus.yml"),
        PathBuf::from(".kubenexus.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/kubenexus/config.yaml"),
            PathBuf::from(&home).join(".config/kubenexus/config.yml"),
            PathBuf::from(&home).join(".kubenexus.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

fn env_config_path(value: Option<String>) -> Option<PathBuf> {
    let value = value.filter(|value| !value.trim().is_empty())?;
    let path = PathBuf::from(value);
    if path.exists() {
        return Some(path);
    }
    debug!(path = %path.display(), "KUBENEXUS_CONFIG names a missing file, ignoring it");
    None
}

#[cfg(test)]
mod tests {
    use super::{ConsoleConfigSnapshot, ConsoleConfigWatcher, env_config_path, parse_config};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let path = std::env::temp_dir().join(format!("kubenexus-{name}-{nanos}.yaml"));
        fs::write(&path, contents).expect("write scratch config");
        path
    }

    #[test]
    fn empty_file_yields_defaults() {
        let snapshot = parse_config("").expect("parse");
        assert_eq!(snapshot, ConsoleConfigSnapshot::default());
        assert_eq!(snapshot.banner[0], "KubeNexus Shell v2.4.0");
    }

    #[test]
    fn banner_and_aliases_are_read() {
        let snapshot = parse_config(
            "banner:\n  - staging shell\naliases:\n  k: kubectl\n  ' kg ': ' kubectl get pods '\n  bad alias: kubectl\n  empty: ''\n",
        )
        .expect("parse");
        assert_eq!(snapshot.banner, ["staging shell"]);
        assert_eq!(snapshot.aliases.get("k").map(String::as_str), Some("kubectl"));
        assert_eq!(
            snapshot.aliases.get("kg").map(String::as_str),
            Some("kubectl get pods")
        );
        assert!(!snapshot.aliases.contains_key("bad alias"));
        assert!(!snapshot.aliases.contains_key("empty"));
    }

    #[test]
    fn empty_banner_list_is_kept() {
        let snapshot = parse_config("banner: []\n").expect("parse");
        assert!(snapshot.banner.is_empty());
    }

    #[test]
    fn broken_yaml_is_an_error() {
        assert!(parse_config("aliases: [unterminated").is_err());
    }

    #[test]
    fn watcher_loads_and_reports_unchanged_file() {
        let path = scratch_file("watch", "aliases:\n  k: kubectl\n");
        let mut watcher = ConsoleConfigWatcher {
            path: Some(path.clone()),
            modified: None,
        };

        let snapshot = watcher.load_current().expect("load");
        assert_eq!(snapshot.source, Some(path.display().to_string()));
        assert_eq!(snapshot.aliases.len(), 1);
        assert!(watcher.reload_if_changed().expect("reload").is_none());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn broken_file_is_reported_once() {
        let path = scratch_file("broken", "aliases: [unterminated");
        let mut watcher = ConsoleConfigWatcher {
            path: Some(path.clone()),
            modified: None,
        };

        assert!(watcher.reload_if_changed().is_err());
        assert!(watcher.reload_if_changed().expect("reload").is_none());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn env_path_must_exist() {
        let path = scratch_file("env", "aliases:\n  k: kubectl\n");
        assert_eq!(env_config_path(Some(path.display().to_string())), Some(path.clone()));
        assert_eq!(env_config_path(Some("  ".to_string())), None);
        assert_eq!(env_config_path(None), None);

        let _ = fs::remove_file(&path);
        assert_eq!(env_config_path(Some(path.display().to_string())), None);
    }

    #[test]
    fn missing_env_file_loads_defaults() {
        let missing = std::env::temp_dir().join("kubenexus-missing-config.yaml");
        let _ = fs::remove_file(&missing);
        let mut watcher = ConsoleConfigWatcher {
            path: env_config_path(Some(missing.display().to_string())),
            modified: None,
        };

        let snapshot = watcher.load_current().expect("load");
        assert_eq!(snapshot, ConsoleConfigSnapshot::default());
    }
}
