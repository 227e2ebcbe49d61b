use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use walkdir::WalkDir;

use crate::event_filter::should_skip_dir;

/// A single entry mapping an absolute path to the challenge that owns it.
#[derive(Debug, Clone)]
struct PathIndexEntry {
    challenge_name: String,
    challenge_root: PathBuf,
}

/// An owning challenge, as returned by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub challenge_name: String,
    pub challenge_root: PathBuf,
}

/// Maps filesystem paths to the challenge that owns them, with longest-prefix fallback for paths
/// not yet walked (spec.md 4.3). Multiple concurrent readers, single writer, via `parking_lot`.
pub struct ChallengeIndex {
    /// Direct path -> owner entries, built by recursive walk and extended opportunistically.
    entries: RwLock<HashMap<PathBuf, PathIndexEntry>>,
    /// Every registered challenge's root, used for the linear longest-prefix fallback.
    roots: RwLock<HashMap<String, PathBuf>>,
}
impl ChallengeIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            roots: RwLock::new(HashMap::new()),
        }
    }

    /// Walks `challenge_root` and indexes every descendant path, skipping dot-prefixed
    /// directories. Returns the non-skipped directories so the caller can subscribe them to the
    /// native watcher. Idempotent: re-registering the same name is a no-op.
    pub fn register(&self, challenge_name: &str, challenge_root: &Path) -> Vec<PathBuf> {
        if self.roots.read().contains_key(challenge_name) {
            return Vec::new();
        }

        let mut watched_dirs = Vec::new();
        let mut new_entries = HashMap::new();
        let mut walker = WalkDir::new(challenge_root).into_iter();
        loop {
            let entry = match walker.next() {
                Some(Ok(entry)) => entry,
                Some(Err(_)) => continue,
                None => break,
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                let basename = entry.file_name().to_string_lossy().to_string();
                if path != challenge_root && should_skip_dir(&basename) {
                    walker.skip_current_dir();
                    continue;
                }
                watched_dirs.push(path.to_path_buf());
            }
            new_entries.insert(
                path.to_path_buf(),
                PathIndexEntry {
                    challenge_name: challenge_name.to_string(),
                    challenge_root: challenge_root.to_path_buf(),
                },
            );
        }

        self.entries.write().extend(new_entries);
        self.roots
            .write()
            .insert(challenge_name.to_string(), challenge_root.to_path_buf());
        watched_dirs
    }

    /// Removes every index entry and root belonging to `challenge_name`.
    pub fn unregister(&self, challenge_name: &str) {
        self.roots.write().remove(challenge_name);
        self.entries
            .write()
            .retain(|_, entry| entry.challenge_name != challenge_name);
    }

    /// Resolves `abs_path` to its owning challenge, per spec.md 4.3's three-step lookup:
    /// direct hit, longest-prefix ancestor walk (with opportunistic insert), then a linear
    /// fallback over every registered root.
    pub fn lookup(&self, abs_path: &Path) -> Option<Owner> {
        if let Some(entry) = self.entries.read().get(abs_path) {
            return Some(Owner {
                challenge_name: entry.challenge_name.clone(),
                challenge_root: entry.challenge_root.clone(),
            });
        }

        let mut best: Option<PathIndexEntry> = None;
        {
            let entries = self.entries.read();
            for ancestor in abs_path.ancestors().skip(1) {
                if let Some(entry) = entries.get(ancestor) {
                    let better = match &best {
                        Some(current) => {
                            entry.challenge_root.as_os_str().len()
                                > current.challenge_root.as_os_str().len()
                        }
                        None => true,
                    };
                    if better {
                        best = Some(entry.clone());
                    }
                }
            }
        }
        if let Some(entry) = best {
            self.entries.write().insert(
                abs_path.to_path_buf(),
                PathIndexEntry {
                    challenge_name: entry.challenge_name.clone(),
                    challenge_root: entry.challenge_root.clone(),
                },
            );
            return Some(Owner {
                challenge_name: entry.challenge_name,
                challenge_root: entry.challenge_root,
            });
        }

        let roots = self.roots.read();
        roots
            .iter()
            .filter(|(_, root)| abs_path.starts_with(root))
            .max_by_key(|(_, root)| root.as_os_str().len())
            .map(|(name, root)| Owner {
                challenge_name: name.clone(),
                challenge_root: root.clone(),
            })
    }

    /// Every currently registered (challenge_name, challenge_root) pair.
    pub fn registered(&self) -> Vec<(String, PathBuf)> {
        self.roots
            .read()
            .iter()
            .map(|(name, root)| (name.clone(), root.clone()))
            .collect()
    }
}
impl Default for ChallengeIndex {
    fn default() -> Self {
        Self::new()
    }
}
