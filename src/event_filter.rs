use std::path::Path;

use crate::config::WatcherConfig;

/// The operations a raw filesystem event can carry, pre-classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Write,
    Create,
    Remove,
    Rename,
}

/// A raw event observed by the native watcher, before it reaches the challenge index or
/// coalescer.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub path: std::path::PathBuf,
    pub op: FsOp,
}

/// Decides whether a raw event should be acted on at all, per spec.md 4.2's decision table. Step
/// 1 (the op-mask check) is satisfied structurally: `FsOp` has no variant outside
/// `{Write, Create, Remove, Rename}`, so every `RawEvent` already passes it.
pub fn accept(event: &RawEvent, config: &WatcherConfig) -> bool {
    let basename = match event.path.file_name() {
        Some(n) => n.to_string_lossy().to_string(),
        None => return false,
    };

    if is_editor_scratch(&basename) {
        return false;
    }
    if is_vscode(&basename, &event.path) {
        return false;
    }
    let path_str = event.path.to_string_lossy();
    if config
        .ignore_patterns
        .iter()
        .any(|p| p.matches(&basename) || p.matches(&path_str))
    {
        return false;
    }
    if !config.watch_patterns.is_empty()
        && !config.watch_patterns.iter().any(|p| p.matches(&basename))
    {
        return false;
    }

    true
}

/// Editor scratch files per spec.md 4.2 step 2: a dotfile basename ending in `.swp`, `.tmp`,
/// `~`, or containing `.sw` (vim swap variants like `.swo`, `.swn`). The leading dot is required —
/// a non-hidden `main.c~` is not a scratch file under this rule.
fn is_editor_scratch(basename: &str) -> bool {
    if !basename.starts_with('.') {
        return false;
    }
    basename.ends_with(".swp") || basename.ends_with(".tmp") || basename.ends_with('~') || basename.contains(".sw")
}

fn is_vscode(basename: &str, path: &Path) -> bool {
    basename.starts_with(".vscode") || path.components().any(|c| c.as_os_str() == ".vscode")
}

/// Whether a directory should be excluded from recursive watching, per spec.md 4.2's companion
/// rule: any directory whose basename begins with `.`, other than `.`/`..`.
pub fn should_skip_dir(basename: &str) -> bool {
    basename != "." && basename != ".." && basename.starts_with('.')
}
