use std::path::PathBuf;

use crate::config::WatcherConfig;
use crate::event_filter::{accept, should_skip_dir, FsOp, RawEvent};

fn config_with_patterns(ignore: &[&str], watch: &[&str]) -> WatcherConfig {
    use crate::config::CompiledPattern;
    WatcherConfig {
        cwd: PathBuf::from("/tmp/nonexistent"),
        events: vec!["e1".to_string()],
        ignore_patterns: ignore
            .iter()
            .map(|p| CompiledPattern::compile(p).unwrap())
            .collect(),
        watch_patterns: watch
            .iter()
            .map(|p| CompiledPattern::compile(p).unwrap())
            .collect(),
        pid_file: PathBuf::from("/tmp/watcher.pid"),
        log_file: PathBuf::from("/tmp/watcher.log"),
        db_path: PathBuf::from("/tmp/watcher.db"),
        socket_path: PathBuf::from("/tmp/watcher.sock"),
        script_timeout: std::time::Duration::from_secs(30),
        git_pull_enabled: false,
        git_pull_interval: std::time::Duration::from_secs(300),
    }
}

fn event(path: &str) -> RawEvent {
    RawEvent {
        path: PathBuf::from(path),
        op: FsOp::Write,
    }
}

#[test]
fn rejects_vim_swap_files() {
    let config = config_with_patterns(&[], &[]);
    assert!(!accept(&event("/events/e1/alpha/.main.c.swp"), &config));
    assert!(!accept(&event("/events/e1/alpha/.main.c.swo"), &config));
    assert!(!accept(&event("/events/e1/alpha/.main.c~"), &config));
}

#[test]
fn accepts_tilde_backup_without_leading_dot() {
    let config = config_with_patterns(&[], &[]);
    assert!(accept(&event("/events/e1/alpha/main.c~"), &config));
}

#[test]
fn rejects_vscode_paths() {
    let config = config_with_patterns(&[], &[]);
    assert!(!accept(
        &event("/events/e1/alpha/.vscode/settings.json"),
        &config
    ));
    assert!(!accept(&event("/events/e1/alpha/.vscode"), &config));
}

#[test]
fn rejects_ignore_pattern_matches() {
    let config = config_with_patterns(&["*.log"], &[]);
    assert!(!accept(&event("/events/e1/alpha/run.log"), &config));
    assert!(accept(&event("/events/e1/alpha/main.c"), &config));
}

#[test]
fn watch_patterns_are_an_allow_list() {
    let config = config_with_patterns(&[], &["*.c"]);
    assert!(accept(&event("/events/e1/alpha/main.c"), &config));
    assert!(!accept(&event("/events/e1/alpha/main.py"), &config));
}

#[test]
fn accepts_ordinary_files_with_no_patterns_configured() {
    let config = config_with_patterns(&[], &[]);
    assert!(accept(&event("/events/e1/alpha/src/main.c"), &config));
}

#[test]
fn should_skip_dir_rejects_dotdirs_only() {
    assert!(should_skip_dir(".git"));
    assert!(should_skip_dir(".vscode"));
    assert!(!should_skip_dir("."));
    assert!(!should_skip_dir(".."));
    assert!(!should_skip_dir("src"));
}
