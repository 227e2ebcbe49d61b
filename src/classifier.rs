use std::path::Path;

/// The verdict the classifier reaches about how a filesystem change should propagate to the
/// remote platform. See `UpdateCoalescer` for how this feeds into an update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    None,
    Attachment,
    Metadata,
    FullRedeploy,
}

/// Classifies a path that has already been made relative to its owning challenge root.
///
/// This is total: every relative path produces exactly one variant. Callers that cannot produce
/// a relative path at all (e.g. `Path::strip_prefix` failed) should classify as
/// `UpdateType::FullRedeploy` themselves rather than calling this with a non-relative path.
pub fn classify(rel_path: &Path) -> UpdateType {
    // Normalise to forward slashes so the prefix checks below work the same on every platform.
    let normalized = rel_path.to_string_lossy().replace('\\', "/");
    let basename = rel_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if normalized.starts_with("solver/") || normalized.starts_with("writeup/") {
        return UpdateType::None;
    }
    if basename == "challenge.yml" || basename == "challenge.yaml" {
        return UpdateType::Metadata;
    }
    if normalized.starts_with("dist/") {
        return UpdateType::Attachment;
    }
    if normalized.starts_with("src/") {
        return UpdateType::FullRedeploy;
    }
    if basename == "Dockerfile" || basename == "docker-compose.yml" || basename == "Makefile" {
        return UpdateType::FullRedeploy;
    }
    UpdateType::None
}

/// Classifies an absolute path given the absolute root of the challenge that owns it. Falls back
/// to `UpdateType::FullRedeploy` if `path` cannot be made relative to `root` (see spec on
/// classifier failures: fail safe to a full redeploy rather than silently dropping the change).
pub fn classify_absolute(path: &Path, root: &Path) -> UpdateType {
    match path.strip_prefix(root) {
        Ok(rel) => classify(rel),
        Err(_) => UpdateType::FullRedeploy,
    }
}
