use std::path::PathBuf;

use crate::classifier::{classify, classify_absolute, UpdateType};

#[test]
fn solver_and_writeup_are_ignored() {
    assert_eq!(classify(&PathBuf::from("solver/exploit.py")), UpdateType::None);
    assert_eq!(classify(&PathBuf::from("writeup/README.md")), UpdateType::None);
}

#[test]
fn challenge_descriptor_is_metadata() {
    assert_eq!(classify(&PathBuf::from("challenge.yml")), UpdateType::Metadata);
    assert_eq!(classify(&PathBuf::from("challenge.yaml")), UpdateType::Metadata);
}

#[test]
fn dist_prefix_is_attachment() {
    assert_eq!(classify(&PathBuf::from("dist/x.zip")), UpdateType::Attachment);
}

#[test]
fn src_prefix_is_full_redeploy() {
    assert_eq!(classify(&PathBuf::from("src/main.c")), UpdateType::FullRedeploy);
}

#[test]
fn build_files_are_full_redeploy() {
    assert_eq!(classify(&PathBuf::from("Dockerfile")), UpdateType::FullRedeploy);
    assert_eq!(classify(&PathBuf::from("docker-compose.yml")), UpdateType::FullRedeploy);
    assert_eq!(classify(&PathBuf::from("Makefile")), UpdateType::FullRedeploy);
}

#[test]
fn unmatched_paths_are_none() {
    assert_eq!(classify(&PathBuf::from("README.md")), UpdateType::None);
}

#[test]
fn classify_is_total_for_any_relative_path() {
    for path in ["", "a/b/c", "solver/writeup/challenge.yml", ".hidden"] {
        let _ = classify(&PathBuf::from(path));
    }
}

#[test]
fn absolute_path_outside_root_falls_back_to_full_redeploy() {
    let root = PathBuf::from("/events/e1/alpha");
    let outside = PathBuf::from("/somewhere/else/file.txt");
    assert_eq!(classify_absolute(&outside, &root), UpdateType::FullRedeploy);
}

#[test]
fn absolute_path_inside_root_classifies_normally() {
    let root = PathBuf::from("/events/e1/alpha");
    let inside = root.join("src/main.c");
    assert_eq!(classify_absolute(&inside, &root), UpdateType::FullRedeploy);
}
