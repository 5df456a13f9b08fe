//! Stamps the binary with build metadata logged at startup.
//!
//! Each value can be pinned by the release pipeline through the environment
//! variable of the same name; otherwise it is derived locally.

use std::process::Command;

fn main() {
    let now = chrono::Utc::now();

    let timestamp = pinned("BUILD_TIMESTAMP")
        .filter(|ts| ts.parse::<i64>().is_ok())
        .unwrap_or_else(|| now.timestamp().to_string());
    let datetime =
        pinned("BUILD_DATETIME").unwrap_or_else(|| now.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    let git_hash = pinned("BUILD_GIT_HASH")
        .or_else(revision)
        .unwrap_or_else(|| "unknown".to_string());

    for (key, value) in [
        ("BUILD_TIMESTAMP", timestamp),
        ("BUILD_DATETIME", datetime),
        ("BUILD_GIT_HASH", git_hash),
    ] {
        println!("cargo:rustc-env={key}={value}");
        println!("cargo:rerun-if-env-changed={key}");
    }
    println!("cargo:rerun-if-changed=build.rs");
}

fn pinned(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Short commit hash with a `-dirty` suffix for uncommitted changes.
///
/// Uses the git CLI rather than libgit2 to keep OpenSSL out of the build.
fn revision() -> Option<String> {
    let head = git(&["rev-parse", "--short", "HEAD"])?;
    let hash = String::from_utf8(head.stdout).ok()?;
    let dirty = git(&["diff", "--quiet"]).is_none();
    Some(format!("{}{}", hash.trim(), if dirty { "-dirty" } else { "" }))
}

/// Run git, returning its output only when it exits successfully
fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|out| out.status.success())
}
