//! Build identification for mw-studio: git hash, timestamp and profile,
//! exposed to the crate as `GIT_HASH`, `BUILD_TIMESTAMP` and `BUILD_PROFILE`.
//!
//! `MW_GIT_HASH` overrides the hash for builds outside a git checkout
//! (source tarballs, distro packaging).

use std::env;
use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string()).filter(|h| !h.is_empty())
}

fn main() {
    // No rerun-if directives: the script runs on every build so the
    // timestamp and hash stay current
    let git_hash = env::var("MW_GIT_HASH")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".to_string());

    // e.g. 2026-03-02T08:15:00+01:00
    let built_at = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    for (key, value) in [
        ("GIT_HASH", git_hash.as_str()),
        ("BUILD_TIMESTAMP", built_at.as_str()),
        ("BUILD_PROFILE", profile.as_str()),
    ] {
        println!("cargo:rustc-env={}={}", key, value);
    }
}
