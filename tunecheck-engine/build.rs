//! Build script for tunecheck-engine
//!
//! Stamps the binary with the git revision and build time. The values are
//! recorded in every index manifest so a snapshot can be traced to the build
//! that produced it.

use std::process::Command;

fn git_revision() -> String {
    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    println!("cargo:rustc-env=TUNECHECK_GIT_HASH={}", git_revision());
    println!("cargo:rustc-env=TUNECHECK_BUILT_AT={}", built_at);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../.git/HEAD");
}
