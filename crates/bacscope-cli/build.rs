//! Stamps `bacscope --version` with the source revision it was built from.
//!
//! `BACSCOPE_BUILD_COMMIT` is an abbreviated revision, suffixed `-dirty` when
//! the work tree has local edits. `BACSCOPE_BUILD_DATE` is the commit date.
//! Packagers building outside a checkout can pin both through
//! `BACSCOPE_COMMIT` and `BACSCOPE_DATE`; CI runners expose `GITHUB_SHA`.

use std::env;
use std::process::Command;

const UNKNOWN: &str = "unknown";
const ABBREV_LEN: usize = 7;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for var in ["BACSCOPE_COMMIT", "BACSCOPE_DATE", "GITHUB_SHA"] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    let revision = pinned("BACSCOPE_COMMIT")
        .or_else(|| pinned("GITHUB_SHA"))
        .map(|sha| abbreviate(&sha))
        .or_else(|| git(&["rev-parse", "--short=7", "HEAD"]).map(|sha| sha + dirty_suffix()))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let date = pinned("BACSCOPE_DATE")
        .or_else(|| git(&["log", "-1", "--format=%cs"]))
        .unwrap_or_else(|| UNKNOWN.to_string());

    println!("cargo:rustc-env=BACSCOPE_BUILD_COMMIT={revision}");
    println!("cargo:rustc-env=BACSCOPE_BUILD_DATE={date}");
}

fn pinned(var: &str) -> Option<String> {
    env::var(var).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn dirty_suffix() -> &'static str {
    match git(&["status", "--porcelain", "--untracked-files=no"]) {
        Some(_) => "-dirty",
        None => "",
    }
}

fn abbreviate(sha: &str) -> String {
    sha.chars().take(ABBREV_LEN).collect()
}
