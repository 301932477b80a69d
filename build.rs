//! Build script: embeds the git short hash for `audiobooker --version`.

use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if std::env::var_os("CARGO_FEATURE_CLI").is_some() {
        check_ffmpeg();
    }
}

/// Warn (never fail) when ffmpeg is missing: only the assembly step needs it.
fn check_ffmpeg() {
    let found = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .is_ok_and(|out| out.status.success());
    if !found {
        println!(
            "cargo::warning=ffmpeg not found on PATH; `audiobooker` needs it to bind the final .m4b"
        );
    }
}
