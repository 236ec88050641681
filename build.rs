use std::env;
use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");

    // Add build metadata for version information
    add_build_metadata()?;

    Ok(())
}

fn add_build_metadata() -> Result<(), Box<dyn std::error::Error>> {
    // Build timestamp
    let build_timestamp = chrono::Utc::now()
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string();
    println!("cargo:rustc-env=VERGEN_BUILD_TIMESTAMP={build_timestamp}");

    // Git SHA (if available)
    let git_sha = get_git_sha().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=VERGEN_GIT_SHA={git_sha}");

    // Rust version
    let rustc_version = get_rustc_version().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=VERGEN_RUSTC_SEMVER={rustc_version}");

    // Target triple
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=VERGEN_CARGO_TARGET_TRIPLE={target}");

    Ok(())
}

fn get_git_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}

fn get_rustc_version() -> Option<String> {
    let output = Command::new("rustc").args(["--version"]).output().ok()?;

    if output.status.success() {
        // "rustc 1.77.0 (aedd173a2 2024-03-17)" -> "1.77.0"
        let version_str = String::from_utf8_lossy(&output.stdout);
        version_str.split_whitespace().nth(1).map(|v| v.to_string())
    } else {
        None
    }
}
