use std::env;
use std::process::Command;

fn main() {
    embuild::espidf::sysenv::output();

    // Running firmware version, e.g. "v0.3.0" or "v0.3.0-2-gabcdef". This is what the
    // version endpoint is compared against, so it must match the published string.
    let git_version = Command::new("git")
        .args(["describe", "--tags", "--always"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .unwrap_or_else(|| env::var("CARGO_PKG_VERSION").unwrap());
    println!("cargo:rustc-env=GIT_VERSION={}", git_version.trim());
    // Rebuild when HEAD moves or tags change
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/refs/tags");

    // Build-time defaults for the first boot, before anything is stored in NVS
    for var in [
        "OTALOOP_WIFI_SSID",
        "OTALOOP_WIFI_PASS",
        "OTALOOP_FIRMWARE_URL",
        "OTALOOP_VERSION_URL",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }
}
