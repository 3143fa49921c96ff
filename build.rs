// build.rs

use std::env;

fn main() {
    // Release pipelines stamp the binary through JT808D_VERSION.
    let version = env::var("JT808D_VERSION")
        .or_else(|_| env::var("CARGO_PKG_VERSION"))
        .unwrap_or_else(|_| "dev".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=CARGO_PKG_VERSION={version}");
    println!("cargo:rustc-env=JT808D_BUILD_PROFILE={profile}");
    println!("cargo:rerun-if-env-changed=JT808D_VERSION");
}
