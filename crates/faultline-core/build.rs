//! Build script for faultline-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (`extern "C-unwind"` needs Rust 1.71.0+)
//! - Target support (full support on Linux x86_64/aarch64)
//!
//! ## Requirements
//!
//! - **Rust**: 1.71.0 or newer
//! - **Linux**: glibc or musl with `dl_iterate_phdr` and `pthread_getattr_np`
//! - **Other Unix**: compiles, traces degrade to unresolved output

fn main()
{
    // The fault handler unwinds out of a signal frame through `extern "C-unwind"`
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 71, 0);

        if rustc_version < min_rust_version {
            panic!("faultline-core requires Rust {min_rust_version} or newer, found {rustc_version}");
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if target_os != "linux" || !matches!(target_arch.as_str(), "x86_64" | "aarch64") {
        println!(
            "cargo:warning=faultline-core: {target_os}/{target_arch} is not fully supported, \
             stack traces will be empty and faults will not be translated"
        );
    }
}
