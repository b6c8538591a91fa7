//! Build script for xpcscope-core
//!
//! Checks the toolchain and, on macOS, the host version the live dyld/libxpc
//! backends were written against.
//!
//! ## Requirements
//!
//! - **Rust**: Rust 1.77.0 or newer (C string literals in the FFI layer)
//! - **macOS**: 11.0+ (Big Sur). From Big Sur on, system libraries only exist
//!   inside the dyld shared cache, which is what the cache-scanning resolver
//!   targets. Older hosts still build; lookups simply take the fallback path.
//! - **Other platforms**: the codec, resolver and sinks build everywhere, the
//!   `platform::macos` backends are compiled out.

fn main()
{
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 77, 0);

        if rustc_version < min_rust_version {
            panic!(
                "xpcscope-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        println!("cargo:warning=could not verify Rust version");
    }

    #[cfg(target_os = "macos")]
    check_macos_requirements();
}

#[cfg(target_os = "macos")]
fn check_macos_requirements()
{
    let min_macos_version = (11, 0, 0);

    match get_macos_version() {
        Some(version) if version < min_macos_version => {
            println!(
                "cargo:warning=macOS {}.{}.{} predates the split dyld shared cache layout; \
                 symbol lookups will use the fallback search",
                version.0, version.1, version.2
            );
        }
        Some(_) => {}
        // Cross-compiling or sandboxed build
        None => println!("cargo:warning=could not detect macOS version"),
    }
}

#[cfg(target_os = "macos")]
fn get_macos_version() -> Option<(u32, u32, u32)>
{
    use std::process::Command;

    let output = Command::new("sw_vers").arg("-productVersion").output().ok()?;

    let version_str = String::from_utf8(output.stdout).ok()?;
    let mut parts = version_str.trim().split('.');

    let major = parts.next()?.parse::<u32>().ok()?;
    let minor = parts.next()?.parse::<u32>().ok()?;
    let patch = parts.next().and_then(|s| s.parse::<u32>().ok()).unwrap_or(0);

    Some((major, minor, patch))
}
