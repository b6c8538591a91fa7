//! # Platform-Specific Implementations
//!
//! Live backends for the host interfaces the rest of the crate is written
//! against:
//!
//! - **macOS**: [`macos::DyldCacheHost`] walks the dyld shared cache through
//!   libdyld, [`macos::XpcRuntime`] reads libxpc values and
//!   [`macos::LoadedImageSearch`] is the slow symbol search.
//! - **Elsewhere**: no shared cache exists; the resolver runs on the generic
//!   search alone and there is no message runtime to capture from.
//!
//! A few small helpers (descriptor paths, the local endpoint) work on every
//! Unix and live here.

#[cfg(target_os = "macos")]
pub mod macos;

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use tracing::warn;

use crate::config::ScopeConfig;
#[cfg(not(target_os = "macos"))]
use crate::symbols::{NoSearch, SymbolSearch};
use crate::symbols::SymbolResolver;
use crate::types::Endpoint;

/// Canonical filesystem path of an open descriptor.
///
/// ## Errors
///
/// Fails when the descriptor is not backed by a path (sockets, pipes) or the
/// query itself fails.
#[cfg(target_os = "macos")]
pub fn descriptor_path(fd: BorrowedFd<'_>) -> io::Result<String>
{
    let mut buf = vec![0u8; libc::PATH_MAX as usize];
    // SAFETY: F_GETPATH writes at most MAXPATHLEN bytes including the NUL.
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETPATH, buf.as_mut_ptr()) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf.truncate(end);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Canonical filesystem path of an open descriptor.
///
/// ## Errors
///
/// Fails when the descriptor is not backed by a path (sockets, pipes) or the
/// query itself fails.
#[cfg(not(target_os = "macos"))]
pub fn descriptor_path(fd: BorrowedFd<'_>) -> io::Result<String>
{
    let target = std::fs::read_link(format!("/proc/self/fd/{}", fd.as_raw_fd()))?;
    if !target.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("descriptor refers to {}", target.display()),
        ));
    }
    Ok(target.to_string_lossy().into_owned())
}

/// Name and pid of the current process.
pub fn current_endpoint() -> Endpoint
{
    let pid = std::process::id() as i32;
    Endpoint::new(process_name(pid), pid)
}

#[cfg(target_os = "macos")]
fn process_name(pid: i32) -> String
{
    match libproc::proc_pid::name(pid) {
        Ok(name) => name,
        Err(err) => {
            warn!(pid, error = %err, "proc_name failed");
            executable_name()
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn process_name(_pid: i32) -> String
{
    executable_name()
}

fn executable_name() -> String
{
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// A resolver wired to this platform's backends.
///
/// On macOS a missing cache API is not fatal: the resolver is built without a
/// cache host and every lookup takes the slow path.
#[cfg(target_os = "macos")]
pub fn default_resolver(config: &ScopeConfig) -> SymbolResolver
{
    let host: Option<Box<dyn crate::symbols::SharedCacheHost>> = match macos::DyldCacheHost::new() {
        Ok(host) => Some(Box::new(host)),
        Err(err) => {
            warn!(error = %err, "shared cache API unavailable");
            None
        }
    };
    SymbolResolver::new(host, Box::new(macos::LoadedImageSearch::current()), config.naming)
}

/// A resolver wired to this platform's backends.
///
/// Without a shared cache the resolver only searches on-disk images mapped
/// into the current process.
#[cfg(not(target_os = "macos"))]
pub fn default_resolver(config: &ScopeConfig) -> SymbolResolver
{
    SymbolResolver::new(None, mapped_image_search(), config.naming)
}

#[cfg(target_os = "linux")]
fn mapped_image_search() -> Box<dyn SymbolSearch>
{
    match crate::symbols::ObjectSymbolSearch::from_proc_maps() {
        Ok(search) => Box::new(search),
        Err(err) => {
            warn!(error = %err, "could not list mapped images");
            Box::new(NoSearch)
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn mapped_image_search() -> Box<dyn SymbolSearch>
{
    Box::new(NoSearch)
}
