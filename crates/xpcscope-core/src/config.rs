//! # Configuration
//!
//! Runtime settings, read from the environment and overridable by the CLI.
//!
//! ## Environment Variables
//!
//! - `XPCSCOPE_SYMBOL_NAMING`: `underscore` (default) or `verbatim`
//! - `XPCSCOPE_BACKTRACE`: `1`/`true`/`on` to attach call stacks to events
//! - `XPCSCOPE_TYPE_PREFIX`: export prefix of value type descriptors
//!   (default `_xpc_type_`)

use std::env;

use tracing::warn;

use crate::error::{ScopeError, ScopeResult};
use crate::message::DEFAULT_TYPE_PREFIX;
use crate::symbols::NamingPolicy;

/// Module holding the XPC dispatch and send entry points.
pub const MESSAGING_MODULE: &str = "libxpc.dylib";

/// Module holding the NSXPC entry points.
pub const PROXY_MODULE: &str = "Foundation";

/// Settings shared by resolution, hook planning and capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConfig
{
    /// How C-level names map to linkage names.
    pub naming: NamingPolicy,
    /// Attach call stacks to captured events.
    pub capture_backtraces: bool,
    /// Export prefix of value type descriptors.
    pub type_prefix: String,
    /// Install-name leaf of the messaging runtime.
    pub messaging_module: String,
    /// Install-name leaf of the proxy layer.
    pub proxy_module: String,
}

impl Default for ScopeConfig
{
    fn default() -> Self
    {
        Self {
            naming: NamingPolicy::default(),
            capture_backtraces: false,
            type_prefix: DEFAULT_TYPE_PREFIX.to_string(),
            messaging_module: MESSAGING_MODULE.to_string(),
            proxy_module: PROXY_MODULE.to_string(),
        }
    }
}

impl ScopeConfig
{
    /// Defaults overlaid with the `XPCSCOPE_*` environment.
    ///
    /// Unparseable values are reported and ignored.
    pub fn from_env() -> Self
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`ScopeConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self
    {
        let mut config = Self::default();

        if let Some(value) = lookup("XPCSCOPE_SYMBOL_NAMING") {
            match value.parse() {
                Ok(naming) => config.naming = naming,
                Err(err) => warn!(error = %err, "ignoring XPCSCOPE_SYMBOL_NAMING"),
            }
        }
        if let Some(value) = lookup("XPCSCOPE_BACKTRACE") {
            match parse_flag(&value) {
                Ok(flag) => config.capture_backtraces = flag,
                Err(err) => warn!(error = %err, "ignoring XPCSCOPE_BACKTRACE"),
            }
        }
        if let Some(value) = lookup("XPCSCOPE_TYPE_PREFIX") {
            if value.is_empty() {
                warn!("ignoring empty XPCSCOPE_TYPE_PREFIX");
            } else {
                config.type_prefix = value;
            }
        }

        config
    }
}

/// Parse a boolean switch (`1/0`, `true/false`, `yes/no`, `on/off`).
///
/// ## Errors
///
/// `InvalidArgument` for anything else.
pub fn parse_flag(value: &str) -> ScopeResult<bool>
{
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ScopeError::InvalidArgument(format!("expected a boolean, got {other:?}"))),
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> ScopeConfig
    {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ScopeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults()
    {
        let config = config_from(&[]);
        assert_eq!(config, ScopeConfig::default());
        assert_eq!(config.naming, NamingPolicy::LeadingUnderscore);
        assert_eq!(config.type_prefix, "_xpc_type_");
        assert_eq!(config.messaging_module, "libxpc.dylib");
        assert!(!config.capture_backtraces);
    }

    #[test]
    fn test_overrides()
    {
        let config = config_from(&[
            ("XPCSCOPE_SYMBOL_NAMING", "verbatim"),
            ("XPCSCOPE_BACKTRACE", "on"),
            ("XPCSCOPE_TYPE_PREFIX", "_my_type_"),
        ]);
        assert_eq!(config.naming, NamingPolicy::Verbatim);
        assert!(config.capture_backtraces);
        assert_eq!(config.type_prefix, "_my_type_");
    }

    #[test]
    fn test_bad_values_ignored()
    {
        let config = config_from(&[("XPCSCOPE_SYMBOL_NAMING", "mangled"), ("XPCSCOPE_BACKTRACE", "maybe")]);
        assert_eq!(config.naming, NamingPolicy::LeadingUnderscore);
        assert!(!config.capture_backtraces);
    }

    #[test]
    fn test_parse_flag()
    {
        assert!(parse_flag(" YES ").unwrap());
        assert!(!parse_flag("off").unwrap());
        assert!(parse_flag("2").is_err());
    }
}
