//! Symbol naming policy and name matchers.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use globset::{Glob, GlobBuilder, GlobMatcher};

use crate::error::{ScopeError, ScopeResult};

/// How C-level names map onto linkage names in symbol tables.
///
/// Mach-O prefixes every C symbol with `_`, so `foo` is stored as `_foo`.
/// Some callers already pass linkage names; `Verbatim` leaves them alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy
{
    /// Prepend a single `_` (Mach-O C convention).
    #[default]
    LeadingUnderscore,
    /// Use names exactly as given.
    Verbatim,
}

impl NamingPolicy
{
    /// Linkage name for a C-level name or pattern.
    pub fn decorate<'a>(&self, name: &'a str) -> Cow<'a, str>
    {
        match self {
            NamingPolicy::LeadingUnderscore => Cow::Owned(format!("_{name}")),
            NamingPolicy::Verbatim => Cow::Borrowed(name),
        }
    }
}

impl FromStr for NamingPolicy
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "underscore" | "leading-underscore" | "macho" => Ok(NamingPolicy::LeadingUnderscore),
            "verbatim" | "none" | "raw" => Ok(NamingPolicy::Verbatim),
            _ => Err(format!("Unknown symbol naming policy: {s}. Use 'underscore' or 'verbatim'")),
        }
    }
}

impl fmt::Display for NamingPolicy
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            NamingPolicy::LeadingUnderscore => write!(f, "underscore"),
            NamingPolicy::Verbatim => write!(f, "verbatim"),
        }
    }
}

/// Compiled matcher over linkage names.
#[derive(Debug, Clone)]
pub enum SymbolMatcher
{
    /// Byte-for-byte comparison.
    Exact(Vec<u8>),
    /// Shell glob: `*`, `?` and `[...]` classes.
    Glob
    {
        pattern: String,
        matcher: GlobMatcher,
    },
}

impl SymbolMatcher
{
    pub fn exact(name: &str) -> Self
    {
        SymbolMatcher::Exact(name.as_bytes().to_vec())
    }

    /// Compile a shell glob.
    ///
    /// `/` gets no special treatment, matching `fnmatch` without
    /// `FNM_PATHNAME`: symbol names are not paths.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the pattern does not compile.
    pub fn glob(pattern: &str) -> ScopeResult<Self>
    {
        let glob: Glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|err| ScopeError::InvalidArgument(format!("invalid glob {pattern:?}: {err}")))?;
        Ok(SymbolMatcher::Glob {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Whether this matcher stops at the first hit.
    pub fn is_exact(&self) -> bool
    {
        matches!(self, SymbolMatcher::Exact(_))
    }

    pub fn matches(&self, name: &[u8]) -> bool
    {
        match self {
            SymbolMatcher::Exact(expected) => expected.as_slice() == name,
            SymbolMatcher::Glob { matcher, .. } => match std::str::from_utf8(name) {
                Ok(text) => matcher.is_match(text),
                Err(_) => matcher.is_match(&*String::from_utf8_lossy(name)),
            },
        }
    }
}

impl fmt::Display for SymbolMatcher
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SymbolMatcher::Exact(name) => write!(f, "{}", String::from_utf8_lossy(name)),
            SymbolMatcher::Glob { pattern, .. } => write!(f, "{pattern}"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_decorate()
    {
        assert_eq!(NamingPolicy::LeadingUnderscore.decorate("foo"), "_foo");
        assert_eq!(NamingPolicy::Verbatim.decorate("_foo"), "_foo");
        assert_eq!("verbatim".parse::<NamingPolicy>().unwrap(), NamingPolicy::Verbatim);
        assert!("bogus".parse::<NamingPolicy>().is_err());
    }

    #[test]
    fn test_glob_classes()
    {
        let matcher = SymbolMatcher::glob("_bar_[ab]?*").unwrap();
        assert!(matcher.matches(b"_bar_a1"));
        assert!(matcher.matches(b"_bar_bxyz"));
        assert!(!matcher.matches(b"_bar_c1"));
        assert!(!matcher.matches(b"_bar_a"));
    }

    #[test]
    fn test_glob_star_crosses_slashes()
    {
        let matcher = SymbolMatcher::glob("*SimpleMessageSend*").unwrap();
        assert!(matcher.matches(b"_NSXPCDistantObjectSimpleMessageSend2"));
        assert!(matcher.matches(b"a/b/SimpleMessageSend/c"));
    }

    #[test]
    fn test_exact_is_bytewise()
    {
        let matcher = SymbolMatcher::exact("_foo");
        assert!(matcher.matches(b"_foo"));
        assert!(!matcher.matches(b"_foo "));
        assert!(!matcher.matches(b"_Foo"));
        assert!(matcher.is_exact());
    }

    #[test]
    fn test_invalid_glob()
    {
        assert!(SymbolMatcher::glob("_bar_[").is_err());
    }
}
