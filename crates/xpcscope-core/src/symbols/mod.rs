//! # Symbol Resolution
//!
//! Locates functions inside the dyld shared cache by reading each image's
//! local symbol table directly, with a generic whole-process search behind it.
//!
//! ## Lookup strategy
//!
//! 1. **Shared cache**: walk the installed caches, pick the first image whose
//!    install name ends in the requested module, stream its `nlist_64`
//!    records and compare names. The values found are cache-relative, so the
//!    module's slide in this process is added afterwards.
//! 2. **Fallback**: if the cache path is unavailable, the module is not a
//!    cache resident, the slide cannot be determined or nothing matched, the
//!    same linkage name is searched with [`SymbolSearch`]. This path is much
//!    slower and is logged as degraded, never treated as a failure on its own.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xpcscope_core::symbols::{NamingPolicy, NoSearch, SymbolResolver};
//!
//! let resolver = SymbolResolver::new(None, Box::new(NoSearch), NamingPolicy::LeadingUnderscore);
//! match resolver.find_exact("libxpc.dylib", "_xpc_connection_call_event_handler") {
//!     Ok(symbol) => println!("{symbol}"),
//!     Err(err) => eprintln!("{err}"),
//! }
//! ```

pub mod cache;
pub mod nlist;
pub mod pattern;
pub mod search;

use std::ops::ControlFlow;

use tracing::{debug, trace, warn};

pub use self::cache::{install_name_matches, module_slide, CacheImage, CacheView, LoadedImage, SharedCacheHost};
pub use self::nlist::{LocalSymbols, StringTable};
pub use self::pattern::{NamingPolicy, SymbolMatcher};
pub use self::search::{ChainedSearch, NoSearch, ObjectSymbolSearch, SymbolSearch};
use crate::error::{ScopeError, ScopeResult};
use crate::types::{ResolvedSymbol, SymbolSource};

/// Outcome of scanning the shared cache for one module.
enum CacheScan
{
    /// No installed cache holds an image for the module.
    ModuleMissing,
    /// The module's image was scanned; `(name, value)` pairs in table order.
    Scanned(Vec<(String, u64)>),
}

/// Two-stage symbol resolver: shared cache first, generic search second.
///
/// The resolver holds no mutable state; it can be shared across threads and
/// queried concurrently.
pub struct SymbolResolver
{
    host: Option<Box<dyn SharedCacheHost>>,
    fallback: Box<dyn SymbolSearch>,
    naming: NamingPolicy,
}

impl SymbolResolver
{
    /// Create a resolver.
    ///
    /// `host` is `None` on platforms without a shared cache; every lookup then
    /// goes straight to `fallback`.
    pub fn new(host: Option<Box<dyn SharedCacheHost>>, fallback: Box<dyn SymbolSearch>, naming: NamingPolicy) -> Self
    {
        Self { host, fallback, naming }
    }

    pub fn naming(&self) -> NamingPolicy
    {
        self.naming
    }

    /// Resolve one symbol exactly.
    ///
    /// `symbol` is a C-level name; the naming policy turns it into the linkage
    /// name both lookup paths compare against.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` when neither the cache nor the fallback knows the
    /// symbol.
    pub fn find_exact(&self, module: &str, symbol: &str) -> ScopeResult<ResolvedSymbol>
    {
        let linkage = self.naming.decorate(symbol);
        let matcher = SymbolMatcher::exact(&linkage);

        match self.lookup_in_cache(module, &matcher) {
            Ok(mut found) if !found.is_empty() => return Ok(found.swap_remove(0)),
            Ok(_) => warn!(module, symbol = %linkage, "symbol not in shared cache, using slow search"),
            Err(err) => warn!(module, symbol = %linkage, error = %err, "shared cache lookup failed, using slow search"),
        }

        self.fallback
            .find_exact(&linkage)
            .ok_or_else(|| ScopeError::SymbolNotFound {
                module: module.to_string(),
                symbol: symbol.to_string(),
            })
    }

    /// Resolve every symbol matching a shell glob.
    ///
    /// An empty result is not an error.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the pattern does not compile.
    pub fn find_glob(&self, module: &str, pattern: &str) -> ScopeResult<Vec<ResolvedSymbol>>
    {
        let linkage = self.naming.decorate(pattern);
        let matcher = SymbolMatcher::glob(&linkage)?;

        match self.lookup_in_cache(module, &matcher) {
            Ok(found) if !found.is_empty() => return Ok(found),
            Ok(_) => warn!(module, pattern = %linkage, "no shared cache matches, using slow search"),
            Err(err) => warn!(module, pattern = %linkage, error = %err, "shared cache glob failed, using slow search"),
        }

        Ok(self.fallback.find_matching(&matcher))
    }

    /// Cache path: scan, then apply the module's slide.
    ///
    /// `Ok(vec![])` means the module was scanned and nothing matched.
    fn lookup_in_cache(&self, module: &str, matcher: &SymbolMatcher) -> ScopeResult<Vec<ResolvedSymbol>>
    {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| ScopeError::Setup("no shared cache host on this platform".to_string()))?;

        let hits = match scan_cache(host, module, matcher)? {
            CacheScan::ModuleMissing => {
                return Err(ScopeError::InvalidArgument(format!("{module} is not in any installed shared cache")));
            }
            CacheScan::Scanned(hits) => hits,
        };
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let slide = module_slide(host, module)?;
        debug!(module, slide, matches = hits.len(), "resolved from shared cache");

        Ok(hits
            .into_iter()
            .map(|(name, base_value)| ResolvedSymbol {
                name,
                base_value,
                slide,
                source: SymbolSource::SharedCache,
            })
            .collect())
    }
}

/// Walk the installed caches and scan the first image named `module`.
///
/// Caches are visited in host order; once a cache yields the module's image
/// no further caches are consulted, so an older cache generation holding the
/// same module is ignored.
fn scan_cache(host: &dyn SharedCacheHost, module: &str, matcher: &SymbolMatcher) -> ScopeResult<CacheScan>
{
    let mut hits: Vec<(String, u64)> = Vec::new();
    let mut found_image = false;

    host.for_each_cache(&mut |cache| {
        cache.for_each_image(&mut |image| {
            let Some(install_name) = image.install_name() else {
                return ControlFlow::Continue(());
            };
            if !install_name_matches(&install_name, module) {
                return ControlFlow::Continue(());
            }

            found_image = true;
            trace!(install_name = %install_name, "scanning local symbols");
            let had_symbols = image.read_local_symbols(&mut |symbols| {
                for (entry, name) in symbols.iter() {
                    if entry.is_stab() || !matcher.matches(name) {
                        continue;
                    }
                    hits.push((String::from_utf8_lossy(name).into_owned(), entry.value));
                    if matcher.is_exact() {
                        break;
                    }
                }
            });
            if !had_symbols {
                debug!(install_name = %install_name, "image has no local symbol table");
            }
            ControlFlow::Break(())
        });

        if found_image {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;

    Ok(if found_image {
        CacheScan::Scanned(hits)
    } else {
        CacheScan::ModuleMissing
    })
}
