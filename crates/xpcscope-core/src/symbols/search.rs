//! Generic whole-process symbol search.
//!
//! This is the slow path the resolver degrades to when the shared cache cannot
//! answer: every loaded image that exists on disk is parsed with `object` and
//! its symbol tables are scanned in full. Images that only live inside the
//! shared cache have no file to parse and are skipped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use object::{Object, ObjectSegment, ObjectSymbol};
use once_cell::sync::OnceCell;
use tracing::debug;

use super::cache::LoadedImage;
use super::pattern::SymbolMatcher;
use crate::types::{ResolvedSymbol, SymbolSource};

/// Slow, cache-independent symbol lookup over the whole process.
pub trait SymbolSearch: Send + Sync
{
    /// First symbol whose linkage name is exactly `name`.
    fn find_exact(&self, name: &str) -> Option<ResolvedSymbol>
    {
        self.find_matching(&SymbolMatcher::exact(name)).into_iter().next()
    }

    /// Every symbol accepted by `matcher`, in image order.
    fn find_matching(&self, matcher: &SymbolMatcher) -> Vec<ResolvedSymbol>;
}

/// A search that never finds anything.
///
/// Used where no fallback is available, so the resolver's error paths stay
/// the same.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSearch;

impl SymbolSearch for NoSearch
{
    fn find_matching(&self, _matcher: &SymbolMatcher) -> Vec<ResolvedSymbol>
    {
        Vec::new()
    }
}

/// How an image's load bias is known.
#[derive(Debug, Clone, Copy)]
enum Bias
{
    /// Reported by the loader.
    Slide(i64),
    /// Only the address the image was mapped at; the bias is that minus the
    /// lowest segment address of the parsed file.
    MappedAt(u64),
}

/// Several searches consulted in order.
///
/// Exact lookups stop at the first search that finds the name; matcher
/// lookups concatenate every search's results.
#[derive(Default)]
pub struct ChainedSearch
{
    searches: Vec<Box<dyn SymbolSearch>>,
}

impl ChainedSearch
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, search: impl SymbolSearch + 'static) -> Self
    {
        self.searches.push(Box::new(search));
        self
    }

    pub fn len(&self) -> usize
    {
        self.searches.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.searches.is_empty()
    }
}

impl SymbolSearch for ChainedSearch
{
    fn find_matching(&self, matcher: &SymbolMatcher) -> Vec<ResolvedSymbol>
    {
        let mut found = Vec::new();
        for search in &self.searches {
            found.extend(search.find_matching(matcher));
            if matcher.is_exact() && !found.is_empty() {
                break;
            }
        }
        found
    }
}

struct SearchImage
{
    path: PathBuf,
    bias: Bias,
    data: OnceCell<Option<Arc<[u8]>>>,
}

impl SearchImage
{
    fn bytes(&self) -> Option<&Arc<[u8]>>
    {
        self.data
            .get_or_init(|| match fs::read(&self.path) {
                Ok(bytes) => Some(Arc::from(bytes)),
                Err(err) => {
                    debug!(path = %self.path.display(), error = %err, "image not readable, skipping");
                    None
                }
            })
            .as_ref()
    }

    fn slide(&self, file: &object::File<'_>) -> i64
    {
        match self.bias {
            Bias::Slide(slide) => slide,
            Bias::MappedAt(start) => {
                let lowest = file.segments().map(|segment| segment.address()).min().unwrap_or(0);
                start.wrapping_sub(lowest) as i64
            }
        }
    }
}

/// [`SymbolSearch`] over object files parsed with the `object` crate.
///
/// Files are read lazily on first search and kept for later ones.
#[derive(Default)]
pub struct ObjectSymbolSearch
{
    images: Vec<SearchImage>,
}

impl ObjectSymbolSearch
{
    #[must_use]
    pub fn new() -> Self
    {
        Self { images: Vec::new() }
    }

    /// Search the on-disk counterparts of the given loaded images.
    pub fn from_loaded_images(images: &[LoadedImage]) -> Self
    {
        let mut search = Self::new();
        for image in images {
            search.add_file(&image.path, image.slide);
        }
        search
    }

    /// Add an image to be read from `path` when first searched.
    pub fn add_file(&mut self, path: impl AsRef<Path>, slide: i64)
    {
        self.images.push(SearchImage {
            path: path.as_ref().to_path_buf(),
            bias: Bias::Slide(slide),
            data: OnceCell::new(),
        });
    }

    /// Add an image mapped at `start` whose slide is not known up front.
    pub fn add_mapped_file(&mut self, path: impl AsRef<Path>, start: u64)
    {
        self.images.push(SearchImage {
            path: path.as_ref().to_path_buf(),
            bias: Bias::MappedAt(start),
            data: OnceCell::new(),
        });
    }

    /// Search every file mapped into the current process, per
    /// `/proc/self/maps`.
    ///
    /// ## Errors
    ///
    /// `Io` if the maps file cannot be read.
    #[cfg(target_os = "linux")]
    pub fn from_proc_maps() -> crate::error::ScopeResult<Self>
    {
        let maps = fs::read_to_string("/proc/self/maps")?;
        Ok(Self::from_maps_text(&maps))
    }

    /// Build from the text of a `/proc/<pid>/maps` file.
    ///
    /// Each file is added once, at the start of its mapping with file offset 0.
    pub fn from_maps_text(maps: &str) -> Self
    {
        let mut search = Self::new();
        let mut seen = HashSet::new();

        for line in maps.lines() {
            let mut fields = line.split_whitespace();
            let (Some(range), Some(_perms), Some(offset), Some(_dev), Some(_inode)) =
                (fields.next(), fields.next(), fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let Some(path) = fields.next().filter(|path| path.starts_with('/')) else {
                continue;
            };
            if u64::from_str_radix(offset, 16) != Ok(0) || !seen.insert(path.to_string()) {
                continue;
            }
            let Some(start) = range.split('-').next().and_then(|start| u64::from_str_radix(start, 16).ok()) else {
                continue;
            };
            search.add_mapped_file(path, start);
        }

        search
    }

    /// Add an image whose bytes are already in memory.
    pub fn add_bytes(&mut self, path: impl AsRef<Path>, bytes: impl Into<Arc<[u8]>>, slide: i64)
    {
        self.images.push(SearchImage {
            path: path.as_ref().to_path_buf(),
            bias: Bias::Slide(slide),
            data: OnceCell::with_value(Some(bytes.into())),
        });
    }

    pub fn len(&self) -> usize
    {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.images.is_empty()
    }
}

impl SymbolSearch for ObjectSymbolSearch
{
    fn find_matching(&self, matcher: &SymbolMatcher) -> Vec<ResolvedSymbol>
    {
        let mut found = Vec::new();

        for image in &self.images {
            let Some(data) = image.bytes() else {
                continue;
            };
            let file = match object::File::parse(&**data) {
                Ok(file) => file,
                Err(err) => {
                    debug!(path = %image.path.display(), error = %err, "unparseable image, skipping");
                    continue;
                }
            };

            let slide = image.slide(&file);
            // Unstripped ELF images list every export in both `.symtab` and
            // `.dynsym`.
            let mut seen: HashSet<(&[u8], u64)> = HashSet::new();
            for symbol in file.symbols().chain(file.dynamic_symbols()) {
                if !symbol.is_definition() {
                    continue;
                }
                let Ok(name) = symbol.name_bytes() else {
                    continue;
                };
                if !matcher.matches(name) || !seen.insert((name, symbol.address())) {
                    continue;
                }

                found.push(ResolvedSymbol {
                    name: String::from_utf8_lossy(name).into_owned(),
                    base_value: symbol.address(),
                    slide,
                    source: SymbolSource::Fallback,
                });
                if matcher.is_exact() {
                    return found;
                }
            }
        }

        found
    }
}
