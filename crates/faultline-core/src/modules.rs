//! # Module Map
//!
//! Images (executable, shared libraries, vdso) mapped into this process.
//!
//! The walker needs, for every return address, the module that contains it and
//! that module's in-memory `.eh_frame_hdr`; the resolver needs the module's
//! path on disk and its load bias to translate runtime addresses into file
//! addresses.
//!
//! The map is built with `dl_iterate_phdr` on first use and rebuilt whenever a
//! lookup misses, so libraries loaded later with `dlopen` are picked up.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use smallvec::SmallVec;

use crate::error::Result;
use crate::platform;
use crate::types::Address;

static MODULES: Lazy<RwLock<ModuleMap>> = Lazy::new(|| RwLock::new(ModuleMap::default()));

/// One image mapped into the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module
{
    path: PathBuf,
    bias: u64,
    segments: SmallVec<[Range<u64>; 4]>,
    eh_frame_hdr: Option<Range<u64>>,
}

impl Module
{
    pub(crate) fn new(
        path: PathBuf,
        bias: u64,
        segments: SmallVec<[Range<u64>; 4]>,
        eh_frame_hdr: Option<Range<u64>>,
    ) -> Self
    {
        Self {
            path,
            bias,
            segments,
            eh_frame_hdr,
        }
    }

    /// Path of the image on disk (the executable's path for the main program).
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Difference between runtime addresses and the addresses in the file.
    pub fn bias(&self) -> u64
    {
        self.bias
    }

    /// Returns `true` if a loadable segment of this module covers `address`.
    pub fn contains(&self, address: Address) -> bool
    {
        self.segment_containing(address.value()).is_some()
    }

    /// Translate a runtime address into an address inside the file.
    pub fn file_address(&self, address: Address) -> Option<u64>
    {
        if !self.contains(address) {
            return None;
        }
        address.value().checked_sub(self.bias)
    }

    /// Runtime address of `.eh_frame_hdr`, if the module has one.
    pub fn eh_frame_hdr_address(&self) -> Option<u64>
    {
        self.eh_frame_hdr.as_ref().map(|range| range.start)
    }

    fn segment_containing(&self, address: u64) -> Option<&Range<u64>>
    {
        self.segments.iter().find(|segment| segment.contains(&address))
    }

    /// The mapped `.eh_frame_hdr` bytes.
    pub(crate) fn eh_frame_hdr_bytes(&self) -> Option<&[u8]>
    {
        let range = self.eh_frame_hdr.as_ref()?;
        self.mapped_bytes(range.start, range.end)
    }

    /// Mapped bytes from `start` to the end of the loadable segment holding it.
    ///
    /// `.eh_frame` has no size recorded in the program headers, so this is the
    /// largest slice it can occupy.
    pub(crate) fn bytes_to_segment_end(&self, start: u64) -> Option<&[u8]>
    {
        let end = self.segment_containing(start)?.end;
        self.mapped_bytes(start, end)
    }

    fn mapped_bytes(&self, start: u64, end: u64) -> Option<&[u8]>
    {
        let segment = self.segment_containing(start)?;
        if end > segment.end || end <= start {
            return None;
        }
        let len = usize::try_from(end - start).ok()?;
        let ptr = usize::try_from(start).ok()? as *const u8;

        // SAFETY: the range lies inside a PT_LOAD segment of a module the
        // dynamic loader reported as mapped. Segments stay mapped until the
        // module is unloaded, which callers holding this module do not do.
        Some(unsafe { std::slice::from_raw_parts(ptr, len) })
    }
}

/// Snapshot of the modules loaded in the process.
#[derive(Debug, Default)]
pub struct ModuleMap
{
    modules: Vec<Arc<Module>>,
}

impl ModuleMap
{
    /// Enumerate the modules currently loaded.
    pub fn load() -> Result<Self>
    {
        let modules = platform::enumerate_modules()?.into_iter().map(Arc::new).collect();
        Ok(Self { modules })
    }

    /// Module whose loadable segments cover `address`.
    pub fn find(&self, address: Address) -> Option<&Arc<Module>>
    {
        self.modules.iter().find(|module| module.contains(address))
    }

    pub fn len(&self) -> usize
    {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.modules.is_empty()
    }
}

/// Module owning `address`, rebuilding the map once if no module matches.
pub fn find_module(address: Address) -> Option<Arc<Module>>
{
    if address.is_zero() {
        return None;
    }

    {
        let map = MODULES.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = map.find(address) {
            return Some(Arc::clone(module));
        }
    }

    if let Err(err) = refresh() {
        tracing::warn!(%err, "failed to enumerate loaded modules");
        return None;
    }

    let map = MODULES.read().unwrap_or_else(PoisonError::into_inner);
    map.find(address).cloned()
}

/// Rebuild the module map, returning the number of modules found.
pub fn refresh() -> Result<usize>
{
    let fresh = ModuleMap::load()?;
    let count = fresh.len();
    *MODULES.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    tracing::debug!(count, "module map refreshed");
    Ok(count)
}

#[cfg(test)]
mod tests
{
    use smallvec::smallvec;

    use super::*;

    fn module() -> Module
    {
        Module::new(
            PathBuf::from("/usr/lib/libdemo.so"),
            0x7f00_0000_0000,
            smallvec![0x7f00_0000_0000..0x7f00_0000_4000, 0x7f00_0000_5000..0x7f00_0000_6000],
            Some(0x7f00_0000_3000..0x7f00_0000_3100),
        )
    }

    #[test]
    fn test_contains_only_loadable_segments()
    {
        let module = module();
        assert!(module.contains(Address::new(0x7f00_0000_1000)));
        assert!(module.contains(Address::new(0x7f00_0000_5fff)));
        assert!(!module.contains(Address::new(0x7f00_0000_4800)));
        assert!(!module.contains(Address::new(0x7f00_0000_6000)));
    }

    #[test]
    fn test_file_address_removes_bias()
    {
        let module = module();
        assert_eq!(module.file_address(Address::new(0x7f00_0000_1234)), Some(0x1234));
        assert_eq!(module.file_address(Address::new(0x1234)), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_own_code_has_a_module()
    {
        assert!(refresh().unwrap() > 0);
        let address = Address::new(test_own_code_has_a_module as *const () as u64);
        let module = find_module(address).unwrap();
        assert!(module.contains(address));
        assert!(module.file_address(address).is_some());
    }

    #[test]
    fn test_eh_frame_hdr_address()
    {
        assert_eq!(module().eh_frame_hdr_address(), Some(0x7f00_0000_3000));
    }
}
