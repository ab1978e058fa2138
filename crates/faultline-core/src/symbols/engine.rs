//! Process-wide symbol engine.
//!
//! The engine caches one parsed [`BinaryImage`] per loaded module. Images are
//! parsed on the first resolution that lands inside them, with line tables.
//!
//! The engine is reference counted: every [`CallStackAccessScope`] holds it,
//! and the cached images are torn down when the last scope is dropped. A new
//! scope afterwards starts a fresh engine.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use once_cell::sync::Lazy;

use super::image::BinaryImage;
use crate::modules::Module;

static PROCESS: Lazy<ProcessHandle> = Lazy::new(ProcessHandle::open);

static ENGINE: Lazy<Mutex<Weak<SymbolEngineContext>>> = Lazy::new(|| Mutex::new(Weak::new()));

/// Identity of the current process, resolved once.
#[derive(Debug, Clone)]
pub struct ProcessHandle
{
    pid: u32,
    executable: PathBuf,
}

impl ProcessHandle
{
    /// Fallback path that always names the running executable on Linux.
    pub const SELF_EXE: &'static str = "/proc/self/exe";

    /// Handle of the current process.
    pub fn get() -> &'static ProcessHandle
    {
        &PROCESS
    }

    fn open() -> Self
    {
        let pid = std::process::id();
        let executable = match env::current_exe().and_then(|path| path.canonicalize()) {
            Ok(path) => path,
            Err(err) => {
                tracing::error!(%err, fallback = Self::SELF_EXE, "cannot determine the executable path");
                PathBuf::from(Self::SELF_EXE)
            }
        };

        tracing::debug!(pid, executable = %executable.display(), "process handle opened");
        Self { pid, executable }
    }

    pub fn pid(&self) -> u32
    {
        self.pid
    }

    /// Path of the main executable.
    pub fn executable(&self) -> &Path
    {
        &self.executable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ImageKey
{
    path: PathBuf,
    bias: u64,
}

#[derive(Clone)]
enum CachedImage
{
    Ready(Arc<BinaryImage>),
    Failed,
}

/// Shared state of the symbol engine.
pub struct SymbolEngineContext
{
    images: Mutex<HashMap<ImageKey, CachedImage>>,
}

impl SymbolEngineContext
{
    fn acquire() -> Arc<Self>
    {
        let mut registry = ENGINE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = registry.upgrade() {
            return engine;
        }

        let engine = Arc::new(Self {
            images: Mutex::new(HashMap::new()),
        });
        *registry = Arc::downgrade(&engine);
        tracing::debug!(pid = ProcessHandle::get().pid(), "symbol engine initialized");
        engine
    }

    /// The live engine, if any scope currently holds it.
    pub fn current() -> Option<Arc<Self>>
    {
        ENGINE.lock().unwrap_or_else(PoisonError::into_inner).upgrade()
    }

    /// Parsed image for `module`, parsing it on first use.
    ///
    /// Parse failures are cached so the file is not read again.
    pub fn image_for(&self, module: &Module) -> Option<Arc<BinaryImage>>
    {
        let key = ImageKey {
            path: module.path().to_path_buf(),
            bias: module.bias(),
        };

        if let Some(cached) = self.images.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return match cached {
                CachedImage::Ready(image) => Some(Arc::clone(image)),
                CachedImage::Failed => None,
            };
        }

        let parsed = match BinaryImage::parse(module.path()) {
            Ok(image) => {
                tracing::debug!(
                    path = %module.path().display(),
                    symbols = image.symbol_count(),
                    line_info = image.has_line_info(),
                    "image loaded"
                );
                CachedImage::Ready(Arc::new(image))
            }
            Err(err) => {
                tracing::debug!(path = %module.path().display(), %err, "image could not be loaded");
                CachedImage::Failed
            }
        };

        let mut images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        match images.entry(key).or_insert(parsed) {
            CachedImage::Ready(image) => Some(Arc::clone(image)),
            CachedImage::Failed => None,
        }
    }

    /// Number of images parsed (or rejected) so far.
    pub fn cached_images(&self) -> usize
    {
        self.images.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for SymbolEngineContext
{
    fn drop(&mut self)
    {
        let images = self.images.get_mut().map_or(0, |images| images.len());
        tracing::debug!(images, "symbol engine torn down");
    }
}

/// Keeps the symbol engine alive.
///
/// Resolution only succeeds while at least one scope exists; without one,
/// frames resolve to
/// [`ResolutionStatus::EngineUnavailable`](crate::types::ResolutionStatus::EngineUnavailable).
/// Scopes nest freely, on any thread.
///
/// ```rust,no_run
/// use faultline_core::{call_stack, CallStackAccessScope};
///
/// let _scope = CallStackAccessScope::new();
/// let trace = call_stack::get_trace(false);
/// ```
pub struct CallStackAccessScope
{
    engine: Arc<SymbolEngineContext>,
}

impl CallStackAccessScope
{
    pub fn new() -> Self
    {
        Self {
            engine: SymbolEngineContext::acquire(),
        }
    }

    pub fn engine(&self) -> &SymbolEngineContext
    {
        &self.engine
    }
}

impl Default for CallStackAccessScope
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl std::fmt::Debug for CallStackAccessScope
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("CallStackAccessScope")
            .field("cached_images", &self.engine.cached_images())
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_scopes_share_one_engine()
    {
        let outer = CallStackAccessScope::new();
        let inner = CallStackAccessScope::new();
        assert!(std::ptr::eq(outer.engine(), inner.engine()));
        drop(inner);
        assert!(SymbolEngineContext::current().is_some());
    }

    #[test]
    fn test_process_handle_names_this_process()
    {
        let handle = ProcessHandle::get();
        assert_eq!(handle.pid(), std::process::id());
        assert!(!handle.executable().as_os_str().is_empty());
    }
}
