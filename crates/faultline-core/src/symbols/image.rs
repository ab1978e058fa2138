//! Binary image parsing: symbol tables and DWARF line tables.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use addr2line::Context;
use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};

use super::demangle::demangle_symbol;
use super::OwnedReader;
use crate::error::{Result, TraceError};

const DWARF_SECTIONS: &[(SectionId, &str)] = &[
    (SectionId::DebugAbbrev, ".debug_abbrev"),
    (SectionId::DebugAddr, ".debug_addr"),
    (SectionId::DebugInfo, ".debug_info"),
    (SectionId::DebugLine, ".debug_line"),
    (SectionId::DebugLineStr, ".debug_line_str"),
    (SectionId::DebugRanges, ".debug_ranges"),
    (SectionId::DebugRngLists, ".debug_rnglists"),
    (SectionId::DebugStr, ".debug_str"),
    (SectionId::DebugStrOffsets, ".debug_str_offsets"),
    (SectionId::DebugLoc, ".debug_loc"),
    (SectionId::DebugLocLists, ".debug_loclists"),
];

fn section_error(path: &Path, name: &str, err: impl std::fmt::Display) -> TraceError
{
    TraceError::ImageParse {
        path: path.to_path_buf(),
        details: format!("failed to read {name}: {err}"),
    }
}

fn load_section_bytes(file: &object::File<'_>, path: &Path, name: &str) -> Result<Option<Arc<[u8]>>>
{
    let Some(section) = file.section_by_name(name) else {
        return Ok(None);
    };
    let data = section
        .uncompressed_data()
        .map_err(|err| section_error(path, name, err))?;
    Ok(Some(match data {
        Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
        Cow::Owned(vec) => vec.into(),
    }))
}

/// A function symbol, in file addresses.
#[derive(Debug, Clone)]
struct SymbolEntry
{
    address: u64,
    size: u64,
    name: Box<str>,
}

/// Source location of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo
{
    pub file: String,
    pub line: Option<u32>,
}

/// Parsed image with its function symbols and, when present, DWARF line tables.
pub struct BinaryImage
{
    path: PathBuf,
    symbols: Vec<SymbolEntry>,
    // addr2line contexts are not `Sync`
    line_context: Option<Mutex<Context<OwnedReader>>>,
}

impl BinaryImage
{
    /// Read and parse the image at `path`.
    pub fn parse(path: &Path) -> Result<Self>
    {
        let bytes = fs::read(path)?;
        let data = Arc::<[u8]>::from(bytes);
        let file = object::File::parse(&*data).map_err(|err| TraceError::ImageParse {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;

        let symbols = collect_symbols(&file);
        let line_context = match load_line_context(&file, path) {
            Ok(context) => context.map(Mutex::new),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "line information unavailable");
                None
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            symbols,
            line_context,
        })
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn symbol_count(&self) -> usize
    {
        self.symbols.len()
    }

    pub fn has_line_info(&self) -> bool
    {
        self.line_context.is_some()
    }

    /// Demangled name of the function covering `file_address`.
    ///
    /// The nearest preceding symbol wins; symbols with a recorded size must
    /// also contain the address.
    pub fn function_name(&self, file_address: u64) -> Option<String>
    {
        let index = self.symbols.partition_point(|symbol| symbol.address <= file_address);
        let symbol = self.symbols.get(index.checked_sub(1)?)?;
        if symbol.size != 0 && file_address >= symbol.address.saturating_add(symbol.size) {
            return None;
        }
        Some(demangle_symbol(&symbol.name))
    }

    /// File and line of `file_address`, for the outermost function at that
    /// address when inlining is involved.
    pub fn line_info(&self, file_address: u64) -> Option<LineInfo>
    {
        let context = self.line_context.as_ref()?.lock().unwrap_or_else(PoisonError::into_inner);

        let mut frames = context.find_frames(file_address).skip_all_loads().ok()?;
        let mut outermost = None;
        while let Ok(Some(frame)) = frames.next() {
            if let Some(location) = frame.location {
                if let Some(file) = location.file {
                    outermost = Some(LineInfo {
                        file: file.to_string(),
                        line: location.line,
                    });
                }
            }
        }

        if outermost.is_none() {
            if let Ok(Some(location)) = context.find_location(file_address) {
                outermost = location.file.map(|file| LineInfo {
                    file: file.to_string(),
                    line: location.line,
                });
            }
        }

        outermost
    }
}

fn collect_symbols(file: &object::File<'_>) -> Vec<SymbolEntry>
{
    let mut symbols: Vec<SymbolEntry> = file
        .symbols()
        .chain(file.dynamic_symbols())
        .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.is_definition() && symbol.address() != 0)
        .filter_map(|symbol| {
            let name = symbol.name().ok()?;
            if name.is_empty() {
                return None;
            }
            Some(SymbolEntry {
                address: symbol.address(),
                size: symbol.size(),
                name: name.into(),
            })
        })
        .collect();

    // Static and dynamic tables overlap; keep one entry per address,
    // preferring the one with a size.
    symbols.sort_by(|a, b| a.address.cmp(&b.address).then(b.size.cmp(&a.size)));
    symbols.dedup_by_key(|symbol| symbol.address);
    symbols
}

fn load_line_context(file: &object::File<'_>, path: &Path) -> Result<Option<Context<OwnedReader>>>
{
    if file.section_by_name(".debug_info").is_none() {
        return Ok(None);
    }

    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let mut sections: HashMap<SectionId, Arc<[u8]>> = HashMap::new();
    for (id, name) in DWARF_SECTIONS {
        if let Some(data) = load_section_bytes(file, path, name)? {
            sections.insert(*id, data);
        }
    }

    let dwarf = Dwarf::load(|id| {
        let data = sections.get(&id).cloned().unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        Ok::<_, gimli::Error>(EndianArcSlice::new(data, endian))
    })?;

    Ok(Some(Context::from_dwarf(dwarf)?))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::symbols::ProcessHandle;

    #[test]
    fn test_missing_file_is_an_error()
    {
        let result = BinaryImage::parse(Path::new("/nonexistent/faultline/image.so"));
        assert!(matches!(result, Err(TraceError::Io(_))));
    }

    #[test]
    fn test_non_elf_file_is_rejected()
    {
        let result = BinaryImage::parse(Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml").as_path());
        assert!(matches!(result, Err(TraceError::ImageParse { .. })));
    }

    #[test]
    fn test_section_error_names_the_image()
    {
        let err = section_error(Path::new("/usr/lib/libdemo.so"), ".debug_line", "bad compression header");
        assert!(matches!(&err, TraceError::ImageParse { path, .. } if path == Path::new("/usr/lib/libdemo.so")));
        assert_eq!(
            err.to_string(),
            "Failed to parse image /usr/lib/libdemo.so: failed to read .debug_line: bad compression header"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_own_executable_has_symbols()
    {
        let image = BinaryImage::parse(ProcessHandle::get().executable()).expect("test binary parses");
        assert!(image.symbol_count() > 0);
    }
}
