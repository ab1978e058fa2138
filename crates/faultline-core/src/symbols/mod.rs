//! # Symbols
//!
//! Turns raw frame addresses into function names and source locations.
//!
//! - [`engine`]: process-wide symbol engine and the scope that keeps it alive
//! - [`image`]: parsed ELF images (symbol tables, DWARF line tables)
//! - [`resolver`]: per-frame resolution with a status for every failure
//! - [`demangle`]: Rust symbol demangling

pub mod demangle;
pub mod engine;
pub mod image;
pub mod resolver;

use gimli::{EndianArcSlice, RunTimeEndian};

pub use engine::{CallStackAccessScope, ProcessHandle, SymbolEngineContext};
pub use image::BinaryImage;
pub use resolver::{resolve_frames, SymbolResolver};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
