//! Loads DWARF debug information out of the target executable's ELF image.
//!
//! The resulting handle is opaque to the rest of the crate: it is held for
//! the REPL's lifetime and dropped on exit, gating future source-level
//! features (function-from-PC lookups and the like) without the core
//! interpreting its contents itself.

use std::borrow::Cow;
use std::fs::File as StdFile;
use std::rc::Rc;

use gimli::{EndianRcSlice, RunTimeEndian};
use memmap2::Mmap;
use object::{Object, ObjectSection};

use crate::error::DebugSymbolsError;

type Slice = EndianRcSlice<RunTimeEndian>;

/// An opaque handle onto a target's DWARF sections. The core never reads
/// through it; it exists purely so it can be loaded and released.
pub struct DebugSymbols {
    path: String,
    // Kept alive for as long as `dwarf` borrows from the mapped file, even
    // though nothing currently reads `dwarf`'s contents.
    _mmap: Mmap,
    #[allow(dead_code)]
    dwarf: gimli::Dwarf<Slice>,
}

impl DebugSymbols {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Memory-maps `path`, parses it as an ELF object, and builds a
/// `gimli::Dwarf` over whichever debug sections are present (x86-64,
/// little-endian only, matching the rest of this crate's scope).
pub fn load(path: &str) -> Result<DebugSymbols, DebugSymbolsError> {
    load_inner(path).map_err(|source| DebugSymbolsError::Load {
        path: path.to_string(),
        source,
    })
}

fn load_inner(path: &str) -> anyhow::Result<DebugSymbols> {
    let file = StdFile::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let object = object::File::parse(&*mmap)?;
    let endian = RunTimeEndian::Little;

    let load_section = |id: gimli::SectionId| -> Result<Slice, gimli::Error> {
        let data = object
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[][..]));
        Ok(gimli::EndianRcSlice::new(Rc::from(&*data), endian))
    };

    let dwarf = gimli::Dwarf::load(load_section)?;

    Ok(DebugSymbols {
        path: path.to_string(),
        _mmap: mmap,
        dwarf,
    })
}
