// parser.rs — .pch2 container decoder
//
// Decodes a Nord Modular G2 patch file into a `PatchGraph` in one forward
// pass over its sections.
//
// Container layout:
//
//   preamble  ASCII "Version=Nord Modular G2 File Format ..." ended by 0x00
//   header    u8 format version (0x17), u8 file type (0x00 = patch)
//   section*  u8 kind, u16 big-endian payload length, payload
//   trailer   u16 checksum (not verified)
//
// Payloads are MSB-first bit streams (see bits.rs). Field widths per section
// kind are listed next to the reader for that kind. Unknown kinds are skipped
// by their declared length.
//
// Preconditions: `catalog` lists the module types the patch may use.
// Postconditions: records appear in file order; every `ParameterBlock` holds
//                 exactly `declared` values.
// Failure modes: `FormatError` for files that are not G2 patches,
//                `CorruptionError` for damaged section framing or records.
//                Unknown module types are warnings on the graph, not errors.
// Side effects: `parse` reads one file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::bits::BitReader;
use crate::catalog::Catalog;
use crate::diag::{codes, Diagnostic, Span};
use crate::patch::{
    Area, Cable, CableColor, CableType, ModuleInstance, ParameterBlock, PatchDescription,
    PatchGraph, UnknownCode,
};

// ── Container constants ─────────────────────────────────────────────────────

pub const PREAMBLE_MAGIC: &[u8] = b"Version=Nord Modular G2 File Format";
pub const FORMAT_VERSION: u8 = 0x17;
pub const FILE_TYPE_PATCH: u8 = 0x00;
pub const SECTION_HEADER_LEN: usize = 3;
pub const TRAILER_LEN: usize = 2;

pub const SECTION_DESCRIPTION: u8 = 0x21;
pub const SECTION_MODULE_LIST: u8 = 0x4a;
pub const SECTION_CABLE_LIST: u8 = 0x52;
pub const SECTION_PARAMETERS: u8 = 0x4d;

// ── Errors ──────────────────────────────────────────────────────────────────

/// The input is not a patch this tool understands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("{}: patch file should have extension '.pch2'", .0.display())]
    BadExtension(PathBuf),
    #[error("not a G2 patch: missing 'Version=Nord Modular G2 File Format' preamble")]
    BadPreamble,
    #[error("text preamble is not terminated")]
    UnterminatedPreamble,
    #[error("binary header is missing")]
    MissingHeader,
    #[error("unsupported format version 0x{0:02x}")]
    UnsupportedVersion(u8),
    #[error("unsupported file type {0}: only patches can be converted")]
    UnsupportedFileType(u8),
}

/// The input is a G2 patch, but its content is damaged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptionError {
    #[error("section header at byte {offset} is truncated")]
    TruncatedHeader { offset: usize },
    #[error("section 0x{kind:02x} at byte {offset} declares {declared} bytes but only {available} remain")]
    SectionOverrun {
        kind: u8,
        offset: usize,
        declared: usize,
        available: usize,
    },
    #[error("section 0x{kind:02x} at byte {offset} declares {declared} bytes but its records use {consumed}")]
    SectionLength {
        kind: u8,
        offset: usize,
        declared: usize,
        consumed: usize,
    },
    #[error("section 0x{kind:02x} at byte {offset} ends inside a record")]
    Truncated { kind: u8, offset: usize },
    #[error("{area} module {module_id} declares {declared} parameters but stores {decoded}")]
    ParameterCount {
        area: Area,
        module_id: u32,
        declared: usize,
        decoded: usize,
    },
    #[error("{area} module id {id} is declared twice")]
    DuplicateModule { area: Area, id: u32 },
    #[error("section 0x{kind:02x} at byte {offset}: {source}")]
    InvalidCode {
        kind: u8,
        offset: usize,
        source: UnknownCode,
    },
    #[error("checksum trailer is missing")]
    MissingTrailer,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
}

// ── Public entry points ─────────────────────────────────────────────────────

/// Read and decode a `.pch2` file.
pub fn parse(catalog: &Catalog, path: &Path) -> Result<PatchGraph, ParseError> {
    let bytes = read_patch(path)?;
    parse_bytes(catalog, &bytes)
}

/// Read a patch file fully, refusing paths without the `.pch2` extension.
pub fn read_patch(path: &Path) -> Result<Vec<u8>, ParseError> {
    if !has_patch_extension(path) {
        return Err(FormatError::BadExtension(path.to_path_buf()).into());
    }
    let bytes = std::fs::read(path).map_err(|e| ParseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "read patch file");
    Ok(bytes)
}

/// Decode an in-memory container.
pub fn parse_bytes(catalog: &Catalog, bytes: &[u8]) -> Result<PatchGraph, ParseError> {
    let mut parser = Parser {
        catalog,
        bytes,
        graph: PatchGraph::new(),
    };
    let body = parser.read_header()?;
    parser.read_sections(body)?;
    Ok(parser.graph)
}

pub fn has_patch_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pch2"))
}

// ── Section cursor ──────────────────────────────────────────────────────────

struct Section<'a> {
    kind: u8,
    offset: usize,
    len: usize,
    reader: BitReader<'a>,
}

impl Section<'_> {
    fn field(&mut self, width: u32) -> Result<u32, CorruptionError> {
        self.reader.read(width).ok_or(CorruptionError::Truncated {
            kind: self.kind,
            offset: self.offset,
        })
    }

    fn skip(&mut self, width: usize) -> Result<(), CorruptionError> {
        self.reader.skip(width).ok_or(CorruptionError::Truncated {
            kind: self.kind,
            offset: self.offset,
        })
    }

    fn code<T>(&mut self, width: u32) -> Result<T, CorruptionError>
    where
        T: TryFrom<u32, Error = UnknownCode>,
    {
        let raw = self.field(width)?;
        T::try_from(raw).map_err(|source| CorruptionError::InvalidCode {
            kind: self.kind,
            offset: self.offset,
            source,
        })
    }

    fn span(&self) -> Span {
        Span::new(self.offset, self.offset + SECTION_HEADER_LEN + self.len)
    }
}

// ── Parser ──────────────────────────────────────────────────────────────────

struct Parser<'a> {
    catalog: &'a Catalog,
    bytes: &'a [u8],
    graph: PatchGraph,
}

impl<'a> Parser<'a> {
    /// Check preamble and binary header; returns the offset of the first section.
    fn read_header(&self) -> Result<usize, FormatError> {
        if !self.bytes.starts_with(PREAMBLE_MAGIC) {
            return Err(FormatError::BadPreamble);
        }
        let terminator = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::UnterminatedPreamble)?;
        let header = self
            .bytes
            .get(terminator + 1..terminator + 3)
            .ok_or(FormatError::MissingHeader)?;
        if header[0] != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(header[0]));
        }
        if header[1] != FILE_TYPE_PATCH {
            return Err(FormatError::UnsupportedFileType(header[1]));
        }
        Ok(terminator + 3)
    }

    fn read_sections(&mut self, mut pos: usize) -> Result<(), CorruptionError> {
        let end = self.bytes.len();
        loop {
            let remaining = end - pos;
            if remaining == TRAILER_LEN {
                return Ok(());
            }
            if remaining < TRAILER_LEN {
                return Err(CorruptionError::MissingTrailer);
            }
            if remaining < TRAILER_LEN + SECTION_HEADER_LEN {
                return Err(CorruptionError::TruncatedHeader { offset: pos });
            }

            let kind = self.bytes[pos];
            let declared = usize::from(u16::from_be_bytes([self.bytes[pos + 1], self.bytes[pos + 2]]));
            let payload_start = pos + SECTION_HEADER_LEN;
            let available = end - TRAILER_LEN - payload_start;
            if declared > available {
                return Err(CorruptionError::SectionOverrun {
                    kind,
                    offset: pos,
                    declared,
                    available,
                });
            }

            let bytes = self.bytes;
            let payload = &bytes[payload_start..payload_start + declared];
            self.read_section(Section {
                kind,
                offset: pos,
                len: declared,
                reader: BitReader::new(payload),
            })?;
            pos = payload_start + declared;
        }
    }

    fn read_section(&mut self, mut section: Section<'a>) -> Result<(), CorruptionError> {
        match section.kind {
            SECTION_DESCRIPTION => self.read_description(&mut section)?,
            SECTION_MODULE_LIST => self.read_module_list(&mut section)?,
            SECTION_CABLE_LIST => self.read_cable_list(&mut section)?,
            SECTION_PARAMETERS => self.read_parameters(&mut section)?,
            kind => {
                debug!(kind, len = section.len, "skipping section");
                return Ok(());
            }
        }

        let consumed = section.reader.bytes_consumed();
        if consumed != section.len {
            return Err(CorruptionError::SectionLength {
                kind: section.kind,
                offset: section.offset,
                declared: section.len,
                consumed,
            });
        }
        Ok(())
    }

    /// active variation 8, voices 5, mono 1, reserved 2
    fn read_description(&mut self, s: &mut Section<'_>) -> Result<(), CorruptionError> {
        let active_variation = s.field(8)? as u8;
        let voices = s.field(5)? as u8;
        let mono = s.field(1)? == 1;
        s.skip(2)?;
        self.graph.description = PatchDescription {
            active_variation,
            voices,
            mono,
        };
        Ok(())
    }

    /// area 2, count 8; per module: type 8, id 8, x 7, y 7, color 8, uprate 1,
    /// leds 1, reserved 6, mode count 4, modes 6 each
    fn read_module_list(&mut self, s: &mut Section<'_>) -> Result<(), CorruptionError> {
        let area: Area = s.code(2)?;
        let count = s.field(8)?;
        debug!(%area, count, "module list");
        for _ in 0..count {
            let type_id = s.field(8)?;
            let id = s.field(8)?;
            s.skip(7 + 7 + 8 + 1 + 1 + 6)?;
            let modes = s.field(4)? as usize;
            s.skip(modes * 6)?;

            if self.graph.find_module(id, area).is_some() {
                return Err(CorruptionError::DuplicateModule { area, id });
            }
            let module = ModuleInstance::new(self.catalog, area, type_id, id);
            if !module.is_known() {
                warn!(%area, id, type_id, "unknown module type");
                self.graph.diagnostics.push(
                    Diagnostic::warning(format!(
                        "{area} module {id} has unknown type {type_id}"
                    ))
                    .with_code(codes::W0100)
                    .with_span(s.span())
                    .with_hint("the module keeps no jacks; cables to it cannot be routed"),
                );
            }
            self.graph.modules.push(module);
        }
        Ok(())
    }

    /// area 2, reserved 12, count 10; per cable: color 3, from module 8,
    /// from jack 6, type 1, to module 8, to jack 6
    fn read_cable_list(&mut self, s: &mut Section<'_>) -> Result<(), CorruptionError> {
        let area: Area = s.code(2)?;
        s.skip(12)?;
        let count = s.field(10)?;
        debug!(%area, count, "cable list");
        for _ in 0..count {
            let color: CableColor = s.code(3)?;
            let module_from = s.field(8)?;
            let jack_from = s.field(6)?;
            let kind: CableType = s.code(1)?;
            let module_to = s.field(8)?;
            let jack_to = s.field(6)?;
            self.graph.cables.push(Cable {
                area,
                kind,
                color,
                module_from,
                jack_from,
                module_to,
                jack_to,
            });
        }
        Ok(())
    }

    /// area 2, module count 8, variation count 8; per module: id 8, count 7;
    /// per variation: variation 8, stored count 7, `stored` values of 7 bits
    fn read_parameters(&mut self, s: &mut Section<'_>) -> Result<(), CorruptionError> {
        let area: Area = s.code(2)?;
        let modules = s.field(8)?;
        let variations = s.field(8)?;
        debug!(%area, modules, variations, "parameters");
        for _ in 0..modules {
            let module_id = s.field(8)?;
            let declared = s.field(7)? as usize;
            let mut kept: Option<Vec<u8>> = None;
            for _ in 0..variations {
                s.skip(8)?;
                let stored = s.field(7)? as usize;
                if stored != declared {
                    return Err(CorruptionError::ParameterCount {
                        area,
                        module_id,
                        declared,
                        decoded: stored,
                    });
                }
                let mut values = Vec::with_capacity(stored);
                for _ in 0..stored {
                    values.push(s.field(7)? as u8);
                }
                // Only the first variation is kept.
                kept.get_or_insert(values);
            }
            // A module without variation records stores no values.
            let Some(values) = kept else {
                continue;
            };
            self.graph.params.push(ParameterBlock {
                area,
                module_id,
                declared,
                values,
            });
        }
        Ok(())
    }
}
