// pipeline.rs — Patch conversion orchestration
//
// Runs the conversion stages in order: read and parse the patch, route its
// cables onto buses, load and validate the templates of its module types,
// render the document and finally write it.
//
// Preconditions: `catalog` is the one the templates were written against.
// Postconditions: `prepare` touches no output; `Conversion::write` creates the
//                 output file only from a fully rendered document.
// Failure modes: any stage error, as `crate::error::Error`. Missing or invalid
//                templates are reported on `Compiled`, not raised.
// Side effects: reads the input patch and template files; `write` creates the
//               output file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::bus::{BusAllocator, UdoSet};
use crate::catalog::Catalog;
use crate::codegen::{render, CodegenOptions};
use crate::error::{Error, Result};
use crate::parser::{parse_bytes, read_patch};
use crate::patch::PatchGraph;
use crate::template::{TemplateSet, TemplateSource};
use crate::validate::{validate, TemplateValidation};

// ── Provenance ──────────────────────────────────────────────────────────────

/// Identifies the input a document was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn of(bytes: &[u8]) -> Self {
        let mut source_hash = [0u8; 32];
        source_hash.copy_from_slice(&Sha256::digest(bytes));
        Provenance {
            source_hash,
            compiler_version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.source_hash {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }

    /// Comment lines placed before the document. Csound ignores text outside
    /// the `<CsoundSynthesizer>` element.
    pub fn header(&self, source_name: &str) -> String {
        format!(
            "; generated by g2csd {}\n; source: {}\n; source sha256: {}\n",
            self.compiler_version,
            source_name,
            self.source_hash_hex()
        )
    }
}

// ── Compilation ─────────────────────────────────────────────────────────────

/// Everything produced from one parsed patch.
#[derive(Debug)]
pub struct Compiled {
    pub graph: PatchGraph,
    pub udos: UdoSet,
    pub templates: TemplateSet,
    /// One entry per loaded template, in UdoSet order.
    pub validations: Vec<TemplateValidation>,
    pub text: String,
}

impl Compiled {
    /// Module types of the patch without a template.
    pub fn missing(&self) -> &[u32] {
        self.templates.missing()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &TemplateValidation> {
        self.validations.iter().filter(|v| !v.is_valid())
    }

    pub fn has_invalid(&self) -> bool {
        self.invalid().next().is_some()
    }
}

/// Route, validate and render an already parsed patch.
pub fn compile(
    catalog: &Catalog,
    mut graph: PatchGraph,
    source: &dyn TemplateSource,
    options: &CodegenOptions,
) -> Result<Compiled> {
    let mut allocator = BusAllocator::new();
    let udos = allocator.connect_patch(&mut graph)?;
    let templates = TemplateSet::load(source, &udos)?;

    let validations: Vec<TemplateValidation> = udos
        .type_ids()
        .filter_map(|type_id| templates.get(type_id))
        .map(|template| validate(catalog, template))
        .collect();
    for v in validations.iter().filter(|v| !v.is_valid()) {
        for error in &v.errors {
            warn!(type_id = v.type_id, "invalid template: {error}");
        }
    }

    let text = render(&graph, &allocator, &udos, &templates, options);
    Ok(Compiled {
        graph,
        udos,
        templates,
        validations,
        text,
    })
}

// ── Files ───────────────────────────────────────────────────────────────────

/// A converted patch that has not been written yet.
#[derive(Debug)]
pub struct Conversion {
    pub input: PathBuf,
    pub provenance: Provenance,
    pub compiled: Compiled,
}

impl Conversion {
    /// The full output text: provenance header followed by the document.
    pub fn document(&self) -> String {
        let name = self
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut out = self.provenance.header(&name);
        out.push_str(&self.compiled.text);
        out
    }

    pub fn write(&self, output: &Path) -> Result<()> {
        std::fs::write(output, self.document()).map_err(|e| Error::Write {
            path: output.to_path_buf(),
            source: e,
        })?;
        info!(
            input = %self.input.display(),
            output = %output.display(),
            modules = self.compiled.graph.modules.len(),
            cables = self.compiled.graph.cables.len(),
            "wrote csd"
        );
        Ok(())
    }
}

/// Read, parse and compile `input` without writing anything.
pub fn prepare(
    catalog: &Catalog,
    input: &Path,
    source: &dyn TemplateSource,
    options: &CodegenOptions,
) -> Result<Conversion> {
    let bytes = read_patch(input)?;
    let provenance = Provenance::of(&bytes);
    let graph = parse_bytes(catalog, &bytes)?;
    let compiled = compile(catalog, graph, source, options)?;
    Ok(Conversion {
        input: input.to_path_buf(),
        provenance,
        compiled,
    })
}

/// Default output location: the input path with `.csd` appended.
pub fn output_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(".csd");
    PathBuf::from(name)
}

/// Convert `input` and write the result to `output`, or next to the input.
/// Missing and invalid templates do not stop the conversion.
pub fn convert_file(
    catalog: &Catalog,
    input: &Path,
    source: &dyn TemplateSource,
    options: &CodegenOptions,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let conversion = prepare(catalog, input, source, options)?;
    let output = output.map_or_else(|| output_path(input), Path::to_path_buf);
    conversion.write(&output)?;
    Ok(output)
}
