// codegen.rs — Csound code generation for routed patches
//
// Assembles the .csd document: orchestra header, the zak bus-space
// declaration sized by the allocator, one opcode definition per module type
// and one opcode call per module instance, followed by a score that runs the
// patch instrument.
//
// Preconditions: `allocator` has routed `graph`; `udos` is its result.
// Postconditions: returns the full document text. Identical inputs give
//                 byte-identical text.
// Failure modes: none. Default buses and types without a template are
//                emitted as they are; gating on coverage is the caller's job.
// Side effects: logs a warning for each module whose stored parameters do
//               not fill its template's args.

use std::fmt::Write as _;

use tracing::warn;

use crate::bus::{BusAllocator, UdoSet};
use crate::catalog::PortRate;
use crate::patch::PatchGraph;
use crate::template::{invocation, opcode_name, SlotKind, Template, TemplateSet};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    pub sample_rate: u32,
    pub ksmps: u32,
    pub nchnls: u32,
    /// Score length of the patch instrument in seconds.
    pub duration: u32,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            sample_rate: 96000,
            ksmps: 16,
            nchnls: 2,
            duration: 3600,
        }
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn render(
    graph: &PatchGraph,
    allocator: &BusAllocator,
    udos: &UdoSet,
    templates: &TemplateSet,
    options: &CodegenOptions,
) -> String {
    let mut ctx = CodegenCtx {
        graph,
        allocator,
        udos,
        templates,
        options,
        out: String::with_capacity(4096),
    };
    ctx.emit_all();
    ctx.out
}

// ── Internal context ────────────────────────────────────────────────────────

struct CodegenCtx<'a> {
    graph: &'a PatchGraph,
    allocator: &'a BusAllocator,
    udos: &'a UdoSet,
    templates: &'a TemplateSet,
    options: &'a CodegenOptions,
    out: String,
}

impl CodegenCtx<'_> {
    fn emit_all(&mut self) {
        self.out.push_str("<CsoundSynthesizer>\n");
        self.out.push_str("<CsInstruments>\n");
        self.emit_header();
        self.emit_bus_space();
        self.emit_definitions();
        self.emit_instrument();
        self.out.push_str("</CsInstruments>\n");
        self.emit_score();
        self.out.push_str("</CsoundSynthesizer>\n");
    }

    fn emit_header(&mut self) {
        let o = self.options;
        let _ = writeln!(self.out, "sr = {}", o.sample_rate);
        let _ = writeln!(self.out, "ksmps = {}", o.ksmps);
        let _ = writeln!(self.out, "nchnls = {}", o.nchnls);
        self.out.push_str("0dbfs = 1\n\n");
    }

    fn emit_bus_space(&mut self) {
        let _ = writeln!(
            self.out,
            "zakinit {}, {}\n",
            self.allocator.space_size(PortRate::Audio),
            self.allocator.space_size(PortRate::Control)
        );
    }

    fn emit_definitions(&mut self) {
        for udo in self.udos.iter() {
            match self.templates.get(udo.type_id) {
                Some(template) => {
                    self.out.push_str(&template.definition(udo.name.as_deref()));
                }
                None => {
                    let _ = writeln!(
                        self.out,
                        "; {} (type {}): no template for {}",
                        udo.name.as_deref().unwrap_or("?"),
                        udo.type_id,
                        opcode_name(udo.type_id)
                    );
                }
            }
            self.out.push('\n');
        }
    }

    fn emit_instrument(&mut self) {
        self.out.push_str("instr 1\n");
        for module in &self.graph.modules {
            let params = self.graph.param_values(module.area, module.id);
            if let Some(expected) = self
                .templates
                .get(module.type_id)
                .and_then(|t| arg_mismatch(t, params))
            {
                warn!(
                    area = %module.area,
                    module = module.id,
                    expected,
                    stored = params.len(),
                    "parameter count differs from the template's args"
                );
            }
            let _ = writeln!(self.out, "{}", invocation(module, params));
        }
        // Bus contents must not leak into the next control period.
        let _ = writeln!(
            self.out,
            "zacl 0, {}",
            self.allocator.highest(PortRate::Audio)
        );
        let _ = writeln!(
            self.out,
            "zkcl 0, {}",
            self.allocator.highest(PortRate::Control)
        );
        self.out.push_str("endin\n");
    }

    fn emit_score(&mut self) {
        self.out.push_str("<CsScore>\n");
        let _ = writeln!(self.out, "i 1 0 {}", self.options.duration);
        self.out.push_str("</CsScore>\n");
    }
}

/// The template's arg count when `params` does not fill it exactly.
fn arg_mismatch(template: &Template, params: &[u8]) -> Option<usize> {
    let expected = template.slot_count(SlotKind::Args);
    (expected != params.len()).then_some(expected)
}
