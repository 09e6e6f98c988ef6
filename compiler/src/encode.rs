// encode.rs — .pch2 container writer
//
// Produces containers in the layout parser.rs reads. Used to build patch
// fixtures for tests and benchmarks; every call appends one section, so a
// builder reproduces the file order the parser will report.
//
// Preconditions: ids, jacks and counts fit their bit widths (higher bits are
//                dropped).
// Postconditions: `build` returns a complete container with a zero trailer.
// Failure modes: none.
// Side effects: none.

use crate::bits::BitWriter;
use crate::patch::{Area, CableColor, CableType};
use crate::parser::{
    FILE_TYPE_PATCH, FORMAT_VERSION, SECTION_CABLE_LIST, SECTION_DESCRIPTION,
    SECTION_MODULE_LIST, SECTION_PARAMETERS,
};

const PREAMBLE: &[u8] =
    b"Version=Nord Modular G2 File Format 1\r\nType=Patch\r\nVersion=23\r\nInfo=BUILD 320\r\n";

#[derive(Debug, Clone, Default)]
pub struct PatchBuilder {
    sections: Vec<(u8, Vec<u8>)>,
}

impl PatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, active_variation: u8, voices: u8, mono: bool) -> Self {
        let mut w = BitWriter::new();
        w.write(u32::from(active_variation), 8);
        w.write(u32::from(voices), 5);
        w.write(u32::from(mono), 1);
        w.write(0, 2);
        self.sections.push((SECTION_DESCRIPTION, w.into_bytes()));
        self
    }

    /// One module in its own module-list section.
    pub fn module(self, area: Area, type_id: u32, id: u32) -> Self {
        self.modules(area, &[(type_id, id)])
    }

    /// A module-list section holding `(type id, module id)` pairs.
    pub fn modules(mut self, area: Area, modules: &[(u32, u32)]) -> Self {
        let payload = Self::module_list_payload(area, modules);
        self.sections.push((SECTION_MODULE_LIST, payload));
        self
    }

    pub fn cable(
        self,
        area: Area,
        kind: CableType,
        color: CableColor,
        from: (u32, u32),
        to: (u32, u32),
    ) -> Self {
        self.cables(area, &[(kind, color, from, to)])
    }

    /// A cable-list section; endpoints are `(module id, jack index)`.
    pub fn cables(
        mut self,
        area: Area,
        cables: &[(CableType, CableColor, (u32, u32), (u32, u32))],
    ) -> Self {
        let mut w = BitWriter::new();
        w.write(area.code(), 2);
        w.write(0, 12);
        w.write(cables.len() as u32, 10);
        for (kind, color, (module_from, jack_from), (module_to, jack_to)) in cables {
            w.write(color.code(), 3);
            w.write(*module_from, 8);
            w.write(*jack_from, 6);
            w.write(kind.code(), 1);
            w.write(*module_to, 8);
            w.write(*jack_to, 6);
        }
        self.sections.push((SECTION_CABLE_LIST, w.into_bytes()));
        self
    }

    /// A parameter section with one module and one variation.
    pub fn params(self, area: Area, module_id: u32, values: &[u8]) -> Self {
        self.params_declaring(area, module_id, values.len() as u32, values)
    }

    /// Like `params`, but the declared count is written independently of the
    /// values actually stored.
    pub fn params_declaring(self, area: Area, module_id: u32, declared: u32, values: &[u8]) -> Self {
        self.param_blocks(area, &[(module_id, declared, values)])
    }

    /// A parameter section with one variation for several modules; entries
    /// are `(module id, declared count, stored values)`.
    pub fn param_blocks(mut self, area: Area, blocks: &[(u32, u32, &[u8])]) -> Self {
        let mut w = BitWriter::new();
        w.write(area.code(), 2);
        w.write(blocks.len() as u32, 8);
        w.write(1, 8);
        for (module_id, declared, values) in blocks {
            w.write(*module_id, 8);
            w.write(*declared, 7);
            w.write(0, 8);
            w.write(values.len() as u32, 7);
            for v in values.iter() {
                w.write(u32::from(*v), 7);
            }
        }
        self.sections.push((SECTION_PARAMETERS, w.into_bytes()));
        self
    }

    /// A section with a caller-supplied payload, written verbatim.
    pub fn raw_section(mut self, kind: u8, payload: &[u8]) -> Self {
        self.sections.push((kind, payload.to_vec()));
        self
    }

    pub fn module_list_payload(area: Area, modules: &[(u32, u32)]) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write(area.code(), 2);
        w.write(modules.len() as u32, 8);
        for (type_id, id) in modules {
            w.write(*type_id, 8);
            w.write(*id, 8);
            // x, y, color, uprate, leds, reserved
            w.write(0, 7);
            w.write(0, 7);
            w.write(0, 8);
            w.write(0, 1);
            w.write(0, 1);
            w.write(0, 6);
            // no modes
            w.write(0, 4);
        }
        w.into_bytes()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREAMBLE.len() + 64);
        out.extend_from_slice(PREAMBLE);
        out.push(0);
        out.push(FORMAT_VERSION);
        out.push(FILE_TYPE_PATCH);
        for (kind, payload) in &self.sections {
            out.push(*kind);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            out.extend_from_slice(payload);
        }
        out.extend_from_slice(&[0, 0]);
        out
    }
}
