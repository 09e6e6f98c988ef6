// patch.rs — Patch graph data model
//
// The typed form of one .pch2 file: module instances, cables and parameter
// blocks for the FX and voice areas. Built by the parser; the bus allocator
// fills in the bus lists; everything downstream only reads it.
//
// Preconditions: none (types only).
// Postconditions: module ids are unique within an area.
// Failure modes: wire codes outside the known variants (`UnknownCode`).
// Side effects: none.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Catalog, PortRate};
use crate::diag::Diagnostic;
use crate::id::Bus;

/// A wire integer that names no variant of the enum it encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown {field} code {code}")]
pub struct UnknownCode {
    pub field: &'static str,
    pub code: u32,
}

// ── Area ────────────────────────────────────────────────────────────────────

/// One of the two independent routing regions of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Area {
    Fx,
    Voice,
}

impl Area {
    pub fn code(self) -> u32 {
        match self {
            Area::Fx => 0,
            Area::Voice => 1,
        }
    }
}

impl TryFrom<u32> for Area {
    type Error = UnknownCode;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Area::Fx),
            1 => Ok(Area::Voice),
            _ => Err(UnknownCode {
                field: "area",
                code,
            }),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::Fx => write!(f, "FX"),
            Area::Voice => write!(f, "Voice"),
        }
    }
}

// ── Cable type and color ────────────────────────────────────────────────────

/// Whether a cable starts at an outlet or bridges two inlets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CableType {
    InToIn,
    OutToIn,
}

impl CableType {
    pub fn code(self) -> u32 {
        match self {
            CableType::InToIn => 0,
            CableType::OutToIn => 1,
        }
    }
}

impl TryFrom<u32> for CableType {
    type Error = UnknownCode;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(CableType::InToIn),
            1 => Ok(CableType::OutToIn),
            _ => Err(UnknownCode {
                field: "cable type",
                code,
            }),
        }
    }
}

impl fmt::Display for CableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CableType::InToIn => write!(f, "in-in"),
            CableType::OutToIn => write!(f, "out-in"),
        }
    }
}

/// Editor cable color. Carries no routing meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CableColor {
    Red,
    Blue,
    Yellow,
    Orange,
    Green,
    Purple,
    White,
}

impl CableColor {
    pub fn code(self) -> u32 {
        match self {
            CableColor::Red => 0,
            CableColor::Blue => 1,
            CableColor::Yellow => 2,
            CableColor::Orange => 3,
            CableColor::Green => 4,
            CableColor::Purple => 5,
            CableColor::White => 6,
        }
    }
}

impl TryFrom<u32> for CableColor {
    type Error = UnknownCode;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(CableColor::Red),
            1 => Ok(CableColor::Blue),
            2 => Ok(CableColor::Yellow),
            3 => Ok(CableColor::Orange),
            4 => Ok(CableColor::Green),
            5 => Ok(CableColor::Purple),
            6 => Ok(CableColor::White),
            _ => Err(UnknownCode {
                field: "cable color",
                code,
            }),
        }
    }
}

impl fmt::Display for CableColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CableColor::Red => "red",
            CableColor::Blue => "blue",
            CableColor::Yellow => "yellow",
            CableColor::Orange => "orange",
            CableColor::Green => "green",
            CableColor::Purple => "purple",
            CableColor::White => "white",
        };
        write!(f, "{name}")
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

/// One module placed in a patch area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInstance {
    pub type_id: u32,
    /// `None` when the catalog does not know `type_id`.
    pub type_name: Option<String>,
    pub id: u32,
    pub area: Area,
    pub inlet_rates: Vec<PortRate>,
    pub outlet_rates: Vec<PortRate>,
    pub inlet_buses: Vec<Bus>,
    pub outlet_buses: Vec<Bus>,
}

impl ModuleInstance {
    /// Resolve `type_id` against the catalog. Unknown types get empty jack
    /// lists so the rest of the patch can still be inspected.
    pub fn new(catalog: &Catalog, area: Area, type_id: u32, id: u32) -> Self {
        let (type_name, inlet_rates, outlet_rates) = match catalog.lookup(type_id) {
            Some(spec) => (
                Some(spec.name.clone()),
                spec.inlets.clone(),
                spec.outlets.clone(),
            ),
            None => (None, Vec::new(), Vec::new()),
        };
        let inlet_buses = vec![Bus::UNCONNECTED_INPUT; inlet_rates.len()];
        let outlet_buses = vec![Bus::UNCONNECTED_OUTPUT; outlet_rates.len()];
        ModuleInstance {
            type_id,
            type_name,
            id,
            area,
            inlet_rates,
            outlet_rates,
            inlet_buses,
            outlet_buses,
        }
    }

    pub fn is_known(&self) -> bool {
        self.type_name.is_some()
    }

    pub fn display_name(&self) -> &str {
        self.type_name.as_deref().unwrap_or("?")
    }
}

/// A patch cable between two jacks of the same area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cable {
    pub area: Area,
    pub kind: CableType,
    pub color: CableColor,
    pub module_from: u32,
    pub jack_from: u32,
    pub module_to: u32,
    pub jack_to: u32,
}

/// Raw parameter values of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterBlock {
    pub area: Area,
    pub module_id: u32,
    pub declared: usize,
    pub values: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchDescription {
    /// Decoded but not acted upon; variations are not supported.
    pub active_variation: u8,
    pub voices: u8,
    pub mono: bool,
}

// ── Patch graph ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchGraph {
    pub description: PatchDescription,
    pub modules: Vec<ModuleInstance>,
    pub cables: Vec<Cable>,
    pub params: Vec<ParameterBlock>,
    /// Non-fatal findings from parsing (unknown module types).
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

impl PatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_module(&self, id: u32, area: Area) -> Option<&ModuleInstance> {
        self.modules.iter().find(|m| m.id == id && m.area == area)
    }

    pub fn find_params(&self, area: Area, module_id: u32) -> Option<&ParameterBlock> {
        self.params
            .iter()
            .find(|p| p.area == area && p.module_id == module_id)
    }

    /// Parameter values of a module; empty when the patch stores none.
    pub fn param_values(&self, area: Area, module_id: u32) -> &[u8] {
        self.find_params(area, module_id)
            .map(|p| p.values.as_slice())
            .unwrap_or(&[])
    }

    /// Distinct type ids of modules the catalog did not know, first-seen order.
    pub fn unknown_types(&self) -> Vec<u32> {
        let mut seen = Vec::new();
        for m in self.modules.iter().filter(|m| !m.is_known()) {
            if !seen.contains(&m.type_id) {
                seen.push(m.type_id);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModuleSpec;

    fn catalog() -> Catalog {
        Catalog::from_specs([ModuleSpec {
            id: 7,
            name: "OscB".into(),
            inlets: vec![PortRate::Control, PortRate::Audio],
            outlets: vec![PortRate::Audio],
            params: 2,
        }])
        .unwrap()
    }

    #[test]
    fn wire_codes_are_exhaustive() {
        assert_eq!(Area::try_from(1), Ok(Area::Voice));
        assert_eq!(
            Area::try_from(2),
            Err(UnknownCode {
                field: "area",
                code: 2
            })
        );
        assert_eq!(CableType::try_from(0), Ok(CableType::InToIn));
        assert!(CableType::try_from(2).is_err());
        for code in 0..7 {
            assert_eq!(CableColor::try_from(code).unwrap().code(), code);
        }
        assert_eq!(
            CableColor::try_from(7).unwrap_err().to_string(),
            "unknown cable color code 7"
        );
    }

    #[test]
    fn new_module_uses_default_buses() {
        let m = ModuleInstance::new(&catalog(), Area::Voice, 7, 3);
        assert_eq!(m.display_name(), "OscB");
        assert_eq!(
            m.inlet_buses,
            vec![Bus::UNCONNECTED_INPUT, Bus::UNCONNECTED_INPUT]
        );
        assert_eq!(m.outlet_buses, vec![Bus::UNCONNECTED_OUTPUT]);
    }

    #[test]
    fn unknown_type_has_no_jacks() {
        let m = ModuleInstance::new(&catalog(), Area::Fx, 250, 1);
        assert!(!m.is_known());
        assert_eq!(m.display_name(), "?");
        assert!(m.inlet_rates.is_empty() && m.outlet_buses.is_empty());
    }

    #[test]
    fn lookups_respect_area() {
        let catalog = catalog();
        let mut graph = PatchGraph::new();
        graph.modules.push(ModuleInstance::new(&catalog, Area::Voice, 7, 1));
        graph.modules.push(ModuleInstance::new(&catalog, Area::Fx, 250, 1));
        graph.params.push(ParameterBlock {
            area: Area::Fx,
            module_id: 1,
            declared: 2,
            values: vec![3, 4],
        });

        assert_eq!(graph.find_module(1, Area::Voice).unwrap().type_id, 7);
        assert_eq!(graph.find_module(1, Area::Fx).unwrap().type_id, 250);
        assert!(graph.find_module(2, Area::Fx).is_none());
        assert_eq!(graph.param_values(Area::Fx, 1), &[3, 4]);
        assert!(graph.param_values(Area::Voice, 1).is_empty());
        assert_eq!(graph.unknown_types(), vec![250]);
    }
}
