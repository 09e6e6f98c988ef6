// bus.rs — Bus allocation for patch cables
//
// Maps the cable graph of a patch onto numbered global buses, one numbering
// per signal rate. Jacks joined by cables form a net (an outlet fanning out,
// or inlets bridged by in-to-in cables); each net gets one bus, allocated
// when the first cable of the net is processed in file order. Jacks without
// cables keep the reserved default buses.
//
// Preconditions: `graph` comes from the parser (module ids unique per area).
// Postconditions: on success every cabled jack holds its net's bus and the
//                 returned `UdoSet` lists each module type once; on error the
//                 graph is unchanged.
// Failure modes: cable to an unknown module or jack, inlet cabled twice,
//                cable joining jacks of different rates.
// Side effects: writes the bus lists of `graph.modules`.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::catalog::PortRate;
use crate::id::{Bus, BusCounter};
use crate::patch::{Area, CableType, PatchGraph};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JackKind {
    Inlet,
    Outlet,
}

impl fmt::Display for JackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JackKind::Inlet => write!(f, "inlet"),
            JackKind::Outlet => write!(f, "outlet"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("cable {cable}: {area} module {module_id} does not exist")]
    UnknownModule {
        cable: usize,
        area: Area,
        module_id: u32,
    },
    #[error("cable {cable}: {area} module {module_id} ({name}) has no {kind} {jack}")]
    UnknownJack {
        cable: usize,
        area: Area,
        module_id: u32,
        name: String,
        kind: JackKind,
        jack: u32,
    },
    #[error("cable {cable}: inlet {jack} of {area} module {module_id} is already fed by cable {first}")]
    InletConnectedTwice {
        cable: usize,
        area: Area,
        module_id: u32,
        jack: u32,
        first: usize,
    },
    #[error("cable {cable}: {area} module {from_module} {from_kind} {from_jack} is {from_rate}-rate but module {to_module} inlet {jack} is {to_rate}-rate")]
    RateMismatch {
        cable: usize,
        area: Area,
        from_module: u32,
        from_kind: JackKind,
        from_jack: u32,
        from_rate: PortRate,
        to_module: u32,
        jack: u32,
        to_rate: PortRate,
    },
}

/// A module type that needs one template definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdoType {
    pub type_id: u32,
    /// `None` for types missing from the catalog.
    pub name: Option<String>,
}

/// Distinct module types of a patch in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdoSet {
    types: Vec<UdoType>,
}

impl UdoSet {
    pub fn from_graph(graph: &PatchGraph) -> Self {
        let mut types: Vec<UdoType> = Vec::new();
        for m in &graph.modules {
            if !types.iter().any(|t| t.type_id == m.type_id) {
                types.push(UdoType {
                    type_id: m.type_id,
                    name: m.type_name.clone(),
                });
            }
        }
        UdoSet { types }
    }

    pub fn iter(&self) -> impl Iterator<Item = &UdoType> {
        self.types.iter()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.types.iter().map(|t| t.type_id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ── Nets ────────────────────────────────────────────────────────────────────

/// A jack addressed by module position in `PatchGraph::modules`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct JackKey {
    module: usize,
    kind: JackKind,
    jack: usize,
}

/// Union-find over the jacks touched by cables.
#[derive(Debug, Default)]
struct Nets {
    parent: HashMap<JackKey, JackKey>,
}

impl Nets {
    fn find(&self, mut key: JackKey) -> JackKey {
        while let Some(&up) = self.parent.get(&key) {
            if up == key {
                break;
            }
            key = up;
        }
        key
    }

    fn union(&mut self, a: JackKey, b: JackKey) {
        self.parent.entry(a).or_insert(a);
        self.parent.entry(b).or_insert(b);
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }

    fn jacks(&self) -> impl Iterator<Item = JackKey> + '_ {
        self.parent.keys().copied()
    }
}

// ── Allocator ───────────────────────────────────────────────────────────────

/// Allocates buses for one patch and remembers how large each bus space got.
#[derive(Debug, Default)]
pub struct BusAllocator {
    counter: BusCounter,
}

impl BusAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every cable of `graph` and return the module types to emit.
    pub fn connect_patch(&mut self, graph: &mut PatchGraph) -> Result<UdoSet, RoutingError> {
        let mut nets = Nets::default();
        let mut fed_by: HashMap<JackKey, usize> = HashMap::new();
        let mut destinations: Vec<(JackKey, PortRate)> = Vec::with_capacity(graph.cables.len());

        for (index, cable) in graph.cables.iter().enumerate() {
            let from = module_index(graph, index, cable.area, cable.module_from)?;
            let to = module_index(graph, index, cable.area, cable.module_to)?;
            let source_kind = match cable.kind {
                CableType::OutToIn => JackKind::Outlet,
                CableType::InToIn => JackKind::Inlet,
            };
            let source = jack_key(graph, index, from, source_kind, cable.jack_from)?;
            let dest = jack_key(graph, index, to, JackKind::Inlet, cable.jack_to)?;

            // A net carries one rate; a bus number is only unique within its rate.
            let from_rate = jack_rate(graph, source);
            let to_rate = jack_rate(graph, dest);
            if from_rate != to_rate {
                return Err(RoutingError::RateMismatch {
                    cable: index,
                    area: cable.area,
                    from_module: cable.module_from,
                    from_kind: source_kind,
                    from_jack: cable.jack_from,
                    from_rate,
                    to_module: cable.module_to,
                    jack: cable.jack_to,
                    to_rate,
                });
            }

            if let Some(&first) = fed_by.get(&dest) {
                return Err(RoutingError::InletConnectedTwice {
                    cable: index,
                    area: cable.area,
                    module_id: cable.module_to,
                    jack: cable.jack_to,
                    first,
                });
            }
            fed_by.insert(dest, index);
            nets.union(source, dest);
            destinations.push((dest, to_rate));
        }

        // Numbering happens after all unions so that a net joined late still
        // keeps the bus of its earliest cable.
        let mut counter = self.counter.clone();
        let mut net_bus: HashMap<JackKey, Bus> = HashMap::new();
        for (index, (dest, rate)) in destinations.iter().enumerate() {
            let root = nets.find(*dest);
            net_bus.entry(root).or_insert_with(|| {
                let bus = counter.alloc(*rate);
                debug!(cable = index, %bus, %rate, "allocated bus");
                bus
            });
        }

        let assignments: Vec<(JackKey, Bus)> = nets
            .jacks()
            .map(|key| (key, net_bus[&nets.find(key)]))
            .collect();

        self.counter = counter;
        for (key, bus) in assignments {
            let module = &mut graph.modules[key.module];
            match key.kind {
                JackKind::Inlet => module.inlet_buses[key.jack] = bus,
                JackKind::Outlet => module.outlet_buses[key.jack] = bus,
            }
        }

        Ok(UdoSet::from_graph(graph))
    }

    /// Highest bus number in use for `rate`.
    pub fn highest(&self, rate: PortRate) -> Bus {
        self.counter.highest(rate)
    }

    /// Number of bus slots the `rate` space must provide.
    pub fn space_size(&self, rate: PortRate) -> u32 {
        self.highest(rate).0 + 1
    }
}

fn module_index(
    graph: &PatchGraph,
    cable: usize,
    area: Area,
    module_id: u32,
) -> Result<usize, RoutingError> {
    graph
        .modules
        .iter()
        .position(|m| m.id == module_id && m.area == area)
        .ok_or(RoutingError::UnknownModule {
            cable,
            area,
            module_id,
        })
}

fn jack_key(
    graph: &PatchGraph,
    cable: usize,
    module: usize,
    kind: JackKind,
    jack: u32,
) -> Result<JackKey, RoutingError> {
    let m = &graph.modules[module];
    let count = match kind {
        JackKind::Inlet => m.inlet_rates.len(),
        JackKind::Outlet => m.outlet_rates.len(),
    };
    let index = jack as usize;
    if index >= count {
        return Err(RoutingError::UnknownJack {
            cable,
            area: m.area,
            module_id: m.id,
            name: m.display_name().to_string(),
            kind,
            jack,
        });
    }
    Ok(JackKey {
        module,
        kind,
        jack: index,
    })
}

fn jack_rate(graph: &PatchGraph, key: JackKey) -> PortRate {
    let m = &graph.modules[key.module];
    match key.kind {
        JackKind::Inlet => m.inlet_rates[key.jack],
        JackKind::Outlet => m.outlet_rates[key.jack],
    }
}
