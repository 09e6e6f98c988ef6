// Property-based tests for converter invariants.
//
// Three categories:
// 1. Parser: generated containers parse deterministically, every module
//    can be found again by (id, area), short parameter blocks are rejected
//    wherever they sit in the section
// 2. Bus allocation: distinct nets get distinct buses, numbering increases in
//    cable order, cables joining different rates are rejected, failures
//    leave the graph untouched
// 3. Rendering: identical inputs give identical text
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use std::collections::HashMap;

use g2csd::bus::{BusAllocator, RoutingError};
use g2csd::catalog::{Catalog, PortRate};
use g2csd::codegen::{render, CodegenOptions};
use g2csd::encode::PatchBuilder;
use g2csd::id::Bus;
use g2csd::parser::{parse_bytes, CorruptionError, ParseError};
use g2csd::patch::{Area, Cable, CableColor, CableType, ModuleInstance, PatchGraph};
use g2csd::template::{InlineTemplates, TemplateSet};
use proptest::prelude::*;

// ── Patch generator ─────────────────────────────────────────────────────────

/// Built-in catalog types, unknown type 200 included to exercise soft failure.
const TYPES: &[u32] = &[1, 4, 7, 9, 18, 23, 24, 81, 92, 127, 200];

/// Raw cable candidate: (from module, from jack, to module, to jack), all
/// reduced modulo the actual counts when the patch is assembled.
type Candidate = (usize, usize, usize, usize);

#[derive(Debug, Clone)]
struct GenPatch {
    types: Vec<u32>,
    candidates: Vec<Candidate>,
    params: Vec<u8>,
}

fn arb_patch() -> impl Strategy<Value = GenPatch> {
    (
        prop::collection::vec(prop::sample::select(TYPES), 1..12),
        prop::collection::vec((0usize..32, 0usize..8, 0usize..32, 0usize..8), 0..24),
        prop::collection::vec(0u8..128, 0..8),
    )
        .prop_map(|(types, candidates, params)| GenPatch {
            types,
            candidates,
            params,
        })
}

/// Out-to-in cables between jacks of equal rate, each inlet fed at most once.
fn valid_cables(catalog: &Catalog, types: &[u32], candidates: &[Candidate]) -> Vec<(u32, u32, u32, u32)> {
    let jacks = |t: u32| {
        catalog
            .lookup(t)
            .map(|s| (s.inlets.clone(), s.outlets.clone()))
            .unwrap_or_default()
    };
    let mut fed: Vec<(usize, usize)> = Vec::new();
    let mut cables = Vec::new();
    for &(from, fj, to, tj) in candidates {
        let (from, to) = (from % types.len(), to % types.len());
        let (_, outlets) = jacks(types[from]);
        let (inlets, _) = jacks(types[to]);
        if outlets.is_empty() || inlets.is_empty() {
            continue;
        }
        let (fj, tj) = (fj % outlets.len(), tj % inlets.len());
        if outlets[fj] != inlets[tj] || fed.contains(&(to, tj)) {
            continue;
        }
        fed.push((to, tj));
        cables.push((from as u32 + 1, fj as u32, to as u32 + 1, tj as u32));
    }
    cables
}

fn build(catalog: &Catalog, p: &GenPatch) -> (Vec<u8>, Vec<(u32, u32, u32, u32)>) {
    let modules: Vec<(u32, u32)> = p
        .types
        .iter()
        .enumerate()
        .map(|(i, t)| (*t, i as u32 + 1))
        .collect();
    let cables = valid_cables(catalog, &p.types, &p.candidates);
    let records: Vec<_> = cables
        .iter()
        .map(|&(f, fj, t, tj)| (CableType::OutToIn, CableColor::Red, (f, fj), (t, tj)))
        .collect();
    let bytes = PatchBuilder::new()
        .modules(Area::Voice, &modules)
        .cables(Area::Voice, &records)
        .params(Area::Voice, 1, &p.params)
        .build();
    (bytes, cables)
}

fn routed(catalog: &Catalog, bytes: &[u8]) -> (PatchGraph, BusAllocator) {
    let mut graph = parse_bytes(catalog, bytes).expect("generated patch parses");
    let mut allocator = BusAllocator::new();
    allocator
        .connect_patch(&mut graph)
        .expect("generated cables route");
    (graph, allocator)
}

// ── Parser properties ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn parse_is_deterministic_and_lookup_roundtrips(p in arb_patch()) {
        let catalog = Catalog::builtin().unwrap();
        let (bytes, cables) = build(&catalog, &p);
        let first = parse_bytes(&catalog, &bytes).unwrap();
        let second = parse_bytes(&catalog, &bytes).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.modules.len(), p.types.len());
        prop_assert_eq!(first.cables.len(), cables.len());
        prop_assert_eq!(first.param_values(Area::Voice, 1), p.params.as_slice());
        for m in &first.modules {
            prop_assert_eq!(first.find_module(m.id, m.area), Some(m));
        }
        let unknown = p.types.iter().any(|t| catalog.lookup(*t).is_none());
        prop_assert_eq!(first.diagnostics.is_empty(), !unknown);
    }

    #[test]
    fn short_parameter_block_is_rejected_at_any_offset(
        preceding in prop::collection::vec(prop::collection::vec(0u8..128, 0..10), 0..12),
        declared in 1u32..16,
        missing in 1u32..16,
    ) {
        let catalog = Catalog::builtin().unwrap();
        let missing = missing.min(declared);
        let short: Vec<u8> = (0..declared - missing).map(|v| v as u8).collect();
        let target = preceding.len() as u32 + 1;

        let modules: Vec<(u32, u32)> = (1..=target).map(|id| (9, id)).collect();
        let mut blocks: Vec<(u32, u32, &[u8])> = preceding
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u32 + 1, v.len() as u32, v.as_slice()))
            .collect();
        blocks.push((target, declared, short.as_slice()));
        let bytes = PatchBuilder::new()
            .modules(Area::Voice, &modules)
            .param_blocks(Area::Voice, &blocks)
            .build();

        let err = parse_bytes(&catalog, &bytes).unwrap_err();
        let expected = CorruptionError::ParameterCount {
            area: Area::Voice,
            module_id: target,
            declared: declared as usize,
            decoded: short.len(),
        };
        prop_assert!(
            matches!(&err, ParseError::Corruption(c) if *c == expected),
            "got {:?}", err
        );
    }
}

// ── Allocator properties ────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn distinct_nets_get_distinct_buses(p in arb_patch()) {
        let catalog = Catalog::builtin().unwrap();
        let (bytes, cables) = build(&catalog, &p);
        let (graph, allocator) = routed(&catalog, &bytes);

        // With out-to-in cables only, a net is identified by its source outlet.
        let mut net_bus: HashMap<(u32, u32), (Bus, PortRate)> = HashMap::new();
        let mut next = [Bus::FIRST_FREE.0, Bus::FIRST_FREE.0];
        for &(from, fj, to, tj) in &cables {
            let src = &graph.modules[from as usize - 1];
            let dst = &graph.modules[to as usize - 1];
            let rate = dst.inlet_rates[tj as usize];
            let bus = dst.inlet_buses[tj as usize];
            prop_assert_eq!(src.outlet_buses[fj as usize], bus);
            prop_assert!(!bus.is_reserved());

            let slot = match rate { PortRate::Audio => 0, PortRate::Control => 1 };
            match net_bus.get(&(from, fj)) {
                Some(&(known, _)) => prop_assert_eq!(known, bus),
                None => {
                    // First cable of a net takes the next number of its class.
                    prop_assert_eq!(bus.0, next[slot]);
                    next[slot] += 1;
                    net_bus.insert((from, fj), (bus, rate));
                }
            }
        }

        let mut seen: HashMap<(u32, PortRate), (u32, u32)> = HashMap::new();
        for (net, (bus, rate)) in &net_bus {
            if let Some(other) = seen.insert((bus.0, *rate), *net) {
                prop_assert!(false, "nets {:?} and {:?} share bus {}", net, other, bus);
            }
        }
        prop_assert_eq!(allocator.highest(PortRate::Audio).0, next[0] - 1);
        prop_assert_eq!(allocator.highest(PortRate::Control).0, next[1] - 1);

        // Uncabled jacks keep the defaults.
        for (i, m) in graph.modules.iter().enumerate() {
            for (j, bus) in m.inlet_buses.iter().enumerate() {
                let cabled = cables.iter().any(|c| c.2 as usize == i + 1 && c.3 as usize == j);
                prop_assert_eq!(cabled, *bus != Bus::UNCONNECTED_INPUT);
            }
        }
    }

    #[test]
    fn routing_failure_leaves_graph_untouched(p in arb_patch()) {
        let catalog = Catalog::builtin().unwrap();
        let (bytes, cables) = build(&catalog, &p);
        prop_assume!(!cables.is_empty());
        let mut graph = parse_bytes(&catalog, &bytes).unwrap();

        // Feed the first cabled inlet a second time.
        let mut dup = graph.cables[0];
        dup.color = CableColor::Green;
        graph.cables.push(dup);
        let before = graph.clone();

        let mut allocator = BusAllocator::new();
        prop_assert!(allocator.connect_patch(&mut graph).is_err());
        prop_assert_eq!(&graph, &before);
        prop_assert_eq!(allocator.highest(PortRate::Audio), Bus(Bus::FIRST_FREE.0 - 1));
    }
}

// ── Rate mismatch ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn cables_between_rates_never_share_a_bus(p in arb_patch()) {
        let catalog = Catalog::builtin().unwrap();
        let (bytes, cables) = build(&catalog, &p);
        let mut graph = parse_bytes(&catalog, &bytes).unwrap();

        // Append a LfoC whose control outlet feeds a fresh LevMult audio inlet.
        let lfo = p.types.len() as u32 + 1;
        let mult = lfo + 1;
        for (type_id, id) in [(24, lfo), (81, mult)] {
            graph.modules.push(ModuleInstance::new(&catalog, Area::Voice, type_id, id));
        }
        let mixed = Cable {
            area: Area::Voice,
            kind: CableType::OutToIn,
            color: CableColor::Red,
            module_from: lfo,
            jack_from: 0,
            module_to: mult,
            jack_to: 0,
        };
        graph.cables.push(mixed);
        let before = graph.clone();

        let mut allocator = BusAllocator::new();
        let err = allocator.connect_patch(&mut graph).unwrap_err();
        let is_mismatch = matches!(
            err,
            RoutingError::RateMismatch { cable, from_rate: PortRate::Control, to_rate: PortRate::Audio, .. }
                if cable == cables.len()
        );
        prop_assert!(is_mismatch, "got {:?}", err);
        prop_assert_eq!(&graph, &before);
    }
}

// ── Rendering properties ────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn rendering_is_deterministic(p in arb_patch()) {
        let catalog = Catalog::builtin().unwrap();
        let (bytes, _) = build(&catalog, &p);
        let source = InlineTemplates::new()
            .with(9, ";@ args k k k k k k\n;@ ins k k a\n;@ outs a\n")
            .with(4, ";@ args k k k\n;@ ins a a\n;@ outs\n");
        let options = CodegenOptions::default();

        let run = || {
            let (graph, allocator) = routed(&catalog, &bytes);
            let udos = g2csd::bus::UdoSet::from_graph(&graph);
            let templates = TemplateSet::load(&source, &udos).unwrap();
            render(&graph, &allocator, &udos, &templates, &options)
        };
        let first = run();
        prop_assert_eq!(&first, &run());
        let instr = first.split("instr 1\n").nth(1).unwrap();
        prop_assert_eq!(instr.lines().take_while(|l| l.starts_with("Mod")).count(), p.types.len());
    }
}
