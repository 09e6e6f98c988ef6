// report.rs — Human-readable views of patches and templates
//
// Tables of the modules and cables of a parsed patch, the single-template
// check behind `--check-udo`, and a Markdown status page covering every
// catalog type.
//
// Preconditions: none.
// Postconditions: output depends only on the inputs (no timestamps, no
//                 host paths).
// Failure modes: none; template load failures become report text.
// Side effects: none.

use std::fmt::Write as _;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::patch::{CableType, PatchGraph};
use crate::template::{TemplateError, TemplateSource};
use crate::validate::validate;

// ── Patch tables ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRow {
    pub name: String,
    pub id: u32,
    pub type_id: u32,
    pub params: Vec<u8>,
    pub area: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CableRow {
    pub from: String,
    pub to: String,
    pub color: String,
    pub kind: String,
    pub area: String,
}

pub fn module_rows(graph: &PatchGraph) -> Vec<ModuleRow> {
    graph
        .modules
        .iter()
        .map(|m| ModuleRow {
            name: m.display_name().to_string(),
            id: m.id,
            type_id: m.type_id,
            params: graph.param_values(m.area, m.id).to_vec(),
            area: m.area.to_string(),
        })
        .collect()
}

pub fn cable_rows(graph: &PatchGraph) -> Vec<CableRow> {
    graph
        .cables
        .iter()
        .map(|c| {
            let name = |id| {
                graph
                    .find_module(id, c.area)
                    .map_or("?", |m| m.display_name())
                    .to_string()
            };
            let from_pin = match c.kind {
                CableType::InToIn => "in",
                CableType::OutToIn => "out",
            };
            CableRow {
                from: format!("{}(id={}, {}={})", name(c.module_from), c.module_from, from_pin, c.jack_from),
                to: format!("{}(id={}, in={})", name(c.module_to), c.module_to, c.jack_to),
                color: c.color.to_string(),
                kind: c.kind.to_string(),
                area: c.area.to_string(),
            }
        })
        .collect()
}

/// Module and cable tables, as printed by `--print`.
pub fn render_tables(graph: &PatchGraph) -> String {
    let modules: Vec<Vec<String>> = module_rows(graph)
        .into_iter()
        .map(|r| {
            vec![
                r.name,
                r.id.to_string(),
                r.type_id.to_string(),
                format!("{:?}", r.params),
                r.area,
            ]
        })
        .collect();
    let cables: Vec<Vec<String>> = cable_rows(graph)
        .into_iter()
        .map(|r| vec![r.from, "->".to_string(), r.to, r.color, r.kind, r.area])
        .collect();

    let mut out = String::from("Modules\n");
    out.push_str(&table(&["Name", "ID", "Type", "Parameters", "Area"], &modules));
    out.push_str("\nCables\n");
    out.push_str(&table(&["From", "", "To", "Color", "Type", "Area"], &cables));
    out
}

/// Left-aligned columns separated by two spaces, dashes under the headers.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut line = |cells: &mut dyn Iterator<Item = String>| {
        let padded: Vec<String> = cells
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    line(&mut headers.iter().map(|h| h.to_string()));
    line(&mut widths.iter().map(|w| "-".repeat(*w)));
    for row in rows {
        line(&mut row.iter().cloned());
    }
    out
}

// ── Template checks ─────────────────────────────────────────────────────────

/// Result of checking the template of one module type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCheck {
    pub valid: bool,
    /// One line per finding; empty for a valid template.
    pub findings: Vec<String>,
}

pub fn check_template(catalog: &Catalog, source: &dyn TemplateSource, type_id: u32) -> TemplateCheck {
    let failed = |line: String| TemplateCheck {
        valid: false,
        findings: vec![line],
    };
    if catalog.lookup(type_id).is_none() {
        return failed(format!("error: unknown module type '{type_id}'"));
    }
    let template = match source.load(type_id) {
        Ok(t) => t,
        Err(TemplateError::NotFound(_)) => return failed(format!("error: no template {type_id}.txt")),
        Err(e) => return failed(format!("error: {e}")),
    };
    let validation = validate(catalog, &template);
    TemplateCheck {
        valid: validation.is_valid(),
        findings: validation.diagnostics().iter().map(|d| d.to_string()).collect(),
    }
}

/// Text printed by `--check-udo`.
pub fn render_check(catalog: &Catalog, source: &dyn TemplateSource, type_id: u32) -> (String, bool) {
    let mut out = String::new();
    let _ = writeln!(out, "checking module type '{type_id}' ({type_id}.txt)");
    if let Some(spec) = catalog.lookup(type_id) {
        let _ = writeln!(out, "module name: {}", spec.name);
    }
    let check = check_template(catalog, source, type_id);
    for line in &check.findings {
        let _ = writeln!(out, "{line}");
    }
    if check.valid {
        out.push_str("ok\n");
    }
    (out, check.valid)
}

/// Markdown table with the template status of every catalog type.
pub fn status_markdown(catalog: &Catalog, source: &dyn TemplateSource) -> String {
    let mut out = String::from("This file is automatically generated.\n\n");
    out.push_str("| Template | Module name | Status |\n");
    out.push_str("|----------|-------------|--------|\n");
    for spec in catalog.types() {
        let status = if source.contains(spec.id) {
            let check = check_template(catalog, source, spec.id);
            if check.valid {
                "ok".to_string()
            } else {
                check.findings.join("<br>")
            }
        } else {
            "not implemented".to_string()
        };
        let _ = writeln!(out, "| {}.txt | {} | {} |", spec.id, spec.name, status);
    }
    out
}
