// template.rs — Module templates (Csound user-defined opcodes)
//
// One template per module type, stored as `<type id>.txt`. Leading `;@`
// directive lines declare the slots the opcode takes; every other line is
// opcode body:
//
//   ;@ args k k i     parameter slots (k or i rate)
//   ;@ ins a k        inlet bus slots (a or k rate)
//   ;@ outs a         outlet bus slots
//
// The opcode receives, in order, the parameter values, the inlet bus numbers
// and the outlet bus numbers. Directive lines are tokenized with `logos`.
//
// Preconditions: none.
// Postconditions: a loaded `Template` holds each directive at most once.
// Failure modes: missing template, unreadable file, malformed directive.
// Side effects: `TemplateDir` reads files.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use logos::Logos;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bus::UdoSet;
use crate::catalog::PortRate;
use crate::patch::ModuleInstance;

const DIRECTIVE_PREFIX: &str = ";@";

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no template for module type {0}")]
    NotFound(u32),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{origin}:{line}: {message}")]
    Syntax {
        origin: String,
        line: usize,
        message: String,
    },
}

// ── Slots ───────────────────────────────────────────────────────────────────

/// The three slot groups a template declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Args,
    Inlets,
    Outlets,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Args => write!(f, "args"),
            SlotKind::Inlets => write!(f, "ins"),
            SlotKind::Outlets => write!(f, "outs"),
        }
    }
}

/// Rate of a parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgRate {
    Control,
    Init,
}

impl ArgRate {
    pub fn letter(self) -> char {
        match self {
            ArgRate::Control => 'k',
            ArgRate::Init => 'i',
        }
    }
}

// ── Directive lexer ─────────────────────────────────────────────────────────

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t,]+")]
enum DirectiveToken {
    #[token("args")]
    Args,
    #[token("ins")]
    Ins,
    #[token("outs")]
    Outs,
    #[token("a")]
    Audio,
    #[token("k")]
    Control,
    #[token("i")]
    Init,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", priority = 1)]
    Word,
}

enum Directive {
    Args(Vec<ArgRate>),
    Ports(SlotKind, Vec<PortRate>),
}

fn lex_directive(text: &str) -> Result<Directive, String> {
    let mut lexer = DirectiveToken::lexer(text);
    let head = match lexer.next() {
        Some(Ok(DirectiveToken::Args)) => SlotKind::Args,
        Some(Ok(DirectiveToken::Ins)) => SlotKind::Inlets,
        Some(Ok(DirectiveToken::Outs)) => SlotKind::Outlets,
        Some(_) => return Err(format!("unknown directive '{}'", lexer.slice())),
        None => return Err("empty directive".to_string()),
    };

    let mut args = Vec::new();
    let mut ports = Vec::new();
    while let Some(token) = lexer.next() {
        match (head, token) {
            (SlotKind::Args, Ok(DirectiveToken::Control)) => args.push(ArgRate::Control),
            (SlotKind::Args, Ok(DirectiveToken::Init)) => args.push(ArgRate::Init),
            (SlotKind::Inlets | SlotKind::Outlets, Ok(DirectiveToken::Audio)) => {
                ports.push(PortRate::Audio)
            }
            (SlotKind::Inlets | SlotKind::Outlets, Ok(DirectiveToken::Control)) => {
                ports.push(PortRate::Control)
            }
            (SlotKind::Args, _) => {
                return Err(format!(
                    "'{}' is not a parameter rate (expected k or i)",
                    lexer.slice()
                ))
            }
            (_, _) => {
                return Err(format!(
                    "'{}' is not a jack rate (expected a or k)",
                    lexer.slice()
                ))
            }
        }
    }

    Ok(match head {
        SlotKind::Args => Directive::Args(args),
        kind => Directive::Ports(kind, ports),
    })
}

// ── Template ────────────────────────────────────────────────────────────────

/// A parsed template. Directives that were absent stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub type_id: u32,
    pub args: Option<Vec<ArgRate>>,
    pub inlets: Option<Vec<PortRate>>,
    pub outlets: Option<Vec<PortRate>>,
    pub body: String,
    pub origin: String,
}

impl Template {
    pub fn parse(type_id: u32, text: &str, origin: &str) -> Result<Template, TemplateError> {
        let mut template = Template {
            type_id,
            args: None,
            inlets: None,
            outlets: None,
            body: String::new(),
            origin: origin.to_string(),
        };
        let mut body_lines: Vec<&str> = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let Some(rest) = line.trim_start().strip_prefix(DIRECTIVE_PREFIX) else {
                body_lines.push(line);
                continue;
            };
            let syntax = |message: String| TemplateError::Syntax {
                origin: origin.to_string(),
                line: index + 1,
                message,
            };
            let directive = lex_directive(rest).map_err(syntax)?;
            let (kind, duplicate) = match directive {
                Directive::Args(rates) => (SlotKind::Args, template.args.replace(rates).is_some()),
                Directive::Ports(SlotKind::Inlets, rates) => {
                    (SlotKind::Inlets, template.inlets.replace(rates).is_some())
                }
                Directive::Ports(kind, rates) => (kind, template.outlets.replace(rates).is_some()),
            };
            if duplicate {
                return Err(syntax(format!("duplicate '{kind}' directive")));
            }
        }

        while body_lines.last().is_some_and(|l| l.trim().is_empty()) {
            body_lines.pop();
        }
        template.body = body_lines.join("\n");
        Ok(template)
    }

    /// Declared slot count of `kind`, zero when the directive is missing.
    pub fn slot_count(&self, kind: SlotKind) -> usize {
        match kind {
            SlotKind::Args => self.args.as_ref().map_or(0, Vec::len),
            SlotKind::Inlets => self.inlets.as_ref().map_or(0, Vec::len),
            SlotKind::Outlets => self.outlets.as_ref().map_or(0, Vec::len),
        }
    }

    /// Csound input signature: argument rates, then one `i` per bus slot.
    pub fn signature(&self) -> String {
        let mut sig: String = self
            .args
            .iter()
            .flatten()
            .map(|r| r.letter())
            .collect();
        let buses = self.slot_count(SlotKind::Inlets) + self.slot_count(SlotKind::Outlets);
        sig.extend(std::iter::repeat('i').take(buses));
        if sig.is_empty() {
            sig.push('0');
        }
        sig
    }

    /// The opcode definition, emitted once per module type.
    pub fn definition(&self, type_name: Option<&str>) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "; {} (type {})",
            type_name.unwrap_or("?"),
            self.type_id
        );
        let _ = writeln!(
            out,
            "opcode {}, 0, {}",
            opcode_name(self.type_id),
            self.signature()
        );
        if !self.body.is_empty() {
            let _ = writeln!(out, "{}", self.body);
        }
        let _ = writeln!(out, "endop");
        out
    }
}

pub fn opcode_name(type_id: u32) -> String {
    format!("Mod{type_id}")
}

/// One opcode call for `module`: parameter values, inlet buses, outlet buses.
pub fn invocation(module: &ModuleInstance, params: &[u8]) -> String {
    let args: Vec<String> = params
        .iter()
        .map(|v| v.to_string())
        .chain(module.inlet_buses.iter().map(|b| b.to_string()))
        .chain(module.outlet_buses.iter().map(|b| b.to_string()))
        .collect();
    let name = opcode_name(module.type_id);
    if args.is_empty() {
        name
    } else {
        format!("{} {}", name, args.join(", "))
    }
}

// ── Sources ─────────────────────────────────────────────────────────────────

/// Where templates come from, keyed by module type id.
pub trait TemplateSource {
    /// Load the template for `type_id`, or `TemplateError::NotFound`.
    fn load(&self, type_id: u32) -> Result<Template, TemplateError>;

    fn contains(&self, type_id: u32) -> bool;
}

/// A directory of `<type id>.txt` files.
#[derive(Debug, Clone)]
pub struct TemplateDir {
    root: PathBuf,
}

impl TemplateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TemplateDir { root: root.into() }
    }

    /// The templates shipped with the crate.
    pub fn bundled_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, type_id: u32) -> PathBuf {
        self.root.join(format!("{type_id}.txt"))
    }
}

impl TemplateSource for TemplateDir {
    fn load(&self, type_id: u32) -> Result<Template, TemplateError> {
        let path = self.path_for(type_id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::NotFound(type_id))
            }
            Err(e) => return Err(TemplateError::Io { path, source: e }),
        };
        debug!(path = %path.display(), "loaded template");
        Template::parse(type_id, &text, &path.display().to_string())
    }

    fn contains(&self, type_id: u32) -> bool {
        self.path_for(type_id).is_file()
    }
}

/// Templates held in memory.
#[derive(Debug, Clone, Default)]
pub struct InlineTemplates {
    texts: HashMap<u32, String>,
}

impl InlineTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, type_id: u32, text: impl Into<String>) -> Self {
        self.texts.insert(type_id, text.into());
        self
    }
}

impl TemplateSource for InlineTemplates {
    fn load(&self, type_id: u32) -> Result<Template, TemplateError> {
        let text = self
            .texts
            .get(&type_id)
            .ok_or(TemplateError::NotFound(type_id))?;
        Template::parse(type_id, text, &format!("<template {type_id}>"))
    }

    fn contains(&self, type_id: u32) -> bool {
        self.texts.contains_key(&type_id)
    }
}

// ── Template set ────────────────────────────────────────────────────────────

/// Templates loaded for the types of one patch.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: HashMap<u32, Template>,
    missing: Vec<u32>,
}

impl TemplateSet {
    /// Load a template for every type in `udos`. Types without a template are
    /// recorded as missing; other load failures abort.
    pub fn load(source: &dyn TemplateSource, udos: &UdoSet) -> Result<TemplateSet, TemplateError> {
        let mut set = TemplateSet::default();
        for type_id in udos.type_ids() {
            match source.load(type_id) {
                Ok(template) => {
                    set.templates.insert(type_id, template);
                }
                Err(TemplateError::NotFound(_)) => {
                    warn!(type_id, "no template for module type");
                    set.missing.push(type_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.type_id, template);
    }

    pub fn get(&self, type_id: u32) -> Option<&Template> {
        self.templates.get(&type_id)
    }

    /// Types of the patch that have no template, first-seen order.
    pub fn missing(&self) -> &[u32] {
        &self.missing
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
