use clap::Parser;
use std::path::{Path, PathBuf};

use g2csd::catalog::Catalog;
use g2csd::codegen::CodegenOptions;
use g2csd::parser;
use g2csd::pipeline;
use g2csd::report;
use g2csd::template::TemplateDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    Csd,
    Tables,
    Graph,
    Status,
}

#[derive(Parser, Debug)]
#[command(
    name = "g2csd",
    version,
    about = "Converts Nord Modular G2 patches (.pch2) to Csound (.csd)"
)]
struct Cli {
    /// Patch file, or a module type id with --check-udo
    arg: Option<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Csd)]
    emit: EmitStage,

    /// Print the module and cable tables (same as --emit tables)
    #[arg(short, long, conflicts_with = "check_udo")]
    print: bool,

    /// Validate the template of one module type
    #[arg(short, long)]
    check_udo: bool,

    /// Output file path (default: input path with .csd appended)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Template directory
    #[arg(long, env = "G2CSD_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Module catalog JSON (default: built-in)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Sample rate
    #[arg(long, default_value_t = 96000)]
    sr: u32,

    /// Samples per control period
    #[arg(long, default_value_t = 16)]
    ksmps: u32,

    /// Number of output channels
    #[arg(long, default_value_t = 2)]
    nchnls: u32,

    /// Score duration in seconds
    #[arg(long, default_value_t = 3600)]
    duration: u32,

    /// Convert even if some module types have no template
    #[arg(long)]
    allow_unimplemented: bool,

    /// Refuse to write output when a template fails validation
    #[arg(long)]
    strict: bool,

    /// Debug logging on stderr
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // ── Load catalog and templates ──
    let catalog = match &cli.catalog {
        Some(path) => Catalog::load(path),
        None => Catalog::builtin(),
    };
    let catalog = match catalog {
        Ok(c) => c,
        Err(e) => {
            eprintln!("g2csd: error: {}", e);
            std::process::exit(2);
        }
    };
    let templates = TemplateDir::new(
        cli.templates
            .clone()
            .unwrap_or_else(TemplateDir::bundled_root),
    );
    tracing::debug!(
        types = catalog.len(),
        templates = %templates.root().display(),
        "loaded catalog"
    );

    if cli.check_udo {
        let arg = require_arg(&cli, "a module type id");
        let Ok(type_id) = arg.parse::<u32>() else {
            eprintln!("g2csd: error: --check-udo expects an integer type id, got '{}'", arg);
            std::process::exit(2);
        };
        let (text, valid) = report::render_check(&catalog, &templates, type_id);
        print!("{}", text);
        std::process::exit(if valid { 0 } else { 1 });
    }

    let emit = if cli.print { EmitStage::Tables } else { cli.emit };
    match emit {
        EmitStage::Status => {
            let text = report::status_markdown(&catalog, &templates);
            match &cli.output {
                Some(path) => write_or_exit(path, &text),
                None => print!("{}", text),
            }
        }
        EmitStage::Tables | EmitStage::Graph => {
            let input = PathBuf::from(require_arg(&cli, "a patch file"));
            let graph = match parser::parse(&catalog, &input) {
                Ok(g) => g,
                Err(e) => exit_with(&g2csd::error::Error::from(e)),
            };
            if emit == EmitStage::Tables {
                let name = input.file_name().unwrap_or_default().to_string_lossy();
                println!("Patch file: {}\n", name);
                print!("{}", report::render_tables(&graph));
            } else {
                match serde_json::to_string_pretty(&graph) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("g2csd: error: {}", e);
                        std::process::exit(2);
                    }
                }
            }
        }
        EmitStage::Csd => convert(&cli, &catalog, &templates),
    }
}

fn convert(cli: &Cli, catalog: &Catalog, templates: &TemplateDir) {
    let input = PathBuf::from(require_arg(cli, "a patch file"));
    let options = CodegenOptions {
        sample_rate: cli.sr,
        ksmps: cli.ksmps,
        nchnls: cli.nchnls,
        duration: cli.duration,
    };

    let conversion = match pipeline::prepare(catalog, &input, templates, &options) {
        Ok(c) => c,
        Err(e) => exit_with(&e),
    };
    let compiled = &conversion.compiled;
    for diag in &compiled.graph.diagnostics {
        eprintln!("g2csd: {}", diag);
    }

    // ── Gating ──
    if !compiled.missing().is_empty() && !cli.allow_unimplemented {
        let names: Vec<String> = compiled
            .udos
            .iter()
            .filter(|u| compiled.missing().contains(&u.type_id))
            .map(|u| match &u.name {
                Some(name) => format!("{} ({})", name, u.type_id),
                None => format!("type {}", u.type_id),
            })
            .collect();
        eprintln!("g2csd: error: the patch contains modules that have no template yet:");
        eprintln!("g2csd:   {}", names.join(", "));
        let unknown = compiled.graph.unknown_types();
        if !unknown.is_empty() {
            let ids: Vec<String> = unknown.iter().map(u32::to_string).collect();
            eprintln!("g2csd: not in the module catalog: {}", ids.join(", "));
        }
        eprintln!("g2csd: pass --allow-unimplemented to convert anyway");
        std::process::exit(1);
    }
    if compiled.has_invalid() {
        for v in compiled.invalid() {
            for diag in v.diagnostics() {
                eprintln!("g2csd: template {}.txt: {}", v.type_id, diag);
            }
        }
        if cli.strict {
            std::process::exit(1);
        }
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| pipeline::output_path(&input));
    if let Err(e) = conversion.write(&output) {
        exit_with(&e);
    }
    if cli.verbose {
        eprintln!("g2csd: wrote {}", output.display());
    }
}

fn require_arg<'a>(cli: &'a Cli, what: &str) -> &'a str {
    match cli.arg.as_deref() {
        Some(arg) => arg,
        None => {
            eprintln!("g2csd: error: expected {} argument", what);
            std::process::exit(2);
        }
    }
}

fn write_or_exit(path: &Path, text: &str) {
    if let Err(e) = std::fs::write(path, text) {
        eprintln!("g2csd: error: {}: {}", path.display(), e);
        std::process::exit(2);
    }
}

fn exit_with(e: &g2csd::error::Error) -> ! {
    eprintln!("g2csd: error: {}", e);
    std::process::exit(if e.is_io() { 2 } else { 1 });
}
