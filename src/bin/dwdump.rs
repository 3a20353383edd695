//! Small companion tool: extracts the .debug_* sections from an object
//! file, runs the parser, and prints what landed in the symbol database.

use std::borrow::Cow;
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use memmap2::Mmap;
use object::{Object, ObjectSection};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

use dwarfdb::symbols::{DataKind, Symbol};
use dwarfdb::{parse, registers::X86, DwarfSections, Module};

#[derive(Parser)]
#[command(version, about = "dump DWARF 2 debug information from an object file", long_about = None)]
struct Cli {
    /// path to an object file carrying .debug_* sections
    path: PathBuf,

    /// load base added to every address
    #[arg(long, default_value_t = 0)]
    base: u64,

    /// list functions
    #[arg(long)]
    functions: bool,

    /// list types
    #[arg(long)]
    types: bool,

    /// list source files
    #[arg(long)]
    sources: bool,
}

#[derive(Tabled)]
struct FunctionRow {
    name: String,
    address: String,
    size: u64,
    params: usize,
    locals: usize,
    lines: usize,
}

#[derive(Tabled)]
struct TypeRow {
    kind: &'static str,
    name: String,
    size: String,
}

fn section<'a>(file: &object::File<'a>, name: &str) -> Option<Cow<'a, [u8]>> {
    file.section_by_name(name)
        .and_then(|s| s.uncompressed_data().ok())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let file = std::fs::File::open(&cli.path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let object = object::File::parse(&*mmap)?;

    let debug = section(&object, ".debug_info").ok_or("no .debug_info section")?;
    let abbrev = section(&object, ".debug_abbrev").ok_or("no .debug_abbrev section")?;
    let string = section(&object, ".debug_str").unwrap_or(Cow::Borrowed(&[]));
    let line = section(&object, ".debug_line");

    let name = cli
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    let mut module = Module::new(&name, cli.base);
    parse(
        &mut module,
        &[],
        &X86,
        DwarfSections {
            debug: &debug,
            abbrev: &abbrev,
            string: &string,
            line: line.as_deref(),
        },
    )?;

    let mut compilands = 0usize;
    let mut functions = Vec::new();
    let mut types = Vec::new();
    let mut globals = 0usize;
    for symbol in module.symbols() {
        match symbol {
            Symbol::Compiland(_) => compilands += 1,
            Symbol::Function(f) => functions.push(FunctionRow {
                name: f.name.clone(),
                address: format!("{:#010x}", f.address),
                size: f.size,
                params: f.locals.iter().filter(|l| l.kind == DataKind::Param).count(),
                locals: f.locals.len(),
                lines: f.lines.len(),
            }),
            Symbol::Variable(_) => globals += 1,
            Symbol::Basic(b) => types.push(TypeRow {
                kind: "basic",
                name: b.name.clone(),
                size: b.size.to_string(),
            }),
            Symbol::Typedef(t) => types.push(TypeRow {
                kind: "typedef",
                name: t.name.clone(),
                size: String::new(),
            }),
            Symbol::Enum(e) => types.push(TypeRow {
                kind: "enum",
                name: e.name.clone(),
                size: e.elements.len().to_string(),
            }),
            Symbol::Udt(u) => types.push(TypeRow {
                kind: "udt",
                name: u.name.clone(),
                size: u.size.to_string(),
            }),
            _ => (),
        }
    }
    println!(
        "{}: {} compilands, {} functions, {} globals, {} sources",
        module.name,
        compilands,
        functions.len(),
        globals,
        module.sources().len()
    );

    if cli.functions {
        let mut table = Table::new(functions);
        table.with(Style::psql());
        println!("{table}");
    }
    if cli.types {
        let mut table = Table::new(types);
        table.with(Style::psql());
        println!("{table}");
    }
    if cli.sources {
        for source in module.sources() {
            println!("{}", source.path);
        }
    }
    Ok(())
}
