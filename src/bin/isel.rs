//! Command-line driver: textual IR in, ARM assembly, hex or ELF object out.
//!
//! Register allocation is not done here. Units that still reference virtual
//! registers can only be assembled when every one of them is mapped with
//! `--assign N=REG` (`%vN` in the listing).

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use hashbrown::HashMap;
use isel::arm::{registers::GENERAL, Arm, ArmOptions};
use isel::codegen::{select_function, Target};
use isel::core::{AsmReg, MachineCode, ObjectWriter, Unit, VirtualReg};
use isel::ir::parser::parse_ir;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::exit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Assembly listing with literal pool.
    Asm,
    /// Encoded bytes and relocations.
    Hex,
    /// ELF relocatable object.
    Obj,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Select and encode ARM code for textual IR", long_about = None)]
struct Args {
    /// IR file; stdin when omitted.
    input: Option<PathBuf>,

    /// Output file; stdout when omitted (required for `obj`).
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "asm")]
    emit: Emit,

    /// Use sdiv/udiv instead of runtime division calls.
    #[arg(long)]
    hw_div: bool,

    /// Only compile the named function.
    #[arg(short, long)]
    function: Option<String>,

    /// Physical register for virtual register N, as `N=REG`.
    #[arg(long = "assign", value_name = "N=REG")]
    assignments: Vec<String>,

    /// Print unit statistics to stderr.
    #[arg(long)]
    stats: bool,
}

fn parse_assignments(target: &Arm, specs: &[String]) -> Result<HashMap<VirtualReg, AsmReg>, String> {
    let mut map = HashMap::new();
    for spec in specs {
        let (index, name) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected N=REG, got `{}`", spec))?;
        let index: u32 = index
            .trim_start_matches("%v")
            .parse()
            .map_err(|_| format!("bad virtual register `{}`", index))?;
        let reg = target
            .register_names()
            .parse_register(name)
            .ok_or_else(|| format!("unknown register `{}`", name))?;
        map.insert(VirtualReg { bank: GENERAL, index }, reg);
    }
    Ok(map)
}

fn hex_listing(unit: &Unit, code: &MachineCode) -> String {
    let mut out = format!("{}:\n", unit.name);
    for (offset, word) in code.code.chunks(4).enumerate() {
        let bytes: Vec<String> = word.iter().map(|b| format!("{:02x}", b)).collect();
        out.push_str(&format!("  {:04x}: {}\n", offset * 4, bytes.join(" ")));
    }
    for reloc in &code.relocations {
        out.push_str(&format!("  reloc {:04x} {} {}\n", reloc.offset, reloc.kind.name, reloc.symbol));
    }
    out
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let text = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let target = Arm::new(ArmOptions {
        hardware_divide: args.hw_div,
    })?;
    let arena = Bump::new();
    let functions = parse_ir(&text, &arena, target.register_names(), GENERAL)?;
    log::info!("parsed {} functions", functions.len());

    let mut units = Vec::new();
    for function in &functions {
        if args.function.as_deref().is_some_and(|name| name != function.name) {
            continue;
        }
        let unit = select_function(&target, function)?;
        if args.stats {
            eprintln!("{}:\n{}", unit.name, unit.stats);
        }
        units.push(unit);
    }
    if units.is_empty() {
        return Err("no function selected".into());
    }

    let assignment = parse_assignments(&target, &args.assignments)?;
    let output = match args.emit {
        Emit::Asm => units
            .iter()
            .map(|unit| unit.render(target.register_names()))
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes(),
        Emit::Hex => {
            let mut listing = String::new();
            for unit in &units {
                let code = unit.assemble(&target, &assignment)?;
                listing.push_str(&hex_listing(unit, &code));
            }
            listing.into_bytes()
        }
        Emit::Obj => {
            let mut writer = ObjectWriter::new(&target);
            for unit in &units {
                writer.add_unit(unit.assemble(&target, &assignment)?)?;
            }
            writer.finish()?
        }
    };

    match &args.output {
        Some(path) => fs::write(path, output)?,
        None if args.emit == Emit::Obj => return Err("--emit obj needs --output".into()),
        None => io::stdout().write_all(&output)?,
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {}", err);
        exit(1);
    }
}
