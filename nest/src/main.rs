use clap::{Parser as ClapParser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process,
};

use heap::HeapSettings;
use nest::{Interpreter, Settings};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log every executed instruction
    #[arg(long, help = "Trace each instruction (interpreter log target)")]
    trace: bool,

    /// Disassemble before running
    #[arg(long, help = "Dump bytecode of every package function before running")]
    dump: bool,

    /// Live bytes that trigger the first collection
    #[arg(long, value_name = "BYTES")]
    heap_ceiling: Option<usize>,

    /// Saved register sets per invocation before a call is refused
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Nested invocations (natives calling back in) before a call is refused
    #[arg(long, value_name = "N")]
    max_nesting: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a package and run its main function
    Run { file: PathBuf },
    /// Disassemble every function in a package
    Disasm { file: PathBuf },
    /// Describe a global function defined by a package
    Info { file: PathBuf, name: String },
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.trace {
        logger.filter_module("nest::interpreter", log::LevelFilter::Trace);
    }
    logger.init();

    let mut settings = Settings::default();
    if let Some(ceiling) = cli.heap_ceiling {
        settings.heap = HeapSettings {
            initial_ceiling: ceiling,
            ..settings.heap
        };
    }
    if let Some(depth) = cli.max_depth {
        settings.max_call_depth = depth;
    }
    if let Some(nesting) = cli.max_nesting {
        settings.max_nesting = nesting;
    }
    if let Err(err) = settings.validate() {
        eprintln!("Invalid settings: {}", err);
        process::exit(1);
    }

    let mut interp = Interpreter::new(settings);
    let result = match &cli.command {
        Command::Run { file } => run(&mut interp, file, cli.dump),
        Command::Disasm { file } => disasm(&mut interp, file),
        Command::Info { file, name } => info(&mut interp, file, name),
    };
    if let Err(err) = result {
        eprintln!("Error: {}", err);
        match &err {
            nest::RuntimeError::Error(nest::ErrorInfo { value: Some(v), .. }) => {
                eprintln!("  value: {}", interp.format_value(*v));
            }
            nest::RuntimeError::Exception { data, .. } if !data.is_nil() => {
                eprintln!("  data: {}", interp.format_value(*data));
            }
            _ => {}
        }
        process::exit(1);
    }
}

fn run(interp: &mut Interpreter, file: &Path, dump: bool) -> nest::Result<()> {
    let package = interp.load_package_file(file)?;
    if dump {
        print_listing(interp, &package)?;
    }
    let value = interp.run_package(&package)?;
    println!("{}", interp.format_value(value));
    Ok(())
}

fn disasm(interp: &mut Interpreter, file: &Path) -> nest::Result<()> {
    let package = interp.load_package_file(file)?;
    print_listing(interp, &package)
}

fn info(interp: &mut Interpreter, file: &Path, name: &str) -> nest::Result<()> {
    interp.load_package_file(file)?;
    let sym = interp.intern(name);
    let Some(f) = interp.global_function(sym) else {
        return Err(nest::RuntimeError::with_value(
            nest::ErrorCode::UndefinedGlobalFunction,
            object::Value::Symbol(sym),
        ));
    };
    println!("{}:", name);
    print!("{}", interp.function_info(f)?);
    Ok(())
}

fn print_listing(interp: &Interpreter, package: &nest::package::Package) -> nest::Result<()> {
    for (name, f) in interp.package_functions(package) {
        println!("== {} ==", interp.symbol_name(name));
        print!("{}", interp.disassemble_function(f)?);
    }
    Ok(())
}
