use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use pcc::bytecode::disasm::{print_program, print_stats};
use pcc::frontend::token_dumper::TokenDumper;
use pcc::{Program, RuntimeError, Vm, VmConfig, compile};

/// pcc - compile a small C subset to bytecode and run it
#[derive(Parser, Debug)]
#[command(name = "pcc")]
#[command(about = "Compile and run a C subset program on a bytecode VM", long_about = None)]
struct Args {
    /// Source file (or bytecode image with --image)
    file: PathBuf,

    /// Show tokens only
    #[arg(long)]
    tokens: bool,

    /// Disable colors in the token listing
    #[arg(long)]
    no_color: bool,

    /// Print the disassembly before running
    #[arg(long)]
    bc: bool,

    /// Print opcode statistics before running
    #[arg(long)]
    stats: bool,

    /// Compile only
    #[arg(long)]
    no_run: bool,

    /// Write the compiled program image to PATH
    #[arg(long, value_name = "PATH")]
    emit: Option<PathBuf>,

    /// FILE is a compiled image written by --emit
    #[arg(long)]
    image: bool,

    /// VM stack size in bytes
    #[arg(long, default_value_t = VmConfig::default().stack_size)]
    stack_size: usize,

    /// VM heap size in bytes
    #[arg(long, default_value_t = VmConfig::default().heap_size)]
    heap_size: usize,

    /// Abort after this many instructions
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Log declarations and functions as they are compiled
    #[arg(short, long)]
    verbose: bool,

    /// Log every executed instruction
    #[arg(long)]
    trace: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    if args.tokens {
        let source = read_source(&args.file);
        let mut dumper = TokenDumper::new();
        if args.no_color {
            dumper = dumper.no_color();
        }
        if let Err(e) = dumper.dump(&source) {
            eprintln!("Lexer error: {}", e);
            process::exit(1);
        }
        return;
    }

    let program = if args.image {
        load_image(&args.file)
    } else {
        let source = read_source(&args.file);
        match compile(&source) {
            Ok(program) => program,
            Err(e) => {
                eprintln!("{}: {}", args.file.display(), e);
                process::exit(1);
            }
        }
    };

    if let Some(path) = &args.emit {
        write_image(&program, path);
    }

    if args.bc {
        print_program(&program);
    }
    if args.stats {
        print_stats(&program);
    }
    if args.no_run {
        return;
    }

    let config = VmConfig {
        stack_size: args.stack_size,
        heap_size: args.heap_size,
        max_cycles: args.max_cycles,
    };
    let mut vm = Vm::new(config);
    match vm.run(&program) {
        Ok(code) => process::exit(code as i32),
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            process::exit(RuntimeError::EXIT_STATUS);
        }
    }
}

fn init_logging(args: &Args) {
    // -v / --trace override RUST_LOG; otherwise default to WARN
    let filter = if args.trace {
        EnvFilter::new("trace")
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_source(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => {
            debug!(path = %path.display(), bytes = bytes.len(), "read source");
            String::from_utf8_lossy(&bytes).into_owned()
        }
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn load_image(path: &Path) -> Program {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path.display(), e);
            process::exit(1);
        }
    };
    match Program::from_bytes(&bytes) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn write_image(program: &Program, path: &Path) {
    let bytes = match program.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    if let Err(e) = fs::write(path, &bytes) {
        eprintln!("Failed to write '{}': {}", path.display(), e);
        process::exit(1);
    }
    debug!(path = %path.display(), bytes = bytes.len(), "wrote image");
}
