//! Sim68k - CLI Entry Point
//!
//! Commands:
//! - `sim68k run <image.68b>` - Run a program image until it halts
//! - `sim68k disasm <image.68b>` - Disassemble a program image

use clap::{Parser, Subcommand};
use sim68k::asm::disasm::{disassemble, disassemble_instruction};
use sim68k::{load_image, Cpu, ProgramImage};

#[derive(Parser)]
#[command(name = "sim68k")]
#[command(version = "0.1.0")]
#[command(about = "A cycle-level simulator of a simplified 68000-style CPU")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the .68b image to execute
        program: String,
        /// Maximum number of cycles to run
        #[arg(short, long, default_value = "100000")]
        max_cycles: u64,
        /// Show each executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Print the final machine state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Disassemble a .68b image to readable text
    Disasm {
        /// Path to the .68b image
        image: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { program, max_cycles, trace, json } => {
            run_program(&program, max_cycles, trace, json);
        }
        Commands::Disasm { image } => {
            disassemble_file(&image);
        }
    }
}

fn open_image(path: &str) -> ProgramImage {
    match load_image(path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Can't load '{}': {}", path, e);
            std::process::exit(1);
        }
    }
}

fn run_program(path: &str, max_cycles: u64, trace: bool, json: bool) {
    let image = open_image(path);

    let mut cpu = Cpu::new();
    match image.load_into(&mut cpu) {
        Ok(len) if !json => println!("Program loaded. {} bytes in memory.\n", len),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Failed to load program: {}", e);
            std::process::exit(1);
        }
    }

    let mut cycles = 0u64;
    while !cpu.is_halted() && cycles < max_cycles {
        let pc = cpu.regs.pc;
        cpu.step();
        cycles += 1;

        if trace {
            if let Some(instr) = cpu.last_instruction() {
                eprintln!("{:04X}: {}", pc, disassemble_instruction(&instr));
            }
        }
    }

    let snapshot = cpu.snapshot();
    if json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to serialize machine state: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!();
        println!("━━━ Result ━━━");
        println!("{}", snapshot);
    }

    if !cpu.is_halted() {
        eprintln!();
        eprintln!("Reached max cycles limit ({}). Use --max-cycles to increase.", max_cycles);
    }

    if snapshot.fault.is_some() {
        std::process::exit(2);
    }
}

fn disassemble_file(path: &str) {
    let image = open_image(path);
    print!("{}", disassemble(&image.bytes));
}
