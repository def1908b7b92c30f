//! Terminal front-end for the ossim operating-system simulator.
//!
//! This is the "collaborator" spec.md §6 describes: it owns the program
//! loader invocation, drives `step()` in a loop, and supplies the
//! `Callbacks`/`FileIo` ports. The core crates never know a terminal exists.

use clap::{Parser, ValueEnum};
use ossim_driver::{Callbacks, Pid, SchedulerConfig, SchedulerKind, System};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchedulerArg {
    Fcfs,
    Rr,
    Mlfq,
}

impl From<SchedulerArg> for SchedulerKind {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::Fcfs => SchedulerKind::Fcfs,
            SchedulerArg::Rr => SchedulerKind::RoundRobin,
            SchedulerArg::Mlfq => SchedulerKind::Mlfq,
        }
    }
}

/// Run one or more instruction-language programs against the simulator.
#[derive(Parser)]
#[command(name = "ossim", about = "A pedagogical operating-system simulator")]
struct Args {
    /// Scheduling discipline.
    #[arg(long, value_enum, default_value_t = SchedulerArg::Fcfs)]
    scheduler: SchedulerArg,

    /// Quantum charged per dispatch under Round Robin (ignored otherwise).
    #[arg(long, default_value_t = 2)]
    rr_quantum: i32,

    /// Maximum clock cycles to run before giving up (a safety valve; the
    /// driver itself has no notion of a deadline, see spec.md §5).
    #[arg(long, default_value_t = 10_000)]
    max_cycles: u64,

    /// Program files to load, in order, at clock 0.
    #[arg(required = true)]
    programs: Vec<PathBuf>,
}

/// Prints process output to stdout and answers `assign x input` by
/// prompting the attached terminal, per spec.md §6's callback surface.
struct TerminalCallbacks;

impl Callbacks for TerminalCallbacks {
    fn log_message(&mut self, text: &str) {
        log::info!("{text}");
    }

    fn process_output(&mut self, pid: Pid, text: &str) {
        println!("P{pid}: {text}");
    }

    fn request_input(&mut self, pid: Pid, var_name: &str) -> bool {
        print!("P{pid} requests input for '{var_name}': ");
        let _ = io::stdout().flush();
        true
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = SchedulerConfig::new(args.scheduler.into(), args.rr_quantum);
    let mut system = System::with_callbacks(config, Box::new(TerminalCallbacks));

    for path in &args.programs {
        if !system.load_program(path) {
            eprintln!("failed to load program: {}", path.display());
            std::process::exit(1);
        }
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let mut cycles = 0u64;
    while !system.is_simulation_complete() {
        if cycles >= args.max_cycles {
            eprintln!("simulation did not complete within {} cycles", args.max_cycles);
            std::process::exit(1);
        }
        if system.is_awaiting_input() {
            let value = lines.next().and_then(Result::ok).unwrap_or_default();
            system.provide_input(value.trim());
            continue;
        }
        system.step();
        cycles += 1;
    }

    println!("--- simulation complete after {} cycles ---", system.clock());
}
