//! Tokeniser and instruction handlers.
//!
//! `execute` fetches and runs exactly one instruction for one process. It
//! never loops and never advances the clock — that sequencing belongs to the
//! driver (§4.1). A handler either completes (advancing `pc`, possibly
//! waking a mutex waiter), blocks the process on a mutex, parks it awaiting
//! input, or faults it; a fault always terminates the process and is logged,
//! never propagated to the driver's caller.

use ossim_memory::Memory;
use ossim_mutex::{MutexFault, MutexSet, Resource, WaitOutcome};
use ossim_process::{Pcb, Pid, ProcessState};
use std::fmt;

/// Read content past this many bytes is truncated with a warning, mirroring
/// the fixed-size buffer the original file-read handler used.
pub const FILE_READ_TRUNCATE_BYTES: usize = 500;

/// Every way an instruction can fail. All variants terminate the offending
/// process; none unwind out of `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessFault {
    BadCommand,
    BadResource,
    IllegalSignal,
    VarMissing,
    VarStoreFull,
    FileIo,
    QueueOverflow,
    PcOutOfBounds,
    InputUnavailable,
}

impl fmt::Display for ProcessFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessFault::BadCommand => write!(f, "unknown opcode or arity mismatch"),
            ProcessFault::BadResource => write!(f, "unrecognised mutex name"),
            ProcessFault::IllegalSignal => write!(f, "semSignal by non-holder or on an unlocked mutex"),
            ProcessFault::VarMissing => write!(f, "read of undefined variable"),
            ProcessFault::VarStoreFull => write!(f, "no free variable slot remains"),
            ProcessFault::FileIo => write!(f, "file open/read/write failure"),
            ProcessFault::QueueOverflow => write!(f, "a ready queue or waiter queue is at capacity"),
            ProcessFault::PcOutOfBounds => write!(f, "computed instruction index is out of bounds"),
            ProcessFault::InputUnavailable => write!(f, "assign input used but no request_input callback is registered"),
        }
    }
}

impl std::error::Error for ProcessFault {}

impl From<MutexFault> for ProcessFault {
    fn from(fault: MutexFault) -> Self {
        match fault {
            MutexFault::IllegalSignal => ProcessFault::IllegalSignal,
            MutexFault::WaiterQueueFull => ProcessFault::QueueOverflow,
        }
    }
}

impl From<ossim_memory::VarStoreFull> for ProcessFault {
    fn from(_: ossim_memory::VarStoreFull) -> Self {
        ProcessFault::VarStoreFull
    }
}

/// The file-read/write collaborator (spec §4.5). Kept separate from
/// [`Callbacks`] since it is a synchronous data channel, not a notification.
pub trait FileIo {
    fn read(&mut self, filename: &str) -> std::io::Result<String>;
    fn write(&mut self, filename: &str, data: &str) -> std::io::Result<()>;
}

/// Reads and writes through the real filesystem.
#[derive(Debug, Default)]
pub struct StdFileIo;

impl FileIo for StdFileIo {
    fn read(&mut self, filename: &str) -> std::io::Result<String> {
        std::fs::read_to_string(filename)
    }

    fn write(&mut self, filename: &str, data: &str) -> std::io::Result<()> {
        std::fs::write(filename, data)
    }
}

/// The four notification hooks a front-end collaborator may supply (Design
/// Note "Callback hub → explicit port"). Every method has a default body, so
/// a collaborator implements only what it needs; the rest fall back to the
/// `log` facade (or, for `request_input`, to declining).
///
/// Lives here rather than in the driver crate because three of its four
/// methods are invoked from instruction handlers; the driver crate
/// re-exports this trait so collaborators only ever import it from one
/// place. `state_update` carries no `&System` parameter — a collaborator
/// that needs to inspect state after a step already holds the handle it
/// called `step` through.
pub trait Callbacks {
    fn log_message(&mut self, text: &str) {
        log::info!("{text}");
    }

    fn process_output(&mut self, pid: Pid, text: &str) {
        log::info!("P{pid} output: {text}");
    }

    /// Declines by default, modelling "no `request_input` callback
    /// registered" — the `input-unavailable` fault.
    fn request_input(&mut self, _pid: Pid, _var_name: &str) -> bool {
        false
    }

    fn state_update(&mut self) {}
}

/// A collaborator that answers every hook with its default body. Useful for
/// tests and as the base `System` starts with before a front-end registers.
#[derive(Debug, Default)]
pub struct NullCallbacks;

impl Callbacks for NullCallbacks {}

/// What running one instruction produced, from the driver's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The instruction completed and `pc` advanced; the process is still running.
    Advanced,
    /// `semWait` found the mutex held; the process is now `BLOCKED` and `pc` did not move.
    Blocked,
    /// `assign x input` registered a pending-input request; `pc` did not move.
    AwaitingInput(String),
    /// The process ended, either by running off the end of its program or by fault.
    Terminated,
}

/// The result of running one instruction: the process-level outcome, plus
/// the pid a `semSignal` woke, if any (the driver must re-enqueue it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub outcome: Outcome,
    pub woke: Option<Pid>,
}

enum Step {
    Advance(Option<Pid>),
    Blocked(Resource),
    AwaitInput(String),
}

/// Runs exactly one instruction for `pcb`. `priority` is the scheduling
/// priority the mutex subsystem should record if this process must block
/// (the MLFQ level, or 0 under FCFS/RR — computed by the scheduler and
/// passed in, so this crate never depends on scheduling policy).
pub fn execute(
    pcb: &mut Pcb,
    memory: &mut Memory,
    mutexes: &mut MutexSet,
    priority: i32,
    file_io: &mut dyn FileIo,
    callbacks: &mut dyn Callbacks,
) -> ExecResult {
    let pid = pcb.pid;
    let instruction_count = memory.instruction_count(pid);

    if pcb.pc >= instruction_count {
        pcb.state = ProcessState::Terminated;
        return ExecResult { outcome: Outcome::Terminated, woke: None };
    }

    let line = match memory.fetch_instruction(pid, pcb.pc) {
        Some(line) => line.to_string(),
        None => return fault(pcb, callbacks, ProcessFault::PcOutOfBounds),
    };

    match dispatch(pid, &line, memory, mutexes, priority, file_io, callbacks) {
        Err(f) => fault(pcb, callbacks, f),
        Ok(Step::Blocked(resource)) => {
            pcb.state = ProcessState::Blocked;
            pcb.blocked_on = Some(resource);
            ExecResult { outcome: Outcome::Blocked, woke: None }
        }
        Ok(Step::AwaitInput(var_name)) => ExecResult { outcome: Outcome::AwaitingInput(var_name), woke: None },
        Ok(Step::Advance(woke)) => {
            pcb.pc += 1;
            if pcb.pc >= memory.instruction_count(pid) {
                pcb.state = ProcessState::Terminated;
                ExecResult { outcome: Outcome::Terminated, woke }
            } else {
                ExecResult { outcome: Outcome::Advanced, woke }
            }
        }
    }
}

fn fault(pcb: &mut Pcb, callbacks: &mut dyn Callbacks, f: ProcessFault) -> ExecResult {
    callbacks.log_message(&format!("Error in P{}: {f}. Terminating.", pcb.pid));
    pcb.state = ProcessState::Terminated;
    ExecResult { outcome: Outcome::Terminated, woke: None }
}

fn dispatch(
    pid: Pid,
    line: &str,
    memory: &mut Memory,
    mutexes: &mut MutexSet,
    priority: i32,
    file_io: &mut dyn FileIo,
    callbacks: &mut dyn Callbacks,
) -> Result<Step, ProcessFault> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let Some(cmd) = fields.first().copied() else {
        return Ok(Step::Advance(None)); // blank or whitespace-only line: NOP
    };
    let args = &fields[1..];

    match cmd {
        "print" => do_print(pid, args, memory, callbacks),
        "assign" => do_assign(pid, args, memory, file_io, callbacks),
        "writeFile" => do_write_file(pid, args, memory, file_io, callbacks),
        "readFile" => do_read_file(pid, args, memory, file_io, callbacks),
        "printFromTo" => do_print_from_to(pid, args, memory, callbacks),
        "semWait" => do_sem_wait(pid, args, mutexes, priority),
        "semSignal" => do_sem_signal(pid, args, mutexes),
        _ => Err(ProcessFault::BadCommand),
    }
}

fn do_print(pid: Pid, args: &[&str], memory: &Memory, callbacks: &mut dyn Callbacks) -> Result<Step, ProcessFault> {
    let [name] = args else { return Err(ProcessFault::BadCommand) };
    let value = memory.get_variable(pid, name).ok_or(ProcessFault::VarMissing)?;
    callbacks.process_output(pid, value);
    Ok(Step::Advance(None))
}

fn do_assign(
    pid: Pid,
    args: &[&str],
    memory: &mut Memory,
    file_io: &mut dyn FileIo,
    callbacks: &mut dyn Callbacks,
) -> Result<Step, ProcessFault> {
    match args {
        [x, "input"] => {
            if callbacks.request_input(pid, x) {
                Ok(Step::AwaitInput((*x).to_string()))
            } else {
                Err(ProcessFault::InputUnavailable)
            }
        }
        [x, "readFile", y] => read_file_into(pid, y, Some(x), memory, file_io, callbacks),
        [x, v] => {
            memory.set_variable(pid, x, v)?;
            Ok(Step::Advance(None))
        }
        _ => Err(ProcessFault::BadCommand),
    }
}

fn do_write_file(
    pid: Pid,
    args: &[&str],
    memory: &Memory,
    file_io: &mut dyn FileIo,
    callbacks: &mut dyn Callbacks,
) -> Result<Step, ProcessFault> {
    let [file_var, data_var] = args else { return Err(ProcessFault::BadCommand) };
    let filename = memory.get_variable(pid, file_var).ok_or(ProcessFault::VarMissing)?.to_string();
    let data = memory.get_variable(pid, data_var).ok_or(ProcessFault::VarMissing)?.to_string();
    file_io.write(&filename, &data).map_err(|_| ProcessFault::FileIo)?;
    callbacks.log_message(&format!("P{pid} wrote to file '{filename}'"));
    Ok(Step::Advance(None))
}

fn do_read_file(
    pid: Pid,
    args: &[&str],
    memory: &mut Memory,
    file_io: &mut dyn FileIo,
    callbacks: &mut dyn Callbacks,
) -> Result<Step, ProcessFault> {
    let [file_var] = args else { return Err(ProcessFault::BadCommand) };
    read_file_into(pid, file_var, None, memory, file_io, callbacks)
}

/// Shared core of standalone `readFile y` and `assign x readFile y`: both
/// bind `file_<y>`; only the `assign` form also binds `x` (spec's retained
/// asymmetry, §9).
fn read_file_into(
    pid: Pid,
    file_var: &str,
    also_bind: Option<&str>,
    memory: &mut Memory,
    file_io: &mut dyn FileIo,
    callbacks: &mut dyn Callbacks,
) -> Result<Step, ProcessFault> {
    let filename = memory.get_variable(pid, file_var).ok_or(ProcessFault::VarMissing)?.to_string();
    let mut content = file_io.read(&filename).map_err(|_| ProcessFault::FileIo)?;
    if content.len() > FILE_READ_TRUNCATE_BYTES {
        truncate_utf8(&mut content, FILE_READ_TRUNCATE_BYTES);
        callbacks.log_message(&format!("Warning in P{pid}: file '{filename}' content truncated during read."));
    }
    let alias = format!("file_{file_var}");
    memory.set_variable(pid, &alias, &content)?;
    if let Some(x) = also_bind {
        memory.set_variable(pid, x, &content)?;
    }
    Ok(Step::Advance(None))
}

fn truncate_utf8(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

fn do_print_from_to(pid: Pid, args: &[&str], memory: &Memory, callbacks: &mut dyn Callbacks) -> Result<Step, ProcessFault> {
    let [a, b] = args else { return Err(ProcessFault::BadCommand) };
    let from: i64 = memory.get_variable(pid, a).ok_or(ProcessFault::VarMissing)?.parse().map_err(|_| ProcessFault::BadCommand)?;
    let to: i64 = memory.get_variable(pid, b).ok_or(ProcessFault::VarMissing)?.parse().map_err(|_| ProcessFault::BadCommand)?;
    if from <= to {
        for v in from..=to {
            callbacks.process_output(pid, &v.to_string());
        }
    } else {
        for v in (to..=from).rev() {
            callbacks.process_output(pid, &v.to_string());
        }
    }
    Ok(Step::Advance(None))
}

fn do_sem_wait(pid: Pid, args: &[&str], mutexes: &mut MutexSet, priority: i32) -> Result<Step, ProcessFault> {
    let [name] = args else { return Err(ProcessFault::BadCommand) };
    let resource = Resource::parse(name).ok_or(ProcessFault::BadResource)?;
    match mutexes.wait(resource, pid, priority)? {
        WaitOutcome::Acquired => Ok(Step::Advance(None)),
        WaitOutcome::Blocked => Ok(Step::Blocked(resource)),
    }
}

fn do_sem_signal(pid: Pid, args: &[&str], mutexes: &mut MutexSet) -> Result<Step, ProcessFault> {
    let [name] = args else { return Err(ProcessFault::BadCommand) };
    let resource = Resource::parse(name).ok_or(ProcessFault::BadResource)?;
    let woken = mutexes.signal(resource, pid)?;
    Ok(Step::Advance(woken))
}
