//! The `step()` driver: arrivals, quantum accounting, dispatch, and
//! instruction execution, in the fixed order spec'd for the simulator.
//!
//! `System` owns every subsystem (memory, mutexes, process table,
//! scheduler) and the two collaborator ports (`Callbacks`, `FileIo`). It is
//! the only place that mutates more than one subsystem per call; the
//! subsystem crates themselves never call each other.

use ossim_interpreter::{self as interp, Outcome};
use ossim_memory::Memory;
use ossim_mutex::MutexSet;
use ossim_process::{Pcb, ProcessState, ProcessTable, ReadySnapshot};
use ossim_scheduler::Scheduler;
use std::path::Path;

pub use ossim_interpreter::{Callbacks, FileIo, NullCallbacks, StdFileIo};
pub use ossim_memory::MemoryWord;
pub use ossim_mutex::{MutexSnapshot, Resource};
pub use ossim_process::{Pid, ProcessState as State};
pub use ossim_scheduler::{SchedulerConfig, SchedulerKind};
/// Older, shorter aliases kept for collaborators that spell them this way.
pub use ossim_scheduler::{SchedulerConfig as Config, SchedulerKind as Kind};

/// Program lines beyond this count are dropped (with a log) on load.
pub use ossim_memory::MAX_INSTRUCTIONS;
/// Program lines are truncated to this many characters on load.
pub use ossim_memory::MAX_LINE_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingInput {
    pid: Pid,
    var_name: String,
}

/// The whole simulated machine: arena, mutexes, process table, scheduler,
/// clock, and the two collaborator ports. Owned exclusively by whichever
/// thread calls `step`/`provide_input`/`load_program` (spec §5).
pub struct System {
    memory: Memory,
    mutexes: MutexSet,
    table: ProcessTable,
    scheduler: Scheduler,
    running_pid: Option<Pid>,
    clock: u64,
    pending_input: Option<PendingInput>,
    terminal: bool,
    callbacks: Box<dyn Callbacks>,
    file_io: Box<dyn FileIo>,
}

impl System {
    /// `initializeSystem` with a default (logging) callback set and real
    /// filesystem I/O.
    pub fn new(config: SchedulerConfig) -> Self {
        System::with_callbacks(config, Box::new(NullCallbacks))
    }

    pub fn with_callbacks(config: SchedulerConfig, callbacks: Box<dyn Callbacks>) -> Self {
        System {
            memory: Memory::new(),
            mutexes: MutexSet::new(),
            table: ProcessTable::new(),
            scheduler: Scheduler::new(config),
            running_pid: None,
            clock: 0,
            pending_input: None,
            terminal: false,
            callbacks,
            file_io: Box::new(StdFileIo),
        }
    }

    /// Swaps in a non-filesystem-backed collaborator (tests, sandboxed
    /// front-ends that want to intercept `readFile`/`writeFile`).
    pub fn with_file_io(mut self, file_io: Box<dyn FileIo>) -> Self {
        self.file_io = file_io;
        self
    }

    // ---- read-only accessors (spec §6) ----------------------------------

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn running_pid(&self) -> Option<Pid> {
        self.running_pid
    }

    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    pub fn pcb(&self, pid: Pid) -> Option<&Pcb> {
        self.table.get(pid)
    }

    pub fn instruction_count(&self, pid: Pid) -> usize {
        self.memory.instruction_count(pid)
    }

    pub fn variable(&self, pid: Pid, name: &str) -> Option<&str> {
        self.memory.get_variable(pid, name)
    }

    pub fn memory_words(&self) -> Vec<MemoryWord> {
        self.memory.words()
    }

    pub fn ready_snapshot(&self) -> ReadySnapshot {
        self.scheduler.ready_snapshot()
    }

    pub fn mutex_snapshot(&self) -> [MutexSnapshot; 3] {
        self.mutexes.snapshot_all()
    }

    pub fn scheduler_config(&self) -> &SchedulerConfig {
        self.scheduler.config()
    }

    /// Pure query of the terminal condition (spec §4.1): at least one
    /// process has ever been loaded and every PCB is `TERMINATED`. Computed
    /// fresh each call rather than from the cached flag `step` uses to
    /// short-circuit, so it stays correct even if called before `step` has
    /// had a chance to notice.
    pub fn is_simulation_complete(&self) -> bool {
        self.table.all_terminated()
    }

    /// Whether a `step` call right now would be a no-op because the
    /// simulator is paused on `assign x input`.
    pub fn is_awaiting_input(&self) -> bool {
        self.pending_input.is_some()
    }

    // ---- mutators (spec §6) ----------------------------------------------

    /// Parses a program file (one instruction per line, blank lines
    /// ignored, max [`MAX_INSTRUCTIONS`] lines, each truncated to
    /// [`MAX_LINE_LEN`] chars) and installs a new `NEW` PCB with
    /// `arrival_time = clock`. Returns `false` on any parse/allocation
    /// failure, without mutating the process table (spec §9's "driver
    /// centred" loader variant).
    pub fn load_program(&mut self, path: &Path) -> bool {
        let Ok(raw) = std::fs::read_to_string(path) else {
            self.callbacks.log_message(&format!("Failed to open program file '{}'.", path.display()));
            return false;
        };

        let mut lines: Vec<String> = raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                let mut s = l.to_string();
                s.truncate(MAX_LINE_LEN);
                s
            })
            .collect();

        if lines.len() > MAX_INSTRUCTIONS {
            self.callbacks.log_message(&format!(
                "Program file '{}' has {} instructions; truncating to {}.",
                path.display(),
                lines.len(),
                MAX_INSTRUCTIONS
            ));
            lines.truncate(MAX_INSTRUCTIONS);
        }

        if self.table.is_full() {
            self.callbacks.log_message("Cannot load program: process table is full.");
            return false;
        }

        let program_number = program_number_for(path);
        let Some(pid) = self.memory.install_process(lines) else {
            self.callbacks.log_message(&format!("Cannot load program '{}': memory arena is full.", path.display()));
            return false;
        };
        let region = *self.memory.region(pid).expect("just installed");

        match self.table.spawn(program_number, region.lb, region.ub, self.clock) {
            Ok(spawned) => {
                debug_assert_eq!(spawned, pid, "memory and process table pid streams must stay in lockstep");
                self.callbacks.log_message(&format!("Loaded '{}' as P{pid} (program {program_number}).", path.display()));
                true
            }
            Err(_) => {
                // Process table couldn't accept the PCB even though memory had
                // room; the arena region is wasted (spec's arena never
                // reclaims), but no half-formed process is left in the table.
                self.callbacks.log_message(&format!("Cannot load program '{}': process table is full.", path.display()));
                false
            }
        }
    }

    /// Delivers the value the collaborator was asked for via
    /// `request_input`. A no-op if nothing is pending. Binds the variable,
    /// advances the interpreted PC exactly once (terminating the process if
    /// that runs it off the end of its program), and clears the pause so the
    /// next `step` runs a full cycle.
    pub fn provide_input(&mut self, value: &str) {
        let Some(pending) = self.pending_input.take() else {
            return;
        };
        let pid = pending.pid;

        let Some(pcb) = self.table.get_mut(pid) else {
            return;
        };
        match self.memory.set_variable(pid, &pending.var_name, value) {
            Ok(()) => {
                pcb.pc += 1;
                if pcb.pc >= self.memory.instruction_count(pid) {
                    pcb.state = ProcessState::Terminated;
                    if self.running_pid == Some(pid) {
                        self.running_pid = None;
                    }
                    self.cleanup_mutexes_on_terminate(pid);
                }
            }
            Err(_) => {
                pcb.state = ProcessState::Terminated;
                if self.running_pid == Some(pid) {
                    self.running_pid = None;
                }
                self.callbacks.log_message(&format!("Error in P{pid}: no free variable slot remains. Terminating."));
                self.cleanup_mutexes_on_terminate(pid);
            }
        }
    }

    /// Advances one simulated clock cycle: arrivals, quantum check,
    /// dispatch, execute, clock++, terminal check, in that fixed order
    /// (spec §4.1). A no-op once the simulation is terminal. Paused (and
    /// does not advance the clock) while `pending_input` is set on entry.
    pub fn step(&mut self) {
        if self.terminal {
            return;
        }
        self.table.reset_unblocked_flags();

        if self.pending_input.is_some() {
            return;
        }

        self.callbacks.log_message(&format!("--- cycle {} ---", self.clock));

        self.do_arrivals();
        self.quantum_check();
        self.dispatch_if_idle();
        self.execute_if_running();

        self.clock += 1;

        if !self.terminal && self.table.all_terminated() {
            self.terminal = true;
            self.callbacks.log_message("Simulation complete: all processes terminated.");
            self.callbacks.state_update();
        }
    }

    // ---- internal phases ---------------------------------------------------

    fn do_arrivals(&mut self) {
        let clock = self.clock;
        let arriving: Vec<Pid> = self
            .table
            .iter()
            .filter(|p| p.state == ProcessState::New && p.arrival_time <= clock)
            .map(|p| p.pid)
            .collect();
        if arriving.is_empty() {
            return;
        }
        for pid in arriving {
            if let Some(pcb) = self.table.get_mut(pid) {
                pcb.mlfq_level = 0;
                pcb.priority = 0;
            }
            if self.scheduler.enqueue_ready(&mut self.table, pid).is_err() {
                if let Some(pcb) = self.table.get_mut(pid) {
                    pcb.state = ProcessState::Terminated;
                }
                self.callbacks.log_message(&format!("Error in P{pid}: ready queue overflow on arrival. Terminating."));
            }
        }
        self.callbacks.state_update();
    }

    fn quantum_check(&mut self) {
        let Some(pid) = self.running_pid else { return };
        let Some(state) = self.table.get(pid).map(|p| p.state) else {
            self.running_pid = None;
            return;
        };
        if state != ProcessState::Running {
            self.running_pid = None;
            return;
        }

        let kind = self.scheduler.config().kind;
        if !matches!(kind, SchedulerKind::RoundRobin | SchedulerKind::Mlfq) {
            return;
        }
        let quantum_remaining = self.table.get(pid).map(|p| p.quantum_remaining).unwrap_or(0);
        if quantum_remaining > 0 {
            return;
        }

        let level = self.table.get(pid).map(|p| p.mlfq_level).unwrap_or(0);
        if let Some(pcb) = self.table.get_mut(pid) {
            pcb.state = ProcessState::Ready;
            if kind == SchedulerKind::Mlfq {
                pcb.mlfq_level = Scheduler::demote(level);
            }
        }
        if self.scheduler.enqueue_ready(&mut self.table, pid).is_err() {
            if let Some(pcb) = self.table.get_mut(pid) {
                pcb.state = ProcessState::Terminated;
            }
            self.callbacks.log_message(&format!("Error in P{pid}: ready queue overflow on requeue. Terminating."));
            self.cleanup_mutexes_on_terminate(pid);
        }
        self.running_pid = None;
    }

    fn dispatch_if_idle(&mut self) {
        if self.running_pid.is_some() {
            return;
        }
        let Some(pid) = self.scheduler.dispatch(&self.table) else {
            return;
        };
        let level = self.table.get(pid).map(|p| p.mlfq_level).unwrap_or(0);
        let kind = self.scheduler.config().kind;
        let quantum = self.scheduler.quantum_for(level);
        if let Some(pcb) = self.table.get_mut(pid) {
            pcb.state = ProcessState::Running;
            if matches!(kind, SchedulerKind::RoundRobin | SchedulerKind::Mlfq) {
                pcb.quantum_remaining = quantum;
            }
        }
        self.running_pid = Some(pid);
    }

    fn execute_if_running(&mut self) {
        let Some(pid) = self.running_pid else { return };
        if self.table.get(pid).map(|p| p.state) != Some(ProcessState::Running) {
            return;
        }

        let kind = self.scheduler.config().kind;
        let priority = self.scheduler.priority_of(self.table.get(pid).unwrap());

        let result = {
            let System { table, memory, mutexes, file_io, callbacks, .. } = self;
            let pcb = table.get_mut(pid).expect("checked Running above");
            if matches!(kind, SchedulerKind::RoundRobin | SchedulerKind::Mlfq) {
                pcb.quantum_remaining -= 1;
            }
            interp::execute(pcb, memory, mutexes, priority, file_io.as_mut(), callbacks.as_mut())
        };

        match result.outcome {
            Outcome::Advanced => {}
            Outcome::Blocked => {
                self.running_pid = None;
            }
            Outcome::AwaitingInput(var_name) => {
                self.pending_input = Some(PendingInput { pid, var_name });
            }
            Outcome::Terminated => {
                self.running_pid = None;
                self.cleanup_mutexes_on_terminate(pid);
            }
        }

        if let Some(woken) = result.woke {
            self.unblock_and_requeue(woken);
        }
    }

    /// Spec §9's resolved open question: on termination, release any mutex
    /// this pid still held and wake one waiter per released mutex, so a
    /// process that dies mid-critical-section doesn't wedge every future
    /// waiter forever.
    fn cleanup_mutexes_on_terminate(&mut self, pid: Pid) {
        for r in Resource::ALL {
            if let Some(woken) = self.mutexes.release_if_holder(r, pid) {
                self.unblock_and_requeue(woken);
            }
        }
    }

    /// Common tail of `semSignal` and termination cleanup: marks the woken
    /// pid `READY` and enqueues it into the structure its recorded priority
    /// calls for (spec §4.3 `unblock`).
    fn unblock_and_requeue(&mut self, pid: Pid) {
        if let Some(pcb) = self.table.get_mut(pid) {
            pcb.blocked_on = None;
            pcb.unblocked_this_cycle = true;
        }
        if self.scheduler.enqueue_ready(&mut self.table, pid).is_err() {
            if let Some(pcb) = self.table.get_mut(pid) {
                pcb.state = ProcessState::Terminated;
            }
            self.callbacks.log_message(&format!("Error in P{pid}: ready queue overflow on unblock. Terminating."));
            self.cleanup_mutexes_on_terminate(pid);
        }
    }

    /// Checks invariants I1-I7 (spec §3). Intended for `#[cfg(test)]` and
    /// property tests, not the hot path — kept as a plain method (not
    /// gated behind `cfg(test)`) so integration tests in this crate's
    /// `tests/` directory, which compile the crate as an external
    /// dependency, can still call it.
    pub fn debug_assert_invariants(&self) {
        let running_count = self.table.iter().filter(|p| p.state == ProcessState::Running).count();
        assert!(running_count <= 1, "I1: at most one PCB may be RUNNING");
        assert_eq!(
            self.running_pid.is_some(),
            running_count == 1,
            "I1: running_pid must be set iff a RUNNING PCB exists"
        );
        if let Some(pid) = self.running_pid {
            assert_eq!(self.table.get(pid).map(|p| p.state), Some(ProcessState::Running));
        }

        for pcb in self.table.iter() {
            match pcb.state {
                ProcessState::Blocked => {
                    assert!(pcb.blocked_on.is_some(), "I4: a BLOCKED pcb must record blocked_on");
                }
                ProcessState::New | ProcessState::Running => {
                    assert!(pcb.blocked_on.is_none());
                }
                _ => {}
            }
            assert!(pcb.pc <= self.memory.instruction_count(pcb.pid), "I6: pc must stay in bounds");
            assert!(pcb.lb <= pcb.ub, "I6: region bounds must be ordered");
        }

        for r in Resource::ALL {
            let snap = self.mutexes.snapshot(r);
            assert_eq!(snap.locked, snap.holder.is_some(), "I5: locked iff holder is set");
            if let Some(holder) = snap.holder {
                assert!(!snap.waiters.contains(&holder), "I5: holder must not also be a waiter");
            }
        }
    }
}

fn program_number_for(path: &Path) -> u32 {
    match path.file_name().and_then(|n| n.to_str()) {
        Some("Program_1.txt") => 1,
        Some("Program_2.txt") => 2,
        Some("Program_3.txt") => 3,
        _ => 0,
    }
}
