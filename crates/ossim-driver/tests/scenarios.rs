//! End-to-end scenarios, exercised only through the public `System` API —
//! the same surface `ossim-cli` and any other front-end collaborator sees.

use ossim_driver::{Callbacks, FileIo, Pid, Resource, SchedulerConfig, SchedulerKind, State, System};
use std::collections::HashMap;
use std::io::Write;

fn fcfs(quantum: i32) -> SchedulerConfig {
    SchedulerConfig::new(SchedulerKind::Fcfs, quantum)
}

fn round_robin(quantum: i32) -> SchedulerConfig {
    SchedulerConfig::new(SchedulerKind::RoundRobin, quantum)
}

fn mlfq() -> SchedulerConfig {
    SchedulerConfig::new(SchedulerKind::Mlfq, 1)
}

fn write_program(dir: &tempfile::TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    path
}

#[derive(Default)]
struct RecordingCallbacks {
    output: Vec<(Pid, String)>,
    logs: Vec<String>,
    grant_input: bool,
}

impl Callbacks for RecordingCallbacks {
    fn log_message(&mut self, text: &str) {
        self.logs.push(text.to_string());
    }
    fn process_output(&mut self, pid: Pid, text: &str) {
        self.output.push((pid, text.to_string()));
    }
    fn request_input(&mut self, _pid: Pid, _var_name: &str) -> bool {
        self.grant_input
    }
}

struct FakeFileIo(HashMap<String, String>);

impl FileIo for FakeFileIo {
    fn read(&mut self, filename: &str) -> std::io::Result<String> {
        self.0
            .get(filename)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
    }
    fn write(&mut self, filename: &str, data: &str) -> std::io::Result<()> {
        self.0.insert(filename.to_string(), data.to_string());
        Ok(())
    }
}

fn run_to_completion(sys: &mut System, max_cycles: u32) {
    for _ in 0..max_cycles {
        if sys.is_simulation_complete() {
            return;
        }
        sys.step();
    }
    assert!(sys.is_simulation_complete(), "simulation did not complete within {max_cycles} cycles");
}

/// Scenario 1 — FCFS print-only: `x` is bound by an `assign` before the
/// program ever runs `print x` (the only collaborator-free way to pre-bind a
/// variable through the public API), and the single process runs to
/// completion without ever contending for anything.
#[test]
fn fcfs_print_only_prints_the_bound_value_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "Program_1.txt", &["assign x hi", "print x"]);
    let mut sys = System::with_callbacks(fcfs(1), Box::new(RecordingCallbacks::default()));
    assert!(sys.load_program(&path));

    run_to_completion(&mut sys, 10);
    assert!(sys.is_simulation_complete());
}

/// Scenario 2 — Round Robin time-slicing: two 3-NOP processes, quantum 2.
/// Dispatch alternates once each quantum is exhausted; both terminate.
#[test]
fn round_robin_alternates_dispatch_once_per_exhausted_quantum() {
    let dir = tempfile::tempdir().unwrap();
    let p1 = write_program(&dir, "Program_1.txt", &["assign a 1", "assign a 2", "assign a 3"]);
    let p2 = write_program(&dir, "Program_2.txt", &["assign a 1", "assign a 2", "assign a 3"]);
    let mut sys = System::new(round_robin(2));
    assert!(sys.load_program(&p1));
    assert!(sys.load_program(&p2));

    let mut dispatch_trace = Vec::new();
    let mut last_running = None;
    for _ in 0..20 {
        if sys.is_simulation_complete() {
            break;
        }
        sys.step();
        let running = sys.running_pid();
        if running.is_some() && running != last_running {
            dispatch_trace.push(running.unwrap());
        }
        last_running = running;
    }

    assert!(sys.is_simulation_complete());
    // Each process's final quantum also runs its terminating instruction,
    // so that dispatch never shows up as a *running* pid afterward — only
    // the two quantum-surviving dispatches are observable this way.
    assert_eq!(dispatch_trace, vec![0, 1]);
}

/// Scenario 3 — MLFQ demotion: a process that never blocks walks down
/// through every level and stays at the bottom.
#[test]
fn mlfq_process_that_never_blocks_demotes_through_every_level() {
    let dir = tempfile::tempdir().unwrap();
    // Quanta are {1, 2, 4, 8}; ten instructions forces a demotion out of
    // every level (1 + 2 + 4 = 7, then 3 more run at level 3) before the
    // process runs out of program and terminates.
    let lines: Vec<&str> = vec![
        "assign a 0", "assign a 1", "assign a 2", "assign a 3", "assign a 4",
        "assign a 5", "assign a 6", "assign a 7", "assign a 8", "assign a 9",
    ];
    let path = write_program(&dir, "Program_1.txt", &lines);
    let mut sys = System::new(mlfq());
    assert!(sys.load_program(&path));

    let mut levels_seen = Vec::new();
    for _ in 0..40 {
        if sys.is_simulation_complete() {
            break;
        }
        let before = sys.pcb(0).map(|p| p.mlfq_level);
        sys.step();
        if let Some(pcb) = sys.pcb(0) {
            if pcb.state == State::Running && Some(pcb.mlfq_level) != before {
                levels_seen.push(pcb.mlfq_level);
            }
        }
    }

    assert!(sys.is_simulation_complete());
    // Level 0's run never shows up as a "change" since it matches the
    // freshly-arrived default level; only the demotions are observable.
    assert_eq!(levels_seen, vec![1, 2, 3]);
}

/// Scenario 4 — mutex contention with priority preemption: P1 holds
/// `file`, P2 and P3 block on it in MLFQ level 0. Releasing wakes exactly
/// one waiter, chosen by the FIFO tiebreak since both share a level.
#[test]
fn mutex_release_wakes_exactly_one_waiter_by_priority_then_fifo() {
    let dir = tempfile::tempdir().unwrap();
    // P2 and P3 each keep a second instruction after `semWait` so that once
    // they finally acquire the mutex, holding it is observable for at least
    // one full step instead of being released again in the same step that
    // acquired it (as would happen if `semWait` were their last instruction).
    let p1 = write_program(&dir, "Program_1.txt", &["semWait file", "semSignal file"]);
    let p2 = write_program(&dir, "Program_2.txt", &["semWait file", "assign done 1"]);
    let p3 = write_program(&dir, "Program_3.txt", &["semWait file", "assign done 1"]);
    let mut sys = System::new(mlfq());
    assert!(sys.load_program(&p1));
    assert!(sys.load_program(&p2));
    assert!(sys.load_program(&p3));

    for _ in 0..10 {
        let file = sys.mutex_snapshot().into_iter().find(|m| m.resource == Resource::File).unwrap();
        if file.waiters.len() == 2 {
            break;
        }
        sys.step();
    }
    let file = sys.mutex_snapshot().into_iter().find(|m| m.resource == Resource::File).unwrap();
    assert_eq!(file.holder, Some(0));
    assert_eq!(file.waiters, vec![1, 2]);

    // P1 releases, P2 is woken and made READY, but still has to win its own
    // re-dispatched `semWait` before it actually holds the mutex again.
    for _ in 0..10 {
        let file = sys.mutex_snapshot().into_iter().find(|m| m.resource == Resource::File).unwrap();
        if file.holder == Some(1) {
            break;
        }
        sys.step();
    }

    let file = sys.mutex_snapshot().into_iter().find(|m| m.resource == Resource::File).unwrap();
    assert_eq!(file.holder, Some(1), "P2 arrived first and ties P3 on MLFQ level");
    assert_eq!(file.waiters, vec![2]);
}

/// Scenario 5 — input pause: `step` is a no-op once `assign x input`
/// registers a pending request; `provideInput` resumes it.
#[test]
fn input_pause_blocks_the_clock_until_provide_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "Program_1.txt", &["assign x input", "print x"]);
    let mut sys = System::with_callbacks(fcfs(1), Box::new(RecordingCallbacks { grant_input: true, ..Default::default() }));
    assert!(sys.load_program(&path));

    sys.step(); // arrival, dispatch, and `assign x input` all land in one cycle
    assert!(sys.is_awaiting_input());
    let paused_clock = sys.clock();

    for _ in 0..3 {
        sys.step();
        assert_eq!(sys.clock(), paused_clock, "a paused step must not advance the clock");
    }

    sys.provide_input("42");
    assert!(!sys.is_awaiting_input());
    assert_eq!(sys.variable(0, "x"), Some("42"));

    run_to_completion(&mut sys, 10);
}

/// Scenario 6 — read-then-assign chain: `assign b readFile a` binds both
/// `b` and the `file_a` alias; a standalone `readFile` binds only the alias.
#[test]
fn read_then_assign_binds_both_the_variable_and_the_alias() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "Program_1.txt", &["assign a file.txt", "assign b readFile a", "print b"]);
    let mut files = HashMap::new();
    files.insert("file.txt".to_string(), "hello".to_string());
    let mut sys = System::new(fcfs(1)).with_file_io(Box::new(FakeFileIo(files)));
    assert!(sys.load_program(&path));

    run_to_completion(&mut sys, 10);

    assert_eq!(sys.variable(0, "b"), Some("hello"));
    assert_eq!(sys.variable(0, "file_a"), Some("hello"));
}

#[test]
fn standalone_read_file_binds_only_the_alias_not_the_target_variable() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "Program_1.txt", &["assign a file.txt", "readFile a"]);
    let mut files = HashMap::new();
    files.insert("file.txt".to_string(), "hello".to_string());
    let mut sys = System::new(fcfs(1)).with_file_io(Box::new(FakeFileIo(files)));
    assert!(sys.load_program(&path));

    run_to_completion(&mut sys, 10);

    assert_eq!(sys.variable(0, "file_a"), Some("hello"));
    assert_eq!(sys.variable(0, "a"), Some("file.txt"));
}

/// Boundary — a zero-instruction process is accepted and terminates on
/// its first dispatch.
#[test]
fn zero_instruction_process_terminates_on_first_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "Program_1.txt", &[]);
    let mut sys = System::new(fcfs(1));
    assert!(sys.load_program(&path));

    run_to_completion(&mut sys, 5);
}

/// Boundary — a `semSignal` on an empty waiter list releases the mutex
/// without selecting anyone.
#[test]
fn sem_signal_on_an_uncontended_mutex_releases_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "Program_1.txt", &["semWait file", "semSignal file"]);
    let mut sys = System::new(fcfs(1));
    assert!(sys.load_program(&path));

    run_to_completion(&mut sys, 10);

    let file = sys.mutex_snapshot().into_iter().find(|m| m.resource == Resource::File).unwrap();
    assert!(!file.locked);
    assert!(file.waiters.is_empty());
}
