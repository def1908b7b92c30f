//! The three nameable mutexes (`file`, `userInput`, `userOutput`) and their
//! priority-aware waiter lists.
//!
//! A mutex here only ever sees an opaque `(pid, priority)` pair at block
//! time — it doesn't know or care whether `priority` came from an MLFQ level
//! or a flat FCFS/RR scheduler. That split keeps this crate a leaf with no
//! dependency on the process table, matching the dependency order the
//! simulator is built in (memory, mutex, process, scheduler, interpreter,
//! driver).

use std::collections::VecDeque;
use std::fmt;

pub type Pid = usize;

/// Waiter queue capacity per mutex.
pub const MAX_WAITERS: usize = 10;

/// The three resources the simulator can guard with a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    File,
    UserInput,
    UserOutput,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::File, Resource::UserInput, Resource::UserOutput];

    /// Parses the resource names the instruction language uses
    /// (`file`, `userInput`, `userOutput`). Any other name is unrecognised.
    pub fn parse(name: &str) -> Option<Resource> {
        match name {
            "file" => Some(Resource::File),
            "userInput" => Some(Resource::UserInput),
            "userOutput" => Some(Resource::UserOutput),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Resource::File => 0,
            Resource::UserInput => 1,
            Resource::UserOutput => 2,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::File => "file",
            Resource::UserInput => "userInput",
            Resource::UserOutput => "userOutput",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexFault {
    /// `semSignal` by a pid that isn't the current holder, or on an unlocked mutex.
    IllegalSignal,
    /// The waiter queue is already at [`MAX_WAITERS`].
    WaiterQueueFull,
}

impl fmt::Display for MutexFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutexFault::IllegalSignal => write!(f, "semSignal by non-holder or on an unlocked mutex"),
            MutexFault::WaiterQueueFull => write!(f, "mutex waiter queue is full"),
        }
    }
}

impl std::error::Error for MutexFault {}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    pid: Pid,
    priority: i32,
    seq: u64,
}

/// A single binary lock with a priority-ordered FIFO-tiebreak waiter list.
#[derive(Debug, Default)]
struct Mutex {
    holder: Option<Pid>,
    waiters: VecDeque<Waiter>,
    next_seq: u64,
}

impl Mutex {
    fn is_locked(&self) -> bool {
        self.holder.is_some()
    }
}

/// Outcome of a `semWait` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The mutex was free; `pid` now holds it.
    Acquired,
    /// The mutex was held; `pid` was enqueued and should be blocked.
    Blocked,
}

/// The three named mutexes. Indexed internally by [`Resource`].
#[derive(Debug, Default)]
pub struct MutexSet {
    mutexes: [Mutex; 3],
}

impl MutexSet {
    pub fn new() -> Self {
        MutexSet::default()
    }

    pub fn is_locked(&self, r: Resource) -> bool {
        self.mutexes[r.index()].is_locked()
    }

    pub fn holder(&self, r: Resource) -> Option<Pid> {
        self.mutexes[r.index()].holder
    }

    pub fn waiter_count(&self, r: Resource) -> usize {
        self.mutexes[r.index()].waiters.len()
    }

    /// `semWait r` for `pid`, whose current scheduling `priority` is recorded
    /// if it must block (MLFQ level, or 0 under FCFS/RR).
    pub fn wait(&mut self, r: Resource, pid: Pid, priority: i32) -> Result<WaitOutcome, MutexFault> {
        let m = &mut self.mutexes[r.index()];
        if !m.is_locked() {
            m.holder = Some(pid);
            return Ok(WaitOutcome::Acquired);
        }
        if m.waiters.len() >= MAX_WAITERS {
            return Err(MutexFault::WaiterQueueFull);
        }
        let seq = m.next_seq;
        m.next_seq += 1;
        m.waiters.push_back(Waiter { pid, priority, seq });
        Ok(WaitOutcome::Blocked)
    }

    /// `semSignal r` for `pid`. On success, returns the pid of the waiter
    /// that was unblocked (if any) so the caller can re-enqueue it.
    pub fn signal(&mut self, r: Resource, pid: Pid) -> Result<Option<Pid>, MutexFault> {
        let m = &mut self.mutexes[r.index()];
        if m.holder != Some(pid) {
            return Err(MutexFault::IllegalSignal);
        }
        m.holder = None;
        Ok(Self::dequeue_highest_priority(m))
    }

    /// Releases `r` unconditionally if `pid` holds it, without treating a
    /// non-holder call as an error. Used when a process terminates while
    /// still holding a mutex (spec's recommended termination cleanup
    /// policy), where there is no "illegal signal" to report.
    pub fn release_if_holder(&mut self, r: Resource, pid: Pid) -> Option<Pid> {
        let m = &mut self.mutexes[r.index()];
        if m.holder != Some(pid) {
            return None;
        }
        m.holder = None;
        Self::dequeue_highest_priority(m)
    }

    /// Removes and returns the waiter with the numerically smallest
    /// priority, ties broken by FIFO (earliest `seq` first). Leaves the
    /// remaining waiters in their original relative order.
    fn dequeue_highest_priority(m: &mut Mutex) -> Option<Pid> {
        let (best_index, _) = m
            .waiters
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| (w.priority, w.seq))?;
        m.waiters.remove(best_index).map(|w| w.pid)
    }

    /// A read-only snapshot of one mutex, for collaborators that render
    /// system state (spec §6's "raw memory/queue arrays" accessors).
    pub fn snapshot(&self, r: Resource) -> MutexSnapshot {
        let m = &self.mutexes[r.index()];
        MutexSnapshot {
            resource: r,
            locked: m.is_locked(),
            holder: m.holder,
            waiters: m.waiters.iter().map(|w| w.pid).collect(),
        }
    }

    pub fn snapshot_all(&self) -> [MutexSnapshot; 3] {
        Resource::ALL.map(|r| self.snapshot(r))
    }
}

/// Read-only view of one mutex's lock state and waiter list, in FIFO order
/// but for priority-unblock purposes the driver scans it itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutexSnapshot {
    pub resource: Resource,
    pub locked: bool,
    pub holder: Option<Pid>,
    pub waiters: Vec<Pid>,
}
