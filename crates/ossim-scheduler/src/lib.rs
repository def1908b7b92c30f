//! Scheduling policy: FCFS, Round Robin, or a four-level MLFQ.
//!
//! This crate owns the ready structure (the single FCFS/RR queue, or the
//! four MLFQ level queues) and the enqueue/dispatch policy around it. It
//! does not decide *when* to dispatch, charge quanta, or run instructions —
//! that sequencing lives in the driver (spec §4.1); this crate only answers
//! "which pid, if any, runs next" and "where does this pid's ready-ness go".

use ossim_process::{Pcb, Pid, ProcessState, ProcessTable, QueueOverflow, ReadyQueues, ReadySnapshot, MLFQ_LEVELS};

/// Default per-level quanta for MLFQ, level 0 (highest priority) first.
pub const DEFAULT_MLFQ_QUANTA: [i32; MLFQ_LEVELS] = [1, 2, 4, 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Fcfs,
    RoundRobin,
    Mlfq,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub kind: SchedulerKind,
    /// Quantum charged to every RR dispatch. Clamped to at least 1.
    pub rr_quantum: i32,
    /// Quantum charged per MLFQ level at dispatch time.
    pub mlfq_quanta: [i32; MLFQ_LEVELS],
}

impl SchedulerConfig {
    pub fn new(kind: SchedulerKind, rr_quantum: i32) -> Self {
        SchedulerConfig {
            kind,
            rr_quantum: rr_quantum.max(1),
            mlfq_quanta: DEFAULT_MLFQ_QUANTA,
        }
    }
}

/// Owns the ready structure appropriate to `config.kind` and the dispatch
/// policy over it.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    ready: ReadyQueues,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let ready = match config.kind {
            SchedulerKind::Fcfs | SchedulerKind::RoundRobin => ReadyQueues::fifo(),
            SchedulerKind::Mlfq => ReadyQueues::mlfq(),
        };
        Scheduler { config, ready }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The scheduling priority the mutex subsystem should record for `pcb`
    /// if it needs to block: the MLFQ level under MLFQ, 0 otherwise (spec §4.3).
    pub fn priority_of(&self, pcb: &Pcb) -> i32 {
        match self.config.kind {
            SchedulerKind::Mlfq => pcb.mlfq_level as i32,
            SchedulerKind::Fcfs | SchedulerKind::RoundRobin => 0,
        }
    }

    /// The quantum a process gets when dispatched from `level` (ignored
    /// outside MLFQ) under the current scheduler.
    pub fn quantum_for(&self, level: usize) -> i32 {
        match self.config.kind {
            SchedulerKind::RoundRobin => self.config.rr_quantum,
            SchedulerKind::Mlfq => self.config.mlfq_quanta[level],
            SchedulerKind::Fcfs => 0,
        }
    }

    pub fn demote(level: usize) -> usize {
        (level + 1).min(MLFQ_LEVELS - 1)
    }

    /// A read-only view of the ready structures, for collaborators that
    /// render system state.
    pub fn ready_snapshot(&self) -> ReadySnapshot {
        self.ready.snapshot()
    }

    /// Marks `pid` `READY` and enqueues it into the structure appropriate to
    /// the current scheduler. Under MLFQ, the PCB's current `mlfq_level`
    /// (set by the caller beforehand — 0 for a new arrival, its recorded
    /// level on unblock) is the target level; if that level's queue is
    /// full, the process spills to the next lower level, and if every level
    /// is full the process is not enqueued (caller should terminate it).
    pub fn enqueue_ready(&mut self, table: &mut ProcessTable, pid: Pid) -> Result<(), QueueOverflow> {
        match self.config.kind {
            SchedulerKind::Mlfq => {
                let level = table.get(pid).map(|p| p.mlfq_level).unwrap_or(0);
                self.enqueue_mlfq(table, pid, level)
            }
            SchedulerKind::Fcfs | SchedulerKind::RoundRobin => {
                self.ready.push_fifo(pid)?;
                if let Some(pcb) = table.get_mut(pid) {
                    pcb.state = ProcessState::Ready;
                }
                Ok(())
            }
        }
    }

    fn enqueue_mlfq(&mut self, table: &mut ProcessTable, pid: Pid, level: usize) -> Result<(), QueueOverflow> {
        match self.ready.push_level(level, pid) {
            Ok(()) => {
                if let Some(pcb) = table.get_mut(pid) {
                    pcb.state = ProcessState::Ready;
                    pcb.mlfq_level = level;
                    pcb.priority = level as i32;
                }
                Ok(())
            }
            Err(QueueOverflow) if level + 1 < MLFQ_LEVELS => self.enqueue_mlfq(table, pid, level + 1),
            Err(e) => Err(e),
        }
    }

    /// Selects and removes the next runnable pid, skipping any dequeued
    /// entry whose PCB is no longer `READY` (defensive, per spec §4.4 — this
    /// should not happen under the invariants, but a stale entry must never
    /// be dispatched).
    pub fn dispatch(&mut self, table: &ProcessTable) -> Option<Pid> {
        let is_ready = |table: &ProcessTable, pid: Pid| {
            table.get(pid).map(|p| p.state == ProcessState::Ready).unwrap_or(false)
        };
        match self.config.kind {
            SchedulerKind::Mlfq => {
                for level in 0..MLFQ_LEVELS {
                    while let Some(pid) = self.ready.pop_level(level) {
                        if is_ready(table, pid) {
                            return Some(pid);
                        }
                    }
                }
                None
            }
            SchedulerKind::Fcfs | SchedulerKind::RoundRobin => {
                while let Some(pid) = self.ready.pop_fifo() {
                    if is_ready(table, pid) {
                        return Some(pid);
                    }
                }
                None
            }
        }
    }
}
