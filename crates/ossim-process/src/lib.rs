//! Process control blocks, the process table, and the ready structures
//! (one FCFS/RR queue, or four MLFQ level queues) that hold `READY` pids.
//!
//! This crate only knows about queue *mechanics* — bounded FIFO push/pop.
//! Deciding which queue a freshly-ready process goes into, what happens when
//! a queue is full, and which pid runs next are scheduler policy and belong
//! to `ossim-scheduler`.

use ossim_mutex::Resource;
use std::collections::VecDeque;
use std::fmt;

pub type Pid = usize;

pub const MAX_PROCESSES: usize = 10;
pub const MLFQ_LEVELS: usize = 4;
pub const MAX_QUEUE_SLOTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// A process control block. Field names mirror spec.md §3 directly.
#[derive(Debug, Clone)]
pub struct Pcb {
    pub pid: Pid,
    pub program_number: u32,
    pub state: ProcessState,
    pub priority: i32,
    pub pc: usize,
    pub lb: usize,
    pub ub: usize,
    pub arrival_time: u64,
    pub blocked_on: Option<Resource>,
    pub quantum_remaining: i32,
    pub mlfq_level: usize,
    pub unblocked_this_cycle: bool,
}

impl Pcb {
    fn new(pid: Pid, program_number: u32, lb: usize, ub: usize, arrival_time: u64) -> Self {
        Pcb {
            pid,
            program_number,
            state: ProcessState::New,
            priority: 0,
            pc: 0,
            lb,
            ub,
            arrival_time,
            blocked_on: None,
            quantum_remaining: 0,
            mlfq_level: 0,
            unblocked_this_cycle: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTableFull;

impl fmt::Display for ProcessTableFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process table is full ({MAX_PROCESSES} processes)")
    }
}

impl std::error::Error for ProcessTableFull {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOverflow;

impl fmt::Display for QueueOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ready queue is full ({MAX_QUEUE_SLOTS} slots)")
    }
}

impl std::error::Error for QueueOverflow {}

#[derive(Debug, Default)]
pub struct ProcessTable {
    procs: Vec<Pcb>,
}

impl ProcessTable {
    pub fn new() -> Self {
        ProcessTable { procs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.procs.len() >= MAX_PROCESSES
    }

    /// Installs a new `NEW` PCB. `pid` is the dense index into the table,
    /// assigned in load order.
    pub fn spawn(
        &mut self,
        program_number: u32,
        lb: usize,
        ub: usize,
        arrival_time: u64,
    ) -> Result<Pid, ProcessTableFull> {
        if self.is_full() {
            return Err(ProcessTableFull);
        }
        let pid = self.procs.len();
        self.procs.push(Pcb::new(pid, program_number, lb, ub, arrival_time));
        Ok(pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.procs.get(pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.procs.get_mut(pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.procs.iter()
    }

    pub fn reset_unblocked_flags(&mut self) {
        for pcb in &mut self.procs {
            pcb.unblocked_this_cycle = false;
        }
    }

    pub fn all_terminated(&self) -> bool {
        !self.procs.is_empty() && self.procs.iter().all(|p| p.state == ProcessState::Terminated)
    }
}

/// One bounded FIFO ready queue.
#[derive(Debug, Default)]
struct ReadyQueue {
    pids: VecDeque<Pid>,
}

impl ReadyQueue {
    fn push(&mut self, pid: Pid) -> Result<(), QueueOverflow> {
        if self.pids.len() >= MAX_QUEUE_SLOTS {
            return Err(QueueOverflow);
        }
        self.pids.push_back(pid);
        Ok(())
    }

    fn pop(&mut self) -> Option<Pid> {
        self.pids.pop_front()
    }

    fn len(&self) -> usize {
        self.pids.len()
    }
}

/// The ready structures: either one FCFS/RR queue, or four MLFQ level
/// queues (level 0 = highest priority), selected once at construction.
#[derive(Debug)]
pub enum ReadyQueues {
    Fifo(ReadyQueue),
    Mlfq([ReadyQueue; MLFQ_LEVELS]),
}

impl ReadyQueues {
    pub fn fifo() -> Self {
        ReadyQueues::Fifo(ReadyQueue::default())
    }

    pub fn mlfq() -> Self {
        ReadyQueues::Mlfq([
            ReadyQueue::default(),
            ReadyQueue::default(),
            ReadyQueue::default(),
            ReadyQueue::default(),
        ])
    }

    /// Enqueues into the single FCFS/RR queue. Panics if this isn't a
    /// [`ReadyQueues::Fifo`] — callers select the right method based on
    /// scheduler configuration, the same way the scheduler always knows
    /// which discipline it's running.
    pub fn push_fifo(&mut self, pid: Pid) -> Result<(), QueueOverflow> {
        match self {
            ReadyQueues::Fifo(q) => q.push(pid),
            ReadyQueues::Mlfq(_) => panic!("push_fifo called on an MLFQ ready structure"),
        }
    }

    pub fn pop_fifo(&mut self) -> Option<Pid> {
        match self {
            ReadyQueues::Fifo(q) => q.pop(),
            ReadyQueues::Mlfq(_) => panic!("pop_fifo called on an MLFQ ready structure"),
        }
    }

    pub fn push_level(&mut self, level: usize, pid: Pid) -> Result<(), QueueOverflow> {
        match self {
            ReadyQueues::Mlfq(levels) => levels[level].push(pid),
            ReadyQueues::Fifo(_) => panic!("push_level called on a FIFO ready structure"),
        }
    }

    pub fn pop_level(&mut self, level: usize) -> Option<Pid> {
        match self {
            ReadyQueues::Mlfq(levels) => levels[level].pop(),
            ReadyQueues::Fifo(_) => panic!("pop_level called on a FIFO ready structure"),
        }
    }

    pub fn fifo_len(&self) -> usize {
        match self {
            ReadyQueues::Fifo(q) => q.len(),
            ReadyQueues::Mlfq(_) => 0,
        }
    }

    pub fn level_len(&self, level: usize) -> usize {
        match self {
            ReadyQueues::Mlfq(levels) => levels[level].len(),
            ReadyQueues::Fifo(_) => 0,
        }
    }

    /// A read-only view of every ready structure, front-to-back, for
    /// collaborators that render system state.
    pub fn snapshot(&self) -> ReadySnapshot {
        match self {
            ReadyQueues::Fifo(q) => ReadySnapshot::Fifo(q.pids.iter().copied().collect()),
            ReadyQueues::Mlfq(levels) => {
                let mut out: [Vec<Pid>; MLFQ_LEVELS] = Default::default();
                for (level, q) in levels.iter().enumerate() {
                    out[level] = q.pids.iter().copied().collect();
                }
                ReadySnapshot::Mlfq(out)
            }
        }
    }
}

/// Read-only projection of the ready structures: either the single FCFS/RR
/// queue, or the four MLFQ level queues, each front-to-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadySnapshot {
    Fifo(Vec<Pid>),
    Mlfq([Vec<Pid>; MLFQ_LEVELS]),
}
