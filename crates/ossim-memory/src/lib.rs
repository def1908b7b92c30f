//! Instruction store and per-process variable store backing the simulator.
//!
//! The original implementation this system is modelled on indexes everything
//! through name-tagged words scanned linearly out of one shared array
//! (`Inst_<pid>_<k>`, `Var_<pid>_<name>`, `PCB_<pid>_SlotK`). Here the three
//! concerns are split into typed arenas instead: instructions are immutable
//! once loaded, variables live in a fixed 3-slot table per process, and the
//! legacy word view is reconstructed only when a collaborator asks to render
//! the raw memory array.

use std::fmt;

/// Total simulated memory, in words.
pub const MEMORY_WORDS: usize = 60;
/// Variable slots reserved per process.
pub const VARIABLE_SLOTS: usize = 3;
/// PCB scratch slots reserved per process (carry no behaviour; kept only so
/// the region-size invariant `ub - lb + 1 == instructions + 3 + 5` holds).
pub const SCRATCH_SLOTS: usize = 5;
/// Maximum instruction lines a single program may load.
pub const MAX_INSTRUCTIONS: usize = 50;
/// Program lines are truncated to this many characters on load.
pub const MAX_LINE_LEN: usize = 99;
/// Name/value width of a single legacy memory word, used only when
/// projecting the raw `Inst_`/`Var_`/`PCB_` view for a collaborator.
pub const MAX_WORD_LEN: usize = 49;

/// One named memory word, in the legacy name-tagged encoding.
///
/// This is a read-only projection for collaborators that want to render
/// "the raw memory array" (spec §6); nothing in the interpreter scans it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWord {
    pub name: String,
    pub value: String,
}

impl MemoryWord {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut name = name.into();
        let mut value = value.into();
        name.truncate(MAX_WORD_LEN);
        value.truncate(MAX_WORD_LEN);
        MemoryWord { name, value }
    }
}

/// A contiguous process region `[lb..ub]` inside the 60-word arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub lb: usize,
    pub ub: usize,
    pub instruction_count: usize,
}

impl Region {
    pub fn len(&self) -> usize {
        self.ub - self.lb + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.lb && index <= self.ub
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarStoreFull;

impl fmt::Display for VarStoreFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no free variable slot remains")
    }
}

impl std::error::Error for VarStoreFull {}

#[derive(Debug, Clone)]
enum VarSlot {
    Free,
    Bound { name: String, value: String },
}

/// Instructions, variables, and the arena bump pointer for every loaded
/// process, indexed by `pid` (process ids are assigned densely in load
/// order and never reused, matching the process table).
#[derive(Debug, Default)]
pub struct Memory {
    next: usize,
    regions: Vec<Region>,
    instructions: Vec<Vec<String>>,
    variables: Vec<[VarSlot; VARIABLE_SLOTS]>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            next: 0,
            regions: Vec::new(),
            instructions: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn used_words(&self) -> usize {
        self.next
    }

    pub fn remaining_words(&self) -> usize {
        MEMORY_WORDS - self.next
    }

    /// Bump-allocate a region for `lines` (already truncated to
    /// [`MAX_INSTRUCTIONS`] and [`MAX_LINE_LEN`] by the caller) and install
    /// the new process. Returns the assigned `pid`, or `None` if the arena
    /// has no room left (`queue-overflow`-adjacent "out of memory" case from
    /// the original loader).
    pub fn install_process(&mut self, lines: Vec<String>) -> Option<usize> {
        let words_needed = lines.len() + VARIABLE_SLOTS + SCRATCH_SLOTS;
        if self.next + words_needed > MEMORY_WORDS {
            return None;
        }
        let lb = self.next;
        let ub = lb + words_needed - 1;
        self.next += words_needed;

        let pid = self.regions.len();
        self.regions.push(Region {
            lb,
            ub,
            instruction_count: lines.len(),
        });
        self.instructions.push(lines);
        self.variables.push([VarSlot::Free, VarSlot::Free, VarSlot::Free]);
        Some(pid)
    }

    pub fn region(&self, pid: usize) -> Option<&Region> {
        self.regions.get(pid)
    }

    pub fn instruction_count(&self, pid: usize) -> usize {
        self.instructions.get(pid).map_or(0, |v| v.len())
    }

    pub fn fetch_instruction(&self, pid: usize, pc: usize) -> Option<&str> {
        self.instructions.get(pid)?.get(pc).map(String::as_str)
    }

    /// Looks up `Var_<pid>_<name>`, falling back to `Var_<pid>_file_<name>`
    /// exactly as the original `getVariable` does, so programs may read
    /// through either the original or the `readFile`-installed alias.
    pub fn get_variable(&self, pid: usize, name: &str) -> Option<&str> {
        let slots = self.variables.get(pid)?;
        if let Some(value) = find_bound(slots, name) {
            return Some(value);
        }
        let aliased = format!("file_{name}");
        find_bound(slots, &aliased)
    }

    /// Binds `Var_<pid>_<name> = value`, reusing the first free slot if the
    /// variable isn't already bound. Fails with [`VarStoreFull`] if every
    /// slot is already occupied by a different name.
    pub fn set_variable(&mut self, pid: usize, name: &str, value: &str) -> Result<(), VarStoreFull> {
        let slots = self.variables.get_mut(pid).ok_or(VarStoreFull)?;

        if let Some(slot) = slots.iter_mut().find(|s| matches!(s, VarSlot::Bound { name: n, .. } if n == name)) {
            *slot = VarSlot::Bound { name: name.to_string(), value: value.to_string() };
            return Ok(());
        }
        if let Some(slot) = slots.iter_mut().find(|s| matches!(s, VarSlot::Free)) {
            *slot = VarSlot::Bound { name: name.to_string(), value: value.to_string() };
            return Ok(());
        }
        Err(VarStoreFull)
    }

    /// Reconstructs the legacy `Inst_<pid>_<k>` / `Var_<pid>_<name>` /
    /// `PCB_<pid>_SlotK` word array, for collaborators that render raw
    /// memory. Unbound variable and scratch slots appear with their
    /// original `*_FreeK` / `SlotK` placeholder names.
    pub fn words(&self) -> Vec<MemoryWord> {
        let mut out = Vec::with_capacity(self.next);
        for (pid, region) in self.regions.iter().enumerate() {
            for (k, line) in self.instructions[pid].iter().enumerate() {
                out.push(MemoryWord::new(format!("Inst_{pid}_{k}"), line.clone()));
            }
            for (i, slot) in self.variables[pid].iter().enumerate() {
                match slot {
                    VarSlot::Bound { name, value } => {
                        out.push(MemoryWord::new(format!("Var_{pid}_{name}"), value.clone()))
                    }
                    VarSlot::Free => out.push(MemoryWord::new(format!("Var_{pid}_Free{i}"), "")),
                }
            }
            let scratch_used = region.len() - region.instruction_count - VARIABLE_SLOTS;
            for i in 0..scratch_used {
                out.push(MemoryWord::new(format!("PCB_{pid}_Slot{i}"), ""));
            }
        }
        out
    }
}

fn find_bound<'a>(slots: &'a [VarSlot; VARIABLE_SLOTS], name: &str) -> Option<&'a str> {
    slots.iter().find_map(|s| match s {
        VarSlot::Bound { name: n, value } if n == name => Some(value.as_str()),
        _ => None,
    })
}
