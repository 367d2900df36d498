//! Per-function branch table produced by validation. The interpreter resolves every structured
//! jump through it instead of scanning for the matching `else`/`end`.

use std::collections::HashMap;

/// Destination of a taken branch.
///
/// `height` is the operand stack height (relative to the frame's operand base) the branch
/// unwinds to before pushing back the top `arity` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BranchTarget {
    pub pc: u32,
    pub arity: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Jump {
    /// At an `if`: where to continue when the condition is zero.
    If { else_pc: u32 },
    /// At an `else`: the then-arm is finished, skip to the matching `end`.
    Else { end_pc: u32 },
    /// At a `br` or `br_if`.
    Br(BranchTarget),
    /// At a `br_table`: one target per label, the last entry is the default.
    BrTable(Box<[BranchTarget]>),
}

/// Jumps keyed by the code offset of the instruction that takes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideTable {
    jumps: HashMap<u32, Jump>,
}

impl SideTable {
    #[inline]
    pub fn get(&self, pc: usize) -> Option<&Jump> {
        self.jumps.get(&(pc as u32))
    }

    pub fn len(&self) -> usize {
        self.jumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jumps.is_empty()
    }

    pub(crate) fn insert(&mut self, pc: usize, jump: Jump) {
        self.jumps.insert(pc as u32, jump);
    }

    /// Point a forward reference recorded at `pc` at `target_pc`.
    pub(crate) fn patch(&mut self, fixup: Fixup, target_pc: usize) {
        let target_pc = target_pc as u32;
        match (fixup, self.jumps.get_mut(&(fixup.pc() as u32))) {
            (Fixup::If(_), Some(Jump::If { else_pc })) => *else_pc = target_pc,
            (Fixup::Else(_), Some(Jump::Else { end_pc })) => *end_pc = target_pc,
            (Fixup::Br(_), Some(Jump::Br(target))) => target.pc = target_pc,
            (Fixup::BrTable { slot, .. }, Some(Jump::BrTable(targets))) => {
                if let Some(target) = targets.get_mut(slot) {
                    target.pc = target_pc;
                }
            }
            _ => debug_assert!(false, "fixup does not match recorded jump"),
        }
    }
}

/// A forward jump waiting for its label's `end` (or `else`) offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fixup {
    If(usize),
    Else(usize),
    Br(usize),
    BrTable { pc: usize, slot: usize },
}

impl Fixup {
    fn pc(self) -> usize {
        match self {
            Fixup::If(pc) | Fixup::Else(pc) | Fixup::Br(pc) | Fixup::BrTable { pc, .. } => pc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_forward_targets() {
        let mut table = SideTable::default();
        table.insert(3, Jump::Br(BranchTarget { pc: 0, arity: 1, height: 2 }));
        table.insert(
            7,
            Jump::BrTable(vec![BranchTarget::default(); 2].into_boxed_slice()),
        );
        table.patch(Fixup::Br(3), 20);
        table.patch(Fixup::BrTable { pc: 7, slot: 1 }, 21);

        assert_eq!(
            table.get(3),
            Some(&Jump::Br(BranchTarget { pc: 20, arity: 1, height: 2 }))
        );
        match table.get(7) {
            Some(Jump::BrTable(targets)) => {
                assert_eq!(targets[0].pc, 0);
                assert_eq!(targets[1].pc, 21);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
