//! Resource limits applied to every instance.

use crate::validate::MAX_PAGES;

/// Limits for one [`crate::vm::Vm`]. Child instances created for imported modules inherit the
/// parent's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of active call frames.
    pub max_call_depth: usize,
    /// Maximum operand stack slots, locals included.
    pub max_value_stack: usize,
    /// Ceiling for linear memory in pages, applied on top of the declared maximum.
    pub max_memory_pages: u32,
    /// Instruction budget. `None` runs without a limit.
    pub fuel: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_value_stack: 1 << 20,
            max_memory_pages: MAX_PAGES,
            fuel: None,
        }
    }
}

impl VmConfig {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_value_stack(mut self, slots: usize) -> Self {
        self.max_value_stack = slots;
        self
    }

    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }
}
