//! Instance-owned storage: linear memory and the function table.

pub mod memory;
pub mod table;

pub use memory::{Memory, PAGE_SIZE};
pub use table::Table;
