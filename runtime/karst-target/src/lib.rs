//! Layout primitives for the Karst runtime: byte sizes, power-of-two
//! alignments, and the table of sizes and alignments that the host
//! machine fixes for primitive values.

pub mod alignment;
pub mod data_layout;
pub mod size;

pub use alignment::{Alignment, AlignmentError};
pub use data_layout::HostDataLayout;
pub use size::Size;
