//! Core data types: enums and trading records shared by every crate.

pub mod enums;
pub mod trading;

pub use enums::*;
pub use trading::*;
