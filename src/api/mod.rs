//! Public entry points of the binary.

pub mod cli;
