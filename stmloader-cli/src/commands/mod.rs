//! Command implementations for the stmloader CLI.

pub(crate) mod completions;
pub(crate) mod flash;
pub(crate) mod ports;
