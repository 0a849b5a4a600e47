//! Command implementations for the cdcflow CLI

pub mod check;
pub mod serve;
