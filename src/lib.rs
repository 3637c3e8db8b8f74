//! A resumable bytecode interpreter for DM procs.
//!
//! Compiled procs run on cooperative threads. A thread can stop in the
//! middle of any call chain (waiting on a prompt, a sleep or a step budget)
//! and pick up exactly where it left off on its next resume.

pub mod bytecode;
pub mod lang;
pub mod runtime;
