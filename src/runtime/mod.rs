//! # Proc execution
//!
//! Threads hold stacks of proc states and run them through the shared
//! [`vm::Runtime`]. Bytecode frames are interpreted by [`interp`] with one
//! handler per opcode; built-ins run as native or native-async states.
//! [`scheduler::ProcScheduler`] owns threads and decides who runs next.

pub mod completion;
pub mod config;
pub mod delay;
pub mod enumerator;
pub mod handlers;
pub mod host;
pub mod interp;
pub mod pool;
pub mod procs;
pub mod runtime_error;
pub mod scheduler;
pub mod state;
pub mod thread;
pub mod vm;
