//! # Value model
//!
//! Everything the interpreter manipulates as data: tagged values, the
//! arithmetic over them, call argument bundles and the object/list surface.

pub mod arguments;
pub mod arith;
pub mod objects;
pub mod value;
