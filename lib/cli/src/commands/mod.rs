//! The commands available in the modlink binary.

mod link;

pub use link::Link;
