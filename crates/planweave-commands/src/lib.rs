//! Built-in commands for the planweave engine.
//!
//! THINK and IF delegate to a chat model; CALCULATE evaluates arithmetic
//! locally and falls back to the model only when the expression does not
//! parse. [`register_essential_commands`] wires all three into a registry.

pub mod builtin;
pub mod math;

pub use builtin::{register_essential_commands, CalculateCommand, IfCommand, ThinkCommand};
pub use math::{eval, MathError};
