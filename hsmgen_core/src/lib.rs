//! Implementation of *hierarchical state machines* (HSM)
//! for use in the `hsmgen` statechart compiler.
//!
//! A statechart is described through a [`StatechartBuilder`](statechart::StatechartBuilder),
//! which plays the role of the abstract syntax tree produced by a format parser,
//! and is then validated into an immutable [`Statechart`](statechart::Statechart) table.
//! The table is consumed by code generators,
//! and can be executed directly by the generic [`Machine`](machine::Machine) interpreter.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod machine;
pub mod statechart;

pub use machine::{Context, Machine};
pub use statechart::*;
