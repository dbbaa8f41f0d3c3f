//! Accessor routine compilation
//!
//! The pipeline from an inspected record class to callable routines:
//! [`template`] shapes one expression tree per accessor method, [`compile`]
//! lowers each tree into a composed closure, and [`adapter`] bundles the
//! compiled set with the schema's arena and nested adapters into the unit
//! views dispatch through.

pub mod adapter;
pub mod compile;
pub mod expr;
pub mod frame;
pub mod natives;
pub mod template;
