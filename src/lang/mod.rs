//! # Cinder language values
//!
//! This module defines the tree the external parser hands over (`Node`)
//! and the values an interpreted program computes with (`Value`).
//!
//! ## Documentation conventions
//!
//! - AST forms are written in their S-expression spelling, e.g. `(lvar x)`.
//! - Stack effects are written as `( before -- after )`.

pub mod node;
pub mod value;
