//! # netlens-core
//!
//! CPU tensor primitives for netlens.
//!
//! This crate provides:
//! - [`Tensor`]: a contiguous, row-major, f32 n-dimensional array
//! - [`Shape`]: dimension sizes and element counting
//! - [`Error`] / [`Result`]: the core error type shared across the workspace
//!
//! Tensors here are evaluation-only: there is no autograd graph and no
//! device abstraction. Every operation allocates a fresh contiguous buffer
//! (reshape is the exception, it shares storage).

pub mod error;
pub mod shape;
pub mod tensor;

pub use error::{Error, Result};
pub use shape::Shape;
pub use tensor::Tensor;
