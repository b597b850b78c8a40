//! netlens: compile declarative network architectures into executable graphs
//! and run instrumented forward passes over them.
//!
//! The crate splits into three layers:
//! - [`netlens_core`] (re-exported as [`core`]): CPU f32 tensors and shapes.
//! - [`netlens_nn`] (re-exported as [`nn`]): the layer zoo behind the
//!   [`Module`](netlens_nn::Module) trait.
//! - This crate: the [`compiler`] (descriptor to [`CompiledGraph`], with
//!   dense input-width inference) and the [`executor`] (one observed
//!   forward pass producing an [`InferenceResult`]).
//!
//! ```no_run
//! use netlens::{compile, run, ArchitectureDescriptor, LayerSpec};
//!
//! let descriptor = ArchitectureDescriptor::new(vec![
//!     LayerSpec::new("Conv2d").with_param("in_channels", 3),
//!     LayerSpec::new("ReLU"),
//!     LayerSpec::new("Flatten"),
//!     LayerSpec::new("Dense").with_param("out_features", 10),
//! ]);
//! let graph = compile(&descriptor, Some(&[3, 32, 32]))?;
//! let input = vec![0.0f32; 3 * 32 * 32];
//! let result = run(&graph, &input, Some(&[3, 32, 32]))?;
//! println!("{:?} {:?}", result.predicted_class, result.output_shape);
//! # Ok::<(), netlens::Error>(())
//! ```

pub use netlens_core as core;
pub use netlens_nn as nn;

pub mod compiler;
pub mod error;
pub mod executor;

pub use compiler::{compile, ArchitectureDescriptor, CompiledGraph, GraphOp, LayerSpec, OpSpec};
pub use error::{Error, Result};
pub use executor::{run, ActivationStats, InferenceResult, LayerObservation};
