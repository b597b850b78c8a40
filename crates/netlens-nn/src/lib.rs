//! # netlens-nn
//!
//! Neural network layers for netlens.
//!
//! Every layer implements the [`Module`] trait (a `forward()` method plus
//! parameter access), so a compiled architecture is simply an ordered list of
//! `Box<dyn Module>` values. The layer set matches the kinds the architecture
//! compiler recognizes: Conv2d, Linear, pooling, BatchNorm2d, activations,
//! Dropout, Flatten, and AdaptiveAvgPool2d.
//!
//! Layers that behave differently at inference time (Dropout, BatchNorm2d)
//! carry a training flag behind `Cell`, toggled through
//! [`Module::set_training`].

pub mod activation;
pub mod batchnorm;
pub mod conv;
pub mod dropout;
pub mod flatten;
pub mod linear;
pub mod module;

pub use activation::{ReLU, Sigmoid, Tanh};
pub use batchnorm::BatchNorm2d;
pub use conv::{AdaptiveAvgPool2d, AvgPool2d, Conv2d, MaxPool2d};
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use linear::Linear;
pub use module::Module;
