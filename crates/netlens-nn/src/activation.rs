// Activation modules: thin wrappers around tensor activation functions,
// so activations compose in a layer list like any other module.

use netlens_core::error::Result;
use netlens_core::tensor::Tensor;

use crate::module::Module;

/// ReLU activation: max(0, x).
pub struct ReLU;

impl Module for ReLU {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.relu())
    }
    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}

/// Sigmoid activation: 1 / (1 + e^(-x)).
pub struct Sigmoid;

impl Module for Sigmoid {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.sigmoid())
    }
    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}

/// Tanh activation.
pub struct Tanh;

impl Module for Tanh {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.tanh())
    }
    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}
