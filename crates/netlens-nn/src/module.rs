// Module trait: the interface every layer implements.
//
// The key method is forward(): it takes an input tensor and returns the
// output tensor. parameters() exposes the learnable tensors so callers can
// count them; set_training()/is_training() toggle train vs eval behavior for
// the layers where it matters (Dropout, BatchNorm2d). A network is an
// ordered list of Box<dyn Module> values.

use netlens_core::error::Result;
use netlens_core::tensor::Tensor;

/// The fundamental trait for all neural network layers.
pub trait Module {
    /// Compute the output tensor from the input tensor.
    fn forward(&self, x: &Tensor) -> Result<Tensor>;

    /// Return all learnable parameters of this module.
    fn parameters(&self) -> Vec<Tensor>;

    /// Set training or evaluation mode.
    ///
    /// Override in modules that behave differently in train vs eval.
    /// Uses interior mutability (`Cell<bool>`) so `&self` suffices.
    fn set_training(&self, _training: bool) {
        // Default: no-op.
    }

    /// Whether the module is in training mode (default: true).
    fn is_training(&self) -> bool {
        true
    }

    /// Total number of scalar parameters in this module.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.elem_count()).sum()
    }
}
