// Dropout: regularization via random zeroing.
//
// During training, elements are zeroed with probability p and survivors are
// scaled by 1/(1-p) to preserve the expected value. During eval, Dropout is
// the identity. The executor runs graphs in eval mode, so at inference time
// this layer only contributes an observation record.

use std::cell::Cell;

use netlens_core::error::Result;
use netlens_core::tensor::Tensor;
use rand::Rng;

use crate::module::Module;

/// Applies dropout regularization.
pub struct Dropout {
    /// Probability of an element being zeroed.
    p: f32,
    training: Cell<bool>,
}

impl Dropout {
    /// Create a new Dropout layer. `p` must be in [0, 1).
    pub fn new(p: f32) -> Self {
        debug_assert!((0.0..1.0).contains(&p), "Dropout probability out of range");
        Dropout {
            p,
            training: Cell::new(true),
        }
    }

    pub fn p(&self) -> f32 {
        self.p
    }
}

impl Module for Dropout {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        if !self.training.get() || self.p == 0.0 {
            return Ok(x.clone());
        }

        let scale = 1.0 / (1.0 - self.p);
        let mut rng = rand::rng();
        let out: Vec<f32> = x
            .as_slice()
            .iter()
            .map(|&v| {
                if rng.random::<f32>() < self.p {
                    0.0
                } else {
                    v * scale
                }
            })
            .collect();
        Tensor::from_vec(out, x.shape().clone())
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }

    fn set_training(&self, training: bool) {
        self.training.set(training);
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}
