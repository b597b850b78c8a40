// BatchNorm2d: 2D batch normalization.
//
// Normalizes each channel of a [N, C, H, W] input:
//   x_hat = (x - mean) / sqrt(var + eps)
//   y = gamma * x_hat + beta
//
// Training mode computes mean/var per channel over (N, H, W) and updates
// exponential moving averages; eval mode uses the running statistics.
// The executor always runs graphs in eval mode, so a freshly built layer
// (running mean 0, running var 1) is close to an identity transform.

use std::cell::{Cell, RefCell};

use netlens_core::error::{Error, Result};
use netlens_core::tensor::Tensor;

use crate::module::Module;

/// 2D batch normalization layer.
pub struct BatchNorm2d {
    /// Learnable scale (gamma): [C].
    weight: Tensor,
    /// Learnable shift (beta): [C].
    bias: Tensor,
    /// Running mean (not trainable): [C].
    running_mean: RefCell<Vec<f32>>,
    /// Running variance (not trainable): [C].
    running_var: RefCell<Vec<f32>>,
    num_features: usize,
    eps: f32,
    momentum: f32,
    training: Cell<bool>,
}

impl BatchNorm2d {
    /// Create a new BatchNorm2d layer.
    ///
    /// `eps` is the numerical stability constant (typically 1e-5) and
    /// `momentum` the EMA weight for running statistics (typically 0.1).
    pub fn new(num_features: usize, eps: f32, momentum: f32) -> Self {
        BatchNorm2d {
            weight: Tensor::ones(num_features),
            bias: Tensor::zeros(num_features),
            running_mean: RefCell::new(vec![0.0; num_features]),
            running_var: RefCell::new(vec![1.0; num_features]),
            num_features,
            eps,
            momentum,
            training: Cell::new(true),
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Normalize with the given per-channel mean and variance:
    /// y = gamma * (x - mean) / sqrt(var + eps) + beta, broadcast over
    /// [1, C, 1, 1].
    fn apply_norm(&self, x: &Tensor, mean: &[f32], var: &[f32]) -> Result<Tensor> {
        let c = self.num_features;
        let gamma = self.weight.as_slice();

        let scale: Vec<f32> = var
            .iter()
            .zip(gamma)
            .map(|(&v, &g)| g / (v + self.eps).sqrt())
            .collect();
        let mean_t = Tensor::from_vec(mean.to_vec(), (1, c, 1, 1))?;
        let scale_t = Tensor::from_vec(scale, (1, c, 1, 1))?;
        let beta_t = self.bias.reshape((1, c, 1, 1))?;

        x.sub(&mean_t)?.mul(&scale_t)?.add(&beta_t)
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        if x.rank() != 4 {
            return Err(Error::RankMismatch {
                expected: 4,
                got: x.rank(),
            });
        }
        let dims = x.dims();
        let (n, c, h, w) = (dims[0], dims[1], dims[2], dims[3]);
        if c != self.num_features {
            return Err(Error::msg(format!(
                "BatchNorm2d: expected {} channels, got {}",
                self.num_features, c
            )));
        }

        if self.training.get() {
            // Per-channel mean and variance over (N, H, W).
            let src = x.as_slice();
            let hw = h * w;
            let count = (n * hw) as f32;
            let mut mean = vec![0.0f32; c];
            let mut var = vec![0.0f32; c];
            for (i, &v) in src.iter().enumerate() {
                mean[(i / hw) % c] += v;
            }
            for m in &mut mean {
                *m /= count;
            }
            for (i, &v) in src.iter().enumerate() {
                let ci = (i / hw) % c;
                let d = v - mean[ci];
                var[ci] += d * d;
            }
            for v in &mut var {
                *v /= count;
            }

            {
                let mut rm = self.running_mean.borrow_mut();
                let mut rv = self.running_var.borrow_mut();
                for ci in 0..c {
                    rm[ci] = (1.0 - self.momentum) * rm[ci] + self.momentum * mean[ci];
                    rv[ci] = (1.0 - self.momentum) * rv[ci] + self.momentum * var[ci];
                }
            }

            self.apply_norm(x, &mean, &var)
        } else {
            let rm = self.running_mean.borrow();
            let rv = self.running_var.borrow();
            self.apply_norm(x, &rm, &rv)
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn set_training(&self, training: bool) {
        self.training.set(training);
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}
