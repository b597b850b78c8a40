// Flatten: collapse a contiguous range of dimensions into one.
//
// Default (start_dim=1, end_dim=-1) flattens everything except the batch
// dimension: [N, C, H, W] -> [N, C*H*W]. A negative end_dim counts from the
// back, PyTorch-style.

use netlens_core::error::{Error, Result};
use netlens_core::shape::Shape;
use netlens_core::tensor::Tensor;

use crate::module::Module;

/// Flatten layer: collapses dimensions `start_dim..=end_dim` into one.
pub struct Flatten {
    start_dim: usize,
    end_dim: isize,
}

impl Flatten {
    /// Create a Flatten over `start_dim..=end_dim` (end_dim may be negative).
    pub fn new(start_dim: usize, end_dim: isize) -> Self {
        Flatten { start_dim, end_dim }
    }
}

impl Default for Flatten {
    /// Flatten everything except the batch dimension.
    fn default() -> Self {
        Flatten {
            start_dim: 1,
            end_dim: -1,
        }
    }
}

impl Module for Flatten {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let dims = x.dims();
        if self.start_dim >= dims.len() {
            return Ok(x.clone()); // nothing to flatten
        }

        let end = if self.end_dim < 0 {
            let e = dims.len() as isize + self.end_dim;
            if e < 0 {
                return Err(Error::msg(format!(
                    "Flatten: end_dim {} out of range for rank {}",
                    self.end_dim,
                    dims.len()
                )));
            }
            e as usize
        } else {
            self.end_dim as usize
        };
        if end >= dims.len() || end < self.start_dim {
            return Err(Error::msg(format!(
                "Flatten: invalid range start_dim={} end_dim={} for rank {}",
                self.start_dim,
                self.end_dim,
                dims.len()
            )));
        }

        let mut new_dims: Vec<usize> = dims[..self.start_dim].to_vec();
        new_dims.push(dims[self.start_dim..=end].iter().product());
        new_dims.extend_from_slice(&dims[end + 1..]);

        x.reshape(Shape::new(new_dims))
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}
