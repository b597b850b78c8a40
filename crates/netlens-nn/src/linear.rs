// Linear: fully-connected (dense) layer, y = xW^T + b.
//
// Weights use Kaiming (He) uniform initialization: U(-k, k) with
// k = sqrt(1/in_features), the standard for layers followed by ReLU.
//
// PARAMETER SHAPES:
//   weight: [out_features, in_features]  (stored transposed, PyTorch layout)
//   bias:   [1, out_features]            (broadcast across the batch)

use netlens_core::error::{Error, Result};
use netlens_core::tensor::Tensor;

use crate::module::Module;

/// A fully-connected (dense) layer: y = xW^T + b.
pub struct Linear {
    /// Weight matrix: [out_features, in_features].
    weight: Tensor,
    /// Optional bias vector: [1, out_features].
    bias: Option<Tensor>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a new Linear layer with Kaiming uniform initialization.
    pub fn new(in_features: usize, out_features: usize, use_bias: bool) -> Self {
        // Uniform in [-k, k] where k = sqrt(1/in_features).
        let k = (1.0 / in_features.max(1) as f32).sqrt();
        let weight = Tensor::rand((out_features, in_features)).affine(2.0 * k, -k);
        let bias = use_bias.then(|| Tensor::rand((1, out_features)).affine(2.0 * k, -k));
        Linear {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    /// Create a Linear layer from existing weight and bias tensors.
    /// Useful for deterministic tests and loading pre-set parameters.
    pub fn from_tensors(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        let dims = weight.dims();
        if dims.len() != 2 {
            return Err(Error::msg(format!(
                "Linear weight must be 2D, got shape {:?}",
                dims
            )));
        }
        let out_features = dims[0];
        let in_features = dims[1];
        Ok(Linear {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    /// The input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// The output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Direct access to the weight tensor.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Direct access to the bias tensor (if any).
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

impl Module for Linear {
    /// Forward pass: y = x @ W^T + b.
    ///
    /// Input `[batch, in_features]` (a rank-1 input is treated as a single
    /// unbatched sample and returned rank-1, matching PyTorch).
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let unbatched = x.rank() == 1;
        let x2 = if unbatched {
            x.reshape((1, x.elem_count()))?
        } else {
            x.clone()
        };

        let wt = self.weight.t()?;
        let mut output = x2.matmul(&wt)?;
        if let Some(bias) = &self.bias {
            output = output.add(bias)?;
        }

        if unbatched {
            output.reshape(self.out_features)
        } else {
            Ok(output)
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            params.push(b.clone());
        }
        params
    }
}
