// Conv2d and the pooling layers.
//
// Conv2d applies learnable 2D convolution filters to an input of shape
// [N, C_in, H, W], producing [N, C_out, H_out, W_out]. Filters use Kaiming
// uniform initialization: U(-k, k) with k = sqrt(1 / (C_in * kH * kW)).
//
// MaxPool2d / AvgPool2d down-sample spatially with a sliding window.
// AdaptiveAvgPool2d pools to a fixed output size regardless of input size.
//
// OUTPUT SIZE FORMULA:
//   H_out = floor((H + 2*padding_h - kernel_h) / stride_h) + 1
//   W_out = floor((W + 2*padding_w - kernel_w) / stride_w) + 1

use netlens_core::error::{Error, Result};
use netlens_core::tensor::Tensor;

use crate::module::Module;

/// 2D convolutional layer.
pub struct Conv2d {
    /// Convolution filters: [C_out, C_in, kH, kW].
    weight: Tensor,
    /// Optional bias: [C_out].
    bias: Option<Tensor>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
}

impl Conv2d {
    /// Create a new Conv2d layer with Kaiming uniform initialization.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
        use_bias: bool,
    ) -> Self {
        let [kh, kw] = kernel_size;
        let fan_in = (in_channels * kh * kw).max(1);
        let k = (1.0 / fan_in as f32).sqrt();

        let weight =
            Tensor::rand((out_channels, in_channels, kh, kw)).affine(2.0 * k, -k);
        let bias = use_bias.then(|| Tensor::rand(out_channels).affine(2.0 * k, -k));

        Conv2d {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
        }
    }

    /// Create a Conv2d from existing weight and bias tensors.
    pub fn from_tensors(
        weight: Tensor,
        bias: Option<Tensor>,
        stride: [usize; 2],
        padding: [usize; 2],
    ) -> Result<Self> {
        let dims = weight.dims();
        if dims.len() != 4 {
            return Err(Error::msg(format!(
                "Conv2d weight must be 4D [C_out,C_in,kH,kW], got {:?}",
                dims
            )));
        }
        Ok(Conv2d {
            in_channels: dims[1],
            out_channels: dims[0],
            kernel_size: [dims[2], dims[3]],
            weight,
            bias,
            stride,
            padding,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
    pub fn kernel_size(&self) -> [usize; 2] {
        self.kernel_size
    }
}

impl Module for Conv2d {
    /// Forward pass: `[N, C_in, H, W]` -> `[N, C_out, H_out, W_out]`.
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.conv2d(&self.weight, self.bias.as_ref(), self.stride, self.padding)
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            params.push(b.clone());
        }
        params
    }
}

/// 2D max-pooling layer: takes the max in each sliding window.
pub struct MaxPool2d {
    kernel_size: [usize; 2],
    stride: [usize; 2],
}

impl MaxPool2d {
    pub fn new(kernel_size: [usize; 2], stride: [usize; 2]) -> Self {
        MaxPool2d {
            kernel_size,
            stride,
        }
    }
}

impl Module for MaxPool2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.max_pool2d(self.kernel_size, self.stride, [0, 0])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}

/// 2D average-pooling layer: takes the mean in each sliding window.
pub struct AvgPool2d {
    kernel_size: [usize; 2],
    stride: [usize; 2],
}

impl AvgPool2d {
    pub fn new(kernel_size: [usize; 2], stride: [usize; 2]) -> Self {
        AvgPool2d {
            kernel_size,
            stride,
        }
    }
}

impl Module for AvgPool2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.avg_pool2d(self.kernel_size, self.stride, [0, 0])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}

/// Adaptive 2D average pooling: pools to a fixed output spatial size.
///
/// Kernel and stride are derived from the input size so that the output has
/// the requested dimensions. `AdaptiveAvgPool2d([1, 1])` is global average
/// pooling.
pub struct AdaptiveAvgPool2d {
    output_size: [usize; 2],
}

impl AdaptiveAvgPool2d {
    pub fn new(output_size: [usize; 2]) -> Self {
        AdaptiveAvgPool2d { output_size }
    }
}

impl Module for AdaptiveAvgPool2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let dims = x.dims();
        if dims.len() != 4 {
            return Err(Error::msg(format!(
                "AdaptiveAvgPool2d: expected 4D [N,C,H,W], got {:?}",
                dims
            )));
        }
        let (h_in, w_in) = (dims[2], dims[3]);
        let [h_out, w_out] = self.output_size;
        if h_out == 0 || w_out == 0 {
            return Err(Error::msg("AdaptiveAvgPool2d: output_size must be > 0"));
        }
        if h_out > h_in || w_out > w_in {
            return Err(Error::msg(format!(
                "AdaptiveAvgPool2d: output size [{}, {}] exceeds input [{}, {}]",
                h_out, w_out, h_in, w_in
            )));
        }

        // stride = input / output, kernel = input - (output-1)*stride
        // satisfies output = floor((input - kernel) / stride) + 1.
        let stride_h = h_in / h_out;
        let stride_w = w_in / w_out;
        let kernel_h = h_in - (h_out - 1) * stride_h;
        let kernel_w = w_in - (w_out - 1) * stride_w;

        x.avg_pool2d([kernel_h, kernel_w], [stride_h, stride_w], [0, 0])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}
