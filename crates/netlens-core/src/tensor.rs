use std::sync::Arc;

use rand::Rng;

use crate::error::{Error, Result};
use crate::shape::Shape;

// Tensor: the fundamental data structure.
//
// A Tensor is an n-dimensional array of f32 values with contiguous,
// row-major storage. It is evaluation-only: no autograd, no strided views,
// no device abstraction. Operations return fresh tensors.
//
// MEMORY MODEL:
//
//   The buffer is wrapped in Arc, so cloning a Tensor is O(1) and reshape
//   shares storage with the source. All other operations allocate.

/// An n-dimensional array of f32 values.
pub struct Tensor {
    data: Arc<Vec<f32>>,
    shape: Shape,
}

impl Clone for Tensor {
    fn clone(&self) -> Self {
        Tensor {
            data: Arc::clone(&self.data),
            shape: self.shape.clone(),
        }
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tensor(shape={})", self.shape)
    }
}

impl Tensor {
    // Creation

    /// Create a tensor from a flat buffer and a shape.
    ///
    /// Fails with [`Error::ElementCountMismatch`] when the buffer length does
    /// not equal the shape's element count.
    pub fn from_vec(data: Vec<f32>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(Tensor {
            data: Arc::new(data),
            shape,
        })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Tensor {
            data: Arc::new(vec![0.0; shape.elem_count()]),
            shape,
        }
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Tensor {
            data: Arc::new(vec![1.0; shape.elem_count()]),
            shape,
        }
    }

    /// Create a tensor with uniform random values in [0, 1).
    pub fn rand(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let mut rng = rand::rng();
        let data = (0..shape.elem_count())
            .map(|_| rng.random::<f32>())
            .collect();
        Tensor {
            data: Arc::new(data),
            shape,
        }
    }

    // Accessors

    /// The shape of this tensor.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The dimensions as a slice (shortcut for `shape().dims()`).
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// The raw buffer in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copy the buffer out as a Vec.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.as_ref().clone()
    }

    // Shape manipulation

    /// Reshape to a new shape with the same element count.
    ///
    /// Storage is shared with the source tensor (O(1)).
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.elem_count() != self.elem_count() {
            return Err(Error::ReshapeElementMismatch {
                src: self.elem_count(),
                dst: shape.elem_count(),
                dst_shape: shape,
            });
        }
        Ok(Tensor {
            data: Arc::clone(&self.data),
            shape,
        })
    }

    /// Transpose a rank-2 tensor, materializing the result.
    pub fn t(&self) -> Result<Self> {
        if self.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        let (rows, cols) = (self.dims()[0], self.dims()[1]);
        let src = self.as_slice();
        let mut out = vec![0.0f32; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                out[c * rows + r] = src[r * cols + c];
            }
        }
        Tensor::from_vec(out, (cols, rows))
    }

    // Element-wise operations

    fn unary(&self, f: impl Fn(f32) -> f32) -> Self {
        let data = self.data.iter().map(|&v| f(v)).collect();
        Tensor {
            data: Arc::new(data),
            shape: self.shape.clone(),
        }
    }

    /// ReLU: max(0, x).
    pub fn relu(&self) -> Self {
        self.unary(|v| v.max(0.0))
    }

    /// Sigmoid: 1 / (1 + e^(-x)).
    pub fn sigmoid(&self) -> Self {
        self.unary(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Hyperbolic tangent.
    pub fn tanh(&self) -> Self {
        self.unary(f32::tanh)
    }

    /// Affine transform: x * mul + add.
    pub fn affine(&self, mul: f32, add: f32) -> Self {
        self.unary(|v| v * mul + add)
    }

    fn binary_broadcast(&self, rhs: &Tensor, f: impl Fn(f32, f32) -> f32) -> Result<Self> {
        let out_shape = Shape::broadcast_shape(&self.shape, &rhs.shape)?;
        let out_dims = out_shape.dims().to_vec();
        let lhs_strides = self.shape.broadcast_strides(&out_shape);
        let rhs_strides = rhs.shape.broadcast_strides(&out_shape);
        let n = out_shape.elem_count();

        let lhs = self.as_slice();
        let rhs_data = rhs.as_slice();
        let mut out = Vec::with_capacity(n);
        let mut idx = vec![0usize; out_dims.len()];
        for _ in 0..n {
            let li: usize = idx.iter().zip(&lhs_strides).map(|(i, s)| i * s).sum();
            let ri: usize = idx.iter().zip(&rhs_strides).map(|(i, s)| i * s).sum();
            out.push(f(lhs[li], rhs_data[ri]));
            for d in (0..idx.len()).rev() {
                idx[d] += 1;
                if idx[d] < out_dims[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        Tensor::from_vec(out, out_shape)
    }

    /// Element-wise addition with NumPy-style broadcasting.
    pub fn add(&self, rhs: &Tensor) -> Result<Self> {
        self.binary_broadcast(rhs, |a, b| a + b)
    }

    /// Element-wise subtraction with broadcasting.
    pub fn sub(&self, rhs: &Tensor) -> Result<Self> {
        self.binary_broadcast(rhs, |a, b| a - b)
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, rhs: &Tensor) -> Result<Self> {
        self.binary_broadcast(rhs, |a, b| a * b)
    }

    // Matrix multiplication

    /// Matrix multiply for rank-2 tensors: [m, k] @ [k, n] -> [m, n].
    pub fn matmul(&self, rhs: &Tensor) -> Result<Self> {
        if self.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        if rhs.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: rhs.rank(),
            });
        }
        let (m, k1) = (self.dims()[0], self.dims()[1]);
        let (k2, n) = (rhs.dims()[0], rhs.dims()[1]);
        if k1 != k2 {
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }

        let a = self.as_slice();
        let b = rhs.as_slice();
        let mut out = vec![0.0f32; m * n];
        for i in 0..m {
            for kk in 0..k1 {
                let av = a[i * k1 + kk];
                if av == 0.0 {
                    continue;
                }
                let b_row = &b[kk * n..(kk + 1) * n];
                let o_row = &mut out[i * n..(i + 1) * n];
                for j in 0..n {
                    o_row[j] += av * b_row[j];
                }
            }
        }
        Tensor::from_vec(out, (m, n))
    }

    // Convolution and pooling (NCHW layout)

    /// 2D convolution.
    ///
    /// Input `[N, C_in, H, W]`, weight `[C_out, C_in, kH, kW]`, optional bias
    /// `[C_out]`. Output `[N, C_out, H_out, W_out]` where
    /// `H_out = (H + 2*pH - kH) / sH + 1`.
    pub fn conv2d(
        &self,
        weight: &Tensor,
        bias: Option<&Tensor>,
        stride: [usize; 2],
        padding: [usize; 2],
    ) -> Result<Self> {
        if self.rank() != 4 {
            return Err(Error::RankMismatch {
                expected: 4,
                got: self.rank(),
            });
        }
        if weight.rank() != 4 {
            return Err(Error::RankMismatch {
                expected: 4,
                got: weight.rank(),
            });
        }
        let (n, c_in, h, w) = (
            self.dims()[0],
            self.dims()[1],
            self.dims()[2],
            self.dims()[3],
        );
        let (c_out, wc_in, kh, kw) = (
            weight.dims()[0],
            weight.dims()[1],
            weight.dims()[2],
            weight.dims()[3],
        );
        if wc_in != c_in {
            return Err(Error::msg(format!(
                "conv2d: input has {} channels but weight expects {}",
                c_in, wc_in
            )));
        }
        if let Some(b) = bias {
            if b.dims() != [c_out] {
                return Err(Error::msg(format!(
                    "conv2d: bias must have shape [{}], got {}",
                    c_out,
                    b.shape()
                )));
            }
        }
        let [sh, sw] = stride;
        let [ph, pw] = padding;
        let (h_out, w_out) = out_spatial(h, w, [kh, kw], stride, padding, "conv2d")?;

        let x = self.as_slice();
        let wt = weight.as_slice();
        let mut out = vec![0.0f32; n * c_out * h_out * w_out];
        for b in 0..n {
            for co in 0..c_out {
                let base = bias.map(|t| t.as_slice()[co]).unwrap_or(0.0);
                for oh in 0..h_out {
                    for ow in 0..w_out {
                        let mut acc = base;
                        for ci in 0..c_in {
                            for ki in 0..kh {
                                let ih = (oh * sh + ki) as isize - ph as isize;
                                if ih < 0 || ih >= h as isize {
                                    continue;
                                }
                                for kj in 0..kw {
                                    let iw = (ow * sw + kj) as isize - pw as isize;
                                    if iw < 0 || iw >= w as isize {
                                        continue;
                                    }
                                    let xi = ((b * c_in + ci) * h + ih as usize) * w + iw as usize;
                                    let wi = ((co * c_in + ci) * kh + ki) * kw + kj;
                                    acc += x[xi] * wt[wi];
                                }
                            }
                        }
                        out[((b * c_out + co) * h_out + oh) * w_out + ow] = acc;
                    }
                }
            }
        }
        Tensor::from_vec(out, (n, c_out, h_out, w_out))
    }

    /// 2D max-pooling over the spatial dimensions of `[N, C, H, W]`.
    pub fn max_pool2d(
        &self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
    ) -> Result<Self> {
        self.pool2d(kernel_size, stride, padding, "max_pool2d", |window| {
            window.iter().copied().fold(f32::NEG_INFINITY, f32::max)
        })
    }

    /// 2D average-pooling over the spatial dimensions of `[N, C, H, W]`.
    ///
    /// Padded positions count toward the divisor (PyTorch's
    /// `count_include_pad=True` behavior).
    pub fn avg_pool2d(
        &self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
    ) -> Result<Self> {
        let divisor = (kernel_size[0] * kernel_size[1]) as f32;
        self.pool2d(kernel_size, stride, padding, "avg_pool2d", move |window| {
            window.iter().sum::<f32>() / divisor
        })
    }

    fn pool2d(
        &self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
        op_name: &str,
        reduce: impl Fn(&[f32]) -> f32,
    ) -> Result<Self> {
        if self.rank() != 4 {
            return Err(Error::RankMismatch {
                expected: 4,
                got: self.rank(),
            });
        }
        let (n, c, h, w) = (
            self.dims()[0],
            self.dims()[1],
            self.dims()[2],
            self.dims()[3],
        );
        let [kh, kw] = kernel_size;
        let [sh, sw] = stride;
        let [ph, pw] = padding;
        let (h_out, w_out) = out_spatial(h, w, kernel_size, stride, padding, op_name)?;

        let x = self.as_slice();
        let mut out = vec![0.0f32; n * c * h_out * w_out];
        let mut window = Vec::with_capacity(kh * kw);
        for b in 0..n {
            for ci in 0..c {
                for oh in 0..h_out {
                    for ow in 0..w_out {
                        window.clear();
                        for ki in 0..kh {
                            let ih = (oh * sh + ki) as isize - ph as isize;
                            if ih < 0 || ih >= h as isize {
                                continue;
                            }
                            for kj in 0..kw {
                                let iw = (ow * sw + kj) as isize - pw as isize;
                                if iw < 0 || iw >= w as isize {
                                    continue;
                                }
                                window
                                    .push(x[((b * c + ci) * h + ih as usize) * w + iw as usize]);
                            }
                        }
                        out[((b * c + ci) * h_out + oh) * w_out + ow] = reduce(&window);
                    }
                }
            }
        }
        Tensor::from_vec(out, (n, c, h_out, w_out))
    }
}

/// Output spatial size of a sliding-window op, with bounds checking.
fn out_spatial(
    h: usize,
    w: usize,
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
    op_name: &str,
) -> Result<(usize, usize)> {
    let [kh, kw] = kernel_size;
    let [sh, sw] = stride;
    let [ph, pw] = padding;
    if kh == 0 || kw == 0 || sh == 0 || sw == 0 {
        return Err(Error::msg(format!(
            "{}: kernel_size and stride must be > 0",
            op_name
        )));
    }
    let h_pad = h + 2 * ph;
    let w_pad = w + 2 * pw;
    if kh > h_pad || kw > w_pad {
        return Err(Error::msg(format!(
            "{}: kernel [{}, {}] larger than padded input [{}, {}]",
            op_name, kh, kw, h_pad, w_pad
        )));
    }
    Ok(((h_pad - kh) / sh + 1, (w_pad - kw) / sw + 1))
}
