use std::fmt;

// Shape: n-dimensional shape representation.
//
// A Shape describes the size of each dimension of a tensor:
//   - Scalar: Shape([])        0 dimensions, 1 element
//   - Vector: Shape([5])       1 dimension, 5 elements
//   - Matrix: Shape([3, 4])    2 dimensions, 12 elements
//   - Image:  Shape([1, 3, 32, 32])  NCHW convention
//
// The shape determines the element count (product of all dims) and, together
// with NumPy-style broadcasting rules, whether two tensors are compatible
// for element-wise operations.

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }

    /// Compute the broadcast output shape from two input shapes.
    ///
    /// NumPy-style rules: align from the right, dimensions are compatible
    /// when equal or when one of them is 1, missing leading dimensions are
    /// treated as 1.
    ///
    /// Examples:
    ///   [3, 4] and [4]       -> [3, 4]
    ///   [2, 1] and [1, 3]    -> [2, 3]
    ///   [1, 8, 4, 4] and [1, 8, 1, 1] -> [1, 8, 4, 4]
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> crate::Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            // Index from the right; if i >= len, treat the dimension as 1.
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld == rd {
                result.push(ld);
            } else if ld == 1 {
                result.push(rd);
            } else if rd == 1 {
                result.push(ld);
            } else {
                return Err(crate::Error::ShapeMismatch {
                    expected: lhs.clone(),
                    got: rhs.clone(),
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// Strides of this shape when its data is repeated to fill `target`.
    ///
    /// For dimensions where self is 1 and target is larger, and for missing
    /// leading dimensions, the stride is 0 (the single element repeats).
    pub fn broadcast_strides(&self, target: &Shape) -> Vec<usize> {
        let self_dims = self.dims();
        let target_dims = target.dims();

        // Contiguous row-major strides of self.
        let mut self_strides = vec![0usize; self_dims.len()];
        if !self_dims.is_empty() {
            self_strides[self_dims.len() - 1] = 1;
            for i in (0..self_dims.len() - 1).rev() {
                self_strides[i] = self_strides[i + 1] * self_dims[i + 1];
            }
        }

        let mut result = vec![0usize; target_dims.len()];
        let offset = target_dims.len() - self_dims.len();
        for i in 0..self_dims.len() {
            // Size-1 dims always get stride 0: the single element repeats,
            // whether or not the target dim happens to be 1 as well.
            if self_dims[i] != 1 && self_dims[i] == target_dims[i + offset] {
                result[i + offset] = self_strides[i];
            }
        }
        result
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<()> for Shape {
    /// Scalar shape (0 dimensions).
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    /// 1-D shape.
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}
