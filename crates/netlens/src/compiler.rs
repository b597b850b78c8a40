//! Architecture compiler: turns a declarative layer list into an executable
//! graph of instantiated modules.
//!
//! Compilation walks the descriptor front to back. For each layer it parses
//! the kind string, coerces the loosely typed parameter map into a strict
//! [`OpSpec`], and instantiates the corresponding module. Dense layers with a
//! missing or non-positive `in_features` get their input width inferred by
//! probing the already-built prefix with a zero tensor. Compilation is
//! all-or-nothing: the first bad layer aborts with an error naming its index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use netlens_core::{Shape, Tensor};
use netlens_nn::{
    AdaptiveAvgPool2d, AvgPool2d, BatchNorm2d, Conv2d, Dropout, Flatten, Linear, MaxPool2d,
    Module, ReLU, Sigmoid, Tanh,
};

use crate::error::{Error, Result};

/// One layer in a declarative architecture: a kind string plus a free-form
/// parameter map. Parameters are permissive on the wire (numbers, numeric
/// strings, one-element arrays, pairs) and validated at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl LayerSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        LayerSpec {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// Builder-style parameter insertion, mainly for tests and demos.
    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

/// An ordered list of layers describing a sequential network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchitectureDescriptor {
    pub layers: Vec<LayerSpec>,
}

impl ArchitectureDescriptor {
    pub fn new(layers: Vec<LayerSpec>) -> Self {
        ArchitectureDescriptor { layers }
    }
}

/// Fully resolved parameters for one graph operation. Every field has been
/// coerced, defaulted, and validated; building a module from an `OpSpec`
/// cannot fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpSpec {
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: [usize; 2],
    },
    Linear {
        in_features: usize,
        out_features: usize,
    },
    MaxPool2d {
        kernel_size: [usize; 2],
        stride: [usize; 2],
    },
    AvgPool2d {
        kernel_size: [usize; 2],
        stride: [usize; 2],
    },
    BatchNorm2d {
        num_features: usize,
    },
    ReLU,
    Sigmoid,
    Tanh,
    Dropout {
        p: f32,
    },
    Flatten {
        start_dim: usize,
        end_dim: isize,
    },
    AdaptiveAvgPool2d {
        output_size: [usize; 2],
    },
}

impl OpSpec {
    /// Canonical kind name, as reported in observation records.
    pub fn kind(&self) -> &'static str {
        match self {
            OpSpec::Conv2d { .. } => "Conv2d",
            OpSpec::Linear { .. } => "Linear",
            OpSpec::MaxPool2d { .. } => "MaxPool2d",
            OpSpec::AvgPool2d { .. } => "AvgPool2d",
            OpSpec::BatchNorm2d { .. } => "BatchNorm2d",
            OpSpec::ReLU => "ReLU",
            OpSpec::Sigmoid => "Sigmoid",
            OpSpec::Tanh => "Tanh",
            OpSpec::Dropout { .. } => "Dropout",
            OpSpec::Flatten { .. } => "Flatten",
            OpSpec::AdaptiveAvgPool2d { .. } => "AdaptiveAvgPool2d",
        }
    }

    /// Build the module this spec describes. Total: every variant maps to
    /// exactly one module constructor.
    fn instantiate(&self) -> Box<dyn Module> {
        match *self {
            OpSpec::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            } => Box::new(Conv2d::new(
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
                true,
            )),
            OpSpec::Linear {
                in_features,
                out_features,
            } => Box::new(Linear::new(in_features, out_features, true)),
            OpSpec::MaxPool2d {
                kernel_size,
                stride,
            } => Box::new(MaxPool2d::new(kernel_size, stride)),
            OpSpec::AvgPool2d {
                kernel_size,
                stride,
            } => Box::new(AvgPool2d::new(kernel_size, stride)),
            OpSpec::BatchNorm2d { num_features } => {
                Box::new(BatchNorm2d::new(num_features, 1e-5, 0.1))
            }
            OpSpec::ReLU => Box::new(ReLU),
            OpSpec::Sigmoid => Box::new(Sigmoid),
            OpSpec::Tanh => Box::new(Tanh),
            OpSpec::Dropout { p } => Box::new(Dropout::new(p)),
            OpSpec::Flatten { start_dim, end_dim } => Box::new(Flatten::new(start_dim, end_dim)),
            OpSpec::AdaptiveAvgPool2d { output_size } => {
                Box::new(AdaptiveAvgPool2d::new(output_size))
            }
        }
    }
}

impl std::fmt::Display for OpSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpSpec::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            } => write!(
                f,
                "Conv2d({in_channels}, {out_channels}, kernel_size={kernel_size:?}, stride={stride:?}, padding={padding:?})"
            ),
            OpSpec::Linear {
                in_features,
                out_features,
            } => write!(f, "Linear(in_features={in_features}, out_features={out_features})"),
            OpSpec::MaxPool2d {
                kernel_size,
                stride,
            } => write!(f, "MaxPool2d(kernel_size={kernel_size:?}, stride={stride:?})"),
            OpSpec::AvgPool2d {
                kernel_size,
                stride,
            } => write!(f, "AvgPool2d(kernel_size={kernel_size:?}, stride={stride:?})"),
            OpSpec::BatchNorm2d { num_features } => write!(f, "BatchNorm2d({num_features})"),
            OpSpec::ReLU => write!(f, "ReLU()"),
            OpSpec::Sigmoid => write!(f, "Sigmoid()"),
            OpSpec::Tanh => write!(f, "Tanh()"),
            OpSpec::Dropout { p } => write!(f, "Dropout(p={p})"),
            OpSpec::Flatten { start_dim, end_dim } => {
                write!(f, "Flatten(start_dim={start_dim}, end_dim={end_dim})")
            }
            OpSpec::AdaptiveAvgPool2d { output_size } => {
                write!(f, "AdaptiveAvgPool2d(output_size={output_size:?})")
            }
        }
    }
}

/// One executable node: a stable name, the resolved spec, and the module.
pub struct GraphOp {
    name: String,
    spec: OpSpec,
    module: Box<dyn Module>,
}

impl GraphOp {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.spec.kind()
    }

    pub fn spec(&self) -> &OpSpec {
        &self.spec
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }
}

/// A compiled sequential graph plus the resolved descriptor it was built
/// from. The descriptor reflects inference results (e.g. a dense layer's
/// `in_features` filled in), so serializing it yields a descriptor that
/// recompiles without needing a reference shape.
pub struct CompiledGraph {
    ops: Vec<GraphOp>,
    descriptor: ArchitectureDescriptor,
}

impl CompiledGraph {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[GraphOp] {
        &self.ops
    }

    pub fn descriptor(&self) -> &ArchitectureDescriptor {
        &self.descriptor
    }

    /// Switch every stateful layer (Dropout, BatchNorm2d) between training
    /// and eval behavior.
    pub fn set_training(&self, training: bool) {
        for op in &self.ops {
            op.module.set_training(training);
        }
    }

    /// Total parameter count across all layers. Running statistics are
    /// buffers, not parameters, so they are not counted.
    pub fn total_parameters(&self) -> usize {
        self.ops.iter().map(|op| op.module.num_parameters()).sum()
    }

    /// Trainable parameter count. Every parameter in this graph is
    /// trainable, so this equals [`total_parameters`](Self::total_parameters).
    pub fn trainable_parameters(&self) -> usize {
        self.total_parameters()
    }

    /// Human-readable listing of the graph, one line per layer.
    pub fn summary(&self) -> String {
        let mut out = String::from("Sequential(\n");
        for op in &self.ops {
            out.push_str(&format!("  ({}): {}\n", op.name, op.spec));
        }
        out.push(')');
        out
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("ops", &self.ops.iter().map(GraphOp::name).collect::<Vec<_>>())
            .finish()
    }
}

/// Compile a descriptor into an executable graph.
///
/// `reference_shape` is the shape of a representative input without the
/// batch dimension for 3-d image inputs (e.g. `[3, 32, 32]`); it is only
/// consulted when a dense layer needs its input width inferred.
pub fn compile(
    descriptor: &ArchitectureDescriptor,
    reference_shape: Option<&[usize]>,
) -> Result<CompiledGraph> {
    let mut resolved = descriptor.clone();
    let mut ops: Vec<GraphOp> = Vec::with_capacity(resolved.layers.len());

    for (index, layer) in resolved.layers.iter_mut().enumerate() {
        let kind = LayerKind::parse(&layer.kind).ok_or_else(|| Error::UnsupportedLayerKind {
            index,
            kind: layer.kind.clone(),
        })?;

        if kind == LayerKind::Linear && !has_explicit_in_features(layer, index)? {
            let inferred = infer_in_features(&ops, reference_shape, index)?;
            layer
                .params
                .insert("in_features".to_string(), Value::from(inferred as u64));
        }

        let reader = ParamReader {
            index,
            kind: &layer.kind,
            params: &layer.params,
        };
        let spec = build_spec(kind, &reader)?;
        let module = spec.instantiate();
        ops.push(GraphOp {
            name: format!("{}_{}", spec.kind().to_lowercase(), index),
            spec,
            module,
        });
    }

    tracing::debug!(layers = ops.len(), "compiled architecture");
    Ok(CompiledGraph {
        ops,
        descriptor: resolved,
    })
}

/// The closed set of recognized kind strings. `Dense` is an accepted alias
/// for `Linear`; matching is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerKind {
    Conv2d,
    Linear,
    MaxPool2d,
    AvgPool2d,
    BatchNorm2d,
    ReLU,
    Sigmoid,
    Tanh,
    Dropout,
    Flatten,
    AdaptiveAvgPool2d,
}

impl LayerKind {
    fn parse(kind: &str) -> Option<Self> {
        Some(match kind {
            "Conv2d" => LayerKind::Conv2d,
            "Dense" | "Linear" => LayerKind::Linear,
            "MaxPool2d" => LayerKind::MaxPool2d,
            "AvgPool2d" => LayerKind::AvgPool2d,
            "BatchNorm2d" => LayerKind::BatchNorm2d,
            "ReLU" => LayerKind::ReLU,
            "Sigmoid" => LayerKind::Sigmoid,
            "Tanh" => LayerKind::Tanh,
            "Dropout" => LayerKind::Dropout,
            "Flatten" => LayerKind::Flatten,
            "AdaptiveAvgPool2d" => LayerKind::AdaptiveAvgPool2d,
            _ => return None,
        })
    }
}

/// True when the layer carries a usable positive `in_features`. A present
/// but malformed value is an error, not a trigger for inference.
fn has_explicit_in_features(layer: &LayerSpec, index: usize) -> Result<bool> {
    match layer.params.get("in_features") {
        None => Ok(false),
        Some(v) => match coerce_int(v) {
            Ok(n) => Ok(n > 0),
            Err(message) => Err(Error::InvalidParameter {
                index,
                kind: layer.kind.clone(),
                name: "in_features".to_string(),
                message,
            }),
        },
    }
}

/// Probe the already-built prefix with a zero tensor of the reference shape
/// and report the flattened per-sample feature count at its output.
fn infer_in_features(
    prefix: &[GraphOp],
    reference_shape: Option<&[usize]>,
    index: usize,
) -> Result<usize> {
    let shape = reference_shape.ok_or_else(|| Error::ShapeInference {
        index,
        reason: "in_features not specified and no reference input shape provided".to_string(),
    })?;

    let mut dims = shape.to_vec();
    if dims.len() == 3 {
        // Single CHW sample: prepend a batch dimension.
        dims.insert(0, 1);
    }

    let mut probe = Tensor::zeros(Shape::new(dims));
    for op in prefix {
        probe = op.module.forward(&probe).map_err(|e| Error::ShapeInference {
            index,
            reason: format!(
                "probing reference shape {:?} failed at layer {} ({}): {}",
                shape,
                op.name,
                op.spec.kind(),
                e
            ),
        })?;
    }

    let batch = if probe.rank() == 0 { 1 } else { probe.dims()[0] };
    let features = probe.elem_count() / batch.max(1);
    tracing::debug!(index, features, "inferred dense layer input width");
    Ok(features)
}

/// Per-layer view over the raw parameter map, carrying enough context to
/// build precise errors.
struct ParamReader<'a> {
    index: usize,
    kind: &'a str,
    params: &'a Map<String, Value>,
}

impl ParamReader<'_> {
    fn invalid(&self, name: &str, message: impl Into<String>) -> Error {
        Error::InvalidParameter {
            index: self.index,
            kind: self.kind.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.params.get(name) {
            None => Ok(default),
            Some(v) => coerce_int(v).map_err(|m| self.invalid(name, m)),
        }
    }

    /// Integer parameter that must be >= 1.
    fn positive_or(&self, name: &str, default: usize) -> Result<usize> {
        let v = self.int_or(name, default as i64)?;
        if v < 1 {
            return Err(self.invalid(name, format!("must be positive, got {v}")));
        }
        Ok(v as usize)
    }

    /// Pair parameter with a lower bound on each element (1 for kernels and
    /// strides, 0 for padding).
    fn pair_or(&self, name: &str, default: [usize; 2], min: i64) -> Result<[usize; 2]> {
        let pair = match self.params.get(name) {
            None => return Ok(default),
            Some(v) => coerce_pair(v).map_err(|m| self.invalid(name, m))?,
        };
        for v in pair {
            if v < min {
                return Err(self.invalid(name, format!("must be at least {min}, got {v}")));
            }
        }
        Ok([pair[0] as usize, pair[1] as usize])
    }

    fn float_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.params.get(name) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| self.invalid(name, format!("expected a number, got {n}"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.invalid(name, format!("cannot parse {s:?} as a number"))),
            Some(other) => Err(self.invalid(name, format!("expected a number, got {other}"))),
        }
    }
}

/// Coerce a JSON value to an integer. Accepts integers, numeric strings,
/// and one-element arrays of either. Floats are rejected: a fractional
/// channel count is a descriptor bug, not something to round away.
fn coerce_int(v: &Value) -> std::result::Result<i64, String> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("expected an integer, got {n}")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("cannot parse {s:?} as an integer")),
        Value::Array(items) if items.len() == 1 => coerce_int(&items[0]),
        other => Err(format!("unsupported integer value: {other}")),
    }
}

/// Coerce a JSON value to a 2-element pair. A scalar `k` broadcasts to
/// `[k, k]`; arrays and comma-separated strings supply one or two elements.
fn coerce_pair(v: &Value) -> std::result::Result<[i64; 2], String> {
    match v {
        Value::Number(_) => {
            let k = coerce_int(v)?;
            Ok([k, k])
        }
        Value::Array(items) => match items.len() {
            1 => {
                let k = coerce_int(&items[0])?;
                Ok([k, k])
            }
            2 => Ok([coerce_int(&items[0])?, coerce_int(&items[1])?]),
            n => Err(format!("expected 1 or 2 elements, got {n}")),
        },
        Value::String(s) => {
            let parts: Vec<&str> = s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            match parts.len() {
                1 => {
                    let k = parts[0]
                        .parse::<i64>()
                        .map_err(|_| format!("cannot parse {s:?} as an integer pair"))?;
                    Ok([k, k])
                }
                2 => {
                    let a = parts[0]
                        .parse::<i64>()
                        .map_err(|_| format!("cannot parse {s:?} as an integer pair"))?;
                    let b = parts[1]
                        .parse::<i64>()
                        .map_err(|_| format!("cannot parse {s:?} as an integer pair"))?;
                    Ok([a, b])
                }
                n => Err(format!("expected 1 or 2 elements, got {n}")),
            }
        }
        other => Err(format!("unsupported pair value: {other}")),
    }
}

/// Resolve a layer's parameters into a fully validated spec, applying the
/// documented defaults for anything absent.
fn build_spec(kind: LayerKind, reader: &ParamReader<'_>) -> Result<OpSpec> {
    Ok(match kind {
        LayerKind::Conv2d => OpSpec::Conv2d {
            in_channels: reader.positive_or("in_channels", 3)?,
            out_channels: reader.positive_or("out_channels", 64)?,
            kernel_size: reader.pair_or("kernel_size", [3, 3], 1)?,
            stride: reader.pair_or("stride", [1, 1], 1)?,
            padding: reader.pair_or("padding", [0, 0], 0)?,
        },
        LayerKind::Linear => OpSpec::Linear {
            // in_features is guaranteed present and positive by this point,
            // either from the descriptor or from shape inference.
            in_features: reader.positive_or("in_features", 1)?,
            out_features: reader.positive_or("out_features", 64)?,
        },
        LayerKind::MaxPool2d => OpSpec::MaxPool2d {
            kernel_size: reader.pair_or("kernel_size", [2, 2], 1)?,
            stride: reader.pair_or("stride", [2, 2], 1)?,
        },
        LayerKind::AvgPool2d => OpSpec::AvgPool2d {
            kernel_size: reader.pair_or("kernel_size", [2, 2], 1)?,
            stride: reader.pair_or("stride", [2, 2], 1)?,
        },
        LayerKind::BatchNorm2d => OpSpec::BatchNorm2d {
            num_features: reader.positive_or("num_features", 64)?,
        },
        LayerKind::ReLU => OpSpec::ReLU,
        LayerKind::Sigmoid => OpSpec::Sigmoid,
        LayerKind::Tanh => OpSpec::Tanh,
        LayerKind::Dropout => {
            let p = reader.float_or("p", 0.5)?;
            if !(0.0..1.0).contains(&p) {
                return Err(reader.invalid("p", format!("must be in [0, 1), got {p}")));
            }
            OpSpec::Dropout { p: p as f32 }
        }
        LayerKind::Flatten => {
            let start = reader.int_or("start_dim", 1)?;
            if start < 0 {
                return Err(reader.invalid("start_dim", format!("must be non-negative, got {start}")));
            }
            OpSpec::Flatten {
                start_dim: start as usize,
                end_dim: reader.int_or("end_dim", -1)? as isize,
            }
        }
        LayerKind::AdaptiveAvgPool2d => OpSpec::AdaptiveAvgPool2d {
            output_size: reader.pair_or("output_size", [1, 1], 1)?,
        },
    })
}
