//! Instrumented executor: runs one forward pass through a compiled graph and
//! records an observation for every layer output.
//!
//! Observation points are built fresh for each call and dropped before the
//! function returns, success or failure; nothing about a run outlives it.
//! Statistics cover every element of a layer's output, while the recorded
//! sample is bounded so results stay cheap to serialize.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use serde::Serialize;

use netlens_core::{Shape, Tensor};

use crate::compiler::{CompiledGraph, GraphOp};
use crate::error::{Error, Result};

/// At most this many leading elements are considered for the sample.
const SAMPLE_SCAN_LIMIT: usize = 10_000;
/// At most this many values are recorded per layer.
const SAMPLE_LIMIT: usize = 1_000;

/// Summary statistics over every element of a layer output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
    pub median: f32,
}

/// What one layer produced during a run.
#[derive(Debug, Clone, Serialize)]
pub struct LayerObservation {
    pub layer_name: String,
    pub layer_kind: String,
    pub output_shape: Vec<usize>,
    pub stats: ActivationStats,
    /// Leading values of the output, capped at [`SAMPLE_LIMIT`].
    pub sample: Vec<f32>,
}

/// The outcome of a single forward pass.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub output: Vec<f32>,
    pub output_shape: Vec<usize>,
    /// Argmax of the first output row, when the output looks like
    /// classification scores.
    pub predicted_class: Option<usize>,
    /// Probability assigned to the predicted class.
    pub confidence: Option<f32>,
    pub layers: Vec<LayerObservation>,
    /// Wall-clock seconds for the whole pass, instrumentation included.
    pub processing_time: f64,
}

/// Run one forward pass in eval mode, observing every layer.
///
/// `target_shape` reshapes the flat input before execution; a 3-d shape is
/// treated as a single CHW sample and gets a batch dimension prepended.
/// Without a target shape the input stays a flat vector.
pub fn run(
    graph: &CompiledGraph,
    input: &[f32],
    target_shape: Option<&[usize]>,
) -> Result<InferenceResult> {
    let start = Instant::now();

    let requested: Vec<usize> = match target_shape {
        Some(shape) => shape.to_vec(),
        None => vec![input.len()],
    };
    let expected: usize = requested.iter().product();
    if expected != input.len() {
        return Err(Error::ReshapeMismatch {
            shape: requested,
            expected,
            got: input.len(),
        });
    }

    let mut dims = requested.clone();
    if dims.len() == 3 {
        // Single CHW sample: prepend a batch dimension.
        dims.insert(0, 1);
    }
    let x = Tensor::from_vec(input.to_vec(), Shape::new(dims)).map_err(|_| {
        Error::ReshapeMismatch {
            shape: requested,
            expected,
            got: input.len(),
        }
    })?;

    graph.set_training(false);

    let sink: Rc<RefCell<Vec<LayerObservation>>> = Rc::new(RefCell::new(Vec::new()));
    let points: Vec<ObservationPoint<'_>> = graph
        .ops()
        .iter()
        .map(|op| ObservationPoint {
            op,
            sink: Rc::clone(&sink),
        })
        .collect();

    let mut out = x;
    let mut failure: Option<Error> = None;
    for point in &points {
        match point.forward(&out) {
            Ok(next) => out = next,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    // Detach all observers before surfacing any failure so no observation
    // state leaks into a later run.
    drop(points);
    if let Some(e) = failure {
        return Err(e);
    }

    let (predicted_class, confidence) = interpret_output(&out);
    let observations = Rc::try_unwrap(sink)
        .map(RefCell::into_inner)
        .unwrap_or_else(|rc| rc.borrow().clone());

    let processing_time = start.elapsed().as_secs_f64();
    tracing::debug!(
        layers = observations.len(),
        elapsed_s = processing_time,
        "forward pass complete"
    );

    Ok(InferenceResult {
        output: out.to_vec(),
        output_shape: out.dims().to_vec(),
        predicted_class,
        confidence,
        layers: observations,
        processing_time,
    })
}

/// One attached observer: wraps a graph op for the duration of a run and
/// appends a record to the shared sink after each successful forward.
struct ObservationPoint<'g> {
    op: &'g GraphOp,
    sink: Rc<RefCell<Vec<LayerObservation>>>,
}

impl ObservationPoint<'_> {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let out = self.op.module().forward(x).map_err(|e| Error::Evaluation {
            name: self.op.name().to_string(),
            kind: self.op.kind().to_string(),
            source: e,
        })?;

        let values = out.as_slice();
        self.sink.borrow_mut().push(LayerObservation {
            layer_name: self.op.name().to_string(),
            layer_kind: self.op.kind().to_string(),
            output_shape: out.dims().to_vec(),
            stats: activation_stats(values),
            sample: sample_values(values),
        });
        Ok(out)
    }
}

/// Population statistics over all elements, accumulated in f64.
fn activation_stats(values: &[f32]) -> ActivationStats {
    if values.is_empty() {
        return ActivationStats {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            std: 0.0,
            median: 0.0,
        };
    }

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f64;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v as f64;
    }
    let mean = sum / values.len() as f64;

    let mut sq = 0.0f64;
    for &v in values {
        let d = v as f64 - mean;
        sq += d * d;
    }
    let std = (sq / values.len() as f64).sqrt();

    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    ActivationStats {
        min,
        max,
        mean: mean as f32,
        std: std as f32,
        median,
    }
}

/// Leading values, scanned up to [`SAMPLE_SCAN_LIMIT`] and then truncated to
/// [`SAMPLE_LIMIT`].
fn sample_values(values: &[f32]) -> Vec<f32> {
    let mut sample: Vec<f32> = values.iter().take(SAMPLE_SCAN_LIMIT).copied().collect();
    sample.truncate(SAMPLE_LIMIT);
    sample
}

/// Classification heuristic over the final output.
///
/// Applies only to rank-2 outputs with more than one column. The first row
/// is treated as unnormalized scores unless it already looks like a
/// probability distribution (max <= 1 and sum >= 0.99), in which case it is
/// used as-is. This is a heuristic, not a normalization oracle: a
/// pre-normalized row containing negatives will be softmaxed again.
fn interpret_output(out: &Tensor) -> (Option<usize>, Option<f32>) {
    let dims = out.dims();
    if dims.len() != 2 || dims[1] <= 1 {
        return (None, None);
    }

    let row = &out.as_slice()[..dims[1]];
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = row.iter().sum();
    let probs: Vec<f32> = if max > 1.0 || sum < 0.99 {
        stable_softmax(row)
    } else {
        row.to_vec()
    };

    match probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        Some((idx, &conf)) => (Some(idx), Some(conf)),
        None => (None, None),
    }
}

/// Numerically stable softmax: shift by the row max before exponentiating.
fn stable_softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
