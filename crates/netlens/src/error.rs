// Error taxonomy for compilation and execution.
//
// Compile-time failures (UnsupportedLayerKind, InvalidParameter,
// ShapeInference) mean the caller must fix the descriptor. Run-time failures
// (ReshapeMismatch, Evaluation) are terminal for that call. Nothing is
// retried internally. Every variant carries enough context (layer index or
// name, kind, offending value) for the caller to render its own message.

/// Errors produced by [`compile`](crate::compiler::compile) and
/// [`run`](crate::executor::run).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The layer kind string is not in the recognized set.
    #[error("layer {index}: unsupported layer kind {kind:?}")]
    UnsupportedLayerKind { index: usize, kind: String },

    /// A parameter could not be coerced to the type the layer requires.
    #[error("layer {index} ({kind}): invalid parameter {name:?}: {message}")]
    InvalidParameter {
        index: usize,
        kind: String,
        name: String,
        message: String,
    },

    /// A dense layer's input width could not be inferred.
    #[error("layer {index}: shape inference failed: {reason}")]
    ShapeInference { index: usize, reason: String },

    /// The requested input shape disagrees with the payload length.
    #[error(
        "cannot reshape input of {got} elements to shape {shape:?} ({expected} elements)"
    )]
    ReshapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    /// The forward pass failed inside a layer.
    #[error("evaluation failed at layer {name} ({kind}): {source}")]
    Evaluation {
        name: String,
        kind: String,
        #[source]
        source: netlens_core::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
