// Integration tests for the instrumented executor: reshape handling,
// per-layer observation records, classification heuristics, and observer
// cleanup across failed runs.

use netlens::{compile, run, ArchitectureDescriptor, CompiledGraph, Error, LayerSpec};
use serde_json::json;

fn approx_eq(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() < tol
}

fn graph_of(layers: Vec<LayerSpec>, reference_shape: Option<&[usize]>) -> CompiledGraph {
    compile(&ArchitectureDescriptor::new(layers), reference_shape).unwrap()
}

#[test]
fn test_relu_run_records_one_observation() -> netlens::Result<()> {
    let graph = graph_of(vec![LayerSpec::new("ReLU")], None);
    let result = run(&graph, &[-1.0, 0.0, 2.0], None)?;

    assert_eq!(result.output, vec![0.0, 0.0, 2.0]);
    assert_eq!(result.output_shape, vec![3]);
    assert_eq!(result.layers.len(), 1);

    let obs = &result.layers[0];
    assert_eq!(obs.layer_name, "relu_0");
    assert_eq!(obs.layer_kind, "ReLU");
    assert_eq!(obs.output_shape, vec![3]);
    assert_eq!(obs.sample, vec![0.0, 0.0, 2.0]);
    assert!(approx_eq(obs.stats.min, 0.0, 1e-6));
    assert!(approx_eq(obs.stats.max, 2.0, 1e-6));
    assert!(approx_eq(obs.stats.median, 0.0, 1e-6));

    // Rank-1 output: no classification.
    assert_eq!(result.predicted_class, None);
    assert_eq!(result.confidence, None);
    assert!(result.processing_time >= 0.0);
    Ok(())
}

#[test]
fn test_reshape_mismatch_is_rejected_up_front() {
    let graph = graph_of(vec![LayerSpec::new("ReLU")], None);
    let err = run(&graph, &[1.0, 2.0, 3.0], Some(&[2, 2])).unwrap_err();
    match err {
        Error::ReshapeMismatch {
            shape,
            expected,
            got,
        } => {
            assert_eq!(shape, vec![2, 2]);
            assert_eq!(expected, 4);
            assert_eq!(got, 3);
        }
        other => panic!("expected ReshapeMismatch, got {other:?}"),
    }
}

#[test]
fn test_chw_input_gets_a_batch_dimension() -> netlens::Result<()> {
    let graph = graph_of(vec![LayerSpec::new("Flatten")], None);
    let input = vec![0.5f32; 3 * 4 * 4];
    let result = run(&graph, &input, Some(&[3, 4, 4]))?;

    // [3, 4, 4] becomes [1, 3, 4, 4]; Flatten keeps the batch dimension.
    assert_eq!(result.output_shape, vec![1, 48]);
    Ok(())
}

#[test]
fn test_logit_row_is_softmaxed() -> netlens::Result<()> {
    let graph = graph_of(vec![LayerSpec::new("ReLU")], None);
    let result = run(&graph, &[5.0, 1.0, 0.1], Some(&[1, 3]))?;

    assert_eq!(result.predicted_class, Some(0));
    let expected = (5.0f32).exp() / ((5.0f32).exp() + (1.0f32).exp() + (0.1f32).exp());
    let confidence = result.confidence.unwrap();
    assert!(
        approx_eq(confidence, expected, 1e-4),
        "confidence {confidence} vs {expected}"
    );
    Ok(())
}

#[test]
fn test_normalized_row_is_used_as_is() -> netlens::Result<()> {
    // Max <= 1 and sum >= 0.99: treated as probabilities already.
    let graph = graph_of(vec![LayerSpec::new("ReLU")], None);
    let result = run(&graph, &[0.2, 0.5, 0.3], Some(&[1, 3]))?;

    assert_eq!(result.predicted_class, Some(1));
    assert!(approx_eq(result.confidence.unwrap(), 0.5, 1e-6));
    Ok(())
}

#[test]
fn test_low_sum_row_is_softmaxed() -> netlens::Result<()> {
    // Sigmoid keeps values in (0, 1) but the row sum stays below 0.99,
    // so the heuristic still applies a softmax.
    let graph = graph_of(vec![LayerSpec::new("Sigmoid")], None);
    let result = run(&graph, &[-10.0, -10.0, -3.0], Some(&[1, 3]))?;

    assert_eq!(result.predicted_class, Some(2));
    let confidence = result.confidence.unwrap();
    assert!(confidence > 1.0 / 3.0 && confidence < 1.0);
    Ok(())
}

#[test]
fn test_single_column_output_is_not_classified() -> netlens::Result<()> {
    let graph = graph_of(vec![LayerSpec::new("ReLU")], None);
    let result = run(&graph, &[0.7], Some(&[1, 1]))?;
    assert_eq!(result.predicted_class, None);
    assert_eq!(result.confidence, None);
    Ok(())
}

#[test]
fn test_stats_cover_all_elements_sample_is_capped() -> netlens::Result<()> {
    // 20k elements with the extremes past every sampling bound.
    let mut input = vec![0.0f32; 20_000];
    input[19_999] = 7.0;

    let graph = graph_of(vec![LayerSpec::new("ReLU")], None);
    let result = run(&graph, &input, None)?;

    let obs = &result.layers[0];
    assert_eq!(obs.sample.len(), 1000);
    assert!(obs.sample.iter().all(|&v| v == 0.0));
    // The statistics still see the element the sample missed.
    assert!(approx_eq(obs.stats.max, 7.0, 1e-6));
    assert!(approx_eq(obs.stats.mean, 7.0 / 20_000.0, 1e-8));
    Ok(())
}

#[test]
fn test_observations_follow_graph_order() -> netlens::Result<()> {
    let graph = graph_of(
        vec![
            LayerSpec::new("Conv2d")
                .with_param("in_channels", json!(3))
                .with_param("out_channels", json!(8)),
            LayerSpec::new("ReLU"),
            LayerSpec::new("MaxPool2d"),
            LayerSpec::new("Flatten"),
            LayerSpec::new("Dense").with_param("out_features", json!(10)),
        ],
        Some(&[3, 16, 16]),
    );

    let input = vec![0.1f32; 3 * 16 * 16];
    let result = run(&graph, &input, Some(&[3, 16, 16]))?;

    let names: Vec<&str> = result.layers.iter().map(|o| o.layer_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["conv2d_0", "relu_1", "maxpool2d_2", "flatten_3", "linear_4"]
    );

    assert_eq!(result.layers[0].output_shape, vec![1, 8, 14, 14]);
    assert_eq!(result.layers[2].output_shape, vec![1, 8, 7, 7]);
    assert_eq!(result.layers[3].output_shape, vec![1, 392]);
    assert_eq!(result.layers[4].output_shape, vec![1, 10]);

    assert_eq!(result.output_shape, vec![1, 10]);
    assert!(result.predicted_class.is_some());
    Ok(())
}

#[test]
fn test_failed_run_leaves_no_observers_behind() -> netlens::Result<()> {
    let graph = graph_of(
        vec![
            LayerSpec::new("Conv2d").with_param("in_channels", json!(3)),
            LayerSpec::new("ReLU"),
        ],
        None,
    );

    // First run fails inside the conv layer: a flat input is not 4-d.
    let err = run(&graph, &[1.0, 2.0, 3.0], None).unwrap_err();
    match &err {
        Error::Evaluation { name, kind, .. } => {
            assert_eq!(name, "conv2d_0");
            assert_eq!(kind, "Conv2d");
        }
        other => panic!("expected Evaluation, got {other:?}"),
    }

    // A subsequent valid run on the same graph observes exactly once per
    // layer; nothing carried over from the failure.
    let input = vec![0.0f32; 3 * 8 * 8];
    let result = run(&graph, &input, Some(&[3, 8, 8]))?;
    assert_eq!(result.layers.len(), 2);
    Ok(())
}

#[test]
fn test_dropout_runs_in_eval_mode() -> netlens::Result<()> {
    let graph = graph_of(vec![LayerSpec::new("Dropout")], None);

    // Eval mode makes Dropout the identity even though p = 0.5.
    let result = run(&graph, &[1.0, 2.0, 3.0], None)?;
    assert_eq!(result.output, vec![1.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn test_result_serializes_to_json() -> netlens::Result<()> {
    let graph = graph_of(vec![LayerSpec::new("ReLU")], None);
    let result = run(&graph, &[1.0, -1.0], None)?;

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["output"], json!([1.0, 0.0]));
    assert_eq!(value["layers"][0]["layer_kind"], json!("ReLU"));
    assert!(value["layers"][0]["stats"]["mean"].is_number());
    Ok(())
}
