// Integration tests for the layer zoo.
//
// These tests pin down the numeric behavior of individual layers using
// deterministic parameters, independent of the compiler.

use netlens::core::{Result, Tensor};
use netlens::nn::{
    AdaptiveAvgPool2d, AvgPool2d, BatchNorm2d, Conv2d, Dropout, Flatten, Linear, MaxPool2d,
    Module, ReLU, Sigmoid, Tanh,
};

fn approx_eq(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

// Linear layer tests

#[test]
fn test_linear_shape() -> Result<()> {
    let linear = Linear::new(10, 5, true);
    assert_eq!(linear.weight().dims(), &[5, 10]);
    assert_eq!(linear.bias().unwrap().dims(), &[1, 5]);
    assert_eq!(linear.in_features(), 10);
    assert_eq!(linear.out_features(), 5);

    // Forward: [batch=3, 10] -> [3, 5]
    let x = Tensor::rand((3, 10));
    let y = linear.forward(&x)?;
    assert_eq!(y.dims(), &[3, 5]);
    Ok(())
}

#[test]
fn test_linear_from_tensors() -> Result<()> {
    let w = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], (2, 2))?;
    let b = Tensor::from_vec(vec![0.5, -0.5], (1, 2))?;
    let linear = Linear::from_tensors(w, Some(b))?;

    let x = Tensor::from_vec(vec![3.0, 7.0], (1, 2))?;
    let y = linear.forward(&x)?;
    // y = x @ W^T + b = [3, 7] @ I + [0.5, -0.5] = [3.5, 6.5]
    assert_vec_approx(&y.to_vec(), &[3.5, 6.5], 1e-6);
    Ok(())
}

#[test]
fn test_linear_unbatched_input() -> Result<()> {
    let w = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3))?;
    let linear = Linear::from_tensors(w, None)?;

    // Rank-1 input stays rank-1 on the way out.
    let x = Tensor::from_vec(vec![1.0, 1.0, 1.0], 3)?;
    let y = linear.forward(&x)?;
    assert_eq!(y.dims(), &[2]);
    assert_vec_approx(&y.to_vec(), &[6.0, 15.0], 1e-6);
    Ok(())
}

#[test]
fn test_linear_parameters() {
    let with_bias = Linear::new(4, 3, true);
    assert_eq!(with_bias.parameters().len(), 2);
    assert_eq!(with_bias.num_parameters(), 4 * 3 + 3);

    let no_bias = Linear::new(4, 3, false);
    assert_eq!(no_bias.parameters().len(), 1);
    assert_eq!(no_bias.num_parameters(), 12);
}

// Activation tests

#[test]
fn test_activation_modules() -> Result<()> {
    let x = Tensor::from_vec(vec![-1.0, 0.0, 1.0], 3)?;

    let y = ReLU.forward(&x)?;
    assert_vec_approx(&y.to_vec(), &[0.0, 0.0, 1.0], 1e-6);

    let y = Sigmoid.forward(&x)?;
    assert_vec_approx(&y.to_vec(), &[0.268941, 0.5, 0.731059], 1e-5);

    let y = Tanh.forward(&x)?;
    assert_vec_approx(&y.to_vec(), &[-0.761594, 0.0, 0.761594], 1e-5);
    Ok(())
}

// Convolution tests

#[test]
fn test_conv2d_scaling_kernel() -> Result<()> {
    // 1x1 kernel with value 2.0 doubles every element.
    let x = Tensor::from_vec((1..=9).map(|v| v as f32).collect(), (1, 1, 3, 3))?;
    let w = Tensor::from_vec(vec![2.0], (1, 1, 1, 1))?;
    let conv = Conv2d::from_tensors(w, None, [1, 1], [0, 0])?;

    let y = conv.forward(&x)?;
    assert_eq!(y.dims(), &[1, 1, 3, 3]);
    assert_vec_approx(
        &y.to_vec(),
        &[2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0],
        1e-6,
    );
    Ok(())
}

#[test]
fn test_conv2d_sum_kernel_with_bias() -> Result<()> {
    // 2x2 all-ones kernel sums each window; bias shifts the result.
    let x = Tensor::from_vec((1..=9).map(|v| v as f32).collect(), (1, 1, 3, 3))?;
    let w = Tensor::ones((1, 1, 2, 2));
    let b = Tensor::from_vec(vec![10.0], 1)?;
    let conv = Conv2d::from_tensors(w, Some(b), [1, 1], [0, 0])?;

    let y = conv.forward(&x)?;
    assert_eq!(y.dims(), &[1, 1, 2, 2]);
    // Windows: 1+2+4+5, 2+3+5+6, 4+5+7+8, 5+6+8+9, each +10.
    assert_vec_approx(&y.to_vec(), &[22.0, 26.0, 34.0, 38.0], 1e-6);
    Ok(())
}

#[test]
fn test_conv2d_output_sizes() -> Result<()> {
    let x = Tensor::zeros((1, 3, 32, 32));

    // 3x3, stride 1, padding 1 preserves the spatial size.
    let same = Conv2d::new(3, 8, [3, 3], [1, 1], [1, 1], true);
    assert_eq!(same.forward(&x)?.dims(), &[1, 8, 32, 32]);

    // 3x3, stride 2, no padding: floor((32 - 3) / 2) + 1 = 15.
    let strided = Conv2d::new(3, 8, [3, 3], [2, 2], [0, 0], true);
    assert_eq!(strided.forward(&x)?.dims(), &[1, 8, 15, 15]);
    Ok(())
}

#[test]
fn test_conv2d_parameter_count() {
    let conv = Conv2d::new(3, 16, [3, 3], [1, 1], [0, 0], true);
    assert_eq!(conv.num_parameters(), 16 * 3 * 3 * 3 + 16);
}

// Pooling tests

#[test]
fn test_max_and_avg_pool() -> Result<()> {
    let x = Tensor::from_vec((0..16).map(|v| v as f32).collect(), (1, 1, 4, 4))?;

    let y = MaxPool2d::new([2, 2], [2, 2]).forward(&x)?;
    assert_eq!(y.dims(), &[1, 1, 2, 2]);
    assert_vec_approx(&y.to_vec(), &[5.0, 7.0, 13.0, 15.0], 1e-6);

    let y = AvgPool2d::new([2, 2], [2, 2]).forward(&x)?;
    assert_vec_approx(&y.to_vec(), &[2.5, 4.5, 10.5, 12.5], 1e-6);
    Ok(())
}

#[test]
fn test_adaptive_avg_pool_global() -> Result<()> {
    let mut data = vec![1.0f32; 16];
    data.extend(vec![3.0f32; 16]);
    let x = Tensor::from_vec(data, (1, 2, 4, 4))?;

    let y = AdaptiveAvgPool2d::new([1, 1]).forward(&x)?;
    assert_eq!(y.dims(), &[1, 2, 1, 1]);
    assert_vec_approx(&y.to_vec(), &[1.0, 3.0], 1e-6);
    Ok(())
}

// Flatten tests

#[test]
fn test_flatten_default_keeps_batch() -> Result<()> {
    let x = Tensor::zeros((2, 3, 4, 5));
    let y = Flatten::default().forward(&x)?;
    assert_eq!(y.dims(), &[2, 60]);
    Ok(())
}

#[test]
fn test_flatten_full() -> Result<()> {
    let x = Tensor::zeros((2, 3, 4));
    let y = Flatten::new(0, -1).forward(&x)?;
    assert_eq!(y.dims(), &[24]);
    Ok(())
}

// BatchNorm tests

#[test]
fn test_batchnorm_eval_uses_running_stats() -> Result<()> {
    // Fresh layer in eval mode: running mean 0, running var 1, so the
    // output is x / sqrt(1 + eps), effectively the input.
    let bn = BatchNorm2d::new(2, 1e-5, 0.1);
    bn.set_training(false);

    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], (1, 2, 2, 2))?;
    let y = bn.forward(&x)?;
    assert_vec_approx(&y.to_vec(), &x.to_vec(), 1e-3);
    Ok(())
}

#[test]
fn test_batchnorm_training_centers_channels() -> Result<()> {
    let bn = BatchNorm2d::new(1, 1e-5, 0.1);
    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], (1, 1, 2, 2))?;
    let y = bn.forward(&x)?;

    let mean: f32 = y.to_vec().iter().sum::<f32>() / 4.0;
    assert!(approx_eq(mean, 0.0, 1e-5));
    Ok(())
}

#[test]
fn test_batchnorm_rejects_wrong_rank() {
    let bn = BatchNorm2d::new(2, 1e-5, 0.1);
    let x = Tensor::zeros((2, 2));
    assert!(bn.forward(&x).is_err());
}

// Dropout tests

#[test]
fn test_dropout_eval_is_identity() -> Result<()> {
    let dropout = Dropout::new(0.5);
    dropout.set_training(false);

    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], 3)?;
    let y = dropout.forward(&x)?;
    assert_vec_approx(&y.to_vec(), &[1.0, 2.0, 3.0], 1e-6);
    Ok(())
}

#[test]
fn test_dropout_training_zeros_or_scales() -> Result<()> {
    let dropout = Dropout::new(0.5);
    let x = Tensor::ones(1000);
    let y = dropout.forward(&x)?;

    // Every surviving element is scaled by 1/(1-p) = 2.
    for &v in y.as_slice() {
        assert!(v == 0.0 || approx_eq(v, 2.0, 1e-6), "unexpected value {v}");
    }
    // With p = 0.5 over 1000 elements, both outcomes occur.
    let zeros = y.as_slice().iter().filter(|&&v| v == 0.0).count();
    assert!(zeros > 0 && zeros < 1000);
    Ok(())
}
