// CNN inspection demo
//
// Builds a small convolutional classifier from a declarative layer list,
// compiles it against a CIFAR-sized reference shape (the dense layer's input
// width is inferred automatically), then runs one instrumented forward pass
// and prints what every layer produced.

use netlens::core::Tensor;
use netlens::{compile, run, ArchitectureDescriptor, LayerSpec};

fn main() -> netlens::Result<()> {
    let descriptor = ArchitectureDescriptor::new(vec![
        LayerSpec::new("Conv2d")
            .with_param("in_channels", 3)
            .with_param("out_channels", 16)
            .with_param("padding", 1),
        LayerSpec::new("BatchNorm2d").with_param("num_features", 16),
        LayerSpec::new("ReLU"),
        LayerSpec::new("MaxPool2d"),
        LayerSpec::new("Flatten"),
        LayerSpec::new("Dense").with_param("out_features", 10),
    ]);

    let reference_shape = [3usize, 32, 32];
    let graph = compile(&descriptor, Some(&reference_shape))?;

    println!("{}", graph.summary());
    println!("total parameters: {}", graph.total_parameters());
    println!();

    let input = Tensor::rand((3, 32, 32)).to_vec();
    let result = run(&graph, &input, Some(&reference_shape))?;

    println!(
        "{:<16} {:<18} {:>10} {:>10} {:>10} {:>10}",
        "layer", "output shape", "min", "max", "mean", "std"
    );
    for obs in &result.layers {
        println!(
            "{:<16} {:<18} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            obs.layer_name,
            format!("{:?}", obs.output_shape),
            obs.stats.min,
            obs.stats.max,
            obs.stats.mean,
            obs.stats.std
        );
    }

    println!();
    if let (Some(class), Some(confidence)) = (result.predicted_class, result.confidence) {
        println!("predicted class {class} with confidence {confidence:.4}");
    }
    println!("processing time: {:.3} ms", result.processing_time * 1000.0);
    Ok(())
}
