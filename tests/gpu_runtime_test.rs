//! GPU runtime tests comparing rendered kernels with the CPU reference.
//!
//! Every test returns early when no adapter is available, or when the
//! adapter cannot render to the texture format a tensor precision needs.

use pollster::FutureExt;
use texmodel_inference::activation::Activation;
use texmodel_inference::config::RuntimeConfig;
use texmodel_inference::cpu_runner::CpuRunner;
use texmodel_inference::gpu::{GpuContext, GpuRuntimeError, Runtime, create_tensor, read_tensor};
use texmodel_inference::kernels::{
    BatchNormKernel, BinaryKernel, BinaryOp, ConcatKernel, Conv2dKernel, CopyKernel,
    DecodeBoxesKernel, DetectionLevel, DflKernel, MaxPool2dKernel, SliceKernel, UnaryKernel,
    UpsampleNearestKernel,
};
use texmodel_inference::precision::Precision;
use texmodel_inference::schedule::Schedule;
use texmodel_inference::schedule_info::{KernelInfo, ScheduleInfo};
use texmodel_inference::weights::{Dtype, ResolvedWeights, WeightFile, WeightWriter};
use texmodel_inference::yolo::{self, YoloConfig};

const TOLERANCE: f32 = 1e-4;
const HALF_TOLERANCE: f32 = 2e-2;

fn gpu_context(config: &RuntimeConfig) -> Option<GpuContext> {
    match GpuContext::new_async(config).block_on() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("Skipping GPU test: {e}");
            None
        }
    }
}

/// Like [`gpu_context`], but also skips when `precision` is not renderable.
fn gpu_context_for(config: &RuntimeConfig, precision: Precision) -> Option<GpuContext> {
    let ctx = gpu_context(config)?;
    if !ctx.supports_precision(precision) {
        eprintln!("Skipping GPU test: {precision:?} textures are not renderable");
        return None;
    }
    Some(ctx)
}

fn supports_schedule(ctx: &GpuContext, schedule: &Schedule) -> bool {
    let supported = schedule
        .tensors()
        .iter()
        .all(|tensor| ctx.supports_precision(tensor.precision));
    if !supported {
        eprintln!("Skipping GPU test: schedule uses a precision the adapter cannot render");
    }
    supported
}

fn compare_results(gpu: &[f32], cpu: &[f32], tolerance: f32) {
    assert_eq!(gpu.len(), cpu.len(), "Output lengths differ");
    for (i, (g, c)) in gpu.iter().zip(cpu.iter()).enumerate() {
        let allowed = tolerance * c.abs().max(1.0);
        assert!(
            (g - c).abs() <= allowed,
            "Mismatch at index {i}: GPU={g}, CPU={c}"
        );
    }
}

fn pattern(len: usize, seed: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i * 37 + seed * 11) % 101) as f32 / 50.0 - 1.0)
        .collect()
}

/// Runs one kernel on both paths. The first input is the schedule input,
/// the others are uploaded as weights.
fn check_kernel(kernel: impl Into<KernelInfo>, inputs: Vec<Vec<f32>>, precision: Precision) {
    let Some(ctx) = gpu_context(&RuntimeConfig::new()) else {
        return;
    };
    let kernel = kernel.into();
    let output_len = kernel
        .create_kernel()
        .expect("valid kernel")
        .output_len();

    let mut builder = ScheduleInfo::builder().precision(precision);
    let mut writer = WeightWriter::new();
    let mut indices = Vec::new();
    for (i, data) in inputs.iter().enumerate() {
        if i == 0 {
            indices.push(builder.input("x", data.len()));
        } else {
            let name = format!("w{i}");
            writer
                .add_f32(&name, &[data.len()], data)
                .expect("shape matches");
            indices.push(builder.weight(name, data.len()));
        }
    }
    builder.step("y", kernel, indices, output_len);
    let schedule = Schedule::new(builder.build()).expect("valid schedule");
    if !supports_schedule(&ctx, &schedule) {
        return;
    }
    let file = WeightFile::from_bytes(writer.to_bytes().expect("serializable")).expect("parsable");
    let weights = ResolvedWeights::resolve(&file, &schedule).expect("resolvable");

    let cpu = CpuRunner::new(&schedule, &weights)
        .infer(&inputs[0])
        .expect("CPU inference");
    let config = RuntimeConfig::new();
    let mut runtime = Runtime::new(ctx, schedule, &weights, &config).expect("runtime");
    let gpu = runtime.infer(&inputs[0]).expect("GPU inference");

    let tolerance = match precision {
        Precision::Full => TOLERANCE,
        Precision::Half => HALF_TOLERANCE,
    };
    compare_results(&gpu, &cpu, tolerance);
}

#[test]
fn test_round_trip_full_is_exact() {
    let Some(ctx) = gpu_context_for(&RuntimeConfig::new(), Precision::Full) else {
        return;
    };
    let data = pattern(1000, 1);
    let tensor = create_tensor(&ctx, "round_trip", data.len(), Precision::Full, Some(&data))
        .expect("allocation");
    assert_eq!(tensor.layout().height(), 1);
    let back = read_tensor(&ctx, &tensor).expect("readback");
    assert_eq!(back, data);
}

#[test]
fn test_round_trip_half_within_rounding() {
    let Some(ctx) = gpu_context_for(&RuntimeConfig::new(), Precision::Half) else {
        return;
    };
    let data = pattern(777, 2);
    let tensor = create_tensor(&ctx, "round_trip_half", data.len(), Precision::Half, Some(&data))
        .expect("allocation");
    let back = read_tensor(&ctx, &tensor).expect("readback");
    compare_results(&back, &data, 1e-3);
}

#[test]
fn test_multi_row_layout_round_trip() {
    let config = RuntimeConfig::new().with_max_texture_dimension(64);
    let Some(ctx) = gpu_context_for(&config, Precision::Full) else {
        return;
    };
    // 3000 = 50 rows of 60 under a 64 texel cap.
    let data = pattern(3000, 3);
    let tensor = create_tensor(&ctx, "rows", data.len(), Precision::Full, Some(&data))
        .expect("allocation");
    let layout = tensor.layout();
    assert_eq!(layout.width() * layout.height(), 3000);
    assert!(layout.width() <= 64 && layout.height() <= 64);
    assert_eq!(read_tensor(&ctx, &tensor).expect("readback"), data);
}

#[test]
fn test_texture_too_large() {
    let config = RuntimeConfig::new().with_max_texture_dimension(8);
    let Some(ctx) = gpu_context_for(&config, Precision::Full) else {
        return;
    };
    // 67 is prime, so only the 67 x 1 layout exists.
    let result = create_tensor(&ctx, "prime", 67, Precision::Full, None);
    assert!(matches!(
        result,
        Err(GpuRuntimeError::TextureTooLarge { length: 67, .. })
    ));
}

#[test]
fn test_allocation_respects_renderable_formats() {
    let Some(ctx) = gpu_context(&RuntimeConfig::new()) else {
        return;
    };
    let data = pattern(16, 4);
    for precision in [Precision::Full, Precision::Half] {
        let result = create_tensor(&ctx, "renderable", data.len(), precision, Some(&data));
        if ctx.supports_precision(precision) {
            assert!(result.is_ok(), "{precision:?} allocation failed: {result:?}");
        } else {
            assert!(matches!(
                result,
                Err(GpuRuntimeError::UnsupportedPrecision { precision: p, .. }) if p == precision
            ));
        }
    }
}

#[test]
fn test_copy_kernel() {
    check_kernel(CopyKernel::new(37).unwrap(), vec![pattern(37, 0)], Precision::Full);
}

#[test]
fn test_slice_kernel() {
    check_kernel(
        SliceKernel::new(40, 12, 20).unwrap(),
        vec![pattern(40, 0)],
        Precision::Full,
    );
}

#[test]
fn test_concat_kernel() {
    check_kernel(
        ConcatKernel::new(3, vec![5, 2, 4]).unwrap(),
        vec![pattern(15, 0), pattern(6, 1), pattern(12, 2)],
        Precision::Full,
    );
}

#[test]
fn test_unary_kernels() {
    for op in [
        Activation::Relu,
        Activation::Sigmoid,
        Activation::Silu,
        Activation::Tanh,
        Activation::Exp,
        Activation::Neg,
    ] {
        check_kernel(
            UnaryKernel::new(op, 50).unwrap(),
            vec![pattern(50, 4)],
            Precision::Full,
        );
    }
}

#[test]
fn test_binary_kernel() {
    check_kernel(
        BinaryKernel::new(BinaryOp::Sub, 30).unwrap(),
        vec![pattern(30, 0), pattern(30, 5)],
        Precision::Full,
    );
}

#[test]
fn test_batch_norm_kernel() {
    let variance: Vec<f32> = pattern(4, 3).iter().map(|v| v.abs() + 0.5).collect();
    check_kernel(
        BatchNormKernel::new(4, 9, 1e-3, Some(Activation::Silu)).unwrap(),
        vec![
            pattern(36, 0),
            pattern(4, 1),
            pattern(4, 2),
            pattern(4, 6),
            variance,
        ],
        Precision::Full,
    );
}

#[test]
fn test_conv2d_kernels() {
    check_kernel(
        Conv2dKernel::square(4, 6, 7, 5, 3, 1, true).unwrap(),
        vec![pattern(4 * 35, 0), pattern(6 * 4 * 9, 1), pattern(6, 2)],
        Precision::Full,
    );
    check_kernel(
        Conv2dKernel::square(3, 2, 8, 8, 3, 2, false).unwrap(),
        vec![pattern(3 * 64, 0), pattern(2 * 3 * 9, 1)],
        Precision::Full,
    );
    check_kernel(
        Conv2dKernel::square(5, 3, 4, 6, 1, 1, false).unwrap(),
        vec![pattern(5 * 24, 0), pattern(3 * 5, 1)],
        Precision::Full,
    );
}

#[test]
fn test_conv2d_half_precision() {
    check_kernel(
        Conv2dKernel::square(4, 4, 6, 6, 3, 1, false).unwrap(),
        vec![pattern(4 * 36, 0), pattern(4 * 4 * 9, 1)],
        Precision::Half,
    );
}

#[test]
fn test_max_pool_kernel() {
    check_kernel(
        MaxPool2dKernel::new(3, 6, 6, 5, 1, 2).unwrap(),
        vec![pattern(3 * 36, 0)],
        Precision::Full,
    );
}

#[test]
fn test_upsample_kernel() {
    check_kernel(
        UpsampleNearestKernel::new(3, 4, 5, 2).unwrap(),
        vec![pattern(60, 0)],
        Precision::Full,
    );
}

#[test]
fn test_dfl_kernel() {
    check_kernel(
        DflKernel::new(16, 10).unwrap(),
        vec![pattern(64 * 10, 0)],
        Precision::Full,
    );
}

#[test]
fn test_decode_boxes_kernel() {
    let levels = vec![
        DetectionLevel {
            height: 4,
            width: 4,
            stride: 8.0,
        },
        DetectionLevel {
            height: 2,
            width: 2,
            stride: 16.0,
        },
    ];
    let distances: Vec<f32> = pattern(80, 0).iter().map(|v| (v + 1.0) * 4.0).collect();
    check_kernel(
        DecodeBoxesKernel::new(levels).unwrap(),
        vec![distances],
        Precision::Full,
    );
}

fn run_detector(config: &YoloConfig) -> Option<(Vec<f32>, Vec<f32>)> {
    let ctx = gpu_context(&RuntimeConfig::new())?;
    let schedule = Schedule::new(yolo::build_schedule(config).unwrap()).unwrap();
    if !supports_schedule(&ctx, &schedule) {
        return None;
    }
    let writer = yolo::zero_weight_writer(config, Dtype::F16).unwrap();
    let file = WeightFile::from_bytes(writer.to_bytes().unwrap()).unwrap();
    let weights = ResolvedWeights::resolve(&file, &schedule).unwrap();
    let input = pattern(schedule.input_len(), 9);

    let cpu = CpuRunner::new(&schedule, &weights).infer(&input).unwrap();
    let mut runtime = Runtime::new(ctx, schedule, &weights, &RuntimeConfig::new())
        .expect("Failed to build runtime");
    assert!(runtime.program_count() < runtime.step_count());
    let gpu = runtime.infer(&input).expect("GPU inference");
    let again = runtime.infer(&input).expect("GPU inference");
    assert_eq!(gpu, again, "Repeated inference must be deterministic");

    let bytes: Vec<u8> = input.iter().flat_map(|v| v.to_le_bytes()).collect();
    let from_bytes = runtime.infer_bytes(&bytes).expect("GPU inference from bytes");
    assert_eq!(gpu, from_bytes);

    let output = runtime.schedule().output();
    let layout = runtime.tensor_layout(output).expect("output tensor exists");
    assert_eq!(layout.length(), runtime.output_len());
    assert_eq!(runtime.read_tensor(output).expect("readback"), gpu);
    Some((gpu, cpu))
}

#[test]
fn test_small_detector_matches_cpu() {
    let config = YoloConfig::variant("n").unwrap().with_input_size(64, 64);
    if let Some((gpu, cpu)) = run_detector(&config) {
        assert_eq!(gpu.len(), 84 * 84);
        compare_results(&gpu, &cpu, TOLERANCE);
    }
}

#[test]
fn test_small_detector_half_precision() {
    let config = YoloConfig::variant("n")
        .unwrap()
        .with_input_size(64, 64)
        .with_precision(Precision::Half);
    if let Some((gpu, cpu)) = run_detector(&config) {
        compare_results(&gpu, &cpu, HALF_TOLERANCE);
    }
}

#[test]
fn test_misaligned_bytes_rejected() {
    let config = YoloConfig::variant("n").unwrap().with_input_size(64, 64);
    let Some(ctx) = gpu_context(&RuntimeConfig::new()) else {
        return;
    };
    let schedule = Schedule::new(yolo::build_schedule(&config).unwrap()).unwrap();
    if !supports_schedule(&ctx, &schedule) {
        return;
    }
    let writer = yolo::zero_weight_writer(&config, Dtype::F32).unwrap();
    let file = WeightFile::from_bytes(writer.to_bytes().unwrap()).unwrap();
    let weights = ResolvedWeights::resolve(&file, &schedule).unwrap();
    let mut runtime = Runtime::new(ctx, schedule, &weights, &RuntimeConfig::new()).unwrap();
    assert!(runtime.infer_bytes(&[0u8; 7]).is_err());
    assert!(matches!(
        runtime.read_tensor(usize::MAX),
        Err(GpuRuntimeError::TensorIndexOutOfBounds { .. })
    ));
}

#[test]
#[ignore = "runs the full 640x640 detector"]
fn test_full_size_detector() {
    let config = YoloConfig::variant("n").unwrap();
    if let Some((gpu, cpu)) = run_detector(&config) {
        assert_eq!(gpu.len(), 705_600);
        compare_results(&gpu, &cpu, TOLERANCE);
    }
}
