//! Tests for loading schedules from JSON and running them on the CPU.

use texmodel_inference::cpu_runner::CpuRunner;
use texmodel_inference::precision::Precision;
use texmodel_inference::schedule::Schedule;
use texmodel_inference::schedule_info::ScheduleInfo;
use texmodel_inference::weights::{ResolvedWeights, WeightFile, WeightWriter};

const JSON_SCHEDULE: &str = r#"
{
  "tensors": [
    {"name": "x", "length": 4},
    {"name": "scale", "length": 4, "weight": "layer.scale"},
    {"name": "scaled", "length": 4},
    {"name": "middle", "length": 2, "precision": "F16"},
    {"name": "joined", "length": 6},
    {"name": "result", "length": 6}
  ],
  "steps": [
    {"kernel": {"type": "BINARY", "op": "MUL", "length": 4}, "output": 2, "inputs": [0, 1]},
    {"kernel": {"type": "SLICE", "source_length": 4, "offset": 1, "length": 2}, "output": 3, "inputs": [2]},
    {"kernel": {"type": "CONCAT", "outer": 1, "inner": [4, 2]}, "output": 4, "inputs": [2, 3]},
    {"kernel": {"type": "UNARY", "op": "NEG", "length": 6}, "output": 5, "inputs": [4]}
  ],
  "input": 0,
  "output": 5
}
"#;

fn scale_weights() -> WeightFile {
    let mut writer = WeightWriter::new().with_metadata("source", "schedule_loading_test");
    writer
        .add_f32("layer.scale", &[4], &[2.0, 2.0, -1.0, 0.5])
        .expect("shape matches");
    WeightFile::from_bytes(writer.to_bytes().expect("serializable")).expect("parsable")
}

#[test]
fn test_load_and_run_json_schedule() {
    let info = ScheduleInfo::from_json(JSON_SCHEDULE).expect("Failed to parse schedule");
    assert_eq!(info.tensors[3].precision, Precision::Half);
    assert_eq!(info.tensors[0].precision, Precision::Full);

    let schedule = Schedule::new(info).expect("Failed to validate schedule");
    assert_eq!(schedule.input_len(), 4);
    assert_eq!(schedule.output_len(), 6);
    assert_eq!(schedule.programs().len(), 4);
    let weight_names: Vec<&str> = schedule.weight_tensors().map(|(_, name)| name).collect();
    assert_eq!(weight_names, vec!["layer.scale"]);

    let weights = ResolvedWeights::resolve(&scale_weights(), &schedule).unwrap();
    let mut runner = CpuRunner::new(&schedule, &weights);
    let output = runner.infer(&[1.0, -2.0, 3.0, -4.0]).unwrap();

    // scaled = [2, -4, -3, -2], middle = [-4, -3]
    assert_eq!(output, vec![-2.0, 4.0, 3.0, 2.0, 4.0, 3.0]);
    assert_eq!(runner.tensor(3), Some([-4.0, -3.0].as_slice()));
}

#[test]
fn test_weights_are_not_rewritten_between_inferences() {
    let schedule = Schedule::new(ScheduleInfo::from_json(JSON_SCHEDULE).unwrap()).unwrap();
    let weights = ResolvedWeights::resolve(&scale_weights(), &schedule).unwrap();
    let mut runner = CpuRunner::new(&schedule, &weights);

    let first = runner.infer(&[1.0, 1.0, 1.0, 1.0]).unwrap();
    runner.infer(&[5.0, 6.0, 7.0, 8.0]).unwrap();
    let again = runner.infer(&[1.0, 1.0, 1.0, 1.0]).unwrap();
    assert_eq!(first, again);
    assert_eq!(runner.tensor(1), Some([2.0, 2.0, -1.0, 0.5].as_slice()));
}

#[test]
fn test_unknown_kernel_type_is_rejected() {
    let json = JSON_SCHEDULE.replace(r#""type": "UNARY", "op": "NEG""#, r#""type": "SOFTMAX""#);
    assert!(ScheduleInfo::from_json(&json).is_err());
}
