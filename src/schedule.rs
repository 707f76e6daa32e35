//! Validated tensor schedule.
//!
//! [`Schedule`] checks a [`ScheduleInfo`] once, builds the kernel objects and
//! deduplicates the generated programs. Both the CPU reference runner and
//! the GPU runtime execute a `Schedule`.

use std::collections::HashMap;

use log::debug;

use crate::errors::{ScheduleError, ScheduleResult};
use crate::kernels::Kernel;
use crate::precision::Precision;
use crate::schedule_info::{ScheduleInfo, TensorInfo};

/// A unique fragment program shared by every step generating the same code.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    /// Name of the first kernel that produced this program.
    pub name: String,
    /// Generated `compute` function.
    pub compute: String,
    /// Number of sampled input textures.
    pub input_count: usize,
    /// Precision of the render target.
    pub precision: Precision,
}

/// A validated step of the schedule.
#[derive(Debug)]
pub struct ScheduledStep {
    pub kernel: Box<dyn Kernel>,
    pub program_index: usize,
    pub output: usize,
    pub inputs: Vec<usize>,
}

/// A schedule that passed validation.
#[derive(Debug)]
pub struct Schedule {
    tensors: Vec<TensorInfo>,
    steps: Vec<ScheduledStep>,
    programs: Vec<ProgramSource>,
    input: usize,
    output: usize,
}

impl Schedule {
    /// Validates the description and builds the kernels.
    pub fn new(info: ScheduleInfo) -> ScheduleResult<Self> {
        Self::validate_inputs(&info)?;

        let ScheduleInfo {
            tensors,
            steps: step_infos,
            input,
            output,
        } = info;

        let mut written = vec![false; tensors.len()];
        written[input] = true;
        for (i, tensor) in tensors.iter().enumerate() {
            if tensor.weight.is_some() {
                written[i] = true;
            }
        }

        let mut steps = Vec::with_capacity(step_infos.len());
        let mut programs: Vec<ProgramSource> = Vec::new();
        let mut program_lookup: HashMap<(String, usize, Precision), usize> = HashMap::new();

        for (step, step_info) in step_infos.into_iter().enumerate() {
            Self::validate_tensor_index("output", step_info.output, tensors.len())?;
            for &index in &step_info.inputs {
                Self::validate_tensor_index("input", index, tensors.len())?;
            }

            let kernel = step_info
                .kernel
                .create_kernel()
                .map_err(|source| ScheduleError::InvalidKernel { step, source })?;

            Self::validate_step(
                step,
                kernel.as_ref(),
                &step_info.inputs,
                step_info.output,
                &tensors,
                input,
            )?;

            for &index in &step_info.inputs {
                if !written[index] {
                    return Err(ScheduleError::ReadBeforeWrite {
                        step,
                        name: tensors[index].name.clone(),
                    });
                }
            }
            written[step_info.output] = true;

            let compute = kernel.wgsl_compute();
            let precision = tensors[step_info.output].precision;
            let key = (compute, step_info.inputs.len(), precision);
            let program_index = match program_lookup.get(&key) {
                Some(&index) => index,
                None => {
                    let index = programs.len();
                    programs.push(ProgramSource {
                        name: kernel.name(),
                        compute: key.0.clone(),
                        input_count: key.1,
                        precision,
                    });
                    program_lookup.insert(key, index);
                    index
                }
            };

            steps.push(ScheduledStep {
                kernel,
                program_index,
                output: step_info.output,
                inputs: step_info.inputs,
            });
        }

        if !steps.iter().any(|s| s.output == output) {
            return Err(ScheduleError::OutputNeverWritten {
                name: tensors[output].name.clone(),
            });
        }

        debug!(
            "Validated schedule: {} tensors, {} steps, {} unique programs",
            tensors.len(),
            steps.len(),
            programs.len()
        );

        Ok(Schedule {
            tensors,
            steps,
            programs,
            input,
            output,
        })
    }

    /// Performs basic validation that does not need the kernels.
    fn validate_inputs(info: &ScheduleInfo) -> ScheduleResult<()> {
        if info.tensors.is_empty() {
            return Err(ScheduleError::NoTensorsProvided);
        }
        if info.steps.is_empty() {
            return Err(ScheduleError::NoStepsProvided);
        }
        for tensor in &info.tensors {
            if tensor.length == 0 {
                return Err(ScheduleError::EmptyTensor {
                    name: tensor.name.clone(),
                });
            }
        }
        Self::validate_tensor_index("input", info.input, info.tensors.len())?;
        Self::validate_tensor_index("output", info.output, info.tensors.len())?;

        let input = &info.tensors[info.input];
        if input.weight.is_some() {
            return Err(ScheduleError::InputIsWeight {
                name: input.name.clone(),
            });
        }
        Ok(())
    }

    /// Checks one step against its kernel template.
    fn validate_step(
        step: usize,
        kernel: &dyn Kernel,
        inputs: &[usize],
        output: usize,
        tensors: &[TensorInfo],
        input: usize,
    ) -> ScheduleResult<()> {
        if inputs.contains(&output) {
            return Err(ScheduleError::SelfReadingStep {
                step,
                tensor: output,
            });
        }
        if output == input {
            return Err(ScheduleError::WritesInput { step });
        }
        if tensors[output].weight.is_some() {
            return Err(ScheduleError::WritesWeight {
                step,
                name: tensors[output].name.clone(),
            });
        }

        let expected = kernel.input_lens();
        if expected.len() != inputs.len() {
            return Err(ScheduleError::InputCountMismatch {
                step,
                kernel: kernel.name(),
                expected: expected.len(),
                actual: inputs.len(),
            });
        }
        for (position, (&index, &len)) in inputs.iter().zip(expected.iter()).enumerate() {
            if tensors[index].length != len {
                return Err(ScheduleError::InputLengthMismatch {
                    step,
                    kernel: kernel.name(),
                    position,
                    name: tensors[index].name.clone(),
                    expected: len,
                    actual: tensors[index].length,
                });
            }
        }
        if tensors[output].length != kernel.output_len() {
            return Err(ScheduleError::OutputLengthMismatch {
                step,
                kernel: kernel.name(),
                name: tensors[output].name.clone(),
                expected: kernel.output_len(),
                actual: tensors[output].length,
            });
        }
        Ok(())
    }

    fn validate_tensor_index(label: &str, index: usize, count: usize) -> ScheduleResult<()> {
        if index >= count {
            return Err(ScheduleError::TensorIndexOutOfBounds {
                label: label.to_string(),
                index,
                count,
            });
        }
        Ok(())
    }

    pub fn tensors(&self) -> &[TensorInfo] {
        &self.tensors
    }

    pub fn tensor(&self, index: usize) -> Option<&TensorInfo> {
        self.tensors.get(index)
    }

    pub fn steps(&self) -> &[ScheduledStep] {
        &self.steps
    }

    pub fn programs(&self) -> &[ProgramSource] {
        &self.programs
    }

    /// Index of the input tensor.
    pub fn input(&self) -> usize {
        self.input
    }

    /// Index of the output tensor.
    pub fn output(&self) -> usize {
        self.output
    }

    pub fn input_len(&self) -> usize {
        self.tensors[self.input].length
    }

    pub fn output_len(&self) -> usize {
        self.tensors[self.output].length
    }

    /// Tensors initialized from the weight file, as `(index, weight name)`.
    pub fn weight_tensors(&self) -> impl Iterator<Item = (usize, &str)> {
        self.tensors
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.weight.as_deref().map(|w| (i, w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::kernels::{BinaryKernel, BinaryOp, CopyKernel, UnaryKernel};
    use crate::schedule_info::{KernelInfo, StepInfo};

    fn tensor(name: &str, length: usize) -> TensorInfo {
        TensorInfo {
            name: name.to_string(),
            length,
            precision: Precision::Full,
            weight: None,
        }
    }

    fn copy_step(length: usize, input: usize, output: usize) -> StepInfo {
        StepInfo {
            kernel: KernelInfo::Copy(CopyKernel { length }),
            output,
            inputs: vec![input],
        }
    }

    fn info(tensors: Vec<TensorInfo>, steps: Vec<StepInfo>, output: usize) -> ScheduleInfo {
        ScheduleInfo {
            tensors,
            steps,
            input: 0,
            output,
        }
    }

    #[test]
    fn test_valid_chain() {
        let schedule = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 3), tensor("b", 3)],
            vec![copy_step(3, 0, 1), copy_step(3, 1, 2)],
            2,
        ))
        .unwrap();
        assert_eq!(schedule.steps().len(), 2);
        assert_eq!(schedule.programs().len(), 1);
        assert_eq!(schedule.steps()[1].program_index, 0);
        assert_eq!((schedule.input_len(), schedule.output_len()), (3, 3));
    }

    #[test]
    fn test_programs_deduplicated_by_source() {
        let mut b = ScheduleInfo::builder();
        let x = b.input("x", 4);
        let s = b.step("s", UnaryKernel::new(Activation::Sigmoid, 4).unwrap(), vec![x], 4);
        let r = b.step("r", UnaryKernel::new(Activation::Relu, 4).unwrap(), vec![s], 4);
        let s2 = b.step("s2", UnaryKernel::new(Activation::Sigmoid, 4).unwrap(), vec![r], 4);
        b.step("sum", BinaryKernel::new(BinaryOp::Add, 4).unwrap(), vec![s, s2], 4);
        let schedule = Schedule::new(b.build()).unwrap();
        assert_eq!(schedule.programs().len(), 3);
        let indices: Vec<usize> = schedule.steps().iter().map(|s| s.program_index).collect();
        assert_eq!(indices, vec![0, 1, 0, 2]);
    }

    #[test]
    fn test_self_reading_step() {
        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 3)],
            vec![copy_step(3, 1, 1)],
            1,
        ))
        .unwrap_err();
        assert_eq!(err, ScheduleError::SelfReadingStep { step: 0, tensor: 1 });
    }

    #[test]
    fn test_read_before_write() {
        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 3), tensor("b", 3)],
            vec![copy_step(3, 2, 1), copy_step(3, 0, 2)],
            1,
        ))
        .unwrap_err();
        assert!(matches!(err, ScheduleError::ReadBeforeWrite { step: 0, .. }));
    }

    #[test]
    fn test_length_mismatches() {
        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 4)],
            vec![copy_step(4, 0, 1)],
            1,
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InputLengthMismatch { position: 0, expected: 4, actual: 3, .. }
        ));

        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 4)],
            vec![copy_step(3, 0, 1)],
            1,
        ))
        .unwrap_err();
        assert!(matches!(err, ScheduleError::OutputLengthMismatch { .. }));
    }

    #[test]
    fn test_input_count_mismatch() {
        let step = StepInfo {
            kernel: KernelInfo::Binary(BinaryKernel::new(BinaryOp::Add, 3).unwrap()),
            output: 1,
            inputs: vec![0],
        };
        let err = Schedule::new(info(vec![tensor("x", 3), tensor("a", 3)], vec![step], 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InputCountMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 3)],
            vec![copy_step(3, 0, 5)],
            1,
        ))
        .unwrap_err();
        assert_eq!(
            err,
            ScheduleError::TensorIndexOutOfBounds {
                label: "output".to_string(),
                index: 5,
                count: 2
            }
        );
    }

    #[test]
    fn test_weight_and_input_protection() {
        let mut weight = tensor("w", 3);
        weight.weight = Some("w".to_string());
        let err = Schedule::new(info(
            vec![tensor("x", 3), weight.clone()],
            vec![copy_step(3, 0, 1)],
            1,
        ))
        .unwrap_err();
        assert!(matches!(err, ScheduleError::WritesWeight { .. }));

        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 3)],
            vec![copy_step(3, 1, 0)],
            0,
        ))
        .unwrap_err();
        assert_eq!(err, ScheduleError::WritesInput { step: 0 });

        let err = Schedule::new(info(vec![weight, tensor("a", 3)], vec![copy_step(3, 0, 1)], 1))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InputIsWeight { .. }));
    }

    #[test]
    fn test_output_never_written() {
        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 3), tensor("b", 3)],
            vec![copy_step(3, 0, 1)],
            2,
        ))
        .unwrap_err();
        assert!(matches!(err, ScheduleError::OutputNeverWritten { .. }));
    }

    #[test]
    fn test_invalid_kernel_reports_step() {
        let err = Schedule::new(info(
            vec![tensor("x", 3), tensor("a", 3)],
            vec![copy_step(0, 0, 1)],
            1,
        ))
        .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidKernel { step: 0, .. }));
    }

    #[test]
    fn test_empty_schedule() {
        assert_eq!(
            Schedule::new(info(vec![tensor("x", 3)], vec![], 0)).unwrap_err(),
            ScheduleError::NoStepsProvided
        );
    }
}
