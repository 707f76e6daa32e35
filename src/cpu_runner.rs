//! CPU reference execution of a schedule.
//!
//! Runs every step with its kernel's host implementation. It defines the
//! expected values the GPU runtime is checked against and works without a
//! device.

use std::time::Instant;

use log::{debug, trace};

use crate::errors::{InferenceError, InferenceResult, ShapeError};
use crate::schedule::Schedule;
use crate::weights::ResolvedWeights;

/// Executes a [`Schedule`] on host buffers.
pub struct CpuRunner<'a> {
    schedule: &'a Schedule,
    tensors: Vec<Vec<f32>>,
}

impl<'a> CpuRunner<'a> {
    /// Allocates every tensor and copies the weights in.
    pub fn new(schedule: &'a Schedule, weights: &ResolvedWeights) -> Self {
        let tensors = schedule
            .tensors()
            .iter()
            .enumerate()
            .map(|(i, t)| match weights.get(i) {
                Some(data) => data.to_vec(),
                None => vec![0.0; t.length],
            })
            .collect();
        Self { schedule, tensors }
    }

    /// Runs the schedule on `input` and returns a copy of the output tensor.
    pub fn infer(&mut self, input: &[f32]) -> InferenceResult<Vec<f32>> {
        let schedule = self.schedule;
        let input_index = schedule.input();
        if input.len() != schedule.input_len() {
            return Err(ShapeError::LengthMismatch {
                tensor: schedule.tensors()[input_index].name.clone(),
                expected: schedule.input_len(),
                actual: input.len(),
            }
            .into());
        }
        self.tensors[input_index].copy_from_slice(input);

        let start = Instant::now();
        for (i, step) in schedule.steps().iter().enumerate() {
            // Steps never read their own output, so the output buffer can be
            // taken out while the inputs are borrowed.
            let mut output = std::mem::take(&mut self.tensors[step.output]);
            let inputs: Vec<&[f32]> = step
                .inputs
                .iter()
                .map(|&index| self.tensors[index].as_slice())
                .collect();
            let result = step.kernel.apply(&inputs, &mut output);
            self.tensors[step.output] = output;
            result.map_err(|source| InferenceError::Step { step: i, source })?;
            trace!("CPU step {} ({}) done", i, step.kernel.name());
        }
        debug!("CPU inference finished in {:?}", start.elapsed());

        Ok(self.tensors[schedule.output()].clone())
    }

    /// Current contents of a tensor.
    pub fn tensor(&self, index: usize) -> Option<&[f32]> {
        self.tensors.get(index).map(Vec::as_slice)
    }
}
