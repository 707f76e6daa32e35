//! Resolution of weight names to schedule tensors.

use log::{debug, info};

use crate::errors::{ShapeError, WeightFileResult};
use crate::schedule::Schedule;
use crate::weights::WeightFile;

/// Weight data decoded to `f32` and indexed by tensor index.
///
/// Entries are `None` for tensors that are not initialized from the file.
#[derive(Debug, Clone, Default)]
pub struct ResolvedWeights {
    values: Vec<Option<Vec<f32>>>,
}

impl ResolvedWeights {
    /// Looks up and decodes every weight tensor of the schedule.
    ///
    /// A missing name or an element count differing from the tensor length
    /// is an error.
    pub fn resolve(file: &WeightFile, schedule: &Schedule) -> WeightFileResult<Self> {
        let mut values = vec![None; schedule.tensors().len()];
        let mut total = 0;
        for (index, name) in schedule.weight_tensors() {
            let view = file.tensor(name)?;
            let expected = schedule.tensors()[index].length;
            if view.element_count() != expected {
                return Err(ShapeError::LengthMismatch {
                    tensor: name.to_string(),
                    expected,
                    actual: view.element_count(),
                }
                .into());
            }
            let data = view.to_f32_vec()?;
            debug!("Resolved weight '{}' ({} values) for tensor {}", name, data.len(), index);
            total += data.len();
            values[index] = Some(data);
        }
        let used = values.iter().filter(|v| v.is_some()).count();
        if used < file.len() {
            debug!("{} weight file entries are not referenced by the schedule", file.len() - used);
        }
        info!("Resolved {} weight tensors ({} values)", used, total);
        Ok(Self { values })
    }

    /// Weight data for a tensor, if it is initialized from the file.
    pub fn get(&self, index: usize) -> Option<&[f32]> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Number of resolved weight tensors.
    pub fn count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}
