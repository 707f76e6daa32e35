//! Data structures describing a tensor schedule.
//!
//! A [`ScheduleInfo`] lists every tensor of the graph and the straight-line
//! sequence of kernel steps that computes the output from the input. It is
//! the serializable form consumed by [`crate::schedule::Schedule`] and can
//! be stored as JSON.

use serde::{Deserialize, Serialize};

use crate::errors::KernelResult;
use crate::kernels::{
    BatchNormKernel, BinaryKernel, ConcatKernel, Conv2dKernel, CopyKernel, DecodeBoxesKernel,
    DflKernel, Kernel, MaxPool2dKernel, SliceKernel, UnaryKernel, UpsampleNearestKernel,
};
use crate::precision::Precision;

/// Kernel template and its parameters.
/// This is a polymorphic type that can represent every template of the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KernelInfo {
    #[serde(rename = "COPY")]
    Copy(CopyKernel),
    #[serde(rename = "SLICE")]
    Slice(SliceKernel),
    #[serde(rename = "CONCAT")]
    Concat(ConcatKernel),
    #[serde(rename = "UNARY")]
    Unary(UnaryKernel),
    #[serde(rename = "BINARY")]
    Binary(BinaryKernel),
    #[serde(rename = "BATCH_NORM")]
    BatchNorm(BatchNormKernel),
    #[serde(rename = "CONV2D")]
    Conv2d(Conv2dKernel),
    #[serde(rename = "MAX_POOL2D")]
    MaxPool2d(MaxPool2dKernel),
    #[serde(rename = "UPSAMPLE_NEAREST")]
    UpsampleNearest(UpsampleNearestKernel),
    #[serde(rename = "DFL")]
    Dfl(DflKernel),
    #[serde(rename = "DECODE_BOXES")]
    DecodeBoxes(DecodeBoxesKernel),
}

impl KernelInfo {
    /// Validates the template parameters and returns the kernel object.
    pub fn create_kernel(&self) -> KernelResult<Box<dyn Kernel>> {
        let kernel: Box<dyn Kernel> = match self {
            KernelInfo::Copy(k) => Box::new(k.clone()),
            KernelInfo::Slice(k) => Box::new(k.clone()),
            KernelInfo::Concat(k) => Box::new(k.clone()),
            KernelInfo::Unary(k) => Box::new(k.clone()),
            KernelInfo::Binary(k) => Box::new(k.clone()),
            KernelInfo::BatchNorm(k) => Box::new(k.clone()),
            KernelInfo::Conv2d(k) => Box::new(k.clone()),
            KernelInfo::MaxPool2d(k) => Box::new(k.clone()),
            KernelInfo::UpsampleNearest(k) => Box::new(k.clone()),
            KernelInfo::Dfl(k) => Box::new(k.clone()),
            KernelInfo::DecodeBoxes(k) => Box::new(k.clone()),
        };
        kernel.validate()?;
        Ok(kernel)
    }
}

impl From<CopyKernel> for KernelInfo {
    fn from(k: CopyKernel) -> Self {
        KernelInfo::Copy(k)
    }
}

impl From<SliceKernel> for KernelInfo {
    fn from(k: SliceKernel) -> Self {
        KernelInfo::Slice(k)
    }
}

impl From<ConcatKernel> for KernelInfo {
    fn from(k: ConcatKernel) -> Self {
        KernelInfo::Concat(k)
    }
}

impl From<UnaryKernel> for KernelInfo {
    fn from(k: UnaryKernel) -> Self {
        KernelInfo::Unary(k)
    }
}

impl From<BinaryKernel> for KernelInfo {
    fn from(k: BinaryKernel) -> Self {
        KernelInfo::Binary(k)
    }
}

impl From<BatchNormKernel> for KernelInfo {
    fn from(k: BatchNormKernel) -> Self {
        KernelInfo::BatchNorm(k)
    }
}

impl From<Conv2dKernel> for KernelInfo {
    fn from(k: Conv2dKernel) -> Self {
        KernelInfo::Conv2d(k)
    }
}

impl From<MaxPool2dKernel> for KernelInfo {
    fn from(k: MaxPool2dKernel) -> Self {
        KernelInfo::MaxPool2d(k)
    }
}

impl From<UpsampleNearestKernel> for KernelInfo {
    fn from(k: UpsampleNearestKernel) -> Self {
        KernelInfo::UpsampleNearest(k)
    }
}

impl From<DflKernel> for KernelInfo {
    fn from(k: DflKernel) -> Self {
        KernelInfo::Dfl(k)
    }
}

impl From<DecodeBoxesKernel> for KernelInfo {
    fn from(k: DecodeBoxesKernel) -> Self {
        KernelInfo::DecodeBoxes(k)
    }
}

/// A tensor of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Unique, human readable name.
    pub name: String,
    /// Number of elements.
    pub length: usize,
    /// Storage precision of the backing texture.
    #[serde(default)]
    pub precision: Precision,
    /// Name of the weight-file entry initializing this tensor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
}

/// One kernel invocation: reads `inputs` (bound as `data1..dataK`) and
/// overwrites `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub kernel: KernelInfo,
    pub output: usize,
    pub inputs: Vec<usize>,
}

/// Schedule information required to build the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    /// Every tensor of the graph, addressed by position.
    pub tensors: Vec<TensorInfo>,
    /// Steps in execution order.
    pub steps: Vec<StepInfo>,
    /// Index of the tensor receiving the caller's input.
    pub input: usize,
    /// Index of the tensor read back after the last step.
    pub output: usize,
}

impl ScheduleInfo {
    /// Creates a new builder for ScheduleInfo.
    pub fn builder() -> ScheduleInfoBuilder {
        ScheduleInfoBuilder::new()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Builder for ScheduleInfo.
///
/// Tensors are appended as they are declared and each call returns the new
/// tensor's index, so graphs can be written in execution order.
#[derive(Debug, Default)]
pub struct ScheduleInfoBuilder {
    tensors: Vec<TensorInfo>,
    steps: Vec<StepInfo>,
    input: Option<usize>,
    output: Option<usize>,
    precision: Precision,
}

impl ScheduleInfoBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Precision used for tensors declared afterwards.
    pub fn precision(mut self, value: Precision) -> Self {
        self.precision = value;
        self
    }

    pub fn set_precision(&mut self, value: Precision) {
        self.precision = value;
    }

    /// Declares an intermediate tensor.
    pub fn tensor(&mut self, name: impl Into<String>, length: usize) -> usize {
        self.push(name.into(), length, None)
    }

    /// Declares a tensor initialized from the weight file entry `weight`.
    pub fn weight(&mut self, weight: impl Into<String>, length: usize) -> usize {
        let weight = weight.into();
        self.push(weight.clone(), length, Some(weight))
    }

    /// Declares the input tensor.
    pub fn input(&mut self, name: impl Into<String>, length: usize) -> usize {
        let index = self.push(name.into(), length, None);
        self.input = Some(index);
        index
    }

    /// Marks an already declared tensor as the output.
    pub fn output(&mut self, index: usize) {
        self.output = Some(index);
    }

    /// Appends a step writing a freshly declared tensor and returns its index.
    pub fn step(
        &mut self,
        name: impl Into<String>,
        kernel: impl Into<KernelInfo>,
        inputs: Vec<usize>,
        length: usize,
    ) -> usize {
        let output = self.tensor(name, length);
        self.steps.push(StepInfo {
            kernel: kernel.into(),
            output,
            inputs,
        });
        output
    }

    /// Appends a step writing an existing tensor.
    pub fn step_into(&mut self, kernel: impl Into<KernelInfo>, inputs: Vec<usize>, output: usize) {
        self.steps.push(StepInfo {
            kernel: kernel.into(),
            output,
            inputs,
        });
    }

    pub fn tensor_len(&self, index: usize) -> usize {
        self.tensors.get(index).map_or(0, |t| t.length)
    }

    fn push(&mut self, name: String, length: usize, weight: Option<String>) -> usize {
        self.tensors.push(TensorInfo {
            name,
            length,
            precision: self.precision,
            weight,
        });
        self.tensors.len() - 1
    }

    /// Finishes the description. Without an explicit output the last
    /// written tensor is used; without an explicit input, tensor 0.
    pub fn build(self) -> ScheduleInfo {
        let output = self
            .output
            .or_else(|| self.steps.last().map(|s| s.output))
            .unwrap_or(0);
        ScheduleInfo {
            tensors: self.tensors,
            steps: self.steps,
            input: self.input.unwrap_or(0),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;

    #[test]
    fn test_kernel_info_tagged_json() {
        let json = r#"{"type": "SLICE", "source_length": 8, "offset": 4, "length": 4}"#;
        let info: KernelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info, KernelInfo::Slice(SliceKernel::new(8, 4, 4).unwrap()));

        let json = r#"{"type": "UNARY", "op": "SIGMOID", "length": 3}"#;
        let info: KernelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(
            info,
            KernelInfo::Unary(UnaryKernel::new(Activation::Sigmoid, 3).unwrap())
        );
    }

    #[test]
    fn test_unknown_kernel_type_rejected() {
        let json = r#"{"type": "ATTENTION", "length": 3}"#;
        assert!(serde_json::from_str::<KernelInfo>(json).is_err());
    }

    #[test]
    fn test_create_kernel_validates() {
        let info = KernelInfo::Copy(CopyKernel { length: 0 });
        assert!(info.create_kernel().is_err());
    }

    #[test]
    fn test_builder_assigns_indices() {
        let mut b = ScheduleInfo::builder();
        let x = b.input("x", 4);
        let w = b.weight("scale", 4);
        let y = b.step(
            "y",
            crate::kernels::BinaryKernel::new(crate::kernels::BinaryOp::Mul, 4).unwrap(),
            vec![x, w],
            4,
        );
        let info = b.build();
        assert_eq!((x, w, y), (0, 1, 2));
        assert_eq!(info.input, 0);
        assert_eq!(info.output, 2);
        assert_eq!(info.tensors[1].weight.as_deref(), Some("scale"));
        assert_eq!(info.tensors[2].weight, None);
    }

    #[test]
    fn test_json_round_trip_keeps_defaults() {
        let json = r#"{
            "tensors": [{"name": "a", "length": 2}, {"name": "b", "length": 2, "precision": "F16"}],
            "steps": [{"kernel": {"type": "COPY", "length": 2}, "output": 1, "inputs": [0]}],
            "input": 0,
            "output": 1
        }"#;
        let info = ScheduleInfo::from_json(json).unwrap();
        assert_eq!(info.tensors[0].precision, Precision::Full);
        assert_eq!(info.tensors[1].precision, Precision::Half);
        let again = ScheduleInfo::from_json(&info.to_json().unwrap()).unwrap();
        assert_eq!(again, info);
    }
}
