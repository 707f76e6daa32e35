//! YOLOv8 detector graph generation.
//!
//! Builds the straight-line schedule of the detector: a Darknet backbone made
//! of strided convolution blocks, C2f blocks and SPPF, an FPN neck with
//! nearest upsampling, and a decoupled detection head followed by DFL
//! decoding, box decoding and class sigmoids. Weight tensors are named the
//! way the serialized model names them, e.g. `net.b1.0.conv.weight`,
//! `fpn.n1.cv1.bn.running_mean` or `head.cv2.0.2.bias`.
//!
//! The output is a flat `[4 + classes, anchors]` tensor: rows `0..4` are
//! `(cx, cy, w, h)` in input pixels, the remaining rows class scores.

use log::info;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::errors::{ModelConfigError, ModelConfigResult};
use crate::kernels::batch_norm_kernel::DEFAULT_EPS;
use crate::kernels::dfl_kernel::DEFAULT_BINS;
use crate::kernels::{
    BatchNormKernel, BinaryKernel, BinaryOp, ConcatKernel, Conv2dKernel, DecodeBoxesKernel,
    DetectionLevel, DflKernel, MaxPool2dKernel, SliceKernel, UnaryKernel, UpsampleNearestKernel,
};
use crate::precision::Precision;
use crate::schedule_info::{ScheduleInfo, ScheduleInfoBuilder};
use crate::weights::{Dtype, WeightWriter};

/// Strides of the three detection levels.
pub const STRIDES: [usize; 3] = [8, 16, 32];

/// SPPF pooling window.
const SPPF_WINDOW: usize = 5;

/// Detector hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoloConfig {
    pub input_height: usize,
    pub input_width: usize,
    /// Depth multiple applied to the number of bottlenecks.
    pub depth: f64,
    /// Width multiple applied to channel counts.
    pub width: f64,
    /// Extra channel ratio of the deepest stage.
    pub ratio: f64,
    pub num_classes: usize,
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default)]
    pub precision: Precision,
}

fn default_bins() -> usize {
    DEFAULT_BINS
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            input_height: 640,
            input_width: 640,
            depth: 0.33,
            width: 0.25,
            ratio: 2.0,
            num_classes: 80,
            bins: DEFAULT_BINS,
            precision: Precision::Full,
        }
    }
}

impl YoloConfig {
    /// Standard size variants `n`, `s`, `m`, `l` and `x` at 640x640 with 80 classes.
    pub fn variant(name: &str) -> ModelConfigResult<Self> {
        let (depth, width, ratio) = match name {
            "n" => (0.33, 0.25, 2.0),
            "s" => (0.33, 0.50, 2.0),
            "m" => (0.67, 0.75, 1.5),
            "l" => (1.0, 1.0, 1.0),
            "x" => (1.0, 1.25, 1.0),
            _ => {
                return Err(ModelConfigError::UnknownVariant {
                    name: name.to_string(),
                });
            }
        };
        Ok(Self {
            depth,
            width,
            ratio,
            ..Self::default()
        })
    }

    pub fn with_input_size(mut self, height: usize, width: usize) -> Self {
        self.input_height = height;
        self.input_width = width;
        self
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    fn validate(&self) -> ModelConfigResult<()> {
        let stride = STRIDES[STRIDES.len() - 1];
        let aligned = |v: usize| v > 0 && v.is_multiple_of(stride);
        if !aligned(self.input_height) || !aligned(self.input_width) {
            return Err(ModelConfigError::UnalignedInput {
                height: self.input_height,
                width: self.input_width,
                stride,
            });
        }
        if self.num_classes == 0 {
            return Err(ModelConfigError::NoClasses);
        }
        Ok(())
    }

    /// Channel count scaled by the width multiple.
    fn channels(&self, base: f64) -> usize {
        (base * self.width) as usize
    }

    /// Channel count of the deepest stage.
    fn deep_channels(&self) -> usize {
        (512.0 * self.width * self.ratio) as usize
    }

    /// Number of bottlenecks scaled by the depth multiple.
    fn repeats(&self, base: f64) -> usize {
        ((base * self.depth).round() as usize).max(1)
    }

    /// Detection grids in output order.
    pub fn levels(&self) -> Vec<DetectionLevel> {
        STRIDES
            .iter()
            .map(|&s| DetectionLevel {
                height: self.input_height / s,
                width: self.input_width / s,
                stride: s as f32,
            })
            .collect()
    }

    pub fn input_len(&self) -> usize {
        3 * self.input_height * self.input_width
    }

    pub fn anchors(&self) -> usize {
        self.levels().iter().map(DetectionLevel::anchors).sum()
    }

    pub fn output_len(&self) -> usize {
        (4 + self.num_classes) * self.anchors()
    }
}

/// Name and shape of one expected weight tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl WeightSpec {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Generates the detector schedule.
pub fn build_schedule(config: &YoloConfig) -> ModelConfigResult<ScheduleInfo> {
    let graph = GraphBuilder::build(config)?;
    info!(
        "Generated detector graph: {} tensors, {} steps, {} weights",
        graph.info.tensors.len(),
        graph.info.steps.len(),
        graph.weights.len()
    );
    Ok(graph.info)
}

/// Lists every weight the schedule of `config` reads, in graph order.
pub fn weight_specs(config: &YoloConfig) -> ModelConfigResult<Vec<WeightSpec>> {
    Ok(GraphBuilder::build(config)?.weights)
}

/// A weight writer holding zeros for every expected weight.
pub fn zero_weight_writer(config: &YoloConfig, dtype: Dtype) -> ModelConfigResult<WeightWriter> {
    let mut writer = WeightWriter::new().with_metadata("format", "texmodel-zero");
    for spec in weight_specs(config)? {
        writer.add_zeros(&spec.name, dtype, &spec.shape);
    }
    Ok(writer)
}

/// A feature map produced by the graph.
#[derive(Debug, Clone, Copy)]
struct Feature {
    tensor: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl Feature {
    fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    fn spatial(&self) -> usize {
        self.height * self.width
    }
}

struct Graph {
    info: ScheduleInfo,
    weights: Vec<WeightSpec>,
}

struct GraphBuilder<'a> {
    config: &'a YoloConfig,
    schedule: ScheduleInfoBuilder,
    weights: Vec<WeightSpec>,
}

impl<'a> GraphBuilder<'a> {
    fn build(config: &'a YoloConfig) -> ModelConfigResult<Graph> {
        config.validate()?;
        let mut schedule = ScheduleInfo::builder();
        schedule.set_precision(config.precision);
        let mut graph = GraphBuilder {
            config,
            schedule,
            weights: Vec::new(),
        };

        let images = graph.schedule.input("images", config.input_len());
        let x = Feature {
            tensor: images,
            channels: 3,
            height: config.input_height,
            width: config.input_width,
        };
        let (p3, p4, p5) = graph.backbone(x)?;
        let heads = graph.neck(p3, p4, p5)?;
        let output = graph.head(&heads)?;
        graph.schedule.output(output);

        Ok(Graph {
            info: graph.schedule.build(),
            weights: graph.weights,
        })
    }

    fn backbone(&mut self, x: Feature) -> ModelConfigResult<(Feature, Feature, Feature)> {
        let c = self.config;
        let (c64, c128, c256, c512) = (
            c.channels(64.0),
            c.channels(128.0),
            c.channels(256.0),
            c.channels(512.0),
        );
        let deep = c.deep_channels();

        let x = self.conv_block("net.b1.0", x, c64, 3, 2)?;
        let x = self.conv_block("net.b1.1", x, c128, 3, 2)?;

        let x = self.c2f("net.b2.0", x, c128, c.repeats(3.0), true)?;
        let x = self.conv_block("net.b2.1", x, c256, 3, 2)?;
        let p3 = self.c2f("net.b2.2", x, c256, c.repeats(6.0), true)?;

        let x = self.conv_block("net.b3.0", p3, c512, 3, 2)?;
        let p4 = self.c2f("net.b3.1", x, c512, c.repeats(6.0), true)?;

        let x = self.conv_block("net.b4.0", p4, deep, 3, 2)?;
        let x = self.c2f("net.b4.1", x, deep, c.repeats(3.0), true)?;

        let p5 = self.sppf("net.b5.0", x, deep)?;
        Ok((p3, p4, p5))
    }

    fn neck(
        &mut self,
        p3: Feature,
        p4: Feature,
        p5: Feature,
    ) -> ModelConfigResult<[Feature; 3]> {
        let c = self.config;
        let n = c.repeats(3.0);

        let up = self.upsample("fpn.up5", p5)?;
        let cat = self.concat_channels("fpn.cat1", &[up, p4])?;
        let x = self.c2f("fpn.n1", cat, c.channels(512.0), n, false)?;

        let up = self.upsample("fpn.up4", x)?;
        let cat = self.concat_channels("fpn.cat2", &[up, p3])?;
        let head_1 = self.c2f("fpn.n2", cat, c.channels(256.0), n, false)?;

        let down = self.conv_block("fpn.n3", head_1, c.channels(256.0), 3, 2)?;
        let cat = self.concat_channels("fpn.cat3", &[down, x])?;
        let head_2 = self.c2f("fpn.n4", cat, c.channels(512.0), n, false)?;

        let down = self.conv_block("fpn.n5", head_2, c.channels(512.0), 3, 2)?;
        let cat = self.concat_channels("fpn.cat4", &[down, p5])?;
        let head_3 = self.c2f("fpn.n6", cat, c.deep_channels(), n, false)?;

        Ok([head_1, head_2, head_3])
    }

    fn head(&mut self, features: &[Feature; 3]) -> ModelConfigResult<usize> {
        let bins = self.config.bins;
        let nc = self.config.num_classes;
        let box_channels = 4 * bins;
        let c_cls = features[0].channels.max(nc.min(100));
        let c_box = (features[0].channels / 4).max(box_channels);

        let mut boxes = Vec::with_capacity(features.len());
        let mut classes = Vec::with_capacity(features.len());
        for (i, &f) in features.iter().enumerate() {
            let x = self.conv_block(&format!("head.cv2.{i}.0"), f, c_box, 3, 1)?;
            let x = self.conv_block(&format!("head.cv2.{i}.1"), x, c_box, 3, 1)?;
            boxes.push(self.conv_bias(&format!("head.cv2.{i}.2"), x, box_channels)?);

            let x = self.conv_block(&format!("head.cv3.{i}.0"), f, c_cls, 3, 1)?;
            let x = self.conv_block(&format!("head.cv3.{i}.1"), x, c_cls, 3, 1)?;
            classes.push(self.conv_bias(&format!("head.cv3.{i}.2"), x, nc)?);
        }

        let anchors_per_level: Vec<usize> = boxes.iter().map(Feature::spatial).collect();
        let anchors: usize = anchors_per_level.iter().sum();

        let box_cat = self.schedule.step(
            "head.box",
            ConcatKernel::new(box_channels, anchors_per_level.clone())?,
            boxes.iter().map(|f| f.tensor).collect(),
            box_channels * anchors,
        );
        let cls_cat = self.schedule.step(
            "head.cls",
            ConcatKernel::new(nc, anchors_per_level)?,
            classes.iter().map(|f| f.tensor).collect(),
            nc * anchors,
        );

        let dist = self.schedule.step(
            "head.dfl",
            DflKernel::new(bins, anchors)?,
            vec![box_cat],
            4 * anchors,
        );
        let dbox = self.schedule.step(
            "head.dbox",
            DecodeBoxesKernel::new(self.config.levels())?,
            vec![dist],
            4 * anchors,
        );
        let scores = self.schedule.step(
            "head.scores",
            UnaryKernel::new(Activation::Sigmoid, nc * anchors)?,
            vec![cls_cat],
            nc * anchors,
        );
        Ok(self.schedule.step(
            "output",
            ConcatKernel::flat(vec![4 * anchors, nc * anchors])?,
            vec![dbox, scores],
            (4 + nc) * anchors,
        ))
    }

    /// Convolution without bias, batch norm and SiLU.
    fn conv_block(
        &mut self,
        prefix: &str,
        x: Feature,
        out_channels: usize,
        k: usize,
        stride: usize,
    ) -> ModelConfigResult<Feature> {
        let conv =
            Conv2dKernel::square(x.channels, out_channels, x.height, x.width, k, stride, false)?;
        let (height, width) = (conv.out_height(), conv.out_width());
        let weight = self.weight(
            format!("{prefix}.conv.weight"),
            vec![out_channels, x.channels, k, k],
        );
        let len = out_channels * height * width;
        let y = self
            .schedule
            .step(format!("{prefix}.conv"), conv, vec![x.tensor, weight], len);

        let mut bn_inputs = vec![y];
        for name in ["weight", "bias", "running_mean", "running_var"] {
            bn_inputs.push(self.weight(format!("{prefix}.bn.{name}"), vec![out_channels]));
        }
        let bn = BatchNormKernel::new(
            out_channels,
            height * width,
            DEFAULT_EPS,
            Some(Activation::Silu),
        )?;
        let tensor = self.schedule.step(prefix, bn, bn_inputs, len);
        Ok(Feature {
            tensor,
            channels: out_channels,
            height,
            width,
        })
    }

    /// Pointwise convolution with bias, the last layer of each head branch.
    fn conv_bias(
        &mut self,
        prefix: &str,
        x: Feature,
        out_channels: usize,
    ) -> ModelConfigResult<Feature> {
        let conv = Conv2dKernel::square(x.channels, out_channels, x.height, x.width, 1, 1, true)?;
        let weight = self.weight(
            format!("{prefix}.weight"),
            vec![out_channels, x.channels, 1, 1],
        );
        let bias = self.weight(format!("{prefix}.bias"), vec![out_channels]);
        let tensor = self.schedule.step(
            prefix,
            conv,
            vec![x.tensor, weight, bias],
            out_channels * x.spatial(),
        );
        Ok(Feature {
            tensor,
            channels: out_channels,
            ..x
        })
    }

    fn bottleneck(
        &mut self,
        prefix: &str,
        x: Feature,
        shortcut: bool,
    ) -> ModelConfigResult<Feature> {
        let y = self.conv_block(&format!("{prefix}.cv1"), x, x.channels, 3, 1)?;
        let y = self.conv_block(&format!("{prefix}.cv2"), y, x.channels, 3, 1)?;
        if !shortcut {
            return Ok(y);
        }
        let tensor = self.schedule.step(
            format!("{prefix}.add"),
            BinaryKernel::new(BinaryOp::Add, x.len())?,
            vec![x.tensor, y.tensor],
            x.len(),
        );
        Ok(Feature { tensor, ..y })
    }

    /// Split into two halves, chain bottlenecks on the second half and fuse
    /// every intermediate with a pointwise convolution.
    fn c2f(
        &mut self,
        prefix: &str,
        x: Feature,
        out_channels: usize,
        n: usize,
        shortcut: bool,
    ) -> ModelConfigResult<Feature> {
        let c = out_channels / 2;
        let y = self.conv_block(&format!("{prefix}.cv1"), x, 2 * c, 1, 1)?;

        let half = c * y.spatial();
        let second = self.schedule.step(
            format!("{prefix}.chunk1"),
            SliceKernel::new(y.len(), half, half)?,
            vec![y.tensor],
            half,
        );
        let mut last = Feature {
            tensor: second,
            channels: c,
            ..y
        };
        // Both halves concatenated are `y` itself.
        let mut parts = vec![y];
        for i in 0..n {
            last = self.bottleneck(&format!("{prefix}.bottleneck.{i}"), last, shortcut)?;
            parts.push(last);
        }
        let cat = self.concat_channels(&format!("{prefix}.cat"), &parts)?;
        self.conv_block(&format!("{prefix}.cv2"), cat, out_channels, 1, 1)
    }

    fn sppf(
        &mut self,
        prefix: &str,
        x: Feature,
        out_channels: usize,
    ) -> ModelConfigResult<Feature> {
        let x = self.conv_block(&format!("{prefix}.cv1"), x, x.channels / 2, 1, 1)?;
        let mut parts = vec![x];
        let mut last = x;
        for i in 0..3 {
            let pool = MaxPool2dKernel::new(
                last.channels,
                last.height,
                last.width,
                SPPF_WINDOW,
                1,
                SPPF_WINDOW / 2,
            )?;
            let tensor = self
                .schedule
                .step(format!("{prefix}.pool{i}"), pool, vec![last.tensor], last.len());
            last = Feature { tensor, ..last };
            parts.push(last);
        }
        let cat = self.concat_channels(&format!("{prefix}.cat"), &parts)?;
        self.conv_block(&format!("{prefix}.cv2"), cat, out_channels, 1, 1)
    }

    fn upsample(&mut self, name: &str, x: Feature) -> ModelConfigResult<Feature> {
        let up = UpsampleNearestKernel::new(x.channels, x.height, x.width, 2)?;
        let out = Feature {
            tensor: 0,
            height: x.height * 2,
            width: x.width * 2,
            ..x
        };
        let tensor = self.schedule.step(name, up, vec![x.tensor], out.len());
        Ok(Feature { tensor, ..out })
    }

    fn concat_channels(&mut self, name: &str, parts: &[Feature]) -> ModelConfigResult<Feature> {
        let lens: Vec<usize> = parts.iter().map(Feature::len).collect();
        let channels = parts.iter().map(|f| f.channels).sum();
        let out = Feature {
            tensor: 0,
            channels,
            ..parts[0]
        };
        let tensor = self.schedule.step(
            name,
            ConcatKernel::flat(lens)?,
            parts.iter().map(|f| f.tensor).collect(),
            out.len(),
        );
        Ok(Feature { tensor, ..out })
    }

    fn weight(&mut self, name: String, shape: Vec<usize>) -> usize {
        let length = shape.iter().product();
        let index = self.schedule.weight(name.clone(), length);
        self.weights.push(WeightSpec { name, shape });
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;

    fn small() -> YoloConfig {
        YoloConfig::variant("n").unwrap().with_input_size(64, 64)
    }

    #[test]
    fn test_nano_output_length() {
        let config = YoloConfig::variant("n").unwrap();
        assert_eq!(config.anchors(), 8400);
        assert_eq!(config.output_len(), 705_600);
        assert_eq!(config.input_len(), 3 * 640 * 640);
    }

    #[test]
    fn test_scaled_channels() {
        let config = YoloConfig::variant("n").unwrap();
        assert_eq!(config.channels(64.0), 16);
        assert_eq!(config.channels(256.0), 64);
        assert_eq!(config.deep_channels(), 256);
        assert_eq!(config.repeats(3.0), 1);
        assert_eq!(config.repeats(6.0), 2);

        let m = YoloConfig::variant("m").unwrap();
        assert_eq!(m.deep_channels(), 576);
        assert_eq!(m.repeats(6.0), 4);
    }

    #[test]
    fn test_small_schedule_validates() {
        let config = small();
        let schedule = Schedule::new(build_schedule(&config).unwrap()).unwrap();
        assert_eq!(schedule.input_len(), 3 * 64 * 64);
        // 8x8 + 4x4 + 2x2 anchors
        assert_eq!(schedule.output_len(), 84 * 84);
        assert!(schedule.programs().len() < schedule.steps().len());
    }

    #[test]
    fn test_weight_names_follow_model_layout() {
        let specs = weight_specs(&small()).unwrap();
        let find = |name: &str| specs.iter().find(|s| s.name == name).map(|s| s.shape.clone());
        assert_eq!(find("net.b1.0.conv.weight"), Some(vec![16, 3, 3, 3]));
        assert_eq!(find("net.b1.0.bn.running_var"), Some(vec![16]));
        assert_eq!(
            find("net.b2.0.bottleneck.0.cv1.conv.weight"),
            Some(vec![16, 16, 3, 3])
        );
        assert_eq!(find("net.b5.0.cv2.conv.weight"), Some(vec![256, 512, 1, 1]));
        assert_eq!(find("fpn.n1.cv1.conv.weight"), Some(vec![128, 384, 1, 1]));
        assert_eq!(find("head.cv2.0.2.weight"), Some(vec![64, 64, 1, 1]));
        assert_eq!(find("head.cv3.2.2.bias"), Some(vec![80]));
        assert_eq!(find("head.cv3.0.0.conv.weight"), Some(vec![80, 64, 3, 3]));
        assert!(find("net.b2.0.bottleneck.1.cv1.conv.weight").is_none());
    }

    #[test]
    fn test_weight_names_are_unique() {
        let specs = weight_specs(&small()).unwrap();
        let mut names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), specs.len());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            YoloConfig::variant("q"),
            Err(ModelConfigError::UnknownVariant { .. })
        ));
        let unaligned = small().with_input_size(64, 48);
        assert!(matches!(
            build_schedule(&unaligned),
            Err(ModelConfigError::UnalignedInput { .. })
        ));
        assert!(matches!(
            build_schedule(&small().with_num_classes(0)),
            Err(ModelConfigError::NoClasses)
        ));
    }
}
