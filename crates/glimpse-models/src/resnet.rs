//! ResNet-50 convolutional trunk.
//!
//! The trunk stops after global average pooling and returns one 2048-d feature
//! vector per image. Batch norms always run with their running statistics.

use candle_core::{Result, Tensor, D};
use candle_nn::{batch_norm, conv2d_no_bias, BatchNorm, Conv2d, Conv2dConfig, VarBuilder};

/// Number of channels produced by the trunk.
pub const FEATURE_DIM: usize = 2048;

const EXPANSION: usize = 4;
const BN_EPS: f64 = 1e-5;

// (blocks, planes, stride) of the four stages
const STAGES: [(usize, usize, usize); 4] = [(3, 64, 1), (4, 128, 2), (6, 256, 2), (3, 512, 2)];

/// Names of the trunk parameters inside a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackboneNames {
    pub stem_conv: &'static str,
    pub stem_bn: &'static str,
    pub stages: [&'static str; 4],
}

impl BackboneNames {
    /// `conv1`, `bn1`, `layer1`..`layer4`, as in an unmodified torchvision ResNet.
    pub const TORCHVISION: Self = Self {
        stem_conv: "conv1",
        stem_bn: "bn1",
        stages: ["layer1", "layer2", "layer3", "layer4"],
    };

    /// The trunk wrapped in an indexed sequence of its children
    /// (conv, bn, relu, maxpool, layer1..layer4).
    pub const SEQUENTIAL: Self = Self {
        stem_conv: "0",
        stem_bn: "1",
        stages: ["4", "5", "6", "7"],
    };
}

#[derive(Debug, Clone)]
struct ConvBn {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBn {
    #[allow(clippy::too_many_arguments)]
    fn new(
        c_in: usize,
        c_out: usize,
        ksize: usize,
        stride: usize,
        padding: usize,
        conv_vb: VarBuilder,
        bn_vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            stride,
            padding,
            ..Default::default()
        };
        Ok(Self {
            conv: conv2d_no_bias(c_in, c_out, ksize, cfg, conv_vb)?,
            bn: batch_norm(c_out, BN_EPS, bn_vb)?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        xs.apply(&self.conv)?.apply_t(&self.bn, false)
    }
}

#[derive(Debug, Clone)]
struct Bottleneck {
    conv1: ConvBn,
    conv2: ConvBn,
    conv3: ConvBn,
    downsample: Option<ConvBn>,
}

impl Bottleneck {
    fn new(c_in: usize, planes: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let c_out = planes * EXPANSION;
        let conv1 = ConvBn::new(c_in, planes, 1, 1, 0, vb.pp("conv1"), vb.pp("bn1"))?;
        // the stride sits on the 3x3 convolution
        let conv2 = ConvBn::new(planes, planes, 3, stride, 1, vb.pp("conv2"), vb.pp("bn2"))?;
        let conv3 = ConvBn::new(planes, c_out, 1, 1, 0, vb.pp("conv3"), vb.pp("bn3"))?;

        let downsample = if stride != 1 || c_in != c_out {
            let vb = vb.pp("downsample");
            Some(ConvBn::new(c_in, c_out, 1, stride, 0, vb.pp(0), vb.pp(1))?)
        } else {
            None
        };

        Ok(Self {
            conv1,
            conv2,
            conv3,
            downsample,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = self.conv1.forward(xs)?.relu()?;
        let ys = self.conv2.forward(&ys)?.relu()?;
        let ys = self.conv3.forward(&ys)?;
        let shortcut = match &self.downsample {
            Some(downsample) => downsample.forward(xs)?,
            None => xs.clone(),
        };
        (ys + shortcut)?.relu()
    }
}

/// ResNet-50 without its classification layer.
#[derive(Debug, Clone)]
pub struct ResNet50 {
    stem: ConvBn,
    stages: Vec<Vec<Bottleneck>>,
}

impl ResNet50 {
    /// Build the trunk, reading the weights under `vb` with the given naming.
    pub fn new(names: BackboneNames, vb: VarBuilder) -> Result<Self> {
        let stem = ConvBn::new(3, 64, 7, 2, 3, vb.pp(names.stem_conv), vb.pp(names.stem_bn))?;

        let mut c_in = 64;
        let mut stages = Vec::with_capacity(STAGES.len());
        for ((blocks, planes, stride), name) in STAGES.into_iter().zip(names.stages) {
            let vb = vb.pp(name);
            let mut stage = Vec::with_capacity(blocks);
            for index in 0..blocks {
                let stride = if index == 0 { stride } else { 1 };
                stage.push(Bottleneck::new(c_in, planes, stride, vb.pp(index))?);
                c_in = planes * EXPANSION;
            }
            stages.push(stage);
        }

        Ok(Self { stem, stages })
    }

    /// Run the trunk on a batch of images with shape [B, 3, H, W].
    ///
    /// Returns the pooled features with shape [B, 2048].
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self
            .stem
            .forward(xs)?
            .relu()?
            // max pool 3x3/2 with one pixel of padding on every side
            .pad_with_same(D::Minus1, 1, 1)?
            .pad_with_same(D::Minus2, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;

        for stage in self.stages.iter() {
            for block in stage.iter() {
                xs = block.forward(&xs)?;
            }
        }

        // global average pooling
        xs.mean(D::Minus1)?.mean(D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn pooled_feature_shape() -> Result<()> {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let model = ResNet50::new(BackboneNames::TORCHVISION, vb)?;

        let xs = Tensor::zeros((2, 3, 64, 64), DType::F32, &device)?;
        let ys = model.forward(&xs)?;
        assert_eq!(ys.dims(), &[2, FEATURE_DIM]);
        Ok(())
    }

    #[test]
    fn reads_sequential_names() -> Result<()> {
        let device = Device::Cpu;
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let _ = ResNet50::new(BackboneNames::SEQUENTIAL, vb.pp("resnet"))?;

        let data = varmap.data().lock().expect("varmap lock");
        assert!(data.contains_key("resnet.0.weight"));
        assert!(data.contains_key("resnet.1.running_var"));
        assert!(data.contains_key("resnet.4.0.downsample.0.weight"));
        assert!(data.contains_key("resnet.7.2.bn3.bias"));
        assert!(!data.contains_key("resnet.4.1.downsample.0.weight"));
        Ok(())
    }
}
