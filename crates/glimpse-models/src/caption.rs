use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{
    batch_norm, embedding, linear, lstm, BatchNorm, Embedding, LSTMConfig, Linear, VarBuilder,
    LSTM, RNN,
};
use glimpse_image::Image;

use crate::{
    config::CaptionConfig,
    error::ModelError,
    preprocess::preprocess,
    resnet::{BackboneNames, ResNet50, FEATURE_DIM},
    utils::argmax,
    vocab::Vocabulary,
};

/// A model that turns a preprocessed image into a sequence of token ids.
pub trait CaptionGenerator: Send + Sync {
    /// Greedily decode exactly `max_length` token ids for the image.
    ///
    /// # Arguments
    ///
    /// * `image` - The preprocessed image with shape [1, 3, 224, 224].
    /// * `max_length` - The number of decoding steps.
    fn sample(&self, image: &Tensor, max_length: usize) -> Result<Vec<u32>, ModelError>;
}

/// Maps an image to a single embedding vector.
#[derive(Debug, Clone)]
pub struct CaptionEncoder {
    resnet: ResNet50,
    fc: Linear,
    bn: BatchNorm,
}

impl CaptionEncoder {
    pub fn new(embed_size: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            resnet: ResNet50::new(BackboneNames::SEQUENTIAL, vb.pp("resnet"))?,
            fc: linear(FEATURE_DIM, embed_size, vb.pp("fc"))?,
            bn: batch_norm(embed_size, 1e-5, vb.pp("bn"))?,
        })
    }

    /// Encode a batch of images [B, 3, H, W] into embeddings [B, embed_size].
    pub fn forward(&self, images: &Tensor) -> candle_core::Result<Tensor> {
        self.resnet
            .forward(images)?
            .apply(&self.fc)?
            .apply_t(&self.bn, false)
    }
}

/// Stacked LSTM language model conditioned on the image embedding.
#[derive(Debug, Clone)]
pub struct CaptionDecoder {
    embed: Embedding,
    layers: Vec<LSTM>,
    fc: Linear,
}

impl CaptionDecoder {
    pub fn new(config: &CaptionConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let embed = embedding(config.vocab_size, config.embed_size, vb.pp("embed"))?;

        let mut layers = Vec::with_capacity(config.num_layers);
        for layer_idx in 0..config.num_layers {
            let in_dim = if layer_idx == 0 {
                config.embed_size
            } else {
                config.hidden_size
            };
            let lstm_config = LSTMConfig {
                layer_idx,
                ..Default::default()
            };
            layers.push(lstm(in_dim, config.hidden_size, lstm_config, vb.pp("lstm"))?);
        }

        let fc = linear(config.hidden_size, config.vocab_size, vb.pp("fc"))?;

        Ok(Self { embed, layers, fc })
    }

    /// Greedy decoding from a batch of embeddings [B, embed_size].
    ///
    /// The loop always runs `max_length` steps; terminators are handled by the
    /// caller. Returns one id sequence per batch element.
    pub fn sample(
        &self,
        features: &Tensor,
        max_length: usize,
    ) -> Result<Vec<Vec<u32>>, ModelError> {
        let batch_size = features.dim(0)?;
        let device = features.device();

        let mut states = self
            .layers
            .iter()
            .map(|layer| layer.zero_state(batch_size))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let mut sequences = vec![Vec::with_capacity(max_length); batch_size];
        let mut inputs = features.clone();

        for _ in 0..max_length {
            let mut xs = inputs;
            for (layer, state) in self.layers.iter().zip(states.iter_mut()) {
                *state = layer.step(&xs, state)?;
                xs = state.h().clone();
            }

            let logits = xs.apply(&self.fc)?.to_dtype(DType::F32)?.to_vec2::<f32>()?;

            let mut predicted = Vec::with_capacity(batch_size);
            for (row, sequence) in logits.iter().zip(sequences.iter_mut()) {
                let id = argmax(row)? as u32;
                sequence.push(id);
                predicted.push(id);
            }

            inputs = self.embed.forward(&Tensor::new(predicted, device)?)?;
        }

        Ok(sequences)
    }
}

/// Encoder and decoder trained together for image captioning.
#[derive(Debug, Clone)]
pub struct CaptionModel {
    encoder: CaptionEncoder,
    decoder: CaptionDecoder,
}

impl CaptionModel {
    /// Build the model, reading the `encoder.*` and `decoder.*` weights from `vb`.
    pub fn new(config: &CaptionConfig, vb: VarBuilder) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self {
            encoder: CaptionEncoder::new(config.embed_size, vb.pp("encoder"))?,
            decoder: CaptionDecoder::new(config, vb.pp("decoder"))?,
        })
    }
}

impl CaptionGenerator for CaptionModel {
    fn sample(&self, image: &Tensor, max_length: usize) -> Result<Vec<u32>, ModelError> {
        let features = self.encoder.forward(image)?;
        log::debug!("caption features: {:?}", features.shape());

        let sequences = self.decoder.sample(&features, max_length)?;
        Ok(sequences.into_iter().next().unwrap_or_default())
    }
}

/// Turn decoded words into a caption.
///
/// Start tokens are skipped, the caption stops at the first end or pad token and
/// only the first character is uppercased.
pub fn postprocess_caption<S: AsRef<str>>(words: &[S], vocab: &Vocabulary) -> String {
    let caption = words
        .iter()
        .map(AsRef::as_ref)
        .take_while(|word| !vocab.is_terminator(word))
        .filter(|word| *word != vocab.start_token())
        .collect::<Vec<_>>()
        .join(" ");

    let mut chars = caption.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => caption,
    }
}

/// Generate a caption for an rgb8 image.
///
/// # Arguments
///
/// * `model` - The captioning model.
/// * `image` - The rgb8 image with shape [H, W, 3].
/// * `vocab` - The vocabulary the model was trained with.
/// * `device` - The device the model runs on.
/// * `max_length` - The number of decoding steps.
///
/// # Returns
///
/// The caption with its first character uppercased, possibly empty.
pub fn generate_caption<M: CaptionGenerator + ?Sized>(
    model: &M,
    image: &Image<u8, 3>,
    vocab: &Vocabulary,
    device: &Device,
    max_length: usize,
) -> Result<String, ModelError> {
    let image_t = preprocess(image, device)?;
    let ids = model.sample(&image_t, max_length)?;
    let words = vocab.decode(&ids);
    Ok(postprocess_caption(&words, vocab))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vocab() -> Vocabulary {
        let table = [
            ("<pad>", 0),
            ("<start>", 1),
            ("<end>", 2),
            ("<unk>", 3),
            ("dog", 4),
            ("runs", 5),
        ];
        Vocabulary::from_word_to_id(table.iter().map(|(w, i)| (w.to_string(), *i)).collect())
            .expect("valid vocabulary")
    }

    struct FixedIds(Vec<u32>);

    impl CaptionGenerator for FixedIds {
        fn sample(&self, image: &Tensor, max_length: usize) -> Result<Vec<u32>, ModelError> {
            assert_eq!(image.dims(), &[1, 3, 224, 224]);
            Ok(self.0.iter().copied().take(max_length).collect())
        }
    }

    fn small_config() -> CaptionConfig {
        CaptionConfig {
            embed_size: 4,
            hidden_size: 3,
            vocab_size: 6,
            num_layers: 2,
            dropout: 0.0,
        }
    }

    // lstm gate blocks, in the order candle chunks them
    const INPUT_GATE: usize = 0;
    const FORGET_GATE: usize = 1;
    const CELL_GATE: usize = 2;
    const OUTPUT_GATE: usize = 3;

    /// Row-major decoder weights, all zero until set.
    struct DecoderWeights {
        config: CaptionConfig,
        params: HashMap<String, (Vec<usize>, Vec<f32>)>,
    }

    impl DecoderWeights {
        fn zeros() -> Self {
            let config = small_config();
            let (e, h, v) = (config.embed_size, config.hidden_size, config.vocab_size);

            let mut shapes = vec![
                ("embed.weight".to_string(), vec![v, e]),
                ("fc.weight".to_string(), vec![v, h]),
                ("fc.bias".to_string(), vec![v]),
            ];
            for layer in 0..config.num_layers {
                let in_dim = if layer == 0 { e } else { h };
                shapes.push((format!("lstm.weight_ih_l{layer}"), vec![4 * h, in_dim]));
                shapes.push((format!("lstm.weight_hh_l{layer}"), vec![4 * h, h]));
                shapes.push((format!("lstm.bias_ih_l{layer}"), vec![4 * h]));
                shapes.push((format!("lstm.bias_hh_l{layer}"), vec![4 * h]));
            }

            let params = shapes
                .into_iter()
                .map(|(name, shape)| {
                    let len = shape.iter().product();
                    (name, (shape, vec![0.0; len]))
                })
                .collect();
            Self { config, params }
        }

        fn set(&mut self, name: &str, row: usize, col: usize, value: f32) {
            let (shape, data) = self.params.get_mut(name).expect("known parameter");
            let cols = shape.get(1).copied().unwrap_or(1);
            data[row * cols + col] = value;
        }

        fn set_bias(&mut self, name: &str, index: usize, value: f32) {
            self.set(name, index, 0, value);
        }

        // gate biases for every unit of an lstm layer
        fn set_gates(&mut self, layer: usize, input: f32, forget: f32, output: f32) {
            let h = self.config.hidden_size;
            let name = format!("lstm.bias_ih_l{layer}");
            for unit in 0..h {
                self.set_bias(&name, INPUT_GATE * h + unit, input);
                self.set_bias(&name, FORGET_GATE * h + unit, forget);
                self.set_bias(&name, OUTPUT_GATE * h + unit, output);
            }
        }

        // weight from input `col` into the cell gate of `unit`
        fn set_cell_input(&mut self, layer: usize, unit: usize, col: usize, value: f32) {
            let row = CELL_GATE * self.config.hidden_size + unit;
            self.set(&format!("lstm.weight_ih_l{layer}"), row, col, value);
        }

        fn build(self) -> candle_core::Result<CaptionDecoder> {
            let device = Device::Cpu;
            let mut tensors = HashMap::new();
            for (name, (shape, data)) in self.params {
                tensors.insert(name, Tensor::from_vec(data, shape, &device)?);
            }
            let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
            CaptionDecoder::new(&self.config, vb)
        }
    }

    // zero weights everywhere except the output bias, so the bias alone decides
    fn biased_decoder(bias: &[f32]) -> candle_core::Result<CaptionDecoder> {
        let mut weights = DecoderWeights::zeros();
        for (id, &value) in bias.iter().enumerate() {
            weights.set_bias("fc.bias", id, value);
        }
        weights.build()
    }

    #[test]
    fn postprocess_scenario() {
        let vocab = vocab();
        let words = vocab.decode(&[1, 4, 5, 2, 0]);
        assert_eq!(postprocess_caption(&words, &vocab), "Dog runs");
    }

    #[test]
    fn postprocess_without_terminator() {
        let vocab = vocab();
        let words = vocab.decode(&[4, 1, 5, 9]);
        assert_eq!(postprocess_caption(&words, &vocab), "Dog runs <unk>");
    }

    #[test]
    fn postprocess_only_sentinels() {
        let vocab = vocab();
        assert_eq!(postprocess_caption(&vocab.decode(&[1, 2, 4]), &vocab), "");
        assert_eq!(postprocess_caption(&vocab.decode(&[0, 4]), &vocab), "");
        assert_eq!(postprocess_caption::<&str>(&[], &vocab), "");
    }

    #[test]
    fn postprocess_keeps_case_after_first_char() {
        let vocab = vocab();
        let words = ["élan", "NASA", "<end>"];
        assert_eq!(postprocess_caption(&words, &vocab), "Élan NASA");
    }

    #[test]
    fn generate_caption_scenario() -> Result<(), ModelError> {
        let vocab = vocab();
        let image = Image::<u8, 3>::from_size_val([32, 24].into(), 128)?;
        let model = FixedIds(vec![1, 4, 5, 2, 0]);

        let caption = generate_caption(&model, &image, &vocab, &Device::Cpu, 30)?;
        assert_eq!(caption, "Dog runs");
        Ok(())
    }

    #[test]
    fn decoder_runs_max_length_steps() -> Result<(), ModelError> {
        let decoder = biased_decoder(&[0.0, 0.0, 0.0, 0.0, 1.0, 0.5])?;
        let features = Tensor::ones((1, 4), DType::F32, &Device::Cpu)?;

        let sequences = decoder.sample(&features, 7)?;
        assert_eq!(sequences, vec![vec![4; 7]]);
        Ok(())
    }

    #[test]
    fn decoder_ignores_end_token() -> Result<(), ModelError> {
        let decoder = biased_decoder(&[0.0, 0.0, 3.0, 0.0, 1.0, 0.5])?;
        let features = Tensor::ones((2, 4), DType::F32, &Device::Cpu)?;

        let sequences = decoder.sample(&features, 4)?;
        assert_eq!(sequences, vec![vec![2; 4], vec![2; 4]]);
        Ok(())
    }

    #[test]
    fn decoder_breaks_ties_with_lowest_id() -> Result<(), ModelError> {
        let decoder = biased_decoder(&[0.0, 0.0, 0.0, 0.0, 2.0, 2.0])?;
        let features = Tensor::zeros((1, 4), DType::F32, &Device::Cpu)?;

        assert_eq!(decoder.sample(&features, 3)?, vec![vec![4, 4, 4]]);
        Ok(())
    }

    #[test]
    fn decoder_zero_length() -> Result<(), ModelError> {
        let decoder = biased_decoder(&[0.0; 6])?;
        let features = Tensor::zeros((1, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(decoder.sample(&features, 0)?, vec![Vec::<u32>::new()]);
        Ok(())
    }

    #[test]
    fn decoder_feeds_back_predicted_embedding() -> Result<(), ModelError> {
        // each hidden unit lights up for one input: unit 0 for the image feature
        // and for "<end>", unit 1 for "dog", unit 2 for "runs". The output layer
        // maps unit 0 -> "dog", unit 1 -> "runs" and unit 2 -> "<end>", so the
        // sequence only cycles if every prediction is embedded as the next input.
        let mut weights = DecoderWeights::zeros();
        weights.set("embed.weight", 4, 0, 1.0);
        weights.set("embed.weight", 5, 1, 1.0);
        weights.set("embed.weight", 2, 3, 1.0);

        for layer in 0..2 {
            weights.set_gates(layer, 10.0, -10.0, 10.0);
        }
        weights.set_cell_input(0, 0, 3, 10.0);
        weights.set_cell_input(0, 1, 0, 10.0);
        weights.set_cell_input(0, 2, 1, 10.0);
        for unit in 0..3 {
            weights.set_cell_input(1, unit, unit, 10.0);
        }

        weights.set("fc.weight", 4, 0, 5.0);
        weights.set("fc.weight", 5, 1, 5.0);
        weights.set("fc.weight", 2, 2, 5.0);
        let decoder = weights.build()?;

        // the second image has no signal: every score ties and "<pad>" wins
        let features = Tensor::new(&[[0.0f32, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 0.0]], &Device::Cpu)?;
        let sequences = decoder.sample(&features, 6)?;
        assert_eq!(sequences, vec![vec![4, 5, 2, 4, 5, 2], vec![0; 6]]);
        Ok(())
    }

    #[test]
    fn decoder_carries_cell_state() -> Result<(), ModelError> {
        // inputs are all zero, so only the cell state of the first layer, which
        // grows every step, can change the prediction from "dog" to "runs"
        let mut weights = DecoderWeights::zeros();
        weights.set_gates(0, 10.0, 10.0, 10.0);
        weights.set_bias("lstm.bias_ih_l0", CELL_GATE * 3, 0.5);

        // the second layer forgets and only relays unit 0 of the first
        weights.set_gates(1, 10.0, -10.0, 10.0);
        weights.set_cell_input(1, 0, 0, 1.0);

        weights.set("fc.weight", 5, 0, 10.0);
        weights.set_bias("fc.bias", 4, 5.0);
        let decoder = weights.build()?;

        let features = Tensor::zeros((1, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(decoder.sample(&features, 4)?, vec![vec![4, 5, 5, 5]]);
        Ok(())
    }
}
