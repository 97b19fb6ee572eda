use anyhow::{Context, bail};
use candle_core::Device;
use candle_nn::ops::softmax;
use std::path::Path;
use tract_onnx::prelude::*;

use crate::error::ClassifyError;
use crate::preprocess::{INPUT_CHANNELS, INPUT_HEIGHT, INPUT_SHAPE, INPUT_WIDTH, ImageTensor};
use crate::types::ProbabilityVector;

/// A frozen image classifier: one preprocessed image in, one probability per
/// class out. Implementations must be safe to call from many threads at once.
pub trait Classifier: Send + Sync {
    fn predict(&self, tensor: ImageTensor) -> Result<ProbabilityVector, ClassifyError>;
}

/// Rejects tensors that did not come out of the preprocessor.
pub fn check_input_shape(tensor: &ImageTensor) -> Result<(), ClassifyError> {
    if tensor.dims() != INPUT_SHAPE {
        return Err(ClassifyError::inference(format!(
            "input tensor has shape {:?}, classifier expects {:?}",
            tensor.dims(),
            INPUT_SHAPE
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct OnnxClassifierConfig {
    pub num_classes: usize,
    /// Apply softmax to the raw output, for models exported without one.
    pub apply_softmax: bool,
}

pub struct OnnxClassifier {
    model: TypedRunnableModel<TypedModel>,
    config: OnnxClassifierConfig,
}

/// Checks the output width against the label table and applies softmax when
/// configured.
pub fn finalize_scores(
    values: Vec<f32>,
    config: OnnxClassifierConfig,
) -> Result<ProbabilityVector, ClassifyError> {
    if values.len() != config.num_classes {
        return Err(ClassifyError::inference(format!(
            "model produced {} scores for {} classes",
            values.len(),
            config.num_classes
        )));
    }

    if !config.apply_softmax {
        return Ok(ProbabilityVector::new(values));
    }
    let len = values.len();
    let logits = candle_core::Tensor::from_vec(values, len, &Device::Cpu)?;
    let probabilities = softmax(&logits, 0)?.to_vec1::<f32>()?;
    Ok(ProbabilityVector::new(probabilities))
}

impl OnnxClassifier {
    /// Loads and optimizes the ONNX artifact, then hands it to
    /// [`OnnxClassifier::from_model`].
    #[tracing::instrument(skip(config), fields(num_classes = config.num_classes))]
    pub fn load(path: &Path, config: OnnxClassifierConfig) -> anyhow::Result<Self> {
        if !path.is_file() {
            bail!("Classifier artifact {} does not exist", path.display());
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("Failed to parse classifier artifact {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, INPUT_HEIGHT, INPUT_WIDTH, INPUT_CHANNELS),
                ),
            )?
            .into_optimized()
            .context("Failed to optimize classifier graph")?;

        Self::from_model(model, config)
    }

    /// Makes the graph runnable and runs one all-zero input through it to
    /// confirm the output width matches the label table.
    pub fn from_model(model: TypedModel, config: OnnxClassifierConfig) -> anyhow::Result<Self> {
        let classifier = Self {
            model: model.into_runnable()?,
            config,
        };

        let probe = classifier
            .predict(ImageTensor::zeros()?)
            .context("Classifier output does not match the label table")?;
        tracing::debug!(outputs = probe.len(), "Classifier probe succeeded");

        Ok(classifier)
    }
}

impl Classifier for OnnxClassifier {
    #[tracing::instrument(skip(self, tensor))]
    fn predict(&self, tensor: ImageTensor) -> Result<ProbabilityVector, ClassifyError> {
        check_input_shape(&tensor)?;

        let input = tract_ndarray::Array4::from_shape_vec(
            (1, INPUT_HEIGHT, INPUT_WIDTH, INPUT_CHANNELS),
            tensor.to_vec()?,
        )
        .map_err(ClassifyError::inference)?;

        let outputs = self
            .model
            .run(tvec!(input.into_tensor().into()))
            .map_err(ClassifyError::inference)?;
        let output = outputs
            .first()
            .ok_or_else(|| ClassifyError::inference("model produced no outputs"))?;
        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| ClassifyError::inference(format!("output is not f32: {e}")))?
            .iter()
            .copied()
            .collect();

        finalize_scores(values, self.config)
    }
}
