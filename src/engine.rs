use async_trait::async_trait;
use std::sync::Arc;

use crate::classifier::Classifier;
use crate::error::ClassifyError;
use crate::preprocess::preprocess;
use crate::resolver::resolve;
use crate::types::{LabelSet, PredictionResult};

#[async_trait]
pub trait Engine {
    async fn classify(&self, image: Vec<u8>) -> Result<PredictionResult, ClassifyError>;
}

/// Runs the full pipeline for one image: preprocess, predict, resolve.
#[derive(Clone)]
pub struct InferenceService {
    classifier: Arc<dyn Classifier>,
    labels: Arc<LabelSet>,
}

impl InferenceService {
    pub fn new(classifier: Arc<dyn Classifier>, labels: Arc<LabelSet>) -> Self {
        Self { classifier, labels }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn classify(&self, image: &[u8]) -> Result<PredictionResult, ClassifyError> {
        if image.is_empty() {
            return Err(ClassifyError::missing_input("Empty upload"));
        }

        let tensor = preprocess(image)?;
        let probabilities = self.classifier.predict(tensor)?;
        resolve(&self.labels, &probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::StubClassifier;
    use crate::preprocess::tests::encode;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn service(classifier: StubClassifier) -> InferenceService {
        InferenceService::new(Arc::new(classifier), Arc::new(LabelSet::default()))
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([40, 120, 220]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
    }

    #[test]
    fn classifies_through_every_stage() {
        let service = service(StubClassifier::peaked(9, 6, 0.82, 0.0225));
        let result = service.classify(&jpeg(640, 480)).unwrap();
        assert_eq!(result.label.as_str(), "Plastic");
        assert_eq!(result.confidence, 0.82);
    }

    #[test]
    fn empty_input_is_missing_input() {
        let service = service(StubClassifier::peaked(9, 0, 1.0, 0.0));
        let err = service.classify(&[]).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingInput(_)));
    }

    #[test]
    fn corrupt_input_is_decode_error() {
        let service = service(StubClassifier::peaked(9, 0, 1.0, 0.0));
        let err = service.classify(&[0xFF, 0xD8, 0xFF, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, ClassifyError::Decode(_)));
    }

    #[test]
    fn oversized_output_surfaces_label_index_error() {
        let service = service(StubClassifier::peaked(12, 11, 0.9, 0.01));
        let err = service.classify(&jpeg(32, 32)).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::LabelIndex { index: 11, len: 9 }
        ));
    }
}
