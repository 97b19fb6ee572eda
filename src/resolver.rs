use crate::error::ClassifyError;
use crate::types::{LabelSet, PredictionResult, ProbabilityVector};

/// Index of the largest value. The first occurrence wins on ties and NaN
/// entries are never selected.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (index, value)| match best {
            Some((_, best_value)) if value <= best_value => best,
            _ => Some((index, value)),
        })
}

/// Picks the most probable class. Confidence is the raw maximum, not
/// renormalized.
pub fn resolve(
    labels: &LabelSet,
    vector: &ProbabilityVector,
) -> Result<PredictionResult, ClassifyError> {
    let (index, confidence) = argmax(vector.as_slice())
        .ok_or_else(|| ClassifyError::inference("classifier returned no usable probabilities"))?;

    let label = labels
        .get(index)
        .cloned()
        .ok_or(ClassifyError::LabelIndex {
            index,
            len: labels.len(),
        })?;

    Ok(PredictionResult { label, confidence })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> ProbabilityVector {
        ProbabilityVector::new(values.to_vec())
    }

    #[test]
    fn single_maximum_is_selected() {
        let labels = LabelSet::default();
        let probs = vector(&[0.01, 0.02, 0.03, 0.04, 0.02, 0.03, 0.82, 0.02, 0.01]);
        let result = resolve(&labels, &probs).unwrap();
        assert_eq!(result.label.as_str(), "Plastic");
        assert_eq!(result.confidence, 0.82);
    }

    #[test]
    fn every_index_maps_to_its_label() {
        let labels = LabelSet::default();
        for i in 0..labels.len() {
            let mut values = vec![0.05; labels.len()];
            values[i] = 0.6;
            let result = resolve(&labels, &vector(&values)).unwrap();
            assert_eq!(&result.label, labels.get(i).unwrap());
            assert_eq!(result.confidence, 0.6);
        }
    }

    #[test]
    fn uniform_vector_resolves_to_first_label() {
        let labels = LabelSet::default();
        let n = labels.len();
        let probs = vector(&vec![1.0 / n as f32; n]);
        let result = resolve(&labels, &probs).unwrap();
        assert_eq!(result.label.as_str(), "CardBoard");
        assert_eq!(result.confidence, 1.0 / n as f32);
    }

    #[test]
    fn ties_go_to_lowest_index() {
        let labels = LabelSet::default();
        let probs = vector(&[0.1, 0.0, 0.4, 0.0, 0.0, 0.4, 0.1, 0.0, 0.0]);
        assert_eq!(resolve(&labels, &probs).unwrap().label.as_str(), "Glass");
    }

    #[test]
    fn resolve_is_idempotent() {
        let labels = LabelSet::default();
        let probs = vector(&[0.3, 0.1, 0.05, 0.05, 0.1, 0.1, 0.1, 0.1, 0.1]);
        let first = resolve(&labels, &probs).unwrap();
        let second = resolve(&labels, &probs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn confidence_is_not_renormalized() {
        let labels = LabelSet::default();
        let probs = vector(&[0.0, 0.0, 0.0, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(resolve(&labels, &probs).unwrap().confidence, 0.2);
    }

    #[test]
    fn index_beyond_label_set_is_rejected() {
        let labels = LabelSet::default();
        let mut values = vec![0.0; 12];
        values[10] = 0.9;
        let err = resolve(&labels, &vector(&values)).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::LabelIndex { index: 10, len: 9 }
        ));
    }

    #[test]
    fn nan_entries_are_skipped() {
        let labels = LabelSet::default();
        let probs = vector(&[f32::NAN, 0.3, f32::NAN, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let result = resolve(&labels, &probs).unwrap();
        assert_eq!(result.label.as_str(), "Metal");
    }

    #[test]
    fn empty_vector_is_an_inference_error() {
        let err = resolve(&LabelSet::default(), &vector(&[])).unwrap_err();
        assert!(matches!(err, ClassifyError::Inference(_)));
    }
}
