use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Class names in the order the classifier emits them.
pub const DEFAULT_LABELS: [&str; 9] = [
    "CardBoard",
    "Food Organics",
    "Glass",
    "Metal",
    "Miscellaneous Trash",
    "Paper",
    "Plastic",
    "Textile Trash",
    "Vegetation",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered label table. Index `i` names output `i` of the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<ClassLabel>,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS
                .iter()
                .map(|name| ClassLabel(name.to_string()))
                .collect(),
        }
    }
}

impl LabelSet {
    /// Builds the ordering from an id-to-label map. Ids must cover `0..len`
    /// exactly once.
    pub fn from_id2label(id2label: HashMap<u32, String>) -> anyhow::Result<Self> {
        if id2label.is_empty() {
            anyhow::bail!("Label mapping is empty");
        }

        let mut labels = Vec::with_capacity(id2label.len());
        for id in 0..id2label.len() as u32 {
            let Some(name) = id2label.get(&id) else {
                anyhow::bail!(
                    "Label mapping has {} entries but no label for id {id}",
                    id2label.len()
                );
            };
            let name = name.trim();
            if name.is_empty() {
                anyhow::bail!("Label for id {id} is empty");
            }
            labels.push(ClassLabel(name.to_string()));
        }

        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&ClassLabel> {
        self.labels.get(index)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Classifier output, indexed like [`LabelSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: ClassLabel,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: ClassLabel,
    pub confidence: f32,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            prediction: result.label,
            confidence: result.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub labels: usize,
}
