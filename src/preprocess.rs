//! Turns uploaded image bytes into the fixed-shape input tensor the classifier
//! expects: NHWC, `(1, 150, 150, 3)`, values scaled into `[0.0, 1.0]`.

use candle_core::{DType, Device, Tensor};
use image::ImageReader;
use image::imageops::{self, FilterType};
use std::io::Cursor;

use crate::error::ClassifyError;

pub const INPUT_HEIGHT: usize = 150;
pub const INPUT_WIDTH: usize = 150;
pub const INPUT_CHANNELS: usize = 3;
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_HEIGHT, INPUT_WIDTH, INPUT_CHANNELS];

/// A single preprocessed image with a leading batch dimension.
#[derive(Debug)]
pub struct ImageTensor(Tensor);

impl ImageTensor {
    pub fn from_tensor(tensor: Tensor) -> Self {
        Self(tensor)
    }

    /// All-zero input of the expected shape.
    pub fn zeros() -> Result<Self, ClassifyError> {
        Ok(Self(Tensor::zeros(
            (1, INPUT_HEIGHT, INPUT_WIDTH, INPUT_CHANNELS),
            DType::F32,
            &Device::Cpu,
        )?))
    }

    pub fn dims(&self) -> &[usize] {
        self.0.dims()
    }

    /// Flattened values in row-major NHWC order.
    pub fn to_vec(&self) -> Result<Vec<f32>, ClassifyError> {
        Ok(self.0.flatten_all()?.to_vec1::<f32>()?)
    }
}

#[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
pub fn preprocess(bytes: &[u8]) -> Result<ImageTensor, ClassifyError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "Decoded image"
    );

    // Stretch to the exact input size; nearest matches the training pipeline.
    let rgb = image.to_rgb8();
    let resized = imageops::resize(
        &rgb,
        INPUT_WIDTH as u32,
        INPUT_HEIGHT as u32,
        FilterType::Nearest,
    );

    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    let tensor = Tensor::from_vec(
        data,
        (1, INPUT_HEIGHT, INPUT_WIDTH, INPUT_CHANNELS),
        &Device::Cpu,
    )?;
    Ok(ImageTensor(tensor))
}
