//! Image embedding encoders
//!
//! The embedding encoder is the process-wide model handle behind the
//! signal provider. Two implementations ship:
//!
//! - `HistogramEncoder` — deterministic pure-Rust color histogram,
//!   always available. The default.
//! - `OnnxImageEncoder` — CNN embeddings via ONNX Runtime, behind the
//!   `onnx-encoder` feature. Requires a `model.onnx` on disk.

use image::RgbImage;

use super::SignalError;

/// Embedding dimension of the fallback histogram encoder (4x4x4 RGB bins).
pub const HISTOGRAM_DIM: usize = 64;

/// Fixed-dimension image embedding capability.
///
/// Encoders must be deterministic: identical pixels yield identical
/// vectors. Returned vectors are L2-normalized.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, image: &RgbImage) -> Result<Vec<f32>, SignalError>;
    fn dimension(&self) -> usize;
}

/// L2-normalize in place; zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vec.iter_mut() {
            *val /= norm;
        }
    }
}

/// Pure-Rust fallback encoder: a 4x4x4 RGB color histogram.
///
/// Coarse, but stable and monotone in color composition, which is what
/// the zero-shot tree reference scoring needs.
pub struct HistogramEncoder;

impl ImageEncoder for HistogramEncoder {
    fn encode(&self, image: &RgbImage) -> Result<Vec<f32>, SignalError> {
        let mut bins = vec![0.0f32; HISTOGRAM_DIM];

        for pixel in image.pixels() {
            let r = (pixel[0] >> 6) as usize;
            let g = (pixel[1] >> 6) as usize;
            let b = (pixel[2] >> 6) as usize;
            bins[(r << 4) | (g << 2) | b] += 1.0;
        }

        l2_normalize(&mut bins);
        Ok(bins)
    }

    fn dimension(&self) -> usize {
        HISTOGRAM_DIM
    }
}

#[cfg(feature = "onnx-encoder")]
mod onnx {
    use super::{l2_normalize, ImageEncoder, SignalError};
    use image::RgbImage;
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// CNN input edge length (ImageNet convention)
    const INPUT_SIZE: u32 = 224;

    /// ImageNet channel normalization
    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    /// CNN image encoder using ONNX Runtime.
    ///
    /// Uses interior mutability (Mutex) because ort::Session::run requires
    /// `&mut self` but ImageEncoder exposes `&self` for shared usage.
    pub struct OnnxImageEncoder {
        session: Mutex<Session>,
        dimension: usize,
    }

    impl OnnxImageEncoder {
        /// Load the ONNX encoder from a model file.
        pub fn load(model_path: &Path, dimension: usize) -> Result<Self, SignalError> {
            if !model_path.exists() {
                return Err(SignalError::ModelUnavailable(format!(
                    "model not found: {}",
                    model_path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| SignalError::ModelUnavailable(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| SignalError::ModelUnavailable(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e: ort::Error| {
                    SignalError::ModelUnavailable(format!("ONNX load failed: {e}"))
                })?;

            tracing::info!("ONNX image encoder loaded from {}", model_path.display());

            Ok(Self {
                session: Mutex::new(session),
                dimension,
            })
        }

        fn infer(&self, image: &RgbImage) -> Result<Vec<f32>, SignalError> {
            use ort::value::TensorRef;

            let resized = image::imageops::resize(
                image,
                INPUT_SIZE,
                INPUT_SIZE,
                image::imageops::FilterType::CatmullRom,
            );

            // NCHW float tensor with ImageNet normalization
            let mut input =
                ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
            for (x, y, pixel) in resized.enumerate_pixels() {
                for c in 0..3 {
                    input[[0, c, y as usize, x as usize]] =
                        (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
                }
            }

            let tensor = TensorRef::from_array_view(&input)
                .map_err(|e| SignalError::Internal(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| SignalError::Internal("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| SignalError::Internal(format!("ONNX inference failed: {e}")))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| SignalError::Internal(format!("Output extraction: {e}")))?;

            // Accept [1, D] or [1, D, 1, 1] feature outputs
            let flat_len: usize = shape.iter().map(|&d| d as usize).product();
            if flat_len != self.dimension {
                return Err(SignalError::Internal(format!(
                    "Unexpected output shape {shape:?}, expected {} features",
                    self.dimension
                )));
            }

            let mut embedding = data[..flat_len].to_vec();
            l2_normalize(&mut embedding);
            Ok(embedding)
        }
    }

    impl ImageEncoder for OnnxImageEncoder {
        fn encode(&self, image: &RgbImage) -> Result<Vec<f32>, SignalError> {
            self.infer(image)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }
}

#[cfg(feature = "onnx-encoder")]
pub use onnx::OnnxImageEncoder;
