//! Default signal provider
//!
//! Turns raw image bytes into the immutable per-image signal snapshot:
//! perceptual hash, embedding, tree-likelihood score against zero-shot
//! references, vegetation/skin/face pixel statistics, blur score, and
//! dimensions.
//!
//! The embedding encoder is a process-wide handle, lazily initialized on
//! first use behind a single guard and reused for the process lifetime.

use image::{Rgb, RgbImage};
use once_cell::sync::OnceCell;

use super::encoder::{HistogramEncoder, ImageEncoder};
use super::{SignalError, SignalProvider};
use crate::models::ImageSignals;
use crate::services::vector_deduplicator::cosine_similarity;
use crate::validators::quality_gate;

/// Edge length of the synthetic zero-shot reference images
const REFERENCE_SIZE: u32 = 224;

/// Edge length of the thumbnail used for pixel statistics
const STATS_SIZE: u32 = 64;

type EncoderFactory = Box<dyn Fn() -> Result<Box<dyn ImageEncoder>, SignalError> + Send + Sync>;

/// Zero-shot reference embeddings for the tree-likelihood score.
///
/// Two synthetic references — a forest-green block and a flat gray block —
/// are embedded once and reused; tree likelihood is the candidate's
/// similarity to the positive reference relative to the negative one.
struct ZeroShotReferences {
    positive: Vec<f32>,
    negative: Vec<f32>,
}

/// Default `SignalProvider` implementation.
pub struct DefaultSignalProvider {
    encoder: OnceCell<Box<dyn ImageEncoder>>,
    encoder_factory: EncoderFactory,
    references: OnceCell<ZeroShotReferences>,
    blur_half_width: u32,
}

impl DefaultSignalProvider {
    /// Provider backed by the pure-Rust histogram encoder.
    pub fn new(blur_half_width: u32) -> Self {
        Self::with_encoder_factory(Box::new(|| Ok(Box::new(HistogramEncoder))), blur_half_width)
    }

    /// Provider with a custom (possibly expensive) encoder. The factory
    /// runs at most once, on first extraction.
    pub fn with_encoder_factory(encoder_factory: EncoderFactory, blur_half_width: u32) -> Self {
        Self {
            encoder: OnceCell::new(),
            encoder_factory,
            references: OnceCell::new(),
            blur_half_width,
        }
    }

    fn encoder(&self) -> Result<&dyn ImageEncoder, SignalError> {
        self.encoder
            .get_or_try_init(|| (self.encoder_factory)())
            .map(|boxed| boxed.as_ref())
    }

    fn references(&self) -> Result<&ZeroShotReferences, SignalError> {
        self.references.get_or_try_init(|| {
            let encoder = self.encoder()?;

            let positive_img =
                RgbImage::from_pixel(REFERENCE_SIZE, REFERENCE_SIZE, Rgb([34, 139, 34]));
            let negative_img =
                RgbImage::from_pixel(REFERENCE_SIZE, REFERENCE_SIZE, Rgb([128, 128, 128]));

            tracing::info!("Preparing zero-shot references for tree-likelihood scoring");

            Ok(ZeroShotReferences {
                positive: encoder.encode(&positive_img)?,
                negative: encoder.encode(&negative_img)?,
            })
        })
    }
}

impl SignalProvider for DefaultSignalProvider {
    fn extract(&self, image: &[u8]) -> Result<ImageSignals, SignalError> {
        let decoded = image::load_from_memory(image)
            .map_err(|e| SignalError::DecodeFailed(e.to_string()))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();

        let phash = perceptual_hash(&decoded)?;
        let blur_score = quality_gate::blur_score(&decoded, self.blur_half_width);

        let stats = pixel_statistics(&rgb);

        let encoder = self.encoder()?;
        let embedding = encoder.encode(&rgb)?;

        let refs = self.references()?;
        let pos_sim = cosine_similarity(&embedding, &refs.positive);
        let neg_sim = cosine_similarity(&embedding, &refs.negative);
        let tree_margin = pos_sim - neg_sim;
        let tree_prob = ((tree_margin + 1.0) / 2.0).clamp(0.0, 1.0);

        tracing::debug!(
            tree_prob,
            tree_margin,
            vegetation = stats.vegetation_ratio,
            blur = blur_score,
            "Signals extracted"
        );

        Ok(ImageSignals {
            embedding,
            tree_prob,
            tree_margin,
            vegetation_ratio: stats.vegetation_ratio,
            blur_score,
            skin_ratio: stats.skin_ratio,
            face_area_frac: stats.face_area_frac,
            phash,
            width,
            height,
        })
    }
}

/// 64-bit gradient perceptual hash.
fn perceptual_hash(image: &image::DynamicImage) -> Result<u64, SignalError> {
    let hasher = img_hash::HasherConfig::new()
        .hash_alg(img_hash::HashAlg::Gradient)
        .hash_size(8, 8)
        .to_hasher();

    let hash = hasher.hash_image(image);
    let bytes: [u8; 8] = hash
        .as_bytes()
        .try_into()
        .map_err(|_| SignalError::Internal("unexpected perceptual hash width".to_string()))?;

    Ok(u64::from_be_bytes(bytes))
}

struct PixelStatistics {
    vegetation_ratio: f32,
    skin_ratio: f32,
    face_area_frac: f32,
}

/// Vegetation/skin ratios and the largest connected skin region, computed
/// on a fixed-size thumbnail.
fn pixel_statistics(rgb: &RgbImage) -> PixelStatistics {
    let thumb = image::imageops::resize(
        rgb,
        STATS_SIZE,
        STATS_SIZE,
        image::imageops::FilterType::Triangle,
    );

    let n = (STATS_SIZE * STATS_SIZE) as usize;
    let mut vegetation = 0usize;
    let mut skin_mask = vec![false; n];

    for (i, pixel) in thumb.pixels().enumerate() {
        if is_vegetation(pixel) {
            vegetation += 1;
        }
        if is_skin_tone(pixel) {
            skin_mask[i] = true;
        }
    }

    let skin = skin_mask.iter().filter(|m| **m).count();
    let largest_region = largest_connected_region(&skin_mask, STATS_SIZE as usize);

    PixelStatistics {
        vegetation_ratio: vegetation as f32 / n as f32,
        skin_ratio: skin as f32 / n as f32,
        face_area_frac: largest_region as f32 / n as f32,
    }
}

fn is_vegetation(pixel: &Rgb<u8>) -> bool {
    let r = i16::from(pixel[0]);
    let g = i16::from(pixel[1]);
    let b = i16::from(pixel[2]);
    g > r + 10 && g > b + 10
}

/// Classic RGB skin-tone rule (Peer et al. style).
fn is_skin_tone(pixel: &Rgb<u8>) -> bool {
    let r = i16::from(pixel[0]);
    let g = i16::from(pixel[1]);
    let b = i16::from(pixel[2]);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95 && g > 40 && b > 20 && r > g && r > b && (r - g) > 15 && (max - min) > 15
}

/// Area of the largest 4-connected true region in a square mask.
fn largest_connected_region(mask: &[bool], edge: usize) -> usize {
    let mut visited = vec![false; mask.len()];
    let mut largest = 0usize;
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        let mut size = 0usize;
        visited[start] = true;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            size += 1;
            let x = idx % edge;
            let y = idx / edge;

            let mut push = |nx: usize, ny: usize| {
                let nidx = ny * edge + nx;
                if mask[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            };

            if x > 0 {
                push(x - 1, y);
            }
            if x + 1 < edge {
                push(x + 1, y);
            }
            if y > 0 {
                push(x, y - 1);
            }
            if y + 1 < edge {
                push(x, y + 1);
            }
        }

        largest = largest.max(size);
    }

    largest
}
