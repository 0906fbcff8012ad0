//! Size-capped JPEG re-encoding.
//!
//! The optimizer searches `(width, height, quality)` for the best-looking JPEG that
//! fits a byte ceiling:
//!
//! 1. At fixed dimensions, JPEG quality is binary-searched over
//!    `[min_quality, max_quality]` ([`search_quality`]).
//! 2. If nothing fits, both sides shrink by `shrink_ratio` and the quality search
//!    repeats, until a side would drop below `min_dimension`.
//! 3. If still nothing fits, the image is encoded once at the dimension floor with
//!    the minimum quality and returned as-is, even when it exceeds the ceiling.
//!
//! Every encode is a pure function of `(source, width, height, quality)`, so the
//! whole search is deterministic. Total work is bounded by
//! `tiers × ⌈log2(quality range)⌉` encodes plus one fallback encode.

use std::borrow::Cow;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use log::{debug, info, warn};

use super::ImageError;

pub const DEFAULT_MIN_QUALITY: u8 = 10;
pub const DEFAULT_MAX_QUALITY: u8 = 90;
pub const DEFAULT_MIN_DIMENSION: u32 = 100;
pub const DEFAULT_SHRINK_RATIO: f32 = 0.8;

const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scales both sides by `ratio`, never below one pixel.
    pub fn scaled(self, ratio: f32) -> Self {
        let scale = |side: u32| ((side as f32 * ratio).round() as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }

    /// Caps each side at the corresponding side of `bound`.
    pub fn clamp_to(self, bound: Dimensions) -> Self {
        Self::new(self.width.min(bound.width), self.height.min(bound.height))
    }

    fn below(self, floor: u32) -> bool {
        self.width < floor || self.height < floor
    }
}

/// Tunables for the search. Defaults: quality `[10, 90]`, 100px floor, ×0.8 shrink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerPolicy {
    pub min_quality: u8,
    pub max_quality: u8,
    pub min_dimension: u32,
    pub shrink_ratio: f32,
}

impl Default for OptimizerPolicy {
    fn default() -> Self {
        Self {
            min_quality: DEFAULT_MIN_QUALITY,
            max_quality: DEFAULT_MAX_QUALITY,
            min_dimension: DEFAULT_MIN_DIMENSION,
            shrink_ratio: DEFAULT_SHRINK_RATIO,
        }
    }
}

impl OptimizerPolicy {
    /// Brings out-of-range values back to something the search can run with:
    /// qualities inside `1..=100` with `min <= max`, a non-zero floor and a
    /// shrink ratio strictly between 0 and 1.
    fn normalized(self) -> Self {
        let min_quality = self.min_quality.clamp(1, 100);
        let max_quality = self.max_quality.clamp(min_quality, 100);
        let shrink_ratio = if self.shrink_ratio > 0.0 && self.shrink_ratio < 1.0 {
            self.shrink_ratio
        } else {
            DEFAULT_SHRINK_RATIO
        };
        Self {
            min_quality,
            max_quality,
            min_dimension: self.min_dimension.max(1),
            shrink_ratio,
        }
    }
}

/// A quality level whose encoding fit the ceiling.
#[derive(Debug, Clone)]
pub struct QualityFit {
    pub quality: u8,
    pub bytes: Vec<u8>,
}

/// Result of [`ImageOptimizer::optimize`].
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `None` when the input JPEG was kept untouched.
    pub quality: Option<u8>,
}

impl OptimizedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Stateless optimizer service. Built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ImageOptimizer {
    policy: OptimizerPolicy,
}

impl ImageOptimizer {
    pub fn new(policy: OptimizerPolicy) -> Self {
        Self {
            policy: policy.normalized(),
        }
    }

    pub fn policy(&self) -> &OptimizerPolicy {
        &self.policy
    }

    /// Reads format and dimensions without decoding pixel data.
    pub fn probe(bytes: &[u8]) -> Result<(ImageFormat, Dimensions), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::invalid("empty buffer"));
        }
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::invalid(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| ImageError::invalid("unrecognised image format"))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ImageError::invalid(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(ImageError::invalid("image has no pixels"));
        }
        Ok((format, Dimensions::new(width, height)))
    }

    /// Re-encodes `bytes` as a JPEG of at most `ceiling` bytes when the search space allows it.
    pub fn optimize(&self, bytes: &[u8], ceiling: usize) -> Result<OptimizedImage, ImageError> {
        self.optimize_from(bytes, ceiling, None)
    }

    /// Like [`optimize`](Self::optimize), starting the dimension search at `start`
    /// (capped at the source size) instead of the source size.
    pub fn optimize_from(
        &self,
        bytes: &[u8],
        ceiling: usize,
        start: Option<Dimensions>,
    ) -> Result<OptimizedImage, ImageError> {
        let (format, source_dims) = Self::probe(bytes)?;
        let source = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ImageError::invalid(e.to_string()))?;
        let start = start.map_or(source_dims, |dims| dims.clamp_to(source_dims));
        let keep_original = format == ImageFormat::Jpeg && start == source_dims;

        debug!(
            "optimizing {:?} {}x{} ({} bytes) to fit {} bytes",
            format,
            source_dims.width,
            source_dims.height,
            bytes.len(),
            ceiling
        );

        for dims in self.dimension_ladder(start) {
            let tier = DynamicImage::ImageRgb8(resize_exact(&source, dims).to_rgb8());
            if let Some(fit) = search_quality(|q| encode_at(&tier, dims, q), ceiling, &self.policy)? {
                info!(
                    "image fits at {}x{} quality {}: {} -> {} bytes",
                    dims.width,
                    dims.height,
                    fit.quality,
                    bytes.len(),
                    fit.bytes.len()
                );
                let result = OptimizedImage {
                    bytes: fit.bytes,
                    width: dims.width,
                    height: dims.height,
                    quality: Some(fit.quality),
                };
                return Ok(prefer_original(bytes, keep_original, source_dims, ceiling, result));
            }
            debug!("no quality fits at {}x{}", dims.width, dims.height);
        }

        let dims = self.fallback_dimensions(start);
        let rgb = resize_to_fill(&source, dims).to_rgb8();
        let fallback = encode_rgb(&rgb, self.policy.min_quality)?;
        if fallback.len() > ceiling {
            warn!(
                "image still {} bytes at {}x{} quality {}, over the {} byte ceiling",
                fallback.len(),
                dims.width,
                dims.height,
                self.policy.min_quality,
                ceiling
            );
        }
        let result = OptimizedImage {
            bytes: fallback,
            width: dims.width,
            height: dims.height,
            quality: Some(self.policy.min_quality),
        };
        Ok(prefer_original(bytes, keep_original, source_dims, ceiling, result))
    }

    /// Successive sizes tried by the search: `start`, then ×`shrink_ratio` steps
    /// while both sides stay at or above `min_dimension`.
    pub fn dimension_ladder(&self, start: Dimensions) -> Vec<Dimensions> {
        let mut tiers = vec![start];
        let mut current = start;
        loop {
            let next = current.scaled(self.policy.shrink_ratio);
            if next == current || next.below(self.policy.min_dimension) {
                break;
            }
            tiers.push(next);
            current = next;
        }
        tiers
    }

    /// The last-resort box: `min_dimension` square, never larger than `bound`
    /// (the search's starting size, itself capped at the source).
    pub fn fallback_dimensions(&self, bound: Dimensions) -> Dimensions {
        let floor = self.policy.min_dimension;
        Dimensions::new(floor, floor).clamp_to(bound)
    }
}

/// Binary-searches quality in `[policy.min_quality, policy.max_quality]` for the
/// highest level whose encoding is at most `ceiling` bytes.
///
/// Assumes encoded size does not grow as quality drops. Returns `None` when even
/// `min_quality` is over the ceiling.
pub fn search_quality<F>(
    mut encode: F,
    ceiling: usize,
    policy: &OptimizerPolicy,
) -> Result<Option<QualityFit>, ImageError>
where
    F: FnMut(u8) -> Result<Vec<u8>, ImageError>,
{
    let policy = policy.normalized();
    // Bounds in u16 so `mid + 1` cannot wrap at the top of the range.
    let mut low = u16::from(policy.min_quality);
    let mut high = u16::from(policy.max_quality);
    let mut best = None;

    while low <= high {
        let mid = low + (high - low) / 2;
        let quality = mid as u8;
        let bytes = encode(quality)?;
        if bytes.len() <= ceiling {
            best = Some(QualityFit { quality, bytes });
            low = mid + 1;
        } else if mid == 0 {
            break;
        } else {
            high = mid - 1;
        }
    }

    Ok(best)
}

/// Resizes `image` to exactly `dims` (no upscaling past the source) and encodes it
/// as a JPEG at `quality`.
///
/// An RGB8 image already at `dims` is encoded without copying, which is how the
/// optimizer calls it for every quality probe of a tier.
pub fn encode_at(image: &DynamicImage, dims: Dimensions, quality: u8) -> Result<Vec<u8>, ImageError> {
    let dims = dims.clamp_to(Dimensions::new(image.width(), image.height()));
    match &*resize_exact(image, dims) {
        DynamicImage::ImageRgb8(rgb) => encode_rgb(rgb, quality),
        other => encode_rgb(&other.to_rgb8(), quality),
    }
}

fn encode_rgb(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(rgb)
        .map_err(|e| ImageError::processing(e.to_string()))?;
    Ok(bytes)
}

fn resize_exact(image: &DynamicImage, dims: Dimensions) -> Cow<'_, DynamicImage> {
    if image.width() == dims.width && image.height() == dims.height {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize_exact(dims.width, dims.height, RESIZE_FILTER))
    }
}

/// Scales to cover `dims` and crops the centre.
fn resize_to_fill(image: &DynamicImage, dims: Dimensions) -> Cow<'_, DynamicImage> {
    if image.width() == dims.width && image.height() == dims.height {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize_to_fill(dims.width, dims.height, RESIZE_FILTER))
    }
}

/// Hands back the untouched input when it is a JPEG at the requested size that is
/// no larger than `result` and at least as good against the ceiling.
fn prefer_original(
    original: &[u8],
    keep_original: bool,
    source_dims: Dimensions,
    ceiling: usize,
    result: OptimizedImage,
) -> OptimizedImage {
    let fits_as_well = original.len() <= ceiling || result.bytes.len() > ceiling;
    if keep_original && fits_as_well && original.len() <= result.bytes.len() {
        debug!("keeping original jpeg ({} bytes)", original.len());
        return OptimizedImage {
            bytes: original.to_vec(),
            width: source_dims.width,
            height: source_dims.height,
            quality: None,
        };
    }
    result
}
