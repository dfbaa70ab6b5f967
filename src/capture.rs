use std::path::PathBuf;

use image::{DynamicImage, GrayImage, RgbImage, imageops};
use thiserror::Error;

/// Failure modes of one capture attempt
///
/// The web surface collapses all of these into the one "Face capture
/// failed…" message; the distinction exists for the logs.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not open camera")]
    CameraUnavailable,

    #[error("could not capture frame")]
    NoFrame,

    #[error("no face detected")]
    NoFaceDetected,

    #[error("image i/o error: {0}")]
    Io(#[from] image::ImageError),
}

/// Source of single camera frames
///
/// The adapter owns exactly one frame source; tests substitute a stub that
/// serves synthetic frames instead of touching real hardware.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<RgbImage, CaptureError>;
}

/// A V4L camera, opened and released per grab
///
/// The device is treated as exclusively owned for the duration of one call;
/// there is no pooling and no retry.
pub struct Camera {
    index: u32,
}

impl Camera {
    pub fn new(index: u32) -> Camera {
        Camera { index }
    }
}

impl FrameSource for Camera {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        use nokhwa::pixel_format::RgbFormat;
        use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = nokhwa::Camera::new(CameraIndex::Index(self.index), requested)
            .map_err(|e| {
                tracing::error!(index = self.index, error = %e, "could not open camera");
                CaptureError::CameraUnavailable
            })?;

        camera.open_stream().map_err(|e| {
            tracing::error!(index = self.index, error = %e, "could not open camera stream");
            CaptureError::CameraUnavailable
        })?;

        let buffer = camera.frame().map_err(|e| {
            tracing::error!(error = %e, "could not capture frame");
            CaptureError::NoFrame
        })?;

        buffer.decode_image::<RgbFormat>().map_err(|e| {
            tracing::error!(error = %e, "could not decode frame");
            CaptureError::NoFrame
        })
    }
}

/// A detected face bounding box, in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Multi-scale frontal-face detector
///
/// A sliding square window is scored at every scale by a center-surround
/// contrast feature on the integral image: a face-sized region reads
/// brighter than the ring around it. Overlapping raw hits are clustered and
/// a cluster only counts as a face once it has `min_neighbors` members,
/// which suppresses isolated spurious windows. Parameters default to the
/// classic cascade settings: scale step 1.3, 5 neighbors, 50x50 minimum.
#[derive(Debug, Clone)]
pub struct FaceDetector {
    pub scale_factor: f64,
    pub min_neighbors: usize,
    pub min_size: u32,
    /// Minimum brightness gap (gray levels) between window center and ring.
    pub contrast_threshold: f64,
}

impl Default for FaceDetector {
    fn default() -> FaceDetector {
        FaceDetector {
            scale_factor: 1.3,
            min_neighbors: 5,
            min_size: 50,
            contrast_threshold: 24.0,
        }
    }
}

impl FaceDetector {
    /// Detect faces in a grayscale frame.
    ///
    /// Returns the clustered boxes in scan order; callers that want the
    /// original "first detection wins" behavior take the first element.
    pub fn detect(&self, gray: &GrayImage) -> Vec<FaceBox> {
        let (w, h) = gray.dimensions();
        if w < self.min_size || h < self.min_size {
            return Vec::new();
        }

        let (ii, stride) = integral_image(gray);
        let mut candidates = Vec::new();

        let mut size = self.min_size as f64;
        while size as u32 <= w.min(h) {
            let s = size as u32;
            let step = (s / 10).max(2);
            let ring = (s / 5).max(1);
            let inner = s - 2 * ring;

            let mut y = 0;
            while y + s <= h {
                let mut x = 0;
                while x + s <= w {
                    let total = rect_sum(&ii, stride, x, y, x + s, y + s);
                    let inner_sum =
                        rect_sum(&ii, stride, x + ring, y + ring, x + s - ring, y + s - ring);

                    let inner_area = (inner as u64 * inner as u64) as f64;
                    let ring_area = (s as u64 * s as u64) as f64 - inner_area;
                    let inner_mean = inner_sum as f64 / inner_area;
                    let ring_mean = (total - inner_sum) as f64 / ring_area;

                    if inner_mean - ring_mean >= self.contrast_threshold {
                        candidates.push(FaceBox { x, y, w: s, h: s });
                    }

                    x += step;
                }
                y += step;
            }

            size *= self.scale_factor;
        }

        self.cluster(candidates)
    }

    /// Group overlapping raw hits; clusters smaller than `min_neighbors`
    /// are discarded, the rest are averaged into one box each.
    fn cluster(&self, candidates: Vec<FaceBox>) -> Vec<FaceBox> {
        let mut groups: Vec<Vec<FaceBox>> = Vec::new();

        for candidate in candidates {
            match groups.iter_mut().find(|g| overlaps(g[0], candidate)) {
                Some(group) => group.push(candidate),
                None => groups.push(vec![candidate]),
            }
        }

        groups.retain(|g| g.len() >= self.min_neighbors);

        groups
            .iter()
            .map(|group| {
                let n = group.len() as u32;
                FaceBox {
                    x: group.iter().map(|b| b.x).sum::<u32>() / n,
                    y: group.iter().map(|b| b.y).sum::<u32>() / n,
                    w: group.iter().map(|b| b.w).sum::<u32>() / n,
                    h: group.iter().map(|b| b.h).sum::<u32>() / n,
                }
            })
            .collect()
    }
}

// True when the intersection covers more than half of the smaller box.
fn overlaps(a: FaceBox, b: FaceBox) -> bool {
    let iw = (a.x + a.w).min(b.x + b.w).saturating_sub(a.x.max(b.x)) as u64;
    let ih = (a.y + a.h).min(b.y + b.h).saturating_sub(a.y.max(b.y)) as u64;
    let min_area = (a.w as u64 * a.h as u64).min(b.w as u64 * b.h as u64);
    iw * ih * 2 > min_area
}

// Summed-area table with a one-pixel zero border, so any window sum is four
// lookups.
fn integral_image(gray: &GrayImage) -> (Vec<u64>, usize) {
    let (w, h) = gray.dimensions();
    let stride = w as usize + 1;
    let mut ii = vec![0u64; stride * (h as usize + 1)];

    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
            ii[(y + 1) * stride + (x + 1)] = ii[y * stride + (x + 1)] + row_sum;
        }
    }

    (ii, stride)
}

// Sum over [x0, x1) x [y0, y1).
fn rect_sum(ii: &[u64], stride: usize, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
    let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
    ii[y1 * stride + x1] + ii[y0 * stride + x0] - ii[y0 * stride + x1] - ii[y1 * stride + x0]
}

/// The face capture adapter
///
/// Turns one camera frame into a saved cropped face image: grab a frame,
/// write the unfiltered debug copy, detect, crop the first detected box,
/// save it keyed by registration number. A second registration with the
/// same key would overwrite the file, which is why the store enforces
/// registration-number uniqueness.
pub struct FaceCapture {
    source: Box<dyn FrameSource>,
    detector: FaceDetector,
    image_dir: PathBuf,
    debug_dir: PathBuf,
}

impl FaceCapture {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: FaceDetector,
        image_dir: PathBuf,
        debug_dir: PathBuf,
    ) -> FaceCapture {
        FaceCapture {
            source,
            detector,
            image_dir,
            debug_dir,
        }
    }

    /// Capture one frame and save the first detected face.
    ///
    /// # Arguments
    /// * `reg_number` - Registration number keying the saved image
    ///
    /// # Returns
    /// * `Result<PathBuf, CaptureError>` - Path of the saved face JPEG
    pub fn capture_face(&mut self, reg_number: &str) -> Result<PathBuf, CaptureError> {
        let frame = self.source.grab()?;

        // The raw frame is always kept for debugging, even when no face is
        // found afterwards.
        let debug_path = self.debug_dir.join(format!("debug_{}.jpg", reg_number));
        DynamicImage::ImageRgb8(frame.clone()).save(&debug_path)?;
        tracing::debug!(path = %debug_path.display(), "debug frame written");

        let gray = imageops::grayscale(&frame);
        let faces = self.detector.detect(&gray);

        let Some(face) = faces.first() else {
            tracing::warn!(reg_number, "no face detected");
            return Err(CaptureError::NoFaceDetected);
        };

        let crop = imageops::crop_imm(&frame, face.x, face.y, face.w, face.h).to_image();
        let face_path = self.image_dir.join(format!("{}.jpg", reg_number));
        DynamicImage::ImageRgb8(crop).save(&face_path)?;
        tracing::info!(reg_number, path = %face_path.display(), "face captured");

        Ok(face_path)
    }
}
