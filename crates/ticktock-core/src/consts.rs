/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum target count to use image-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Number of intensity levels used by lookup tables and histograms.
pub const INTENSITY_LEVELS: usize = 256;

/// Mean luminance (0-255 scale) below which an image is considered low-light.
pub const DEFAULT_LOW_LIGHT_THRESHOLD: f32 = 80.0;

/// Lowe ratio for gradient-histogram descriptors on normal-light images.
pub const DEFAULT_RATIO_NORMAL: f32 = 0.7;

/// Lowe ratio for binary descriptors and low-light images.
pub const DEFAULT_RATIO_LOW_LIGHT: f32 = 0.75;

/// Minimum number of correspondences for a projective fit.
pub const MIN_HOMOGRAPHY_CORRESPONDENCES: usize = 4;

/// Recommended correspondence count below which a fit is flagged low-confidence.
pub const DEFAULT_MIN_CORRESPONDENCES: usize = 8;

/// Default RANSAC reprojection error threshold in pixels.
pub const DEFAULT_REPROJECTION_THRESHOLD: f64 = 5.0;

/// RANSAC reprojection threshold used on the enhanced low-light path.
pub const DEFAULT_LOW_LIGHT_REPROJECTION_THRESHOLD: f64 = 3.0;

/// Default RANSAC confidence.
pub const DEFAULT_RANSAC_CONFIDENCE: f64 = 0.995;

/// Default RANSAC iteration cap.
pub const DEFAULT_RANSAC_MAX_ITERATIONS: usize = 5000;

/// Condition number (of the normalized homography) treated as degenerate.
pub const DEFAULT_CONDITION_CEILING: f64 = 1e5;

/// Confidence used by the relaxed retry after an ill-conditioned fit.
pub const RELAXED_RANSAC_CONFIDENCE: f64 = 0.99;

/// Default template correlation acceptance threshold.
pub const DEFAULT_TEMPLATE_MIN_CORRELATION: f64 = 0.3;

/// Default template search scales.
pub const DEFAULT_TEMPLATE_SCALES: [f64; 5] = [0.8, 0.9, 1.0, 1.1, 1.2];

/// Fraction of the reference cropped away on each side to form the template.
pub const DEFAULT_TEMPLATE_MARGIN: f64 = 0.15;

/// Longest side (in pixels) the template search works at.
pub const DEFAULT_TEMPLATE_WORKING_SIZE: usize = 512;

/// Side length of the square canvas fed to the dense matcher.
pub const DEFAULT_DENSE_CANVAS: usize = 640;

/// Dense correspondences below this confidence are discarded.
pub const DEFAULT_DENSE_CONFIDENCE: f32 = 0.1;

/// RANSAC reprojection threshold for dense correspondences.
pub const DEFAULT_DENSE_REPROJECTION_THRESHOLD: f64 = 8.0;

