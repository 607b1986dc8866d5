//! Keypoint detection and description.
//!
//! Every detector implements [`FeatureAlgorithm`]. Descriptors are only
//! comparable between feature sets produced by the same [`DetectorKind`].

pub mod akaze;
mod binary;
pub mod brisk;
pub mod fast;
pub mod orb;
mod pyramid;
pub mod sift;

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub use akaze::{Akaze, AkazeParams};
pub use binary::{hamming_distance, BinaryDescriptor, BINARY_DESCRIPTOR_BYTES};
pub use brisk::{Brisk, BriskParams};
pub use orb::{Orb, OrbParams};
pub use sift::{Sift, SiftParams, SIFT_DESCRIPTOR_LEN};

/// Detector/descriptor algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorKind {
    /// Gradient-histogram (SIFT-like), floating-point descriptors.
    Sift,
    /// Oriented FAST + rotated BRIEF.
    Orb,
    /// Nonlinear diffusion scale space, binary grid descriptors.
    Akaze,
    /// Multi-scale FAST with a ring sampling pattern.
    Brisk,
}

impl DetectorKind {
    /// Binary detectors tried on low-light images.
    pub const BINARY: [DetectorKind; 3] = [Self::Orb, Self::Akaze, Self::Brisk];

    pub fn family(self) -> DescriptorFamily {
        match self {
            Self::Sift => DescriptorFamily::Float,
            Self::Orb | Self::Akaze | Self::Brisk => DescriptorFamily::Binary,
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sift => write!(f, "SIFT"),
            Self::Orb => write!(f, "ORB"),
            Self::Akaze => write!(f, "AKAZE"),
            Self::Brisk => write!(f, "BRISK"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorFamily {
    Float,
    Binary,
}

impl fmt::Display for DescriptorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float => write!(f, "float"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A detected salient point in full-resolution pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the meaningful neighborhood, in pixels.
    pub size: f32,
    /// Dominant orientation in radians, image coordinates (y down).
    pub angle: f32,
    pub response: f32,
    pub octave: usize,
}

/// Descriptors associated 1:1 with the keypoints of a [`FeatureSet`].
#[derive(Clone, Debug)]
pub enum Descriptors {
    /// One row per keypoint.
    Float(Array2<f32>),
    Binary(Vec<BinaryDescriptor>),
}

impl Descriptors {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(d) => d.nrows(),
            Self::Binary(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn family(&self) -> DescriptorFamily {
        match self {
            Self::Float(_) => DescriptorFamily::Float,
            Self::Binary(_) => DescriptorFamily::Binary,
        }
    }
}

/// Output of one detect-and-describe call.
#[derive(Clone, Debug)]
pub struct FeatureSet {
    pub detector: DetectorKind,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl FeatureSet {
    pub fn empty(detector: DetectorKind) -> Self {
        let descriptors = match detector.family() {
            DescriptorFamily::Float => Descriptors::Float(Array2::zeros((0, SIFT_DESCRIPTOR_LEN))),
            DescriptorFamily::Binary => Descriptors::Binary(Vec::new()),
        };
        Self {
            detector,
            keypoints: Vec::new(),
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn family(&self) -> DescriptorFamily {
        self.descriptors.family()
    }
}

/// A detect-and-describe algorithm.
pub trait FeatureAlgorithm: Send + Sync {
    fn kind(&self) -> DetectorKind;

    fn descriptor_family(&self) -> DescriptorFamily {
        self.kind().family()
    }

    /// Detect keypoints on a [0, 1] grayscale image and describe them.
    fn detect_and_describe(&self, image: &Array2<f32>) -> FeatureSet;
}

/// Parameters for every detector, keyed by kind.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub sift: SiftParams,
    #[serde(default)]
    pub orb: OrbParams,
    #[serde(default)]
    pub akaze: AkazeParams,
    #[serde(default)]
    pub brisk: BriskParams,
}

impl FeatureConfig {
    pub fn detector(&self, kind: DetectorKind) -> Box<dyn FeatureAlgorithm> {
        match kind {
            DetectorKind::Sift => Box::new(Sift::new(self.sift.clone())),
            DetectorKind::Orb => Box::new(Orb::new(self.orb.clone())),
            DetectorKind::Akaze => Box::new(Akaze::new(self.akaze.clone())),
            DetectorKind::Brisk => Box::new(Brisk::new(self.brisk.clone())),
        }
    }

    /// Run one detector by kind.
    pub fn extract(&self, image: &Array2<f32>, kind: DetectorKind) -> FeatureSet {
        self.detector(kind).detect_and_describe(image)
    }
}

/// Keep the `max` strongest keypoints (with their descriptors).
pub(crate) fn retain_strongest<D>(items: &mut Vec<(Keypoint, D)>, max: usize) {
    if max == 0 || items.len() <= max {
        return;
    }
    items.sort_by(|a, b| b.0.response.total_cmp(&a.0.response));
    items.truncate(max);
}
