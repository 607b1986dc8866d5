//! Dense matchers: consume two letterboxed canvases at once and return
//! point pairs with a confidence, instead of per-image descriptors.

pub mod letterbox;
pub mod patch;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TickTockError};

pub use letterbox::Letterbox;
pub use patch::{PatchCorrelationMatcher, PatchCorrelationParams};

/// Where a dense matcher runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePreference {
    #[default]
    Cpu,
    /// Accelerator by ordinal. One pair at a time per device.
    Accelerator(usize),
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator(i) => write!(f, "accelerator:{i}"),
        }
    }
}

/// Explicit execution context handed to a dense matcher's constructor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeContext {
    pub device: DevicePreference,
}

impl ComputeContext {
    pub fn cpu() -> Self {
        Self {
            device: DevicePreference::Cpu,
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self.device, DevicePreference::Accelerator(_))
    }
}

/// Pretrained weights located on local disk.
///
/// Opening never downloads anything: a missing or empty file is reported
/// immediately as [`TickTockError::WeightsUnavailable`].
#[derive(Clone, Debug)]
pub struct WeightsHandle {
    path: PathBuf,
    size_bytes: u64,
}

impl WeightsHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta,
            _ => return Err(TickTockError::WeightsUnavailable { path }),
        };
        debug!(path = %path.display(), bytes = meta.len(), "Dense matcher weights found");
        Ok(Self {
            path,
            size_bytes: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|_| TickTockError::WeightsUnavailable {
            path: self.path.clone(),
        })
    }
}

/// One predicted pair, in canvas pixel coordinates (x, y).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DenseMatch {
    pub reference: (f32, f32),
    pub target: (f32, f32),
    pub confidence: f32,
}

/// A matcher over two square single-channel canvases of `canvas_size()` pixels.
pub trait DenseMatcher: Send + Sync {
    fn name(&self) -> &str;

    fn context(&self) -> &ComputeContext;

    fn canvas_size(&self) -> usize;

    fn match_pair(&self, reference: &Array2<f32>, target: &Array2<f32>) -> Result<Vec<DenseMatch>>;
}

/// Serializes calls into a matcher that runs on an accelerator.
pub struct SerializedMatcher {
    inner: Box<dyn DenseMatcher>,
    device_lock: Mutex<()>,
}

impl SerializedMatcher {
    pub fn new(inner: Box<dyn DenseMatcher>) -> Self {
        Self {
            inner,
            device_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn canvas_size(&self) -> usize {
        self.inner.canvas_size()
    }

    pub fn match_pair(
        &self,
        reference: &Array2<f32>,
        target: &Array2<f32>,
    ) -> Result<Vec<DenseMatch>> {
        if !self.inner.context().is_accelerator() {
            return self.inner.match_pair(reference, target);
        }
        let _guard = self
            .device_lock
            .lock()
            .map_err(|_| TickTockError::Pipeline("dense matcher device lock poisoned".into()))?;
        self.inner.match_pair(reference, target)
    }
}
