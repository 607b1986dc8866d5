use ndarray::{Array2, Zip};

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};

/// A single grayscale image.
/// Pixel values are f32 in [0.0, 1.0].
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Original bit depth before conversion (8 or 16)
    pub original_bit_depth: u8,
}

impl Frame {
    pub fn new(data: Array2<f32>, bit_depth: u8) -> Self {
        Self {
            data,
            original_bit_depth: bit_depth,
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Mean pixel value on the 0-255 scale.
    pub fn mean_8bit(&self) -> f32 {
        self.data.mean().unwrap_or(0.0) * 255.0
    }
}

/// Color image composed of separate channel frames.
#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub red: Frame,
    pub green: Frame,
    pub blue: Frame,
}

impl ColorFrame {
    pub fn width(&self) -> usize {
        self.red.width()
    }

    pub fn height(&self) -> usize {
        self.red.height()
    }

    /// BT.601 luminance.
    pub fn luminance(&self) -> Frame {
        let mut data = Array2::<f32>::zeros(self.red.data.dim());
        Zip::from(&mut data)
            .and(&self.red.data)
            .and(&self.green.data)
            .and(&self.blue.data)
            .for_each(|l, &r, &g, &b| {
                *l = LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b;
            });
        Frame::new(data, self.red.original_bit_depth)
    }

    /// Apply the same single-channel operation to every channel.
    pub fn map_channels<F>(&self, f: F) -> ColorFrame
    where
        F: Fn(&Frame) -> Frame,
    {
        ColorFrame {
            red: f(&self.red),
            green: f(&self.green),
            blue: f(&self.blue),
        }
    }
}

/// A decoded image, either grayscale or color.
#[derive(Clone, Debug)]
pub enum Image {
    Mono(Frame),
    Color(ColorFrame),
}

impl Image {
    pub fn width(&self) -> usize {
        match self {
            Self::Mono(f) => f.width(),
            Self::Color(cf) => cf.width(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Self::Mono(f) => f.height(),
            Self::Color(cf) => cf.height(),
        }
    }

    /// Single-channel view used for classification and registration.
    pub fn to_mono(&self) -> Frame {
        match self {
            Self::Mono(f) => f.clone(),
            Self::Color(cf) => cf.luminance(),
        }
    }

    /// Apply a single-channel operation to every channel.
    pub fn map_channels<F>(&self, f: F) -> Image
    where
        F: Fn(&Frame) -> Frame,
    {
        match self {
            Self::Mono(frame) => Self::Mono(f(frame)),
            Self::Color(cf) => Self::Color(cf.map_channels(f)),
        }
    }
}
