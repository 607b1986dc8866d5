use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, Rgb};
use ndarray::Array2;

use crate::error::{Result, TickTockError};
use crate::frame::{ColorFrame, Frame, Image};

/// Extensions accepted when scanning a directory for targets.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files under `dir` (recursively), sorted by path. `exclude` is
/// skipped, whether it names a file or a directory.
pub fn collect_image_files(dir: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let excluded = exclude.and_then(|p| p.canonicalize().ok());
    let is_excluded = |path: &Path| match (&excluded, path.canonicalize()) {
        (Some(ex), Ok(canon)) => &canon == ex,
        _ => false,
    };

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if is_excluded(&path) {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else if is_supported_image(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Split a sorted file list into the reference at `index` and the targets.
pub fn split_reference(files: &[PathBuf], index: usize) -> Result<(&Path, Vec<&Path>)> {
    if files.is_empty() {
        return Err(TickTockError::EmptySequence);
    }
    let reference = files
        .get(index)
        .ok_or(TickTockError::ReferenceIndexOutOfRange {
            index,
            total: files.len(),
        })?;
    let targets = files
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, p)| p.as_path())
        .collect();
    Ok((reference.as_path(), targets))
}

fn bit_depth(img: &DynamicImage) -> u8 {
    match img {
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => 16,
        _ => 8,
    }
}

fn has_color(img: &DynamicImage) -> bool {
    !matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    )
}

/// Load an image file, keeping color when the file has it.
pub fn load_image(path: &Path) -> Result<Image> {
    let img = image::open(path)?;
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return Err(TickTockError::InvalidDimensions {
            width: w,
            height: h,
        });
    }
    let depth = bit_depth(&img);

    if !has_color(&img) {
        let gray = img.to_luma16();
        let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
            gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
        });
        return Ok(Image::Mono(Frame::new(data, depth)));
    }

    let rgb = img.to_rgb16();
    let channel = |c: usize| {
        let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
            rgb.get_pixel(col as u32, row as u32).0[c] as f32 / 65535.0
        });
        Frame::new(data, depth)
    };
    Ok(Image::Color(ColorFrame {
        red: channel(0),
        green: channel(1),
        blue: channel(2),
    }))
}

fn to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0) as u16
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

fn buffer_error(w: usize, h: usize) -> TickTockError {
    TickTockError::InvalidDimensions {
        width: w as u32,
        height: h as u32,
    }
}

/// Save a frame as 16-bit grayscale TIFF.
fn save_mono_tiff(frame: &Frame, path: &Path) -> Result<()> {
    let (h, w) = frame.data.dim();
    let pixels: Vec<u16> = frame.data.iter().map(|&v| to_u16(v)).collect();
    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| buffer_error(w, h))?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a frame as 8-bit grayscale PNG.
fn save_mono_png(frame: &Frame, path: &Path) -> Result<()> {
    let (h, w) = frame.data.dim();
    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &v) in frame.data.indexed_iter() {
        img.put_pixel(col as u32, row as u32, Luma([to_u8(v)]));
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a ColorFrame as 16-bit RGB TIFF.
fn save_color_tiff(color: &ColorFrame, path: &Path) -> Result<()> {
    let (h, w) = color.red.data.dim();
    let mut pixels: Vec<u16> = Vec::with_capacity(h * w * 3);
    for row in 0..h {
        for col in 0..w {
            pixels.push(to_u16(color.red.data[[row, col]]));
            pixels.push(to_u16(color.green.data[[row, col]]));
            pixels.push(to_u16(color.blue.data[[row, col]]));
        }
    }
    let img = ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| buffer_error(w, h))?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a ColorFrame as 8-bit RGB PNG.
fn save_color_png(color: &ColorFrame, path: &Path) -> Result<()> {
    let (h, w) = color.red.data.dim();
    let mut img = image::RgbImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let r = to_u8(color.red.data[[row, col]]);
            let g = to_u8(color.green.data[[row, col]]);
            let b = to_u8(color.blue.data[[row, col]]);
            img.put_pixel(col as u32, row as u32, Rgb([r, g, b]));
        }
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save an image, choosing the format from the file extension. TIFF keeps
/// 16 bits per channel; anything else is written as 8-bit PNG.
pub fn save_image(image: &Image, path: &Path) -> Result<()> {
    let tiff = matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("tif" | "tiff")
    );
    match (image, tiff) {
        (Image::Mono(f), true) => save_mono_tiff(f, path),
        (Image::Mono(f), false) => save_mono_png(f, path),
        (Image::Color(c), true) => save_color_tiff(c, path),
        (Image::Color(c), false) => save_color_png(c, path),
    }
}
