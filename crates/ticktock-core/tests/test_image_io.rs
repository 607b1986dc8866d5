use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use ticktock_core::frame::{ColorFrame, Frame, Image};
use ticktock_core::error::TickTockError;
use ticktock_core::io::{
    collect_image_files, is_supported_image, load_image, save_image, split_reference,
};

fn gradient(h: usize, w: usize) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| (r * w + c) as f32 / (h * w - 1) as f32)
}

#[test]
fn test_mono_tiff_round_trip() {
    let mut data = Array2::<f32>::zeros((4, 4));
    data[[0, 1]] = 0.5;
    data[[1, 0]] = 1.0;
    data[[2, 3]] = 0.25;
    let image = Image::Mono(Frame::new(data, 16));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.tiff");
    save_image(&image, &path).unwrap();

    let Image::Mono(loaded) = load_image(&path).unwrap() else {
        panic!("expected a mono image");
    };
    assert_eq!((loaded.width(), loaded.height()), (4, 4));
    assert_eq!(loaded.original_bit_depth, 16);
    assert!((loaded.data[[0, 0]] - 0.0).abs() < 1e-4);
    assert!((loaded.data[[0, 1]] - 0.5).abs() < 1e-3);
    assert!((loaded.data[[1, 0]] - 1.0).abs() < 1e-4);
    assert!((loaded.data[[2, 3]] - 0.25).abs() < 1e-3);
}

#[test]
fn test_color_png_round_trip() {
    let color = ColorFrame {
        red: Frame::new(gradient(6, 5), 8),
        green: Frame::new(Array2::from_elem((6, 5), 0.5), 8),
        blue: Frame::new(gradient(6, 5).mapv(|v| 1.0 - v), 8),
    };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("color.png");
    save_image(&Image::Color(color), &path).unwrap();

    let Image::Color(loaded) = load_image(&path).unwrap() else {
        panic!("expected a color image");
    };
    assert_eq!((loaded.width(), loaded.height()), (5, 6));
    assert_eq!(loaded.red.original_bit_depth, 8);
    assert!((loaded.green.data[[3, 3]] - 0.5).abs() < 0.01);
    assert!((loaded.red.data[[5, 4]] - 1.0).abs() < 0.01);
    assert!(loaded.blue.data[[5, 4]] < 0.01);
}

#[test]
fn test_color_image_to_mono_uses_luminance() {
    let color = ColorFrame {
        red: Frame::new(Array2::from_elem((2, 2), 1.0), 8),
        green: Frame::new(Array2::zeros((2, 2)), 8),
        blue: Frame::new(Array2::zeros((2, 2)), 8),
    };
    let mono = Image::Color(color).to_mono();
    assert!((mono.data[[0, 0]] - 0.299).abs() < 1e-6);
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_image(&dir.path().join("absent.png")).is_err());
}

#[test]
fn test_supported_extensions() {
    assert!(is_supported_image("a/b/photo.JPG".as_ref()));
    assert!(is_supported_image("x.tiff".as_ref()));
    assert!(!is_supported_image("notes.txt".as_ref()));
    assert!(!is_supported_image("no_extension".as_ref()));
}

#[test]
fn test_collect_image_files_is_sorted_and_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("2024");
    fs::create_dir(&nested).unwrap();
    let image = Image::Mono(Frame::new(gradient(4, 4), 8));
    for path in [
        dir.path().join("b.png"),
        dir.path().join("a.png"),
        nested.join("c.png"),
    ] {
        save_image(&image, &path).unwrap();
    }
    fs::write(dir.path().join("readme.txt"), "skip").unwrap();

    let files = collect_image_files(dir.path(), None).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| {
            p.strip_prefix(dir.path())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    assert_eq!(names, vec!["2024/c.png", "a.png", "b.png"]);

    let without_a = collect_image_files(dir.path(), Some(&dir.path().join("a.png"))).unwrap();
    assert_eq!(without_a.len(), 2);
}

#[test]
fn test_collect_skips_excluded_directory() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("aligned");
    fs::create_dir(&out).unwrap();
    let image = Image::Mono(Frame::new(gradient(4, 4), 8));
    save_image(&image, &dir.path().join("a.png")).unwrap();
    save_image(&image, &out.join("a.png")).unwrap();

    let files = collect_image_files(dir.path(), Some(&out)).unwrap();
    assert_eq!(files, vec![dir.path().join("a.png")]);
}

#[test]
fn test_split_reference() {
    let files: Vec<PathBuf> = ["a.png", "b.png", "c.png"].iter().map(PathBuf::from).collect();
    let (reference, targets) = split_reference(&files, 1).unwrap();
    assert_eq!(reference, Path::new("b.png"));
    assert_eq!(targets, vec![Path::new("a.png"), Path::new("c.png")]);

    assert!(matches!(
        split_reference(&files, 3),
        Err(TickTockError::ReferenceIndexOutOfRange { index: 3, total: 3 })
    ));
    assert!(matches!(split_reference(&[], 0), Err(TickTockError::EmptySequence)));
}
