pub mod image_io;

pub use image_io::{
    collect_image_files, is_supported_image, load_image, save_image, split_reference,
};
