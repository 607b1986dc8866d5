pub mod bilateral;
pub mod clahe;
pub mod gaussian_blur;
pub mod levels;
pub mod resize;
pub mod sharpen;
