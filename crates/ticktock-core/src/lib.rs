pub mod classify;
pub mod consts;
pub mod dense;
pub mod enhance;
pub mod error;
pub mod estimate;
pub mod features;
pub mod filters;
pub mod frame;
pub mod io;
pub mod matching;
pub mod pipeline;
pub mod template;
pub mod warp;
