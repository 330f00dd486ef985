//! Core domain types - images, tagsets, devices, display events

pub mod device;
pub mod event;
pub mod image;
pub mod tagset;

pub use device::*;
pub use event::*;
pub use image::*;
pub use tagset::*;
