pub mod color;
pub mod components;
pub mod image;

pub use color::ColorRgb;
pub use components::Component;
pub use image::LedImage;
