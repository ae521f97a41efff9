pub mod pixel_convert;
pub mod sample_convert;
