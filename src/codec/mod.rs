//! HEIC decoding and JPEG encoding
//!
//! The pipeline only talks to [`ImageCodec`]; the concrete codec decides how
//! HEIC containers are opened and how JPEG bytes are produced.

pub mod mock;
pub mod processor;

pub use mock::MockImageCodec;
pub use processor::JpegCodec;

use crate::Result;
use async_trait::async_trait;
use image::DynamicImage;

#[async_trait]
pub trait ImageCodec: Send + Sync {
    async fn decode_heic(&self, data: &[u8]) -> Result<DynamicImage>;
    async fn resize(&self, image: DynamicImage, width: u32, height: u32) -> Result<DynamicImage>;
    async fn encode_jpeg(&self, image: DynamicImage, quality: u8) -> Result<Vec<u8>>;
}
