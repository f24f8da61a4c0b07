use super::ImageCodec;
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType};

/// Codec backed by the `image` crate, with libheif decoding under the `heif` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCodec;

impl JpegCodec {
    pub fn new() -> Self {
        Self
    }

    #[cfg(feature = "heif")]
    fn decode_sync(data: &[u8]) -> Result<DynamicImage> {
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let lib_heif = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(data)
            .map_err(|e| Error::Codec(format!("Failed to read HEIC container: {}", e)))?;
        let handle = ctx
            .primary_image_handle()
            .map_err(|e| Error::Codec(format!("No primary image in HEIC container: {}", e)))?;
        let decoded = lib_heif
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(|e| Error::Codec(format!("Failed to decode HEIC image: {}", e)))?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| Error::Codec("Decoded HEIC image has no RGB plane".to_string()))?;

        let row_len = plane.width as usize * 3;
        let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
        for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
            pixels.extend_from_slice(&row[..row_len]);
        }

        image::RgbImage::from_raw(plane.width, plane.height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| Error::Codec("HEIC plane size does not match dimensions".to_string()))
    }

    #[cfg(not(feature = "heif"))]
    fn decode_sync(data: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(data)?)
    }

    fn encode_sync(image: DynamicImage, quality: u8) -> Result<Vec<u8>> {
        // JPEG has no alpha channel
        let rgb = image.to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;

        if bytes.is_empty() {
            return Err(Error::Codec("JPEG encoder produced no output".to_string()));
        }
        Ok(bytes)
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::Invariant(format!("Image processing task join error: {}", e)))?
}

#[async_trait]
impl ImageCodec for JpegCodec {
    async fn decode_heic(&self, data: &[u8]) -> Result<DynamicImage> {
        let data = data.to_vec();
        run_blocking(move || Self::decode_sync(&data)).await
    }

    async fn resize(&self, image: DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
        if image.width() == width && image.height() == height {
            return Ok(image);
        }
        run_blocking(move || Ok(image.resize_exact(width, height, FilterType::Lanczos3))).await
    }

    async fn encode_jpeg(&self, image: DynamicImage, quality: u8) -> Result<Vec<u8>> {
        run_blocking(move || Self::encode_sync(image, quality)).await
    }
}
