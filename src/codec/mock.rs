use super::ImageCodec;
use crate::{Error, Result};
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::{Arc, Mutex};

/// Codec double that fabricates rasters of a fixed size and canned JPEG bytes.
#[derive(Clone)]
pub struct MockImageCodec {
    dimensions: (u32, u32),
    encoded: Vec<u8>,
    undecodable: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_encode: Arc<Mutex<bool>>,
    decode_count: Arc<Mutex<usize>>,
    encode_count: Arc<Mutex<usize>>,
    resize_targets: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl MockImageCodec {
    pub fn new() -> Self {
        Self {
            dimensions: (64, 48),
            encoded: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9],
            undecodable: Arc::new(Mutex::new(Vec::new())),
            fail_encode: Arc::new(Mutex::new(false)),
            decode_count: Arc::new(Mutex::new(0)),
            encode_count: Arc::new(Mutex::new(0)),
            resize_targets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = (width, height);
        self
    }

    pub fn with_encoded_output(mut self, bytes: Vec<u8>) -> Self {
        self.encoded = bytes;
        self
    }

    /// Make decoding fail for this exact payload.
    pub fn with_undecodable(self, data: Vec<u8>) -> Self {
        self.undecodable.lock().unwrap().push(data);
        self
    }

    pub fn with_encode_failure(self, should_fail: bool) -> Self {
        *self.fail_encode.lock().unwrap() = should_fail;
        self
    }

    pub fn get_decode_count(&self) -> usize {
        *self.decode_count.lock().unwrap()
    }

    pub fn get_encode_count(&self) -> usize {
        *self.encode_count.lock().unwrap()
    }

    pub fn get_resize_targets(&self) -> Vec<(u32, u32)> {
        self.resize_targets.lock().unwrap().clone()
    }
}

impl Default for MockImageCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageCodec for MockImageCodec {
    async fn decode_heic(&self, data: &[u8]) -> Result<DynamicImage> {
        *self.decode_count.lock().unwrap() += 1;

        if self.undecodable.lock().unwrap().iter().any(|bad| bad == data) {
            return Err(Error::Codec("Mock decode failure".to_string()));
        }

        let (width, height) = self.dimensions;
        Ok(DynamicImage::new_rgb8(width, height))
    }

    async fn resize(&self, _image: DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
        self.resize_targets.lock().unwrap().push((width, height));
        Ok(DynamicImage::new_rgb8(width, height))
    }

    async fn encode_jpeg(&self, _image: DynamicImage, _quality: u8) -> Result<Vec<u8>> {
        *self.encode_count.lock().unwrap() += 1;

        if *self.fail_encode.lock().unwrap() {
            return Err(Error::Codec("Mock encode failure".to_string()));
        }
        Ok(self.encoded.clone())
    }
}
