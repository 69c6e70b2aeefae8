use image::{DynamicImage, GrayImage, RgbImage};
use serde::Serialize;
use tracing::trace;

use crate::error::DecodeError;

/// Pixel layout produced by [`ImageDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// 3 channels, 8-bit RGB. Alpha is dropped.
    #[default]
    Color,
    /// 1 channel, 8-bit luma.
    Grayscale,
}

impl ColorMode {
    pub fn channels(self) -> u8 {
        match self {
            ColorMode::Color => 3,
            ColorMode::Grayscale => 1,
        }
    }
}

/// Raw pixels of one frame, row-major, `width * height * channels` bytes.
///
/// Produced for display and dropped once the sink has rendered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
    /// Size of the encoded payload this frame came from.
    pub encoded_len: usize,
}

impl DecodedFrame {
    /// Byte length implied by the dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Rebuild an `image` buffer, e.g. for saving.
    ///
    /// `None` if the channel count is unsupported or the buffer size is wrong.
    pub fn to_image(&self) -> Option<DynamicImage> {
        match self.channels {
            3 => RgbImage::from_raw(self.width, self.height, self.pixels.clone())
                .map(DynamicImage::ImageRgb8),
            1 => GrayImage::from_raw(self.width, self.height, self.pixels.clone())
                .map(DynamicImage::ImageLuma8),
            _ => None,
        }
    }
}

/// Turns one encoded payload into pixels.
pub trait FrameDecoder {
    fn decode(&self, payload: &[u8]) -> Result<DecodedFrame, DecodeError>;
}

/// Decoder backed by the `image` crate. The format is sniffed from the
/// payload; PNG and JPEG are compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder {
    color: ColorMode,
}

impl ImageDecoder {
    pub fn new(color: ColorMode) -> Self {
        Self { color }
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color
    }
}

impl FrameDecoder for ImageDecoder {
    fn decode(&self, payload: &[u8]) -> Result<DecodedFrame, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        let image = image::load_from_memory(payload).map_err(|source| DecodeError::Image {
            len: payload.len(),
            source,
        })?;

        let (width, height, pixels) = match self.color {
            ColorMode::Color => {
                let rgb = image.into_rgb8();
                let (w, h) = rgb.dimensions();
                (w, h, rgb.into_raw())
            }
            ColorMode::Grayscale => {
                let luma = image.into_luma8();
                let (w, h) = luma.dimensions();
                (w, h, luma.into_raw())
            }
        };
        trace!(width, height, len = payload.len(), "decoded frame");

        Ok(DecodedFrame {
            width,
            height,
            channels: self.color.channels(),
            pixels,
            encoded_len: payload.len(),
        })
    }
}
