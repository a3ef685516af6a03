use std::path::Path;

use image::ImageFormat;
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};

use crate::error::ImageDecodeError;

/// A decoded rgb8 image with shape [H, W, 3].
pub type RgbImage = Image<u8, 3, CpuAllocator>;

/// Image formats accepted for upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadFormat {
    /// Portable Network Graphics.
    Png,
    /// JPEG, with either extension.
    Jpeg,
    /// Only the first frame of animated files is used.
    Gif,
    /// Windows bitmap.
    Bmp,
}

impl UploadFormat {
    /// Every accepted format.
    pub const ALL: [UploadFormat; 4] = [
        UploadFormat::Png,
        UploadFormat::Jpeg,
        UploadFormat::Gif,
        UploadFormat::Bmp,
    ];

    /// File extensions associated with the format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            UploadFormat::Png => &["png"],
            UploadFormat::Jpeg => &["jpg", "jpeg"],
            UploadFormat::Gif => &["gif"],
            UploadFormat::Bmp => &["bmp"],
        }
    }

    /// Looks up the format from a file extension, ignoring case.
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| {
            format
                .extensions()
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(extension))
        })
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(UploadFormat::Png),
            ImageFormat::Jpeg => Some(UploadFormat::Jpeg),
            ImageFormat::Gif => Some(UploadFormat::Gif),
            ImageFormat::Bmp => Some(UploadFormat::Bmp),
            _ => None,
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            UploadFormat::Png => ImageFormat::Png,
            UploadFormat::Jpeg => ImageFormat::Jpeg,
            UploadFormat::Gif => ImageFormat::Gif,
            UploadFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Detects the upload format of the given bytes from their signature.
pub fn sniff_format(bytes: &[u8]) -> Result<UploadFormat, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    let format = image::guess_format(bytes).map_err(|_| ImageDecodeError::UnrecognizedFormat)?;
    UploadFormat::from_image_format(format)
        .ok_or_else(|| ImageDecodeError::UnsupportedFormat(format!("{format:?}")))
}

/// Decodes uploaded bytes into an rgb8 image.
///
/// # Arguments
///
/// * `bytes` - Raw bytes of a png, jpeg, gif or bmp file
///
/// # Returns
///
/// The decoded image converted to three channels. Alpha is dropped and
/// grayscale is expanded.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ImageDecodeError> {
    let format = sniff_format(bytes)?;
    let decoded = image::load_from_memory_with_format(bytes, format.image_format())?.into_rgb8();

    let size = ImageSize {
        width: decoded.width() as usize,
        height: decoded.height() as usize,
    };
    log::debug!("Decoded {format:?} image of {size}");

    Ok(Image::new(size, decoded.into_raw(), CpuAllocator)?)
}

/// Reads an image file and decodes it into an rgb8 image.
pub fn read_image_file(file_path: impl AsRef<Path>) -> Result<RgbImage, ImageDecodeError> {
    let bytes = std::fs::read(file_path)?;
    decode_image(&bytes)
}
