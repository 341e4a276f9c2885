//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Detect format | `image::ImageReader::with_guessed_format` (magic bytes) |
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image` crate decoders |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode | `image::DynamicImage::save_with_format`, in the source format |
//!
//! Some encoders accept fewer pixel layouts than their decoders produce
//! (JPEG has no alpha, GIF wants 8-bit RGB(A), TIFF has no grayscale with
//! alpha), so pixels are converted to a
//! layout the target encoder supports before saving.

use super::backend::{BackendError, Dimensions, ImageBackend, SourceImage};
use super::params::ResizeParams;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use std::borrow::Cow;
use std::io::Cursor;

/// Backend using the `image` crate ecosystem.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert pixels to a layout `format`'s encoder can write.
fn encodable(image: &DynamicImage, format: ImageFormat) -> Cow<'_, DynamicImage> {
    let color = image.color();
    match format {
        ImageFormat::Jpeg if !matches!(color, ColorType::L8 | ColorType::Rgb8) => {
            Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8()))
        }
        ImageFormat::Gif if !matches!(color, ColorType::Rgb8 | ColorType::Rgba8) => {
            Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
        }
        ImageFormat::Tiff if color == ColorType::La8 => {
            Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
        }
        ImageFormat::Tiff if color == ColorType::La16 => {
            Cow::Owned(DynamicImage::ImageRgba16(image.to_rgba16()))
        }
        ImageFormat::Bmp | ImageFormat::WebP
            if !matches!(
                color,
                ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8
            ) =>
        {
            if color.has_alpha() {
                Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
            } else {
                Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8()))
            }
        }
        _ => Cow::Borrowed(image),
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<SourceImage, BackendError> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| BackendError::Decode("unrecognized image format".into()))?;
        let image = reader
            .decode()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(SourceImage::new(format, image))
    }

    fn resize(
        &self,
        source: &SourceImage,
        params: &ResizeParams,
    ) -> Result<Dimensions, BackendError> {
        let resized = if source.image.width() == params.width
            && source.image.height() == params.height
        {
            Cow::Borrowed(&source.image)
        } else {
            Cow::Owned(
                source
                    .image
                    .resize_exact(params.width, params.height, FilterType::Lanczos3),
            )
        };

        let output = encodable(&resized, source.format);
        output
            .save_with_format(&params.output, source.format)
            .map_err(|e| match e {
                image::ImageError::IoError(io) => BackendError::Io(io),
                other => BackendError::ProcessingFailed(format!(
                    "Failed to write {}: {}",
                    params.output.display(),
                    other
                )),
            })?;

        Ok(Dimensions {
            width: output.width(),
            height: output.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::Size;
    use crate::test_helpers::encode_test_image;

    fn params(size: &str, width: u32, height: u32, output: std::path::PathBuf) -> ResizeParams {
        ResizeParams {
            size: size.parse::<Size>().unwrap(),
            width,
            height,
            output,
        }
    }

    #[test]
    fn decode_detects_format_from_content() {
        let backend = RustBackend::new();
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif, ImageFormat::Bmp] {
            let bytes = encode_test_image(format, 40, 30);
            let source = backend.decode(&bytes).unwrap();
            assert_eq!(source.format, format);
            assert_eq!(
                source.dimensions(),
                Dimensions {
                    width: 40,
                    height: 30
                }
            );
        }
    }

    #[test]
    fn decode_rejects_non_image() {
        let backend = RustBackend::new();
        assert!(matches!(
            backend.decode(b"plain text, not pixels"),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn decode_rejects_truncated_image() {
        let backend = RustBackend::new();
        let bytes = encode_test_image(ImageFormat::Png, 40, 30);
        assert!(backend.decode(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("source.png");
        std::fs::write(&path, encode_test_image(ImageFormat::Png, 12, 8)).unwrap();

        let source = RustBackend::new().load(&path).unwrap();
        assert_eq!(source.image.width(), 12);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = RustBackend::new().load(std::path::Path::new("/nonexistent/x.png"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn resize_writes_in_source_format() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = RustBackend::new();
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif] {
            let source = backend.decode(&encode_test_image(format, 200, 100)).unwrap();
            let output = tmp.path().join(format!("out.{}", source.format_name()));

            let dims = backend
                .resize(&source, &params("100x100", 100, 50, output.clone()))
                .unwrap();
            assert_eq!(
                dims,
                Dimensions {
                    width: 100,
                    height: 50
                }
            );

            let written = std::fs::read(&output).unwrap();
            assert_eq!(image::guess_format(&written).unwrap(), format);
            let reread = image::load_from_memory(&written).unwrap();
            assert_eq!((reread.width(), reread.height()), (100, 50));
        }
    }

    #[test]
    fn resize_same_dimensions_copies_pixels() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = RustBackend::new();
        let source = backend
            .decode(&encode_test_image(ImageFormat::Png, 20, 20))
            .unwrap();
        let output = tmp.path().join("same.png");
        backend
            .resize(&source, &params("500x500", 20, 20, output.clone()))
            .unwrap();
        let reread = image::open(&output).unwrap();
        assert_eq!(reread.to_rgb8(), source.image.to_rgb8());
    }

    #[test]
    fn resize_into_missing_directory_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = RustBackend::new();
        let source = backend
            .decode(&encode_test_image(ImageFormat::Png, 20, 20))
            .unwrap();
        let result = backend.resize(
            &source,
            &params("10x10", 10, 10, tmp.path().join("missing/out.png")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn encodable_strips_alpha_for_jpeg() {
        let rgba = DynamicImage::new_rgba8(4, 4);
        assert_eq!(encodable(&rgba, ImageFormat::Jpeg).color(), ColorType::Rgb8);
        assert_eq!(encodable(&rgba, ImageFormat::Png).color(), ColorType::Rgba8);
    }

    #[test]
    fn encodable_widens_gray_alpha_for_tiff() {
        let la8 = DynamicImage::new_luma_a8(4, 4);
        assert_eq!(encodable(&la8, ImageFormat::Tiff).color(), ColorType::Rgba8);
        let la16 = DynamicImage::new_luma_a16(4, 4);
        assert_eq!(encodable(&la16, ImageFormat::Tiff).color(), ColorType::Rgba16);
        let l8 = DynamicImage::new_luma8(4, 4);
        assert_eq!(encodable(&l8, ImageFormat::Tiff).color(), ColorType::L8);
    }

    #[test]
    fn resize_gray_alpha_tiff_writes_tiff() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = RustBackend::new();
        let source = SourceImage::new(ImageFormat::Tiff, DynamicImage::new_luma_a8(40, 40));
        let output = tmp.path().join("gray.tiff");

        let dims = backend
            .resize(&source, &params("20x20", 20, 20, output.clone()))
            .unwrap();

        assert_eq!(
            dims,
            Dimensions {
                width: 20,
                height: 20
            }
        );
        let written = std::fs::read(&output).unwrap();
        assert_eq!(image::guess_format(&written).unwrap(), ImageFormat::Tiff);
        let reread = image::load_from_memory(&written).unwrap();
        assert_eq!((reread.width(), reread.height()), (20, 20));
    }
}
