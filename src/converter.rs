use image::codecs::avif::AvifEncoder;
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::tiff::TiffEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{
    ColorType, DynamicImage, ExtendedColorType, GenericImageView, ImageDecoder, ImageEncoder,
    ImageReader, Limits,
};
use std::borrow::Cow;
use std::io::Cursor;
use std::time::Instant;
use webp::Encoder;

use crate::error::ConvertError;
use crate::format::{OutputFormat, RequestedFormat};
use crate::utils::detect_input_format;

// WebP maximum dimensions are 16383x16383
const MAX_WEBP_DIMENSION: u32 = 16383;

const EXIF_HEADER: &[u8] = b"Exif\0\0";

// APP1 length field counts itself, so the payload tops out at 65533 bytes
const MAX_APP1_PAYLOAD: usize = u16::MAX as usize - 2;

/// Per-request conversion settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSettings {
    pub target: RequestedFormat,
    pub quality: u8,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preserve_exif: bool,
}

impl ConversionSettings {
    pub fn new(target: impl Into<RequestedFormat>) -> Self {
        Self {
            target: target.into(),
            quality: 90,
            width: None,
            height: None,
            preserve_exif: false,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn with_max_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_preserve_exif(mut self, preserve_exif: bool) -> Self {
        self.preserve_exif = preserve_exif;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.target.format
    }
}

/// Guards applied while decoding untrusted uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_dimension: 20_000,
            max_alloc_bytes: 512 * 1024 * 1024,
        }
    }
}

impl DecodeLimits {
    fn to_image_limits(self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_alloc_bytes);
        limits
    }
}

/// Result of converting one image
#[derive(Debug, Clone)]
pub struct ConvertedImage {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

struct DecodedImage {
    image: DynamicImage,
    exif: Option<Vec<u8>>,
}

pub struct ImageConverter {
    settings: ConversionSettings,
    limits: DecodeLimits,
    // 1 = slowest/best, 10 = fastest
    avif_speed: u8,
}

impl ImageConverter {
    pub fn new(settings: ConversionSettings) -> Self {
        Self {
            settings,
            limits: DecodeLimits::default(),
            avif_speed: 8,
        }
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_avif_speed(mut self, speed: u8) -> Self {
        self.avif_speed = speed.clamp(1, 10);
        self
    }

    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    /// Decode, resize and re-encode one uploaded image
    pub fn convert(&self, data: &[u8]) -> Result<ConvertedImage, ConvertError> {
        let started = Instant::now();
        let format = self.settings.format();

        let decoded = self.decode(data)?;
        let (width, height) = decoded.image.dimensions();
        if width == 0 || height == 0 {
            return Err(ConvertError::InvalidDimensions { width, height });
        }

        let img = self.resize(decoded.image);
        let img = if format == OutputFormat::Webp {
            cap_webp_dimensions(img)
        } else {
            img
        };

        if self.settings.preserve_exif && !format.carries_exif() {
            log::debug!("EXIF metadata is not carried into {format} output");
        }

        let output = self.encode(&img, decoded.exif.as_deref())?;
        let (out_width, out_height) = img.dimensions();

        log::debug!(
            "Converted {} {}x{} -> {} {}x{} ({} -> {}) in {:?}",
            detect_input_format(data).unwrap_or("image"),
            width,
            height,
            format,
            out_width,
            out_height,
            humansize::format_size(data.len(), humansize::DECIMAL),
            humansize::format_size(output.len(), humansize::DECIMAL),
            started.elapsed()
        );

        Ok(ConvertedImage {
            data: output,
            format,
            mime_type: format.mime_type(),
            width: out_width,
            height: out_height,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<DecodedImage, ConvertError> {
        let mut reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        reader.limits(self.limits.to_image_limits());

        let mut decoder = reader.into_decoder().map_err(ConvertError::from_image)?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

        let exif = if self.settings.preserve_exif && self.settings.format().carries_exif() {
            decoder
                .exif_metadata()
                .ok()
                .flatten()
                .map(strip_exif_header)
                .filter(|exif| !exif.is_empty())
        } else {
            None
        };

        let mut image = DynamicImage::from_decoder(decoder).map_err(ConvertError::from_image)?;

        // A copied EXIF block keeps its orientation tag, so only bake the
        // rotation into the pixels when no EXIF is written out.
        if exif.is_none() {
            image.apply_orientation(orientation);
        }

        Ok(DecodedImage { image, exif })
    }

    fn resize(&self, img: DynamicImage) -> DynamicImage {
        if self.settings.width.is_none() && self.settings.height.is_none() {
            return img;
        }

        let (width, height) = img.dimensions();
        let (new_width, new_height) =
            fit_within(width, height, self.settings.width, self.settings.height);

        if (new_width, new_height) == (width, height) {
            return img;
        }

        log::debug!("Resizing image from {width}x{height} to {new_width}x{new_height}");
        img.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }

    fn encode(&self, img: &DynamicImage, exif: Option<&[u8]>) -> Result<Vec<u8>, ConvertError> {
        let format = self.settings.format();
        let quality = self.settings.quality.clamp(1, 100);
        let mut buffer = Vec::new();

        match format {
            OutputFormat::Jpeg => {
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, quality)
                    .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                    .map_err(|e| ConvertError::encode(format, e))?;
                if let Some(exif) = exif {
                    buffer = insert_jpeg_exif(buffer, exif);
                }
            }
            OutputFormat::Png => encode_png(img, exif, &mut buffer)?,
            OutputFormat::Webp => buffer = encode_webp(img, quality)?,
            OutputFormat::Avif => {
                let rgba = img.to_rgba8();
                AvifEncoder::new_with_speed_quality(&mut buffer, self.avif_speed, quality)
                    .write_image(
                        rgba.as_raw(),
                        rgba.width(),
                        rgba.height(),
                        ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| ConvertError::encode(format, e))?;
            }
            OutputFormat::Tiff => {
                let img = to_rgb_or_rgba(img);
                TiffEncoder::new(Cursor::new(&mut buffer))
                    .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
                    .map_err(|e| ConvertError::encode(format, e))?;
            }
            OutputFormat::Bmp => {
                let img = to_rgb_or_rgba(img);
                BmpEncoder::new(&mut buffer)
                    .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
                    .map_err(|e| ConvertError::encode(format, e))?;
            }
            OutputFormat::Gif => {
                let rgba = img.to_rgba8();
                let mut encoder = GifEncoder::new(&mut buffer);
                encoder
                    .encode(
                        rgba.as_raw(),
                        rgba.width(),
                        rgba.height(),
                        ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| ConvertError::encode(format, e))?;
            }
        }

        Ok(buffer)
    }
}

/// Scale `width`x`height` to fit inside the optional bounds.
///
/// Keeps the aspect ratio, never enlarges, and never returns a zero side.
pub fn fit_within(
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    let scale_x = max_width.map_or(1.0, |w| w as f64 / width as f64);
    let scale_y = max_height.map_or(1.0, |h| h as f64 / height as f64);
    let scale = scale_x.min(scale_y);

    if scale >= 1.0 {
        return (width, height);
    }

    let new_width = ((width as f64 * scale).round() as u32).clamp(1, width);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, height);
    (new_width, new_height)
}

/// Downscale images that exceed the WebP container limits
fn cap_webp_dimensions(img: DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= MAX_WEBP_DIMENSION && height <= MAX_WEBP_DIMENSION {
        return img;
    }

    let (new_width, new_height) = fit_within(
        width,
        height,
        Some(MAX_WEBP_DIMENSION),
        Some(MAX_WEBP_DIMENSION),
    );
    log::warn!(
        "Resizing image from {}x{} to {}x{} to fit WebP limits",
        width,
        height,
        new_width,
        new_height
    );
    img.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

fn to_rgb_or_rgba(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match img.color() {
        ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(img),
        color if color.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
    }
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let img = to_rgb_or_rgba(img);
    let encoder = Encoder::from_image(&img)
        .map_err(|e| ConvertError::encode(OutputFormat::Webp, e))?;

    let webp_data = if quality >= 100 {
        encoder.encode_lossless()
    } else {
        encoder.encode(quality as f32)
    };
    Ok(webp_data.to_vec())
}

fn encode_png(
    img: &DynamicImage,
    exif: Option<&[u8]>,
    buffer: &mut Vec<u8>,
) -> Result<(), ConvertError> {
    let img = match img.color() {
        ColorType::L8 | ColorType::La8 => Cow::Borrowed(img),
        _ => to_rgb_or_rgba(img),
    };
    let color = match img.color() {
        ColorType::L8 => png::ColorType::Grayscale,
        ColorType::La8 => png::ColorType::GrayscaleAlpha,
        ColorType::Rgb8 => png::ColorType::Rgb,
        _ => png::ColorType::Rgba,
    };

    let png_error = |e: png::EncodingError| ConvertError::encode(OutputFormat::Png, e);

    let mut encoder = png::Encoder::new(buffer, img.width(), img.height());
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header().map_err(png_error)?;
    if let Some(exif) = exif {
        writer
            .write_chunk(png::chunk::ChunkType(*b"eXIf"), exif)
            .map_err(png_error)?;
    }
    writer.write_image_data(img.as_bytes()).map_err(png_error)?;
    writer.finish().map_err(png_error)
}

/// Decoders may hand back the APP1 form with the `Exif\0\0` prefix; keep only
/// the TIFF structure.
fn strip_exif_header(raw: Vec<u8>) -> Vec<u8> {
    match raw.strip_prefix(EXIF_HEADER) {
        Some(tiff) => tiff.to_vec(),
        None => raw,
    }
}

/// Splice an APP1 Exif segment after SOI (and after a leading JFIF APP0)
fn insert_jpeg_exif(jpeg: Vec<u8>, tiff: &[u8]) -> Vec<u8> {
    let payload_len = EXIF_HEADER.len() + tiff.len();
    if payload_len > MAX_APP1_PAYLOAD {
        log::debug!("EXIF block of {} bytes does not fit in a JPEG APP1 segment", tiff.len());
        return jpeg;
    }
    if jpeg.len() < 4 || jpeg[..2] != [0xFF, 0xD8] {
        return jpeg;
    }

    let mut insert_at = 2;
    if jpeg[2..4] == [0xFF, 0xE0] && jpeg.len() >= 6 {
        let app0_len = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        if 4 + app0_len <= jpeg.len() {
            insert_at = 4 + app0_len;
        }
    }

    let segment_len = (payload_len + 2) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 4);
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[insert_at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    // Minimal little-endian TIFF header with an empty IFD
    const TIFF_STUB: &[u8] = &[
        0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    fn sample_jpeg_with_exif() -> Vec<u8> {
        let img = RgbImage::from_pixel(24, 16, Rgb([200, 40, 40]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .write_image(img.as_raw(), 24, 16, ExtendedColorType::Rgb8)
            .unwrap();
        insert_jpeg_exif(jpeg, TIFF_STUB)
    }

    fn converter(format: OutputFormat) -> ImageConverter {
        ImageConverter::new(ConversionSettings::new(format))
    }

    #[test]
    fn fit_within_keeps_aspect_and_never_enlarges() {
        assert_eq!(fit_within(400, 200, Some(100), None), (100, 50));
        assert_eq!(fit_within(400, 200, None, Some(50)), (100, 50));
        assert_eq!(fit_within(400, 200, Some(100), Some(100)), (100, 50));
        assert_eq!(fit_within(400, 200, Some(1000), Some(1000)), (400, 200));
        assert_eq!(fit_within(400, 200, None, None), (400, 200));
        assert_eq!(fit_within(1000, 1, Some(10), None), (10, 1));
    }

    #[test]
    fn converts_to_every_format() {
        let input = sample_png(32, 24);
        for format in OutputFormat::all() {
            let output = converter(*format).convert(&input).unwrap();
            assert_eq!(output.mime_type, format.mime_type());
            assert_eq!((output.width, output.height), (32, 24));
            assert!(!output.data.is_empty(), "{format} produced no bytes");

            if *format != OutputFormat::Avif {
                let decoded = image::load_from_memory(&output.data).unwrap();
                assert_eq!(decoded.dimensions(), (32, 24), "{format}");
            }
        }
    }

    #[test]
    fn output_is_recognised_by_magic_bytes() {
        let input = sample_png(8, 8);
        let cases = [
            (OutputFormat::Jpeg, "jpeg"),
            (OutputFormat::Png, "png"),
            (OutputFormat::Webp, "webp"),
            (OutputFormat::Gif, "gif"),
            (OutputFormat::Bmp, "bmp"),
            (OutputFormat::Tiff, "tiff"),
            (OutputFormat::Avif, "avif"),
        ];
        for (format, expected) in cases {
            let output = converter(format).convert(&input).unwrap();
            assert_eq!(detect_input_format(&output.data), Some(expected));
        }
    }

    #[test]
    fn resizes_inside_bounds() {
        let input = sample_png(400, 200);
        let settings = ConversionSettings::new(OutputFormat::Png).with_max_size(Some(100), None);
        let output = ImageConverter::new(settings).convert(&input).unwrap();
        assert_eq!((output.width, output.height), (100, 50));

        let settings =
            ConversionSettings::new(OutputFormat::Png).with_max_size(Some(4000), Some(4000));
        let output = ImageConverter::new(settings).convert(&input).unwrap();
        assert_eq!((output.width, output.height), (400, 200));
    }

    #[test]
    fn lower_quality_gives_smaller_jpeg() {
        let input = sample_png(128, 128);
        let high = ImageConverter::new(ConversionSettings::new(OutputFormat::Jpeg).with_quality(95))
            .convert(&input)
            .unwrap();
        let low = ImageConverter::new(ConversionSettings::new(OutputFormat::Jpeg).with_quality(10))
            .convert(&input)
            .unwrap();
        assert!(low.data.len() < high.data.len());
    }

    #[test]
    fn rejects_garbage_input() {
        let err = converter(OutputFormat::Png)
            .convert(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, ConvertError::Decode(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn enforces_decode_limits() {
        let input = sample_png(64, 64);
        let err = converter(OutputFormat::Png)
            .with_limits(DecodeLimits {
                max_dimension: 32,
                max_alloc_bytes: 1024 * 1024,
            })
            .convert(&input)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Limits(_)));
    }

    #[test]
    fn strips_exif_by_default() {
        let input = sample_jpeg_with_exif();
        assert!(input.windows(EXIF_HEADER.len()).any(|w| w == EXIF_HEADER));

        let output = converter(OutputFormat::Jpeg).convert(&input).unwrap();
        assert!(!output.data.windows(EXIF_HEADER.len()).any(|w| w == EXIF_HEADER));
    }

    #[test]
    fn preserves_exif_into_jpeg_and_png() {
        let input = sample_jpeg_with_exif();

        let settings = ConversionSettings::new(OutputFormat::Jpeg).with_preserve_exif(true);
        let jpeg = ImageConverter::new(settings).convert(&input).unwrap();
        assert!(jpeg.data.windows(EXIF_HEADER.len()).any(|w| w == EXIF_HEADER));
        image::load_from_memory(&jpeg.data).unwrap();

        let settings = ConversionSettings::new(OutputFormat::Png).with_preserve_exif(true);
        let png = ImageConverter::new(settings).convert(&input).unwrap();
        assert!(png.data.windows(4).any(|w| w == b"eXIf"));
        image::load_from_memory(&png.data).unwrap();
    }

    #[test]
    fn jpeg_exif_goes_after_jfif_header() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB, 0xFF, 0xD9];
        let out = insert_jpeg_exif(jpeg, TIFF_STUB);
        assert_eq!(&out[..8], &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB]);
        assert_eq!(&out[8..10], &[0xFF, 0xE1]);
        let len = u16::from_be_bytes([out[10], out[11]]) as usize;
        assert_eq!(len, 2 + EXIF_HEADER.len() + TIFF_STUB.len());
        assert_eq!(&out[out.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn oversized_exif_is_dropped() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let huge = vec![0u8; MAX_APP1_PAYLOAD];
        assert_eq!(insert_jpeg_exif(jpeg.clone(), &huge), jpeg);
    }

    #[test]
    fn exif_prefix_is_normalised() {
        let mut raw = EXIF_HEADER.to_vec();
        raw.extend_from_slice(TIFF_STUB);
        assert_eq!(strip_exif_header(raw), TIFF_STUB);
        assert_eq!(strip_exif_header(TIFF_STUB.to_vec()), TIFF_STUB);
    }

    #[test]
    fn grayscale_png_stays_grayscale() {
        let img = image::GrayImage::from_fn(10, 10, |x, _| image::Luma([(x * 20) as u8]));
        let mut input = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut input), ImageFormat::Png)
            .unwrap();

        let output = converter(OutputFormat::Png).convert(&input).unwrap();
        let decoded = image::load_from_memory(&output.data).unwrap();
        assert_eq!(decoded.color(), ColorType::L8);
    }

    fn sample_rgb_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 64]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    // Little-endian TIFF with a single Orientation (0x0112) entry set to 6
    const TIFF_ROTATE_90: &[u8] = &[
        0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, // header
        0x01, 0x00, // one entry
        0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, // no next IFD
    ];

    fn rotated_jpeg() -> Vec<u8> {
        let img = RgbImage::from_pixel(24, 16, Rgb([40, 160, 40]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .write_image(img.as_raw(), 24, 16, ExtendedColorType::Rgb8)
            .unwrap();
        insert_jpeg_exif(jpeg, TIFF_ROTATE_90)
    }

    #[test]
    fn webp_output_is_capped_to_container_limit() {
        let input = sample_rgb_png(MAX_WEBP_DIMENSION + 117, 2);
        let output = converter(OutputFormat::Webp).convert(&input).unwrap();
        assert_eq!((output.width, output.height), (MAX_WEBP_DIMENSION, 2));

        // Other formats are not capped
        let output = converter(OutputFormat::Png).convert(&input).unwrap();
        assert_eq!(output.width, MAX_WEBP_DIMENSION + 117);
    }

    #[test]
    fn webp_is_lossless_at_full_quality() {
        let input = sample_rgb_png(16, 16);

        let settings = ConversionSettings::new(OutputFormat::Webp).with_quality(100);
        let lossless = ImageConverter::new(settings).convert(&input).unwrap();
        assert_eq!(&lossless.data[12..16], b"VP8L");
        let decoded = image::load_from_memory(&lossless.data).unwrap().to_rgb8();
        let original = image::load_from_memory(&input).unwrap().to_rgb8();
        assert_eq!(decoded, original);

        let settings = ConversionSettings::new(OutputFormat::Webp).with_quality(80);
        let lossy = ImageConverter::new(settings).convert(&input).unwrap();
        assert_eq!(&lossy.data[12..16], b"VP8 ");
    }

    #[test]
    fn orientation_is_baked_when_exif_is_dropped() {
        let input = rotated_jpeg();

        let output = converter(OutputFormat::Png).convert(&input).unwrap();
        assert_eq!((output.width, output.height), (16, 24));

        // WebP cannot carry EXIF, so the rotation is applied even when asked to keep it
        let settings = ConversionSettings::new(OutputFormat::Webp).with_preserve_exif(true);
        let output = ImageConverter::new(settings).convert(&input).unwrap();
        assert_eq!((output.width, output.height), (16, 24));
    }

    #[test]
    fn orientation_is_left_to_copied_exif() {
        let input = rotated_jpeg();

        let settings = ConversionSettings::new(OutputFormat::Jpeg).with_preserve_exif(true);
        let output = ImageConverter::new(settings).convert(&input).unwrap();
        assert_eq!((output.width, output.height), (24, 16));
        assert!(output
            .data
            .windows(TIFF_ROTATE_90.len())
            .any(|w| w == TIFF_ROTATE_90));
    }

    #[test]
    fn animated_gif_uses_first_frame() {
        let frames = [Rgba([10, 10, 10, 255]), Rgba([200, 200, 200, 255])]
            .into_iter()
            .map(|pixel| image::Frame::new(RgbaImage::from_pixel(8, 8, pixel)));
        let mut input = Vec::new();
        GifEncoder::new(&mut input).encode_frames(frames).unwrap();

        let output = converter(OutputFormat::Png).convert(&input).unwrap();
        let decoded = image::load_from_memory(&output.data).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0), &Rgba([10, 10, 10, 255]));
        assert_eq!(decoded.get_pixel(7, 7), &Rgba([10, 10, 10, 255]));
    }
}
