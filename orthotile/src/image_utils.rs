//! Raster loading, tile cropping and tile encoding

use crate::error::{DatasetError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tilegrid::Tile;

/// Decode a raster from disk.
///
/// Orthophoto TIFFs routinely exceed the decoder's default allocation limits,
/// so limits are lifted for source rasters.
pub fn open_raster(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(DatasetError::MissingRaster(path.to_path_buf()));
    }

    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    reader.no_limits();
    reader.decode().map_err(|source| DatasetError::RasterDecode {
        path: path.to_path_buf(),
        source,
    })
}

/// Read only the raster header to get `(width, height)`
pub fn raster_dimensions(path: &Path) -> Result<(u32, u32)> {
    if !path.is_file() {
        return Err(DatasetError::MissingRaster(path.to_path_buf()));
    }
    image::image_dimensions(path).map_err(|source| DatasetError::RasterDecode {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy the tile's region out of the raster as 8-bit RGB
pub fn crop_tile(raster: &DynamicImage, tile: &Tile) -> RgbImage {
    raster
        .crop_imm(tile.x_offset, tile.y_offset, tile.width, tile.height)
        .to_rgb8()
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// Encode a tile. JPEG uses `jpeg_quality`; other formats follow the extension.
pub fn save_tile(img: &RgbImage, path: &Path, jpeg_quality: u8) -> Result<()> {
    if is_jpeg(path) {
        let file = File::create(path).map_err(|e| DatasetError::tile_write(path, e))?;
        let mut writer = BufWriter::new(file);
        let encoder = JpegEncoder::new_with_quality(&mut writer, jpeg_quality);
        img.write_with_encoder(encoder)
            .map_err(|e| DatasetError::tile_write(path, e))?;
        writer.flush().map_err(|e| DatasetError::tile_write(path, e))
    } else {
        img.save(path).map_err(|e| DatasetError::tile_write(path, e))
    }
}

/// Gradient test raster, handy for checking crops by pixel value
pub fn create_test_raster(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x / 256) % 256) as u8]);
    }
    img
}
