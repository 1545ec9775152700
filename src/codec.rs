use crate::error::{Error, Result};
use crate::grid::{row_major, PixelGrid};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::ColorType;

/// Reads and writes pixel grids.
///
/// Workers only see this trait, so the file format can be swapped (or
/// faked in tests) without touching the pool.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, path: &Path) -> Result<PixelGrid>;
    fn encode(&self, grid: &PixelGrid, path: &Path) -> Result<()>;
}

/// Single-channel, uncompressed TIFF
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffCodec;

impl ImageCodec for TiffCodec {
    fn decode(&self, path: &Path) -> Result<PixelGrid> {
        let decode_err = |reason: String| Error::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| decode_err(e.to_string()))?;
        let (width, height) = decoder.dimensions().map_err(|e| decode_err(e.to_string()))?;
        let color = decoder.colortype().map_err(|e| decode_err(e.to_string()))?;
        if !matches!(color, ColorType::Gray(_)) {
            log::debug!("{} is {:?}, reducing to 16-bit luma", path.display(), color);
            return decode_as_luma(path);
        }

        let shape = (height as usize, width as usize);
        let image = decoder.read_image().map_err(|e| decode_err(e.to_string()))?;
        let grid = match image {
            DecodingResult::U8(v) => Array2::from_shape_vec(shape, v).map(PixelGrid::U8),
            DecodingResult::U16(v) => Array2::from_shape_vec(shape, v).map(PixelGrid::U16),
            DecodingResult::U32(v) => Array2::from_shape_vec(shape, v).map(PixelGrid::U32),
            DecodingResult::I16(v) => Array2::from_shape_vec(shape, v).map(PixelGrid::I16),
            DecodingResult::I32(v) => Array2::from_shape_vec(shape, v).map(PixelGrid::I32),
            DecodingResult::F32(v) => Array2::from_shape_vec(shape, v).map(PixelGrid::F32),
            DecodingResult::F64(v) => Array2::from_shape_vec(shape, v).map(PixelGrid::F64),
            DecodingResult::I8(v) => {
                Array2::from_shape_vec(shape, v.into_iter().map(i16::from).collect()).map(PixelGrid::I16)
            }
            _ => return Err(decode_err("unsupported sample format".into())),
        };
        grid.map_err(|e| decode_err(e.to_string()))
    }

    fn encode(&self, grid: &PixelGrid, path: &Path) -> Result<()> {
        let encode_err = |reason: String| Error::Encode {
            path: path.to_path_buf(),
            reason,
        };

        let (rows, cols) = grid.dim();
        let (width, height) = (cols as u32, rows as u32);
        let mut writer = BufWriter::new(File::create(path).map_err(|e| encode_err(e.to_string()))?);
        let written = {
            let mut encoder = TiffEncoder::new(&mut writer).map_err(|e| encode_err(e.to_string()))?;
            match grid {
                PixelGrid::U8(a) => encoder.write_image::<colortype::Gray8>(width, height, &row_major(a)),
                PixelGrid::U16(a) => encoder.write_image::<colortype::Gray16>(width, height, &row_major(a)),
                PixelGrid::U32(a) => encoder.write_image::<colortype::Gray32>(width, height, &row_major(a)),
                PixelGrid::I16(a) => encoder.write_image::<colortype::GrayI16>(width, height, &row_major(a)),
                PixelGrid::I32(a) => encoder.write_image::<colortype::GrayI32>(width, height, &row_major(a)),
                PixelGrid::F32(a) => encoder.write_image::<colortype::Gray32Float>(width, height, &row_major(a)),
                PixelGrid::F64(a) => encoder.write_image::<colortype::Gray64Float>(width, height, &row_major(a)),
            }
        };
        written.map_err(|e| encode_err(e.to_string()))?;
        writer.flush().map_err(|e| encode_err(e.to_string()))?;
        Ok(())
    }
}

/// Multi-channel TIFFs go through the `image` crate and come back as luma
fn decode_as_luma(path: &Path) -> Result<PixelGrid> {
    let luma = image::open(path)
        .map_err(|e| Error::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .into_luma16();
    let (width, height) = luma.dimensions();
    Array2::from_shape_vec((height as usize, width as usize), luma.into_raw())
        .map(PixelGrid::U16)
        .map_err(|e| Error::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
