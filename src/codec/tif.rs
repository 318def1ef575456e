//! Single-page grayscale TIFF.

use std::io::Cursor;

use ndarray::{Array2, ArrayView2};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::ColorType;

use crate::error::Imars3dError;
use crate::models::SampleFormat;

/// Decode the first page of a TIFF file.
pub fn decode(bytes: &[u8]) -> Result<(Array2<f32>, SampleFormat), String> {
    let mut decoder = Decoder::new(Cursor::new(bytes)).map_err(|err| err.to_string())?;
    let (width, height) = decoder.dimensions().map_err(|err| err.to_string())?;
    match decoder.colortype().map_err(|err| err.to_string())? {
        ColorType::Gray(_) => {}
        other => return Err(format!("unsupported color type {other:?}, expected grayscale")),
    }
    let (samples, format): (Vec<f32>, SampleFormat) =
        match decoder.read_image().map_err(|err| err.to_string())? {
            DecodingResult::U8(buf) => (
                buf.into_iter().map(f32::from).collect(),
                SampleFormat::Uint8,
            ),
            DecodingResult::U16(buf) => (
                buf.into_iter().map(f32::from).collect(),
                SampleFormat::Uint16,
            ),
            DecodingResult::U32(buf) => (
                buf.into_iter().map(|v| v as f32).collect(),
                SampleFormat::Uint32,
            ),
            DecodingResult::F32(buf) => (buf, SampleFormat::Float32),
            DecodingResult::F64(buf) => (
                buf.into_iter().map(|v| v as f32).collect(),
                SampleFormat::Float64,
            ),
            _ => return Err("unsupported sample type".to_string()),
        };
    Array2::from_shape_vec((height as usize, width as usize), samples)
        .map(|array| (array, format))
        .map_err(|err| err.to_string())
}

/// Encode an image as an uncompressed grayscale TIFF.
pub fn encode(data: ArrayView2<f32>, format: SampleFormat) -> Result<Vec<u8>, Imars3dError> {
    let (height, width) = data.dim();
    let (width, height) = (u32::try_from(width)?, u32::try_from(height)?);
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf)?;
        match format {
            SampleFormat::Uint8 => encoder.write_image::<colortype::Gray8>(
                width,
                height,
                &super::quantize_all::<u8>(data),
            )?,
            SampleFormat::Uint16 => encoder.write_image::<colortype::Gray16>(
                width,
                height,
                &super::quantize_all::<u16>(data),
            )?,
            SampleFormat::Uint32 => encoder.write_image::<colortype::Gray32>(
                width,
                height,
                &super::quantize_all::<u32>(data),
            )?,
            SampleFormat::Float32 => {
                let samples: Vec<f32> = data.iter().copied().collect();
                encoder.write_image::<colortype::Gray32Float>(width, height, &samples)?
            }
            SampleFormat::Float64 => {
                let samples: Vec<f64> = data.iter().map(|&v| v as f64).collect();
                encoder.write_image::<colortype::Gray64Float>(width, height, &samples)?
            }
        };
    }
    Ok(buf.into_inner())
}
