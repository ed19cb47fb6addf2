//! Offline map export

use std::path::Path;

use glam::Vec2;
use image::{ImageBuffer, ImageEncoder, Luma};
use serde::{Deserialize, Serialize};

use super::config::GenerationMode;
use crate::core::{Error, Result};
use crate::graph::value::ValueRange;

/// What to export and where
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    /// Node to read; `None` exports the graph's height output
    pub node: Option<String>,
    /// Samples per side
    pub resolution: u32,
    /// World size covered
    pub scale: f32,
    pub seed: i32,
    /// XZ center of the exported square
    pub offset: Vec2,
    pub mode: GenerationMode,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            node: None,
            resolution: 513,
            scale: 1024.0,
            seed: 0,
            offset: Vec2::ZERO,
            mode: GenerationMode::WorldRelative,
        }
    }
}

/// A square map read back from a completed tree, row-major
#[derive(Clone, Debug)]
pub struct ExportedMap {
    pub resolution: u32,
    pub values: Vec<f32>,
    /// Exact range of `values`
    pub range: ValueRange,
}

impl ExportedMap {
    pub fn new(resolution: u32, values: Vec<f32>) -> Self {
        let range = values.iter().fold(ValueRange::EMPTY, |mut r, &v| {
            r.include(v);
            r
        });
        Self { resolution, values, range }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.resolution || y >= self.resolution {
            return None;
        }
        self.values.get((y * self.resolution + x) as usize).copied()
    }

    /// Values stretched over the full 16-bit range
    pub fn normalized_u16(&self) -> Vec<u16> {
        self.values
            .iter()
            .map(|&v| (self.range.normalize(v) * u16::MAX as f32).round() as u16)
            .collect()
    }

    pub fn to_luma16(&self) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>> {
        ImageBuffer::from_raw(self.resolution, self.resolution, self.normalized_u16())
            .ok_or_else(|| Error::Export(format!("{} values do not fill a {}^2 image", self.values.len(), self.resolution)))
    }

    /// 16-bit grayscale PNG bytes
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let image = self.to_luma16()?;
        let mut png_data = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut png_data);
        encoder.write_image(
            bytemuck::cast_slice(image.as_raw()),
            self.resolution,
            self.resolution,
            image::ExtendedColorType::L16,
        )?;
        Ok(png_data)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode_png()?)?;
        log::info!(
            "Exported {}x{} map to {} (range {:.2}..{:.2})",
            self.resolution,
            self.resolution,
            path.display(),
            self.range.min,
            self.range.max
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_spans_full_range() {
        let map = ExportedMap::new(2, vec![-1.0, 0.0, 1.0, 3.0]);
        assert_eq!(map.range, ValueRange::new(-1.0, 3.0));
        assert_eq!(map.normalized_u16(), vec![0, 16384, 32768, u16::MAX]);
        assert_eq!(map.get(1, 1), Some(3.0));
        assert_eq!(map.get(2, 0), None);
    }

    #[test]
    fn test_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("height.png");
        let map = ExportedMap::new(3, (0..9).map(|v| v as f32).collect());
        map.save_png(&path).unwrap();

        let loaded = image::open(&path).unwrap().into_luma16();
        assert_eq!(loaded.dimensions(), (3, 3));
        assert_eq!(loaded.get_pixel(0, 0)[0], 0);
        assert_eq!(loaded.get_pixel(2, 2)[0], u16::MAX);
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let map = ExportedMap { resolution: 4, values: vec![0.0; 3], range: ValueRange::point(0.0) };
        assert!(matches!(map.to_luma16(), Err(Error::Export(_))));
    }
}
