use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;

use shadertoy::{FilterMode, SamplerConfig};

/// Decoded channel image ready for upload: level 0 first, then the mip chain
/// when the sampler asks for one.
#[derive(Debug, Clone)]
pub struct TextureData {
    levels: Vec<RgbaImage>,
}

impl TextureData {
    /// Decodes `bytes` to RGBA8, flips rows when `vflip` is set, and builds the
    /// mip chain for [`FilterMode::Mipmap`].
    pub fn decode(bytes: &[u8], sampler: &SamplerConfig) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).context("decoding channel image")?;
        let mut base = decoded.to_rgba8();
        if base.width() == 0 || base.height() == 0 {
            anyhow::bail!("channel image has no pixels");
        }
        if sampler.vflip {
            imageops::flip_vertical_in_place(&mut base);
        }
        let levels = if sampler.filter == FilterMode::Mipmap {
            mip_chain(base)
        } else {
            vec![base]
        };
        Ok(Self { levels })
    }

    pub fn width(&self) -> u32 {
        self.levels[0].width()
    }

    pub fn height(&self) -> u32 {
        self.levels[0].height()
    }

    pub fn levels(&self) -> &[RgbaImage] {
        &self.levels
    }

    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

fn mip_chain(base: RgbaImage) -> Vec<RgbaImage> {
    let mut levels = vec![base];
    loop {
        let previous = &levels[levels.len() - 1];
        if previous.width() == 1 && previous.height() == 1 {
            break;
        }
        let width = (previous.width() / 2).max(1);
        let height = (previous.height() / 2).max(1);
        let next = imageops::resize(previous, width, height, FilterType::Triangle);
        levels.push(next);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |_, y| {
            if y == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decodes_single_level_without_mipmaps() {
        let data = TextureData::decode(&png(8, 4), &SamplerConfig::default()).unwrap();
        assert_eq!((data.width(), data.height()), (8, 4));
        assert_eq!(data.mip_level_count(), 1);
        assert_eq!(data.levels()[0].get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn vflip_moves_top_row_to_bottom() {
        let sampler = SamplerConfig {
            vflip: true,
            ..SamplerConfig::default()
        };
        let data = TextureData::decode(&png(2, 3), &sampler).unwrap();
        assert_eq!(data.levels()[0].get_pixel(0, 2), &Rgba([255, 0, 0, 255]));
        assert_eq!(data.levels()[0].get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn mipmap_filter_builds_full_chain() {
        let sampler = SamplerConfig {
            filter: FilterMode::Mipmap,
            ..SamplerConfig::default()
        };
        let data = TextureData::decode(&png(8, 2), &sampler).unwrap();
        let sizes: Vec<_> = data
            .levels()
            .iter()
            .map(|level| (level.width(), level.height()))
            .collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(TextureData::decode(b"not an image", &SamplerConfig::default()).is_err());
    }
}
