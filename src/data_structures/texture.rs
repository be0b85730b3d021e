//! Decoded 2D textures living on the device.
//!
//! A [`Texture`] is usually created from encoded image bytes (PNG, JPEG or
//! BMP) via [`from_bytes`](Texture::from_bytes) and handed to a drawable as
//! its `"texture"` argument.

use anyhow::*;
use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

use crate::device::{GraphicsDevice, TextureId};

#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Decode `bytes` and upload them as RGBA8.
    ///
    /// `format` is a file extension such as `"png"`. Without it the format is
    /// guessed from the data.
    pub fn from_bytes(
        device: &mut dyn GraphicsDevice,
        bytes: &[u8],
        format: Option<&str>,
    ) -> Result<Self> {
        let img = match format {
            None => image::load_from_memory(bytes)?,
            Some(fmt) => {
                let format = ImageFormat::from_extension(fmt)
                    .ok_or_else(|| anyhow!("unknown image format `{fmt}`"))?;
                load_from_memory_with_format(bytes, format)?
            }
        };
        Self::from_image(device, &img)
    }

    pub fn from_image(device: &mut dyn GraphicsDevice, img: &image::DynamicImage) -> Result<Self> {
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        let id = device.create_texture(width, height, &rgba)?;
        log::debug!("uploaded {width}x{height} texture {id:?}");
        Ok(Self { id, width, height })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.delete_texture(self.id);
    }
}
