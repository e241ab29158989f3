use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::provider::{ImageBytes, ImageProvider, ProviderRequest, ProviderResponse};

const DEFAULT_SIDE: u32 = 256;
const MAX_SIDE: u32 = 2048;

/// Offline provider: answers every request with a flat PNG tinted by the prompt.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let (width, height) = request
            .images
            .first()
            .and_then(|input| image::load_from_memory(&input.bytes).ok())
            .map(|decoded| (decoded.width(), decoded.height()))
            .unwrap_or((DEFAULT_SIDE, DEFAULT_SIDE));
        let bytes = render_png(
            width.clamp(1, MAX_SIDE),
            height.clamp(1, MAX_SIDE),
            color_from_prompt(&request.prompt),
        )?;

        Ok(ProviderResponse {
            text: format!("dryrun image for: {}", request.prompt),
            images: vec![ImageBytes {
                bytes,
                mime_type: Some("image/png".to_string()),
            }],
            warnings: Vec::new(),
        })
    }
}

fn render_png(width: u32, height: u32, (r, g, b): (u8, u8, u8)) -> Result<Vec<u8>> {
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("dryrun png encode failed")?;
    Ok(bytes)
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use image::GenericImageView;

    use crate::provider::{ImageProvider, InlineImage, ProviderRequest};

    use super::{color_from_prompt, render_png, DryrunProvider};

    #[test]
    fn generate_returns_prompt_tinted_png() -> anyhow::Result<()> {
        let response =
            DryrunProvider.generate(&ProviderRequest::text("dryrun-image-1", "a lighthouse"))?;
        assert_eq!(response.text, "dryrun image for: a lighthouse");
        assert_eq!(response.images.len(), 1);

        let decoded = image::load_from_memory(&response.images[0].bytes)?;
        assert_eq!(decoded.dimensions(), (256, 256));
        let (r, g, b) = color_from_prompt("a lighthouse");
        assert_eq!(decoded.to_rgb8().get_pixel(3, 7).0, [r, g, b]);
        Ok(())
    }

    #[test]
    fn edit_keeps_input_dimensions() -> anyhow::Result<()> {
        let input = render_png(40, 24, (1, 2, 3))?;
        let mut request = ProviderRequest::text("dryrun-image-1", "recolor");
        request.images.push(InlineImage {
            mime_type: "image/png".to_string(),
            bytes: input,
        });
        let response = DryrunProvider.generate(&request)?;
        let decoded = image::load_from_memory(&response.images[0].bytes)?;
        assert_eq!(decoded.dimensions(), (40, 24));
        Ok(())
    }

    #[test]
    fn undecodable_input_falls_back_to_default_size() -> anyhow::Result<()> {
        let mut request = ProviderRequest::text("dryrun-image-1", "recolor");
        request.images.push(InlineImage {
            mime_type: "image/png".to_string(),
            bytes: b"not an image".to_vec(),
        });
        let response = DryrunProvider.generate(&request)?;
        let decoded = image::load_from_memory(&response.images[0].bytes)?;
        assert_eq!(decoded.dimensions(), (256, 256));
        Ok(())
    }
}
