use anyhow::Context;
use common::{MonitorDescriptor, SpanwallError};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::status::StatusLog;

pub const CANVAS_FILE_NAME: &str = "spanwall_canvas.png";

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Bounding box of every monitor rectangle in virtual-desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CanvasBounds {
    /// Union of all monitor rectangles, `None` for an empty set
    pub fn of(monitors: &[MonitorDescriptor]) -> Option<Self> {
        let min_x = monitors.iter().map(|m| m.x).min()?;
        let min_y = monitors.iter().map(|m| m.y).min()?;
        let max_x = monitors.iter().map(|m| m.right()).max()?;
        let max_y = monitors.iter().map(|m| m.bottom()).max()?;

        Some(Self {
            x: min_x,
            y: min_y,
            width: u32::try_from(max_x - i64::from(min_x)).ok()?,
            height: u32::try_from(max_y - i64::from(min_y)).ok()?,
        })
    }

    /// Canvas-local position of a monitor's top-left corner
    pub fn local_origin(&self, monitor: &MonitorDescriptor) -> (i64, i64) {
        let (x, y) = monitor.origin();
        (i64::from(x) - i64::from(self.x), i64::from(y) - i64::from(self.y))
    }
}

/// Size to scale an image to so it covers the target without distortion.
///
/// One side matches the target exactly, the other overflows (or matches).
pub fn cover_fit_size(src: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = (u64::from(src.0.max(1)), u64::from(src.1.max(1)));
    let (dst_w, dst_h) = (u64::from(target.0), u64::from(target.1));

    // Compare aspect ratios without floating point
    if src_w * dst_h > dst_w * src_h {
        // Image is wider, match height and crop the sides
        let width = (dst_h * src_w / src_h).max(dst_w);
        (clamp_u32(width), target.1)
    } else {
        // Image is taller (or equal), match width and crop top/bottom
        let height = (dst_w * src_h / src_w).max(dst_h);
        (target.0, clamp_u32(height))
    }
}

fn clamp_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Stitches per-monitor images into one canvas spanning the virtual desktop
pub struct Compositor {
    output_path: PathBuf,
}

impl Compositor {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    /// Fixed, reusable canvas location in the temp directory
    pub fn default_output_path() -> PathBuf {
        std::env::temp_dir().join(CANVAS_FILE_NAME)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Render the canvas and write it to the output path
    pub fn composite(
        &self,
        monitors: &[MonitorDescriptor],
        selections: &BTreeMap<String, String>,
        status: &StatusLog,
    ) -> Result<PathBuf, SpanwallError> {
        let canvas = self.render(monitors, selections, status)?;

        DynamicImage::ImageRgba8(canvas)
            .to_rgb8()
            .save_with_format(&self.output_path, ImageFormat::Png)
            .map_err(|e| {
                SpanwallError::Io(format!(
                    "Error saving stitched wallpaper {}: {}",
                    self.output_path.display(),
                    e
                ))
            })?;

        log::debug!("Wrote canvas to {}", self.output_path.display());
        Ok(self.output_path.clone())
    }

    /// Render the canvas in memory.
    ///
    /// Monitors without a selection, or whose image cannot be loaded, keep
    /// the black background.
    pub fn render(
        &self,
        monitors: &[MonitorDescriptor],
        selections: &BTreeMap<String, String>,
        status: &StatusLog,
    ) -> Result<RgbaImage, SpanwallError> {
        let bounds = CanvasBounds::of(monitors)
            .ok_or_else(|| SpanwallError::NotFound("no monitors to composite".to_string()))?;

        let start = std::time::Instant::now();
        let mut canvas = ImageBuffer::from_pixel(bounds.width, bounds.height, BACKGROUND);

        // Decode and scale in parallel, paste in enumeration order
        let regions: Vec<_> = monitors
            .par_iter()
            .filter_map(|monitor| {
                let path = selections.get(&monitor.name)?;
                if !Path::new(path).exists() {
                    log::debug!(
                        "{}: selected image {} is missing, leaving region black",
                        monitor.name,
                        path
                    );
                    return None;
                }
                let (width, height) = monitor.size();
                Some((monitor, path, fill_region(Path::new(path), width, height)))
            })
            .collect();

        for (monitor, path, region) in regions {
            match region {
                Ok(region) => {
                    let (x, y) = bounds.local_origin(monitor);
                    image::imageops::replace(&mut canvas, &region, x, y);
                }
                Err(e) => {
                    status.emit(format!("Error processing image {}: {}", path, e));
                }
            }
        }

        log::info!(
            "Composited {}x{} canvas for {} monitor(s) in {:.2}ms",
            bounds.width,
            bounds.height,
            monitors.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(canvas)
    }
}

/// Load `path` and cover-fit it to exactly `width` x `height`
fn fill_region(path: &Path, width: u32, height: u32) -> Result<RgbaImage, SpanwallError> {
    let image = image::open(path)
        .map_err(|e| SpanwallError::ImageDecode(format!("{}: {}", path.display(), e)))?;

    let (scale_width, scale_height) = cover_fit_size((image.width(), image.height()), (width, height));

    let resized = if (scale_width, scale_height) == (image.width(), image.height()) {
        image.to_rgba8()
    } else {
        resize_image_fast(&image, scale_width, scale_height)
            .map_err(|e| SpanwallError::ImageDecode(format!("{}: {:#}", path.display(), e)))?
    };

    // Center crop
    let x_offset = scale_width.saturating_sub(width) / 2;
    let y_offset = scale_height.saturating_sub(height) / 2;

    Ok(image::imageops::crop_imm(&resized, x_offset, y_offset, width, height).to_image())
}

/// Lanczos resize using fast_image_resize
fn resize_image_fast(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> anyhow::Result<RgbaImage> {
    use fast_image_resize as fr;

    let src_image = image.to_rgba8();
    let (src_width, src_height) = src_image.dimensions();

    let src = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        src_image.into_raw(),
        fr::PixelType::U8x4,
    )
    .context("Failed to create source image")?;

    let mut dst = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3)),
        )
        .context("Failed to resize image")?;

    ImageBuffer::from_raw(target_width, target_height, dst.into_vec())
        .context("Failed to create output image buffer")
}
