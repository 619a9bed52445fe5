//! Rendering geometry math
//!
//! Pure functions turning viewport size, device pixel ratio and the manual
//! override into the logical stream resolution and the style applied to
//! the media surface. The async debounce/controller half lives in the
//! client crate; everything here is deterministic and directly testable.

use serde::{Deserialize, Serialize};

use crate::types::Resolution;

/// Viewport snapshot reported by the embedding shell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio,
        }
    }
}

/// Upscaling hint for the media surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingHint {
    /// Nearest-neighbour; used at native or reduced density
    Pixelated,
    /// Interpolated upscale; used on HiDPI surfaces
    Smooth,
}

/// How the surface fills its container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceFit {
    /// Stretch to the container edges
    Fill,
    /// Aspect-preserving letterbox
    Contain,
}

/// Computed style for the media surface
///
/// Logical placement only; the embedding shell translates this into its
/// own styling system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceStyle {
    /// Display width of the surface in CSS pixels
    pub width: f64,
    /// Display height of the surface in CSS pixels
    pub height: f64,
    /// Horizontal letterbox offset inside the container
    pub offset_x: f64,
    /// Vertical letterbox offset inside the container
    pub offset_y: f64,
    pub fit: SurfaceFit,
    pub hint: RenderingHint,
}

/// Round down to the nearest even value.
///
/// Encoders require even dimensions; odd values would be rejected by the
/// server pipeline.
pub fn round_down_even(value: u32) -> u32 {
    value & !1
}

/// Density applied to logical dimension math.
///
/// Manual mode and CSS scaling both pin the stream to a 1:1 pixel mapping;
/// otherwise the surface follows the device pixel ratio.
pub fn effective_dpr(manual_mode: bool, use_css_scaling: bool, device_pixel_ratio: f64) -> f64 {
    if manual_mode || use_css_scaling {
        1.0
    } else {
        device_pixel_ratio
    }
}

/// Logical stream resolution for a target size at the given density.
///
/// Both dimensions are always even.
pub fn logical_resolution(target_width: f64, target_height: f64, dpr: f64) -> Resolution {
    let width = round_down_even((target_width * dpr).floor().max(0.0) as u32);
    let height = round_down_even((target_height * dpr).floor().max(0.0) as u32);
    Resolution::new(width, height)
}

/// Upscaling hint for a given effective density.
pub fn rendering_hint(effective_dpr: f64) -> RenderingHint {
    if effective_dpr <= 1.0 {
        RenderingHint::Pixelated
    } else {
        RenderingHint::Smooth
    }
}

/// Style for a manually pinned surface inside a container.
///
/// With `scale_to_fit` the target aspect ratio is preserved and the
/// shorter axis is letterboxed; otherwise the surface stretches to the
/// container.
pub fn manual_style(
    container_width: f64,
    container_height: f64,
    target: Resolution,
    scale_to_fit: bool,
    hint: RenderingHint,
) -> SurfaceStyle {
    if !scale_to_fit || target.width == 0 || target.height == 0 {
        return SurfaceStyle {
            width: container_width,
            height: container_height,
            offset_x: 0.0,
            offset_y: 0.0,
            fit: SurfaceFit::Fill,
            hint,
        };
    }

    let container_ratio = container_width / container_height;
    let target_ratio = target.aspect_ratio();
    let (width, height) = if container_ratio > target_ratio {
        // Container is wider than the stream: pillarbox
        (container_height * target_ratio, container_height)
    } else {
        // Container is taller than the stream: letterbox
        (container_width, container_width / target_ratio)
    };

    SurfaceStyle {
        width,
        height,
        offset_x: (container_width - width) / 2.0,
        offset_y: (container_height - height) / 2.0,
        fit: SurfaceFit::Contain,
        hint,
    }
}

/// Style for a surface tracking the window at native size.
pub fn window_style(viewport: &Viewport, hint: RenderingHint) -> SurfaceStyle {
    SurfaceStyle {
        width: viewport.width,
        height: viewport.height,
        offset_x: 0.0,
        offset_y: 0.0,
        fit: SurfaceFit::Fill,
        hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_down_even() {
        assert_eq!(round_down_even(1920), 1920);
        assert_eq!(round_down_even(1921), 1920);
        assert_eq!(round_down_even(1), 0);
        assert_eq!(round_down_even(0), 0);
    }

    #[test]
    fn test_logical_dimensions_always_even() {
        for (w, h, dpr) in [
            (1920.0, 1080.0, 1.0),
            (1366.0, 768.0, 1.25),
            (1280.5, 719.5, 2.0),
            (1001.0, 751.0, 1.5),
        ] {
            let res = logical_resolution(w, h, dpr);
            assert_eq!(res.width % 2, 0, "{w}x{h}@{dpr}");
            assert_eq!(res.height % 2, 0, "{w}x{h}@{dpr}");
        }
    }

    #[test]
    fn test_effective_dpr_overrides() {
        assert_eq!(effective_dpr(false, false, 2.0), 2.0);
        assert_eq!(effective_dpr(true, false, 2.0), 1.0);
        assert_eq!(effective_dpr(false, true, 2.0), 1.0);
    }

    #[test]
    fn test_rendering_hint_threshold() {
        assert_eq!(rendering_hint(1.0), RenderingHint::Pixelated);
        assert_eq!(rendering_hint(0.75), RenderingHint::Pixelated);
        assert_eq!(rendering_hint(1.5), RenderingHint::Smooth);
    }

    #[test]
    fn test_manual_fill_stretches() {
        let style = manual_style(
            1600.0,
            900.0,
            Resolution::new(1920, 1080),
            false,
            RenderingHint::Pixelated,
        );
        assert_eq!(style.fit, SurfaceFit::Fill);
        assert_eq!(style.width, 1600.0);
        assert_eq!(style.height, 900.0);
        assert_eq!(style.offset_x, 0.0);
    }

    #[test]
    fn test_scale_to_fit_pillarboxes_wide_container() {
        // 21:9 container, 16:9 stream: bars left and right
        let style = manual_style(
            2520.0,
            1080.0,
            Resolution::new(1920, 1080),
            true,
            RenderingHint::Smooth,
        );
        assert_eq!(style.fit, SurfaceFit::Contain);
        assert!((style.height - 1080.0).abs() < 1e-6);
        assert!((style.width - 1920.0).abs() < 1e-6);
        assert!((style.offset_x - 300.0).abs() < 1e-6);
        assert_eq!(style.offset_y, 0.0);
    }

    #[test]
    fn test_scale_to_fit_letterboxes_tall_container() {
        // 4:3 container, 16:9 stream: bars top and bottom
        let style = manual_style(
            1600.0,
            1200.0,
            Resolution::new(1920, 1080),
            true,
            RenderingHint::Smooth,
        );
        assert_eq!(style.fit, SurfaceFit::Contain);
        assert!((style.width - 1600.0).abs() < 1e-6);
        assert!((style.height - 900.0).abs() < 1e-6);
        assert_eq!(style.offset_x, 0.0);
        assert!((style.offset_y - 150.0).abs() < 1e-6);
    }
}
