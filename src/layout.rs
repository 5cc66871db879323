//! Graph placement: pixel rect in, normalized-device-coordinate geometry out.
//!
//! One sample slot per pixel of rect width. Coordinates are wgpu NDC (Y up),
//! so a plot ratio of 1.0 lands on the rect's top edge.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Pixel-space placement of the graph inside the viewport.
/// `y` is measured from the top of the viewport, matching window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Resolved layout: NDC origin of the rect's bottom-left corner, the X step
/// per sample slot, the NDC height, and the slot count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphLayout {
    origin: Vec2,
    pixel_w: f32,
    graph_h: f32,
    samples: usize,
}

impl Default for GraphLayout {
    fn default() -> Self {
        Self {
            origin: Vec2::ZERO,
            pixel_w: 0.0,
            graph_h: 0.0,
            samples: 0,
        }
    }
}

impl GraphLayout {
    /// Line-list index pattern over [`Self::border_vertices`]: the rect
    /// outline plus a mid-height gridline.
    pub const BORDER_INDICES: [u16; 10] = [0, 1, 1, 2, 2, 3, 3, 0, 4, 5];

    /// Resolve a pixel rect against a viewport. A zero-sized viewport yields
    /// the degenerate layout (no sample slots, no geometry).
    pub fn new(viewport_w: u32, viewport_h: u32, rect: PixelRect) -> Self {
        if viewport_w == 0 || viewport_h == 0 {
            return Self::default();
        }
        let vw = viewport_w as f32;
        let vh = viewport_h as f32;
        Self {
            origin: Vec2::new(
                2.0 * rect.x as f32 / vw - 1.0,
                1.0 - 2.0 * (rect.y + rect.h) as f32 / vh,
            ),
            pixel_w: 2.0 / vw,
            graph_h: 2.0 * rect.h as f32 / vh,
            samples: rect.w as usize,
        }
    }

    /// Number of sample slots (the rect width in pixels).
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// NDC width of one sample slot.
    pub fn pixel_w(&self) -> f32 {
        self.pixel_w
    }

    /// NDC height of the plotting area.
    pub fn graph_h(&self) -> f32 {
        self.graph_h
    }

    /// NDC position of a sample slot at a vertical ratio in [0, 1].
    pub fn point(&self, slot: usize, ratio: f32) -> [f32; 2] {
        [
            self.origin.x + slot as f32 * self.pixel_w,
            self.origin.y + ratio * self.graph_h,
        ]
    }

    /// The six border vertices: rect corners (bottom-left, top-left,
    /// top-right, bottom-right) followed by the mid-height gridline ends.
    pub fn border_vertices(&self) -> [[f32; 2]; 6] {
        let w = self.samples as f32 * self.pixel_w;
        let o = self.origin;
        [
            [o.x, o.y],
            [o.x, o.y + self.graph_h],
            [o.x + w, o.y + self.graph_h],
            [o.x + w, o.y],
            [o.x, o.y + 0.5 * self.graph_h],
            [o.x + w, o.y + 0.5 * self.graph_h],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 0.0001, "{} != {}", a, b);
    }

    #[test]
    fn test_pixel_to_ndc_mapping() {
        let layout = GraphLayout::new(800, 600, PixelRect { x: 10, y: 10, w: 300, h: 150 });
        assert_eq!(layout.samples(), 300);

        // Bottom-left of the rect: 10px from the left, 160px from the top.
        let bl = layout.point(0, 0.0);
        assert_close(bl[0], -0.975);
        assert_close(bl[1], 1.0 - 2.0 * 160.0 / 600.0);

        // Full-ratio point at the last slot reaches the rect's top-right area.
        let tr = layout.point(300, 1.0);
        assert_close(tr[0], -0.975 + 300.0 * 2.0 / 800.0);
        assert_close(tr[1], 1.0 - 2.0 * 10.0 / 600.0);
    }

    #[test]
    fn test_ratio_one_is_above_ratio_zero() {
        let layout = GraphLayout::new(640, 480, PixelRect { x: 0, y: 0, w: 64, h: 48 });
        assert!(layout.point(0, 1.0)[1] > layout.point(0, 0.0)[1]);
    }

    #[test]
    fn test_degenerate_viewport() {
        let layout = GraphLayout::new(0, 0, PixelRect { x: 0, y: 0, w: 100, h: 100 });
        assert_eq!(layout.samples(), 0);
        assert_eq!(layout, GraphLayout::default());
    }

    #[test]
    fn test_border_geometry_shape() {
        let layout = GraphLayout::new(800, 600, PixelRect { x: 0, y: 0, w: 400, h: 300 });
        let verts = layout.border_vertices();
        assert_eq!(verts.len(), 6);
        assert_eq!(GraphLayout::BORDER_INDICES.len(), 10);
        // Outline indices stay within the corner vertices, gridline uses 4/5.
        assert!(GraphLayout::BORDER_INDICES[..8].iter().all(|&i| i < 4));
        assert_eq!(&GraphLayout::BORDER_INDICES[8..], &[4, 5]);
        // Gridline sits halfway up the left edge.
        assert!((verts[4][1] - 0.5 * (verts[0][1] + verts[1][1])).abs() < 0.0001);
    }
}
