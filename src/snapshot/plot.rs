use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use image::{Rgb, RgbImage};
use nalgebra::Vector3;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Fraction of the canvas left empty on each side of the plot area.
const MARGIN: f64 = 0.1;
const TICK_LENGTH: i64 = 6;

/// Look of a position scatter plot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlotStyle {
    /// Side length of the square canvas in inches.
    pub size: f64,
    pub dpi: f64,
    /// Both axes span `-extent..=extent` kpc.
    pub extent: f64,
    /// Marker area in pt^2.
    pub marker_area: f64,
    pub tick_spacing: f64,
    pub color: Rgb<u8>,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            size: 14.,
            dpi: 100.,
            extent: 300.,
            marker_area: 5.,
            tick_spacing: 100.,
            color: Rgb([31, 119, 180]),
        }
    }
}

impl PlotStyle {
    fn side_pixels(&self) -> u32 {
        (self.size * self.dpi).round().max(1.) as u32
    }

    fn marker_radius(&self) -> f64 {
        self.marker_area.sqrt() / 2. * self.dpi / 72.
    }
}

/// One self-contained x-y scatter plot.
///
/// Every figure starts from a blank canvas; nothing carries over between
/// figures. The axes are a frame with ticks only: no axis labels or tick
/// numbers are drawn, both axes are x and y in kpc.
pub struct Figure {
    image: RgbImage,
    style: PlotStyle,
    /// Plot area in pixels: left, top, side length.
    left: f64,
    top: f64,
    side: f64,
}

impl Figure {
    #[must_use]
    pub fn new(style: PlotStyle) -> Self {
        let pixels = style.side_pixels();
        let side = f64::from(pixels) * (1. - 2. * MARGIN);
        let offset = f64::from(pixels) * MARGIN;

        let mut figure = Self {
            image: RgbImage::from_pixel(pixels, pixels, WHITE),
            style,
            left: offset,
            top: offset,
            side,
        };
        figure.draw_frame();
        figure
    }

    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Pixel coordinates of a point in kpc, `None` outside the axes.
    fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let extent = self.style.extent;
        if !(x.abs() <= extent && y.abs() <= extent) {
            return None;
        }

        let px = self.left + (x + extent) / (2. * extent) * self.side;
        let py = self.top + (extent - y) / (2. * extent) * self.side;
        Some((px, py))
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        let inside = (0..i64::from(self.image.width())).contains(&x)
            && (0..i64::from(self.image.height())).contains(&y);
        if inside {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    fn draw_frame(&mut self) {
        let (left, top) = (self.left.round() as i64, self.top.round() as i64);
        let (right, bottom) = (
            (self.left + self.side).round() as i64,
            (self.top + self.side).round() as i64,
        );

        for x in left..=right {
            self.put(x, top, BLACK);
            self.put(x, bottom, BLACK);
        }
        for y in top..=bottom {
            self.put(left, y, BLACK);
            self.put(right, y, BLACK);
        }

        let extent = self.style.extent;
        let spacing = self.style.tick_spacing;
        if !(spacing > 0.) {
            return;
        }
        let mut tick = -(extent / spacing).floor() * spacing;
        while tick <= extent {
            if let Some((px, py)) = self.to_pixel(tick, tick) {
                let (px, py) = (px.round() as i64, py.round() as i64);
                for d in 1..=TICK_LENGTH {
                    self.put(px, bottom + d, BLACK);
                    self.put(left - d, py, BLACK);
                }
            }
            tick += spacing;
        }
    }

    /// Draw every position inside the axes as a filled disc, returning how
    /// many were visible.
    pub fn scatter(&mut self, positions: &[Vector3<f64>]) -> usize {
        let radius = self.style.marker_radius();
        let reach = radius.ceil() as i64;
        let color = self.style.color;

        let mut visible = 0;
        for pos in positions {
            let Some((px, py)) = self.to_pixel(pos.x, pos.y) else {
                continue;
            };
            visible += 1;

            let (cx, cy) = (px.floor() as i64, py.floor() as i64);
            self.put(cx, cy, color);
            for dy in -reach..=reach {
                for dx in -reach..=reach {
                    let ddx = (cx + dx) as f64 + 0.5 - px;
                    let ddy = (cy + dy) as f64 + 0.5 - py;
                    if ddx * ddx + ddy * ddy <= radius * radius {
                        self.put(cx + dx, cy + dy, color);
                    }
                }
            }
        }
        visible
    }

    /// Write the figure, consuming it. The format follows the file extension.
    pub fn save(self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.image
            .save(path)
            .wrap_err_with(|| format!("failed to save plot {}", path.display()))
    }
}
