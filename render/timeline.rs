/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Default timeline renderer: occupancy curves with optional counter overlays,
//! encoded as `timeline.png`.

use std::collections::BTreeMap;
use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::Serialize;

use super::{DiagramRenderer, DrawInfo, RenderError, RenderOutput, RenderSelection, TimelineVariant};
use traceview_core::assets::TIMELINE_IMAGE;

const DEFAULT_WIDTH: u32 = 1200;
const DEFAULT_HEIGHT: u32 = 320;
const MARGIN: u32 = 8;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS: Rgba<u8> = Rgba([160, 160, 160, 255]);
const OVERLAY: Rgba<u8> = Rgba([220, 40, 40, 255]);
const ENGINE_PALETTE: [Rgba<u8>; 6] = [
    Rgba([31, 119, 180, 255]),
    Rgba([255, 127, 14, 255]),
    Rgba([44, 160, 44, 255]),
    Rgba([148, 103, 189, 255]),
    Rgba([140, 86, 75, 255]),
    Rgba([23, 190, 207, 255]),
];

/// Toggles the front-end offers, written as `graph_options.json`.
#[derive(Debug, Serialize)]
struct TimelineOptions<'a> {
    variants: [TimelineVariant; 2],
    variant: TimelineVariant,
    engines: usize,
    counters: &'a [String],
    overlays: Vec<bool>,
    image: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TimelineRenderer {
    width: u32,
    height: u32,
}

impl TimelineRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(2 * MARGIN + 2),
            height: height.max(2 * MARGIN + 2),
        }
    }

    fn plot(&self, draw: &DrawInfo, selection: &RenderSelection) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);
        let frame = Frame::new(self.width, self.height);
        frame.axes(&mut canvas);

        match selection.variant {
            TimelineVariant::PerEngine => {
                let peak = peak(draw.timelines.iter().flatten().copied());
                for (engine, samples) in draw.timelines.iter().enumerate() {
                    let colour = ENGINE_PALETTE[engine % ENGINE_PALETTE.len()];
                    frame.polyline(&mut canvas, &indexed(samples), peak, colour);
                }
            }
            TimelineVariant::Aggregate => {
                let total = aggregate(&draw.timelines);
                let peak = peak(total.iter().copied());
                frame.polyline(&mut canvas, &indexed(&total), peak, ENGINE_PALETTE[0]);
            }
        }

        let end_time = draw
            .events
            .iter()
            .flatten()
            .map(|sample| sample.time)
            .max()
            .unwrap_or(0) as f64;
        for counter in 0..draw.counter_names.len() {
            if !selection.overlay_enabled(counter) {
                continue;
            }
            let mut points: Vec<(f64, f64)> = draw
                .events
                .iter()
                .flatten()
                .filter_map(|sample| {
                    let value = *sample.values.get(counter)?;
                    let x = if end_time > 0.0 { sample.time as f64 / end_time } else { 0.0 };
                    Some((x, value))
                })
                .collect();
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let peak = peak(points.iter().map(|(_, value)| *value));
            frame.polyline(&mut canvas, &points, peak, OVERLAY);
        }

        canvas
    }
}

impl Default for TimelineRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl DiagramRenderer for TimelineRenderer {
    fn render(
        &self,
        draw: &DrawInfo,
        selection: &RenderSelection,
    ) -> Result<RenderOutput, RenderError> {
        let options = TimelineOptions {
            variants: [TimelineVariant::PerEngine, TimelineVariant::Aggregate],
            variant: selection.variant,
            engines: draw.timelines.len(),
            counters: &draw.counter_names,
            overlays: (0..draw.counter_names.len())
                .map(|counter| selection.overlay_enabled(counter))
                .collect(),
            image: TIMELINE_IMAGE,
        };
        let options_json =
            serde_json::to_vec(&options).map_err(|e| RenderError::Options(e.to_string()))?;

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(self.plot(draw, selection))
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        let mut images = BTreeMap::new();
        images.insert(TIMELINE_IMAGE.to_string(), cursor.into_inner());
        Ok(RenderOutput {
            options_json,
            images,
        })
    }
}

/// Plot area inside the margins; x in `[0, 1]`, y in `[0, peak]`.
struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn new(width: u32, height: u32) -> Self {
        Self {
            left: f64::from(MARGIN),
            top: f64::from(MARGIN),
            width: f64::from(width - 2 * MARGIN - 1),
            height: f64::from(height - 2 * MARGIN - 1),
        }
    }

    fn to_pixel(&self, x: f64, y: f64, peak: f64) -> (i64, i64) {
        let y = if peak > 0.0 { (y / peak).clamp(0.0, 1.0) } else { 0.0 };
        let px = self.left + x.clamp(0.0, 1.0) * self.width;
        let py = self.top + (1.0 - y) * self.height;
        (px.round() as i64, py.round() as i64)
    }

    fn axes(&self, canvas: &mut RgbaImage) {
        let origin = self.to_pixel(0.0, 0.0, 1.0);
        let x_end = self.to_pixel(1.0, 0.0, 1.0);
        let y_end = self.to_pixel(0.0, 1.0, 1.0);
        line(canvas, origin, x_end, AXIS);
        line(canvas, origin, y_end, AXIS);
    }

    fn polyline(&self, canvas: &mut RgbaImage, points: &[(f64, f64)], peak: f64, colour: Rgba<u8>) {
        let pixels: Vec<(i64, i64)> = points
            .iter()
            .map(|(x, y)| self.to_pixel(*x, *y, peak))
            .collect();
        match pixels.as_slice() {
            [] => {}
            [only] => plot(canvas, *only, colour),
            _ => {
                for pair in pixels.windows(2) {
                    line(canvas, pair[0], pair[1], colour);
                }
            }
        }
    }
}

fn indexed(samples: &[f64]) -> Vec<(f64, f64)> {
    let span = samples.len().saturating_sub(1).max(1) as f64;
    samples
        .iter()
        .enumerate()
        .map(|(index, value)| (index as f64 / span, *value))
        .collect()
}

fn aggregate(timelines: &[Vec<f64>]) -> Vec<f64> {
    let len = timelines.iter().map(Vec::len).max().unwrap_or(0);
    (0..len)
        .map(|index| timelines.iter().filter_map(|samples| samples.get(index)).sum())
        .collect()
}

fn peak(values: impl Iterator<Item = f64>) -> f64 {
    values.filter(|value| value.is_finite()).fold(0.0, f64::max)
}

fn plot(canvas: &mut RgbaImage, (x, y): (i64, i64), colour: Rgba<u8>) {
    if x >= 0
        && y >= 0
        && (x as u64) < u64::from(canvas.width())
        && (y as u64) < u64::from(canvas.height())
    {
        canvas.put_pixel(x as u32, y as u32, colour);
    }
}

/// Bresenham line, clipped to the canvas.
fn line(canvas: &mut RgbaImage, from: (i64, i64), to: (i64, i64), colour: Rgba<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let step_x = if x < to.0 { 1 } else { -1 };
    let step_y = if y < to.1 { 1 } else { -1 };
    let mut error = dx + dy;
    loop {
        plot(canvas, (x, y), colour);
        if (x, y) == to {
            break;
        }
        let doubled = 2 * error;
        if doubled >= dy {
            error += dy;
            x += step_x;
        }
        if doubled <= dx {
            error += dx;
            y += step_y;
        }
    }
}
