//! Threshold-based bean segmentation
//!
//! Beans are assumed darker than the tray they lie on. The grayscale image is
//! split with Otsu's threshold, foreground pixels are grouped into 4-connected
//! components, and each component large enough to be a bean is cropped and
//! outlined with Moore-neighbor tracing.

use image::{GrayImage, RgbImage};
use std::collections::VecDeque;
use tracing::debug;

use super::{BeanSegmenter, Contour, Point, SegmentedBean};

/// Smallest component (pixels) treated as a bean
pub const DEFAULT_MIN_AREA: usize = 100;

/// Components covering more than this share of the image are background
const MAX_COMPONENT_FRACTION: f64 = 0.9;

/// Background margin kept around each cropped bean
const CROP_PADDING: u32 = 2;

/// Clockwise neighbor offsets starting at west (y grows downward)
const NEIGHBORS: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

#[derive(Debug, Clone, Copy)]
pub struct ThresholdSegmenter {
    min_area: usize,
}

impl Default for ThresholdSegmenter {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
        }
    }
}

impl ThresholdSegmenter {
    pub fn with_min_area(mut self, min_area: usize) -> Self {
        self.min_area = min_area.max(1);
        self
    }
}

impl BeanSegmenter for ThresholdSegmenter {
    fn segment(&self, image: &RgbImage) -> Vec<SegmentedBean> {
        let gray = image::imageops::grayscale(image);
        let Some(threshold) = otsu_threshold(&gray) else {
            debug!("Uniform image, no foreground");
            return Vec::new();
        };

        let (width, height) = gray.dimensions();
        let max_area = (width as f64 * height as f64 * MAX_COMPONENT_FRACTION) as usize;
        let mask: Vec<bool> = gray.pixels().map(|p| p.0[0] <= threshold).collect();

        let beans: Vec<SegmentedBean> = connected_components(&mask, width, height)
            .into_iter()
            .filter(|c| c.pixels.len() >= self.min_area && c.pixels.len() <= max_area)
            .map(|c| c.into_bean(image))
            .collect();

        debug!(threshold, beans = beans.len(), "Segmentation finished");
        beans
    }
}

/// Otsu's threshold over the 256-bin histogram
///
/// Pixels at or below the returned value form the darker class. `None` when
/// the image has a single gray level.
fn otsu_threshold(gray: &GrayImage) -> Option<u8> {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, count)| level as f64 * *count as f64)
        .sum();

    let mut best: Option<(u8, f64)> = None;
    let mut background_weight = 0u64;
    let mut background_sum = 0.0;

    for (level, count) in histogram.iter().enumerate().take(255) {
        background_weight += count;
        background_sum += level as f64 * *count as f64;
        if background_weight == 0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0 {
            break;
        }

        let mean_back = background_sum / background_weight as f64;
        let mean_fore = (weighted_total - background_sum) / foreground_weight as f64;
        let variance = background_weight as f64
            * foreground_weight as f64
            * (mean_back - mean_fore).powi(2);

        if best.map_or(true, |(_, v)| variance > v) {
            best = Some((level as u8, variance));
        }
    }

    best.map(|(level, _)| level)
}

struct Component {
    pixels: Vec<(u32, u32)>,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Component {
    fn into_bean(self, image: &RgbImage) -> SegmentedBean {
        let (width, height) = image.dimensions();
        let x0 = self.min_x.saturating_sub(CROP_PADDING);
        let y0 = self.min_y.saturating_sub(CROP_PADDING);
        let x1 = (self.max_x + CROP_PADDING).min(width - 1);
        let y1 = (self.max_y + CROP_PADDING).min(height - 1);
        let crop_w = x1 - x0 + 1;
        let crop_h = y1 - y0 + 1;

        let mut local = vec![false; (crop_w * crop_h) as usize];
        for (x, y) in &self.pixels {
            local[((y - y0) * crop_w + (x - x0)) as usize] = true;
        }

        let crop = image::imageops::crop_imm(image, x0, y0, crop_w, crop_h).to_image();
        let contour = trace_contour(&local, crop_w, crop_h);

        SegmentedBean {
            image: crop,
            contour,
        }
    }
}

/// 4-connected components in raster discovery order
fn connected_components(mask: &[bool], width: u32, height: u32) -> Vec<Component> {
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        let sx = start as u32 % width;
        let sy = start as u32 / width;
        let mut component = Component {
            pixels: Vec::new(),
            min_x: sx,
            min_y: sy,
            max_x: sx,
            max_y: sy,
        };

        visited[start] = true;
        queue.push_back((sx, sy));

        while let Some((x, y)) = queue.pop_front() {
            component.pixels.push((x, y));
            component.min_x = component.min_x.min(x);
            component.min_y = component.min_y.min(y);
            component.max_x = component.max_x.max(x);
            component.max_y = component.max_y.max(y);

            let candidates = [
                (x.checked_sub(1), Some(y)),
                ((x + 1 < width).then_some(x + 1), Some(y)),
                (Some(x), y.checked_sub(1)),
                (Some(x), (y + 1 < height).then_some(y + 1)),
            ];
            for (nx, ny) in candidates {
                if let (Some(nx), Some(ny)) = (nx, ny) {
                    let idx = (ny * width + nx) as usize;
                    if mask[idx] && !visited[idx] {
                        visited[idx] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }

        components.push(component);
    }

    components
}

/// Moore-neighbor boundary trace of the single component in `mask`
fn trace_contour(mask: &[bool], width: u32, height: u32) -> Contour {
    let inside = |p: Point| {
        p.x >= 0
            && p.y >= 0
            && (p.x as u32) < width
            && (p.y as u32) < height
            && mask[(p.y as u32 * width + p.x as u32) as usize]
    };

    let Some(first) = mask.iter().position(|v| *v) else {
        return Contour::default();
    };
    let start = Point::new((first as u32 % width) as i32, (first as u32 / width) as i32);

    let mut points = vec![start];
    let mut current = start;
    // Raster order guarantees the west neighbor of the start is background
    let mut search_from = 1;
    let mut first_step: Option<Point> = None;
    let max_steps = mask.len() * 4 + 8;

    for _ in 0..max_steps {
        let found = (0..8).map(|i| (search_from + i) % 8).find_map(|d| {
            let (dx, dy) = NEIGHBORS[d];
            let next = Point::new(current.x + dx, current.y + dy);
            inside(next).then_some((next, d))
        });

        let Some((next, d)) = found else {
            // Isolated pixel
            break;
        };

        if current == start {
            match first_step {
                Some(step) if step == next => break,
                Some(_) => {}
                None => first_step = Some(next),
            }
        }

        // Last background pixel examined becomes the backtrack of `next`
        let (bx, by) = NEIGHBORS[(d + 7) % 8];
        let backtrack = (current.x + bx - next.x, current.y + by - next.y);
        let back_dir = NEIGHBORS
            .iter()
            .position(|offset| *offset == backtrack)
            .unwrap_or(0);
        search_from = (back_dir + 1) % 8;

        current = next;
        points.push(current);
    }

    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }

    Contour::new(points)
}
