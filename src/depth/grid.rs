//! Point grids rebuilt from engine point clouds, and their depth-map rendering.

use image::{Rgb, RgbImage};

use super::messages::PointCloudMessage;

/// Index of the depth component in a point.
const DEPTH: usize = 2;

/// One reconstructed frame: a 16:9 grid of `[x, y, z, intensity]` points.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthQueueEntry {
    /// Largest depth in the grid (0 when every depth is non-positive).
    pub max_distance: f64,
    pub width: u32,
    pub height: u32,
    /// Row-major points.
    points: Vec<[f64; 4]>,
}

impl DepthQueueEntry {
    /// Rebuild the grid from a flat point list.
    ///
    /// The engine streams the grid column by column; the largest 16:9 grid
    /// that fits in the point count is kept and any remainder is dropped.
    /// Returns `None` when the cloud is too small to form a grid.
    pub fn from_cloud(cloud: &PointCloudMessage) -> Option<Self> {
        let (width, height) = grid_size(cloud.points.len());
        if width == 0 || height == 0 {
            return None;
        }

        let (w, h) = (width as usize, height as usize);
        let mut points = vec![[0.0; 4]; w * h];
        let mut max_distance = 0.0_f64;
        for (index, point) in cloud.points.iter().take(w * h).enumerate() {
            let (column, row) = (index / h, index % h);
            points[row * w + column] = *point;
            max_distance = max_distance.max(point[DEPTH]);
        }

        Some(Self {
            max_distance,
            width,
            height,
            points,
        })
    }

    pub fn point(&self, x: u32, y: u32) -> Option<&[f64; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.points.get((y * self.width + x) as usize)
    }

    pub fn points(&self) -> &[[f64; 4]] {
        &self.points
    }

    /// Render depth into the green channel, far = bright, or near = bright
    /// with `hot_near`.
    pub fn to_depth_image(&self, hot_near: bool) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let depth = self.points[(y * self.width + x) as usize][DEPTH];
            let ratio = if self.max_distance > 0.0 {
                depth / self.max_distance
            } else {
                0.0
            };
            let ratio = if hot_near { 1.0 - ratio } else { ratio };
            Rgb([0, (ratio * 255.0).clamp(0.0, 255.0) as u8, 0])
        })
    }
}

/// Width and height of the largest 16:9 grid holding `count` points.
fn grid_size(count: usize) -> (u32, u32) {
    let height = (count as f64 * 9.0 / 16.0).sqrt();
    let width = 16.0 * height / 9.0;
    (width.floor() as u32, height.floor() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(count: usize) -> PointCloudMessage {
        PointCloudMessage {
            stamp: None,
            points: (0..count).map(|i| [i as f64, 0.0, i as f64, 1.0]).collect(),
        }
    }

    #[test]
    fn test_grid_size() {
        assert_eq!(grid_size(144), (16, 9));
        assert_eq!(grid_size(576), (32, 18));
        assert_eq!(grid_size(0), (0, 0));
    }

    #[test]
    fn test_column_major_input_becomes_row_major() {
        let entry = DepthQueueEntry::from_cloud(&cloud(144)).unwrap();
        assert_eq!((entry.width, entry.height), (16, 9));
        assert_eq!(entry.max_distance, 143.0);
        // Second streamed point is the second row of the first column.
        assert_eq!(entry.point(0, 1).unwrap()[0], 1.0);
        assert_eq!(entry.point(1, 0).unwrap()[0], 9.0);
        assert!(entry.point(16, 0).is_none());
    }

    #[test]
    fn test_depth_image_intensity() {
        let entry = DepthQueueEntry::from_cloud(&cloud(144)).unwrap();
        let far = entry.to_depth_image(false);
        assert_eq!(far.dimensions(), (16, 9));
        assert_eq!(*far.get_pixel(15, 8), Rgb([0, 255, 0]));
        assert_eq!(*far.get_pixel(0, 0), Rgb([0, 0, 0]));

        let near = entry.to_depth_image(true);
        assert_eq!(*near.get_pixel(0, 0), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_tiny_cloud_has_no_grid() {
        assert!(DepthQueueEntry::from_cloud(&cloud(1)).is_none());
    }
}
