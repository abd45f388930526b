//! Lens distortion model and image undistortion.

mod distortion;
mod undistort;

pub use distortion::{normalize, project, undistort_points, PlumbBob};
pub use undistort::{optimal_new_camera_matrix, undistort_cropped, undistort_image, Roi};
