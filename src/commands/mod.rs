pub mod aggregate;
pub mod compare;
pub mod heatmap;
pub mod levels;
