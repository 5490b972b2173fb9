pub mod geometry;
pub mod items;
