// src/core/mod.rs

pub mod aggregator;
pub mod events;
pub mod interpolator;
pub mod storage;
pub mod tree;
pub mod tree_display;
pub mod view_model;
