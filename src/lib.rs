pub mod aggregate;
pub mod annotate;
pub mod badge;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod overlay;
pub mod patch;
pub mod tree;
