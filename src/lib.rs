pub mod app;
pub mod archive;
pub mod compress;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod normalizer;
pub mod output;
pub mod resolver;
pub mod share_path;
pub mod store;
pub mod taxonomy;
pub mod upload;
