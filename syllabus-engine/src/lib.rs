pub mod artifact;
pub mod catalog;
pub mod cluster;
pub mod config;
pub mod cosine;
pub mod error;
pub mod features;
pub mod model;
pub mod profile;
pub mod protocol;
pub mod ranker;
pub mod server;
pub mod text;
pub mod transport;
pub mod types;
