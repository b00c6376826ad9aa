pub mod cluster;
pub mod text;

pub use cluster::cluster;
