pub mod gzip;

pub use gzip::GzipCompressor;
