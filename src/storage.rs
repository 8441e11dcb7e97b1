mod filesystem;
pub mod paths;

pub use filesystem::BlobStore;
