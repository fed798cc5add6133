pub mod cloudinary_store;
pub mod facepp_client;
pub mod image_fetcher;
pub mod sqlite_repo;

pub use cloudinary_store::*;
pub use facepp_client::*;
pub use image_fetcher::*;
pub use sqlite_repo::*;
