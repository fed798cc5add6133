pub mod crop;
pub mod detect_faces;
pub mod persons;
pub mod save_tags;
pub mod upload_photo;
#[cfg(test)]
mod detect_faces_test;

pub use detect_faces::*;
pub use persons::*;
pub use save_tags::*;
pub use upload_photo::*;
