mod storage;

pub use storage::{ImageFormat, ImageStorage, MediaError, content_type_for};
