pub mod object_store;
pub mod range;
pub mod video_service;
