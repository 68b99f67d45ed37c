pub mod audio_file;
pub mod conversion_job;
pub mod document;
pub mod user;
