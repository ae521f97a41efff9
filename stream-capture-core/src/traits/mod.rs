pub mod audio_source;
pub mod media_sink;
pub mod video_source;
