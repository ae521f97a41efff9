pub mod ffmpeg_sink;
pub mod muxing_writer;
pub mod naming;
