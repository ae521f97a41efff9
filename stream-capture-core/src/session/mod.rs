pub mod audio_loop;
pub mod capture_session;
pub mod deck;
pub mod directory;
pub mod events;
mod shared;
pub mod video_loop;
