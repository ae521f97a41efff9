pub mod clock;
pub mod frame_rate;
pub mod pts;
pub mod rational;
pub mod recording_clock;
