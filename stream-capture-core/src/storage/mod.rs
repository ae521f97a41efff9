pub mod checksum;
pub mod metadata;
pub mod remux;
pub mod settings;
