pub mod bridge;
pub mod config;
pub mod downloader;
pub mod error;
pub mod favourites;
pub mod kv;
pub mod media;
pub mod player;
pub mod prelude;
pub mod radio;
pub mod seek;
pub mod session;
pub mod timefmt;
pub mod track;

pub use config::*;
pub use error::*;
pub use timefmt::format_time;
