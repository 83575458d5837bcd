pub mod config;
#[cfg(feature = "fuse")]
pub mod mount;

pub use config::ShowConfig;
#[cfg(feature = "fuse")]
pub use mount::Mount;
