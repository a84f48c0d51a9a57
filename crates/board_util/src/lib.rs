#![forbid(unsafe_code)]

pub mod origin;
pub mod time;

pub use origin::AllowedOrigins;
pub use time::unix_ms_now;
