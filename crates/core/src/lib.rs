#![forbid(unsafe_code)]

pub mod config;
pub mod countdown;
pub mod error;
pub mod machine;
pub mod model;
pub mod time;

pub use config::{FunnelConfig, ReturnUnlockRule};
pub use error::Error;
pub use time::Clock;
