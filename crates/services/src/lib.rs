#![forbid(unsafe_code)]

pub mod app_services;
pub mod chat;
pub mod error;
pub mod machines;
pub mod navigation;
pub mod progress;
pub mod scripts;
pub mod sync;
pub mod timers;

pub use funnel_core::Clock;

pub use app_services::FunnelServices;
pub use chat::{ChatSession, Effect};
pub use error::{AppServicesError, ChatError, ProgressError};
pub use machines::ModuleMachines;
pub use navigation::BackAction;
pub use progress::{FunnelCountdowns, ProgressController, ReturnHome, SharedController};
pub use sync::{LifecycleEvent, Revalidator};
pub use timers::{CountdownSnapshot, CountdownTicker, TaskGuard};
