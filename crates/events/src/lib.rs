//! SoilWatch in-process distribution and notification delivery.
//!
//! - [`DistributionBuffer`]: bounded, drop-newest broadcast of readings to
//!   every connected viewer through a registry of per-viewer queues.
//! - [`delivery`]: external channels for alert notifications (Telegram).

pub mod buffer;
pub mod delivery;

pub use buffer::{DistributionBuffer, OfferOutcome, Subscription, ViewerId};
pub use delivery::telegram::{TelegramConfig, TelegramDelivery, TelegramError};
