//! SoilWatch domain core.
//!
//! Pure domain types and logic shared by every other crate: the decoded
//! [`reading::Reading`], the cooldown-gated [`alert::AlertEngine`], the
//! collaborator seams ([`sink::ReadingSink`], [`notify::Notifier`]) and the
//! injectable [`clock::Clock`].

pub mod alert;
pub mod clock;
pub mod command;
pub mod env;
pub mod error;
pub mod notify;
pub mod reading;
pub mod sink;
pub mod types;
