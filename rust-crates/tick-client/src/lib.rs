//! Client for a tick-paced game shard behind a Nakama gateway.
//!
//! Transactions are asynchronous: submitting one yields a hash and a tick, and
//! the outcome only shows up in the shard's receipt log a few ticks later.
//! [`confirm::ConfirmationEngine`] bridges that gap.

pub mod backend;

pub mod client;

pub mod command;

pub mod config;

pub mod confirm;

pub mod dispatch;

pub mod error;

pub mod identity;

pub mod messages;

pub mod nakama;

pub mod receipts;

pub mod session;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use client::{
    Action,
    GameClient,
};
pub use command::Command;
pub use config::ClientConfig;
pub use confirm::{
    CancelSignal,
    ConfirmPolicy,
    Confirmation,
    cancellation,
};
pub use messages::{
    Receipt,
    Submission,
    Tick,
};
pub use nakama::NakamaGateway;
pub use receipts::HttpReceiptSource;
pub use session::Credentials;
