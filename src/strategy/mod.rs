//! Strategy module for trade decision making
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Pair runner (one task per pair)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Snapshot arrives                                           │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  OrderBookTracker: ingest, refresh own orders               │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  CompeteEngine.on_book_update() → at most one action        │
//! │    - placement passes through the SafetyCage first          │
//! │    - place/cancel go back through the tracker               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TradingIntent`]: price limits, order size and balance bounds for a pair
//! - [`SafetyCage`]: per-side cooldown and reference price
//! - [`CompeteEngine`]: the six-step check chain
//! - [`EngineAction`] / [`Decline`]: what a book update led to

pub mod cage;
pub mod compete;
pub mod intent;
pub mod types;

pub use cage::SafetyCage;
pub use compete::{truncate_quantity, CompeteEngine};
pub use intent::TradingIntent;
pub use types::{CancelReason, Decline, EngineAction, PlaceStatus};
