//! ProBit module - session, REST and stream clients for the ProBit exchange

pub mod auth;
pub mod messages;
pub mod rest;
pub mod session;
pub mod websocket;

pub use session::ExchangeSession;
