//! # SIP transaction core
//!
//! Transaction-layer plumbing for the Vega proxy/registrar:
//!
//! - **Message model**: the request/response fields transaction
//!   matching needs, plus SIP/SIPS URI parsing
//! - **Transaction identification**: RFC 3261 §17 match keys with the
//!   RFC 2543 ACK fallback
//! - **Transaction registry**: in-memory store of client and server
//!   transactions, indexed by match key and by worker
//! - **Dispatcher**: the actor that owns the registry and runs the
//!   expiry sweep

pub mod dispatcher;
pub mod key;
pub mod message;
pub mod transaction;
pub mod worker;
