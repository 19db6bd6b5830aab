//! Simulated exchange for dry runs and tests
//!
//! Implements the same [`ExchangeClient`](crate::common::traits::ExchangeClient)
//! capability set as the live adapter, without network access:
//! - Order ids count up from 100001
//! - MARKET orders fill on the first status poll (or on submit)
//! - LIMIT and stop orders fill after a configurable number of polls
//! - Faults can be injected per price to exercise failure paths
//!
//! # Example
//!
//! ```ignore
//! let config = SimulationConfig::default()
//!     .with_limit_fill_after_polls(Some(3))
//!     .with_reference_price(dec!(64000));
//!
//! let exchange: SharedExchange = Arc::new(SimulatedExchange::new(config));
//! ```

mod exchange;

pub use exchange::{SimulatedExchange, SimulatedFault, SubmittedOrder};
