//! TLS certificate probing and the periodic domain check cycle.

pub mod checks;
pub mod extract;
pub mod prober;
pub mod resolve;
pub mod settle;
