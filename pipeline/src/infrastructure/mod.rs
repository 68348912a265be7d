//! Concrete implementations of the domain's outbound ports, plus the
//! runtime machinery (stage driver, composer, progress surface) that
//! drives them.

pub mod adapters;
pub mod rate_limiter;
pub mod repositories;
pub mod runtime;
