//! The authorization engine: sessions, per-call enforcement and device
//! step-up approval.

mod otp;
mod service;

pub use service::{AuthService, AuthServiceBuilder};
