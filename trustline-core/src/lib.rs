//! # Trustline
//!
//! The trust and authorization core of an agent identity platform.
//!
//! Applications (A2A agents, OASF agents and MCP servers) call each other
//! through a gateway. Before a call the gateway asks the core for an
//! authorization code ([`AuthService::authorize`]), exchanges it for an
//! access token ([`AuthService::token`]) and then has every invocation
//! enforced by [`AuthService::ext_authz`]. Policies decide who may call
//! whom, and a matching rule can require a human to approve the call from
//! a registered device ([`AuthService::approve_token`]).
//!
//! Applications also hold badges: verifiable credentials describing what
//! the application is, signed by the tenant's issuer key and published to
//! an identity registry ([`badge::BadgeService`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trustline_core::app::{App, AppType};
//! use trustline_core::memory::{MemoryAppRepository, MemoryPolicyRepository};
//! use trustline_core::policy::{Policy, PolicyEvaluator, Rule, RuleAction, Task};
//! use trustline_core::store::AppRepository;
//!
//! # tokio_test::block_on(async {
//! let apps = MemoryAppRepository::new();
//! let callee = apps
//!     .create_app(App::new("weather", AppType::AgentA2a))
//!     .await
//!     .unwrap();
//!
//! let policies = Arc::new(MemoryPolicyRepository::new());
//! policies.insert(
//!     Policy::new("planner may call weather", "planner")
//!         .with_rule(Rule::new("", RuleAction::Allow).with_task(Task::app("weather"))),
//! );
//!
//! let evaluator = PolicyEvaluator::new(policies);
//! let rule = evaluator.evaluate(&callee, "planner", "").await.unwrap();
//! assert!(rule.is_allow());
//! # });
//! ```
//!
//! Storage and every external system sit behind traits ([`store`],
//! [`idp`], [`keys::KeyStore`], [`registry::IdentityRegistry`],
//! [`device::NotificationSender`]). [`memory`] has in-process stores for
//! tests and single-node use.

pub mod app;
pub mod auth;
pub mod badge;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod idp;
pub mod jwt;
pub mod keys;
pub mod memory;
pub mod policy;
pub mod registry;
pub mod session;
pub mod store;

pub use auth::{AuthService, AuthServiceBuilder};
pub use config::{AuthConfig, IdpType, IssuerSettings};
pub use context::RequestContext;
pub use error::{BuildError, Collaborator, Error, ErrorKind, Result, UpstreamError};
pub use session::{Session, SessionDeviceOtp};
