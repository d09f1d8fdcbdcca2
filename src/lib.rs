//! Linux distribution resolution and app bundle lifecycle orchestration.
//!
//! This crate provides the decision-making core of an app packaging tool:
//!
//! - **Distribution resolution** - strict `os-release` parsing and matching
//!   against an ordered registry of packaging profiles
//! - **Lifecycle orchestration** - deciding, per app, whether to create,
//!   update and/or build, and threading accumulated state through the steps
//! - **Configuration** - the `bundle.toml` project file
//! - **Preflight checks** - host tool validation before a run
//!
//! # Architecture
//!
//! ```text
//! bundle-builder (binary)
//!     │
//!     ├── config: loads bundle.toml → ProjectConfig / AppConfig
//!     ├── distro: os-release → OsIdentity → Registry → Distribution
//!     └── lifecycle: AppStatus + Request → ActionChain → ActionExecutor
//!                     (FsAppState supplies on-disk status and build markers)
//! ```
//!
//! # Example
//!
//! ```rust
//! use bundle_builder::distro::{parse_os_release, resolve, Registry};
//! use bundle_builder::lifecycle::{plan, Action, AppStatus, BuildRequest};
//!
//! let identity = parse_os_release("ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"22.04\"\n")?;
//! let distro = resolve(&Registry::builtin(), &identity);
//! assert_eq!(distro.name(), "Debian");
//! assert_eq!(distro.codename(), Some("22"));
//!
//! let chain = plan(AppStatus::default(), BuildRequest::Build);
//! assert_eq!(chain.actions(), [Action::Create, Action::Build]);
//! # Ok::<(), bundle_builder::ParseError>(())
//! ```

pub mod config;
pub mod distro;
pub mod error;
pub mod lifecycle;
pub mod preflight;

pub use config::{AppConfig, ProjectConfig};
pub use distro::{resolve, Distribution, LinuxEnvironment, OsIdentity, Registry};
pub use error::{ClassificationError, LifecycleError, ParseError};
pub use lifecycle::{plan, Action, ActionChain, ActionExecutor, AppStateQuery, Request, State};
