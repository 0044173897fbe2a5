//! L2TP/IPsec session management
//!
//! A session runs its stages strictly in sequence:
//!
//! ```text
//! ┌─────────────────┐   ┌──────────────────┐   ┌────────────────────┐
//! │ ConfigGenerator │──▶│ SecretFileWriter │──▶│ ConnectionLauncher │
//! └─────────────────┘   └──────────────────┘   └─────────┬──────────┘
//!                                                        │
//!                       ┌──────────────────┐   ┌─────────▼──────────┐
//!                       │   RouteManager   │◀──│  ReadinessPoller   │
//!                       └──────────────────┘   └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use libl2tpctl::{Credentials, L2tpConfig, SystemCommandRunner, VpnSession};
//!
//! # async fn run() -> libl2tpctl::L2tpResult<()> {
//! let config = L2tpConfig::default();
//! let creds = Credentials::new("vpn.example.com", "ci-bot", "password", "psk")?;
//! let session = VpnSession::new(&config, creds, Arc::new(SystemCommandRunner::new()))?;
//! let outcome = session.establish().await?;
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod credentials;
pub mod launcher;
pub mod poller;
pub mod session;
pub mod status;
pub mod writer;

pub use artifacts::{ArtifactKind, ConfigArtifact, ConfigGenerator, CIPHER_SUITES, PROTECTED_MODE};
pub use credentials::{Credentials, Secret};
pub use launcher::ConnectionLauncher;
pub use poller::{PollPolicy, PollState, ReadinessOutcome, ReadinessPoller};
pub use session::{render, SessionOutcome, VpnSession};
pub use status::{ReadinessSignal, RegexStatusParser, StatusParser};
pub use writer::{ElevatedWriter, LocalWriter, PrivilegedWriter, SecretFileWriter};
