//! DepthSync - Main Library
//!
//! Local order books kept in sync with venue depth streams.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners, shutdown)
//! - **depthbook**: Book store, sequencer, bootstrapper and venue adapters (re-exported from workspace)
//! - **feedsocket**: Supervised WebSocket connection (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use depthsync::bin_common::{load_config_from_env, ConfigType};
//! use depthsync::depthbook::DepthConfig;
//! ```

// Re-export workspace libraries for convenience
pub use depthbook;
pub use feedsocket;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;
    pub mod shutdown;

    pub use cli::{config_type_from_args, load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
    pub use shutdown::ShutdownManager;
}
