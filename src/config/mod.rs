//! Layered configuration.
//!
//! Configuration is merged field-by-field from three tiers:
//! 1. **Defaults** - built into the binary
//! 2. **Project** - `$CWD/schedule-import/config.yaml`
//! 3. **User** - `~/.schedule-import/config.yaml`
//!
//! followed by environment variable overrides.
//!
//! ## Environment Variables
//! - `SCHEDULE_IMPORT_CONFIG_PATH` - Explicit config file (overrides all tiers)
//! - `SCHEDULE_IMPORT_DB_PATH` - Database path
//! - `SCHEDULE_IMPORT_PROJECT_DIR` - Project config dir (default: `./schedule-import`)
//! - `SCHEDULE_IMPORT_USER_DIR` - User config dir (default: `~/.schedule-import`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{merge_into, merge_layers};
pub use types::*;
