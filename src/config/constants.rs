// Project-wide constants
//
// Centralised here so port numbers and other magic values have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Default bind address for the HTTP service (localhost only).
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";

/// Fix-cycle budget per build/iterate call.
pub const MAX_ITERATIONS: usize = 5;

/// Default directory (relative to the working directory) holding session workspaces.
pub const DEFAULT_WORKSPACE_ROOT: &str = "./workspace";

/// Entry file every generated application must contain.
pub const ENTRY_FILE: &str = "index.html";

/// Hidden directory inside a session workspace holding version snapshots.
pub const VERSIONS_DIR: &str = ".versions";

/// Default maximum tokens for generation requests.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

/// Request body limit for the HTTP service.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 4 * 1024 * 1024;
