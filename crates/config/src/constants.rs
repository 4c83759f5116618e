//! Fixed names under the storage root and inside the sandbox
//!
//! These are deliberately not configurable: toolchain files, compiler
//! wrappers, and packaged artifacts all bake these paths in.

pub const ARTIFACTS_SUBDIR: &str = "artifacts";
pub const DOWNLOADS_SUBDIR: &str = "downloads";
pub const BUILDS_SUBDIR: &str = "builds";
pub const MOUNTS_SUBDIR: &str = "mounts";
pub const CCACHE_SUBDIR: &str = "ccache";
pub const SHARD_MANIFEST: &str = "shards.toml";
pub const EULA_SENTINEL: &str = "xcode_eula_accepted";

/// Root of all toolchain installs inside the sandbox
pub const SANDBOX_OPT: &str = "/opt";

/// Wrapped tool binaries, one directory per full triplet
pub const SANDBOX_BIN: &str = "/opt/bin";
