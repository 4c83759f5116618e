//! Shard mounting error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum MountError {
    #[error("mounting {archive} at {mountpoint} failed: {message}")]
    MountFailed {
        archive: String,
        mountpoint: String,
        message: String,
    },

    #[error("unmounting {mountpoint} failed: {message}")]
    UnmountFailed { mountpoint: String, message: String },

    #[error("Xcode SDK license not accepted; set AUTOMATIC_APPLE=true or accept interactively")]
    SdkNotAccepted,

    #[error("no privilege escalation helper available: {message}")]
    PrivilegeUnavailable { message: String },
}
