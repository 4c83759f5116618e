//! Privilege escalation probe
//!
//! Loop mounts need root. The resolved escalation prefix is probed once
//! per process and cached; builds running as root get an empty prefix.

use crossforge_errors::{Error, MountError};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escalation {
    None,
    Sudo,
    Su,
}

static UID: OnceLock<u32> = OnceLock::new();
static ESCALATION: OnceLock<Option<Escalation>> = OnceLock::new();

/// Effective UID of this process
pub(crate) fn current_uid() -> u32 {
    *UID.get_or_init(|| {
        std::process::Command::new("id")
            .arg("-u")
            .output()
            .ok()
            .and_then(|out| String::from_utf8(out.stdout).ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(u32::MAX)
    })
}

/// How this process reaches root, probed once
pub(crate) fn escalation() -> Result<Escalation, Error> {
    let cached = ESCALATION.get_or_init(|| {
        if current_uid() == 0 {
            Some(Escalation::None)
        } else if which::which("sudo").is_ok() {
            Some(Escalation::Sudo)
        } else if which::which("su").is_ok() {
            Some(Escalation::Su)
        } else {
            None
        }
    });

    (*cached).ok_or_else(|| {
        MountError::PrivilegeUnavailable {
            message: "not root, and neither sudo nor su is available".to_string(),
        }
        .into()
    })
}

/// Run a command with root privileges
pub(crate) async fn run_privileged(args: &[&str]) -> Result<std::process::Output, Error> {
    let output = match escalation()? {
        Escalation::None => {
            tokio::process::Command::new(args[0])
                .args(&args[1..])
                .output()
                .await?
        }
        Escalation::Sudo => {
            tokio::process::Command::new("sudo")
                .args(args)
                .output()
                .await?
        }
        Escalation::Su => {
            tokio::process::Command::new("su")
                .arg("root")
                .arg("-c")
                .arg(args.join(" "))
                .output()
                .await?
        }
    };
    Ok(output)
}
