use anyhow::{Context, Result};
use nix::unistd::{gethostname, getuid, User};
use std::env;
use std::process::Command;

use crate::config::Config;
use crate::error::CronVcError;

// who is running us and where; both end up as path components of the snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub host: String,
    pub user: String,
}

impl Identity {
    pub fn new(host: &str, user: &str) -> Result<Self, CronVcError> {
        Ok(Self {
            host: checked("hostname", host)?,
            user: checked("user name", user)?,
        })
    }

    pub fn detect(config: &Config) -> Result<Self> {
        let host = match &config.hostname {
            Some(host) => host.clone(),
            None => detect_host()?,
        };
        let user = detect_user()?;
        tracing::debug!(%host, %user, "resolved identity");
        Ok(Self::new(&host, &user)?)
    }
}

fn checked(kind: &'static str, name: &str) -> Result<String, CronVcError> {
    if valid_component(name) {
        Ok(name.to_string())
    } else {
        Err(CronVcError::InvalidName { kind, name: name.to_string() })
    }
}

fn detect_host() -> Result<String> {
    let short = gethostname()
        .context("couldn't get hostname")?
        .to_string_lossy()
        .to_string();
    if short.contains('.') {
        return Ok(short);
    }
    // gethostname is often unqualified, ask the resolver
    Ok(qualified_hostname().unwrap_or(short))
}

fn qualified_hostname() -> Option<String> {
    let output = Command::new("hostname").arg("-f").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    valid_component(&name).then_some(name)
}

// must stay a single plain path component under the snapshot root
fn valid_component(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\0']) && !name.starts_with('.')
}

fn detect_user() -> Result<String> {
    match User::from_uid(getuid()) {
        Ok(Some(user)) => Ok(user.name),
        _ => env::var("USER").context("couldn't determine the invoking user"),
    }
}
