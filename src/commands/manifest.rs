//! Native messaging host manifest.
//!
//! Chrome only starts hosts it finds a manifest for. The output of this
//! command belongs in `NativeMessagingHosts/<host name>.json` under the
//! browser's profile directory (or the registry on Windows).

use crate::{
    libs::{
        data_storage::{APP_METADATA_DESCRIPTION, APP_METADATA_HOST_NAME},
        messages::Message,
    },
    msg_bail_anyhow,
};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::Path;

/// Chrome extension ids are 32 characters from `a` to `p`.
const EXTENSION_ID_LEN: usize = 32;

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// ID of the extension allowed to connect
    #[arg(short, long)]
    extension_id: String,
}

#[derive(Debug, Serialize)]
pub struct HostManifest {
    pub name: String,
    pub description: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub allowed_origins: Vec<String>,
}

impl HostManifest {
    pub fn new(extension_id: &str, executable: &Path) -> Self {
        Self {
            name: APP_METADATA_HOST_NAME.to_string(),
            description: APP_METADATA_DESCRIPTION.to_string(),
            path: executable.display().to_string(),
            kind: "stdio".to_string(),
            allowed_origins: vec![format!("chrome-extension://{}/", extension_id)],
        }
    }
}

pub fn is_valid_extension_id(id: &str) -> bool {
    id.len() == EXTENSION_ID_LEN && id.bytes().all(|b| (b'a'..=b'p').contains(&b))
}

pub fn cmd(args: ManifestArgs) -> Result<()> {
    if !is_valid_extension_id(&args.extension_id) {
        msg_bail_anyhow!(Message::InvalidExtensionId(args.extension_id));
    }

    let manifest = HostManifest::new(&args.extension_id, &std::env::current_exe()?);
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_shape() {
        let id = "abcdefghijklmnopabcdefghijklmnop";
        let manifest = serde_json::to_value(HostManifest::new(id, Path::new("/usr/bin/tabquota"))).unwrap();

        assert_eq!(manifest["name"], "com.tabquota.host");
        assert_eq!(manifest["type"], "stdio");
        assert_eq!(manifest["path"], "/usr/bin/tabquota");
        assert_eq!(manifest["allowed_origins"][0], format!("chrome-extension://{}/", id));
    }

    #[test]
    fn test_extension_id_validation() {
        assert!(is_valid_extension_id("abcdefghijklmnopabcdefghijklmnop"));
        assert!(!is_valid_extension_id("abc"));
        assert!(!is_valid_extension_id("zbcdefghijklmnopabcdefghijklmnop"));
    }
}
