// src/infra/fs.rs - Owner-only atomic file writes
//
// Config holds API keys and the session file holds the user's drafts, so
// both are written 0600 into a 0700 directory (when we create it) via a
// temp file + rename.

use std::path::{Path, PathBuf};

use crate::infra::errors::NovelerError;

/// Write `contents` to `path` atomically, readable only by the owner.
pub async fn write_private(path: &Path, contents: &[u8]) -> Result<(), NovelerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !tokio::fs::try_exists(parent).await? {
            tokio::fs::create_dir_all(parent).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await?;
            }
        }
    }

    let tmp = temp_path(path);
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    {
        use tokio::io::AsyncWriteExt;
        let mut file = options.open(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
    }

    // A leftover temp file keeps its old mode; open() does not reset it
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
