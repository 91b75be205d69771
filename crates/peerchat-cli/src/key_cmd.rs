//! Key backup subcommands.

use std::io::{self, Write};
use std::path::Path;

use peerchat_crypto::KeyPair;
use tracing::info;

/// Generate a key pair and write its private record to `out_path`.
pub async fn keygen(out_path: &Path, force: bool) -> anyhow::Result<()> {
    if out_path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            out_path.display()
        );
    }

    let pair = tokio::task::spawn_blocking(KeyPair::generate).await??;
    pair.save_to_file(out_path)?;
    info!(path = %out_path.display(), fingerprint = %pair.thumbprint(), "Key pair written");

    let mut out = io::stdout();
    writeln!(out, "Wrote private key to {}", out_path.display())?;
    writeln!(out, "Fingerprint: {}", pair.thumbprint())?;
    Ok(())
}

/// Print the fingerprint of a backed-up key pair.
pub fn keyinfo(path: &Path) -> anyhow::Result<()> {
    let pair = KeyPair::load_from_file(path)?;
    let mut out = io::stdout();
    writeln!(out, "Key file:    {}", path.display())?;
    writeln!(out, "Algorithm:   RSA-OAEP-256, 2048-bit")?;
    writeln!(out, "Fingerprint: {}", pair.thumbprint())?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keygen_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, "{}").unwrap();

        assert!(keygen(&path, false).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[tokio::test]
    async fn keygen_then_keyinfo_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");

        keygen(&path, false).await.unwrap();
        keyinfo(&path).unwrap();
    }

    #[test]
    fn keyinfo_on_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(keyinfo(&dir.path().join("absent.json")).is_err());
    }
}
