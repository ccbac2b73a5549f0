use std::path::Path;

use anyhow::{anyhow, Result};
use libp2p::identity::Keypair;
use tokio::fs;

/// Load the node's long-lived Ed25519 identity from `path`, generating and
/// persisting a fresh keypair when the file does not exist. With no path
/// configured the identity is ephemeral.
///
/// Keys are stored in the libp2p protobuf encoding.
pub async fn load_or_generate_keypair(path: Option<&Path>) -> Result<Keypair> {
    let path = match path {
        Some(path) => path,
        None => return Ok(Keypair::generate_ed25519()),
    };

    if fs::try_exists(path).await? {
        let bytes = fs::read(path).await?;
        Keypair::from_protobuf_encoding(&bytes)
            .map_err(|error| anyhow!("could not decode identity key at {path:?}: {error}"))
    } else {
        let keypair = Keypair::generate_ed25519();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = keypair
            .to_protobuf_encoding()
            .map_err(|error| anyhow!("could not encode identity key: {error}"))?;
        fs::write(path, bytes).await?;
        Ok(keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_persists_a_generated_key_and_reloads_it() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("identity.key");

        let generated = load_or_generate_keypair(Some(&path)).await?;
        let reloaded = load_or_generate_keypair(Some(&path)).await?;
        assert_eq!(
            generated.public().to_peer_id(),
            reloaded.public().to_peer_id()
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_generates_an_ephemeral_key_without_a_path() -> Result<()> {
        let first = load_or_generate_keypair(None).await?;
        let second = load_or_generate_keypair(None).await?;
        assert_ne!(first.public().to_peer_id(), second.public().to_peer_id());
        Ok(())
    }
}
