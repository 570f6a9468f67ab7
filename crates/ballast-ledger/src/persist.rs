//! Binary snapshots of [`LedgerState`].
//!
//! Layout: the 8-byte magic `BALLAST1` followed by the bincode (standard
//! config) encoding of the state.

use std::fs;
use std::path::Path;

use ballast_core::error::BallastError;
use tracing::debug;

use crate::escrow::LedgerState;

const MAGIC: &[u8; 8] = b"BALLAST1";

pub fn encode_state(state: &LedgerState) -> Result<Vec<u8>, BallastError> {
    let body = bincode::encode_to_vec(state, bincode::config::standard())
        .map_err(|e| BallastError::Encoding(e.to_string()))?;
    let mut out = Vec::with_capacity(MAGIC.len() + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_state(bytes: &[u8]) -> Result<LedgerState, BallastError> {
    let body = bytes
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| BallastError::Encoding("missing state header".into()))?;
    let (state, read): (LedgerState, usize) = bincode::decode_from_slice(body, bincode::config::standard())
        .map_err(|e| BallastError::Encoding(e.to_string()))?;
    if read != body.len() {
        return Err(BallastError::Encoding(format!(
            "{} trailing bytes after state",
            body.len() - read
        )));
    }
    Ok(state)
}

pub fn save(state: &LedgerState, path: impl AsRef<Path>) -> Result<(), BallastError> {
    let bytes = encode_state(state)?;
    fs::write(path.as_ref(), &bytes)?;
    debug!(path = %path.as_ref().display(), bytes = bytes.len(), "persist: state saved");
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<LedgerState, BallastError> {
    let bytes = fs::read(path.as_ref())?;
    let state = decode_state(&bytes)?;
    debug!(path = %path.as_ref().display(), locks = state.locks.len(), "persist: state loaded");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::Escrow;
    use crate::memory::MemoryCollaborators;
    use ballast_core::config::LedgerConfig;
    use ballast_core::constants::UNIT;
    use ballast_core::types::{AccountId, Amounts};

    fn populated() -> LedgerState {
        let mem = MemoryCollaborators::new();
        let owner = AccountId([1; 32]);
        let delegate = AccountId([9; 32]);
        mem.custody.fund(owner, Amounts::new(500 * UNIT, 500 * UNIT));
        mem.authority.register_delegate(delegate);
        let cfg = LedgerConfig::testing();
        let day = cfg.epoch_duration;
        let mut escrow = Escrow::new(cfg, 0, mem.collaborators()).unwrap();
        let id = escrow.create_lock(&owner, Amounts::new(100 * UNIT, 20 * UNIT), 30 * day, 0).unwrap();
        escrow.create_lock(&owner, Amounts::new(50 * UNIT, 0), 10 * day, day).unwrap();
        escrow.delegate(&owner, &id, &delegate, 2 * day).unwrap();
        escrow.sync_global(12 * day).unwrap();
        escrow.into_state()
    }

    #[test]
    fn state_survives_encoding() {
        let state = populated();
        let bytes = encode_state(&state).unwrap();
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(decode_state(&bytes).unwrap(), state);
    }

    #[test]
    fn rejects_missing_header_and_trailing_bytes() {
        let state = populated();
        let bytes = encode_state(&state).unwrap();
        assert!(matches!(decode_state(&bytes[8..]), Err(BallastError::Encoding(_))));
        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(decode_state(&padded), Err(BallastError::Encoding(_))));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.bin");
        let state = populated();
        save(&state, &path).unwrap();
        assert_eq!(load(&path).unwrap(), state);
        assert!(matches!(load(dir.path().join("missing.bin")), Err(BallastError::Io(_))));
    }
}
