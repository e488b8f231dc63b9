//! Locating the transfer-circuit artifacts.
//!
//! Proving needs the circuit WASM and the Groth16 zkey. Both can be pinned
//! explicitly in the client configuration; otherwise they are looked up in
//! `$SHIELDED_CIRCUITS_DIR`, falling back to `~/.shielded-circuits`. When a
//! snarkjs `verification_key.json` sits next to the zkey it is parsed and
//! cross-checked against the public-input ABI, catching a mismatched
//! artifact set before a proof is ever attempted.

use std::env;
use std::path::PathBuf;

use anyhow::Context;

use crate::prover::TRANSFER_PUBLIC_INPUT_COUNT;

pub const CIRCUITS_DIR_ENV: &str = "SHIELDED_CIRCUITS_DIR";

const DEFAULT_DIR: &str = ".shielded-circuits";
const WASM_FILE: &str = "transfer.wasm";
const ZKEY_FILE: &str = "transfer.zkey";
const VERIFYING_KEY_FILE: &str = "verification_key.json";

/// Resolved artifact locations handed to the proving backend.
#[derive(Clone, Debug)]
pub struct CircuitArtifacts {
    pub wasm_path: PathBuf,
    pub zkey_path: PathBuf,
}

/// The subset of a snarkjs verification key the client sanity-checks.
#[derive(Debug, serde::Deserialize)]
struct VerifyingKeyManifest {
    protocol: String,
    #[serde(rename = "nPublic")]
    n_public: usize,
}

/// Resolve artifact paths from explicit configuration or the default
/// discovery chain, validating the verifying-key manifest when present.
pub fn locate(
    wasm_path: Option<PathBuf>,
    zkey_path: Option<PathBuf>,
) -> anyhow::Result<CircuitArtifacts> {
    let dir = default_dir();
    let artifacts = CircuitArtifacts {
        wasm_path: wasm_path.unwrap_or_else(|| dir.join(WASM_FILE)),
        zkey_path: zkey_path.unwrap_or_else(|| dir.join(ZKEY_FILE)),
    };

    let manifest_path = artifacts
        .zkey_path
        .parent()
        .map(|parent| parent.join(VERIFYING_KEY_FILE));
    if let Some(path) = manifest_path.filter(|p| p.is_file()) {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let manifest: VerifyingKeyManifest =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        anyhow::ensure!(
            manifest.protocol == "groth16",
            "verifying key protocol is {:?}, expected groth16",
            manifest.protocol
        );
        anyhow::ensure!(
            manifest.n_public == TRANSFER_PUBLIC_INPUT_COUNT,
            "verifying key expects {} public inputs, circuit ABI has {TRANSFER_PUBLIC_INPUT_COUNT}",
            manifest.n_public
        );
    }

    Ok(artifacts)
}

fn default_dir() -> PathBuf {
    env::var(CIRCUITS_DIR_ENV)
        .ok()
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_DIR)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR))
}
