#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use shielded_client::client::{
    ClientConfig, CommitmentEvent, PoolConnection, ShieldedClient, WalletAdapter,
};
use shielded_client::instruction::{
    ExternalAddress, InstructionKind, InstructionRecord, SignedInstruction,
};
use shielded_client::note::EncryptedNote;
use shielded_client::prover::{
    Groth16Proof, ProverBackend, TRANSFER_PUBLIC_INPUT_COUNT,
};
use shielded_client::{Field, MerkleTree};

/// The 12-word scenario seed from the acceptance suite.
pub const TEST_SEED: &[u8] =
    b"abandon ability able about above absent absorb abstract absurd abuse access accident";

pub const OTHER_SEED: &[u8] =
    b"legal winner thank year wave sausage worth useful legal winner thank yellow";

pub const EXTERNAL_RECIPIENT: ExternalAddress = [9u8; 32];

/// In-memory stand-in for the on-chain pool program: an append-only
/// commitment log with attached memos, mirrored into a local tree so it can
/// answer root queries.
pub struct ChainState {
    pub tree: MerkleTree,
    pub events: Vec<CommitmentEvent>,
    pub nullifiers: Vec<Field>,
    pub submitted: Vec<InstructionRecord>,
    pub reject_next: Option<String>,
    sequence: u64,
}

impl ChainState {
    fn new() -> Self {
        Self {
            tree: MerkleTree::new(),
            events: Vec::new(),
            nullifiers: Vec::new(),
            submitted: Vec::new(),
            reject_next: None,
            sequence: 0,
        }
    }

    fn append(&mut self, commitment: Field, ciphertext: Option<EncryptedNote>) {
        let leaf_index = self.tree.leaf_count();
        self.tree.insert(commitment).expect("mock chain tree not full");
        self.events.push(CommitmentEvent {
            leaf_index,
            commitment,
            ciphertext,
        });
    }
}

#[derive(Clone)]
pub struct MockConnection {
    pub state: Arc<Mutex<ChainState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState::new())),
        }
    }

    pub fn chain(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().expect("mock chain mutex poisoned")
    }

    pub fn reject_next(&self, reason: &str) {
        self.chain().reject_next = Some(reason.to_string());
    }

    /// Append a raw event, bypassing instruction processing. Models a
    /// malicious sender attaching a ciphertext that does not open the
    /// commitment it rides with.
    pub fn inject_event(&self, commitment: Field, ciphertext: Option<EncryptedNote>) {
        self.chain().append(commitment, ciphertext);
    }
}

fn field_at(data: &[u8], offset: usize) -> Field {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[offset..offset + 32]);
    Field::from_bytes_le(&bytes)
}

fn u64_at(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

impl PoolConnection for MockConnection {
    async fn submit(&self, instruction: SignedInstruction) -> anyhow::Result<String> {
        let mut chain = self.chain();
        if let Some(reason) = chain.reject_next.take() {
            anyhow::bail!("{reason}");
        }

        let record = instruction.record;
        let data = record.data.as_slice();
        let mut memos = record.memos.clone().into_iter();
        match record.kind {
            InstructionKind::Shield => {
                assert_eq!(data.len(), 40, "shield instruction layout");
                let commitment = field_at(data, 8);
                chain.append(commitment, memos.next());
            }
            InstructionKind::Transfer => {
                assert_eq!(data.len(), 416, "transfer instruction layout");
                let root = field_at(data, 384);
                anyhow::ensure!(chain.tree.is_known_root(root), "stale merkle root");
                chain.nullifiers.push(field_at(data, 256));
                chain.nullifiers.push(field_at(data, 288));
                for offset in [320, 352] {
                    let commitment = field_at(data, offset);
                    if !commitment.is_zero() {
                        let memo = memos.next();
                        chain.append(commitment, memo);
                    }
                }
            }
            InstructionKind::Unshield => {
                assert_eq!(data.len(), 392, "unshield instruction layout");
                let root = field_at(data, 352);
                anyhow::ensure!(chain.tree.is_known_root(root), "stale merkle root");
                anyhow::ensure!(
                    record.unshield_recipient.is_some(),
                    "unshield carries the exit recipient"
                );
                let _exit_amount = u64_at(data, 384);
                chain.nullifiers.push(field_at(data, 256));
                chain.nullifiers.push(field_at(data, 288));
                let change = field_at(data, 320);
                if !change.is_zero() {
                    let memo = memos.next();
                    chain.append(change, memo);
                }
            }
        }

        chain.submitted.push(record);
        chain.sequence += 1;
        Ok(format!("sig-{}", chain.sequence))
    }

    async fn latest_root(&self, _token_mint: Field) -> anyhow::Result<Field> {
        Ok(self.chain().tree.root())
    }

    async fn commitment_events(
        &self,
        _token_mint: Field,
        from_leaf_index: u64,
    ) -> anyhow::Result<Vec<CommitmentEvent>> {
        Ok(self
            .chain()
            .events
            .iter()
            .filter(|event| event.leaf_index >= from_leaf_index)
            .cloned()
            .collect())
    }
}

pub struct MockWallet;

impl WalletAdapter for MockWallet {
    fn public_key(&self) -> ExternalAddress {
        [7u8; 32]
    }

    async fn sign_transaction(&self, record: InstructionRecord) -> anyhow::Result<SignedInstruction> {
        let transaction = record.data.clone();
        Ok(SignedInstruction {
            record,
            transaction,
        })
    }
}

pub struct RefusingWallet;

impl WalletAdapter for RefusingWallet {
    fn public_key(&self) -> ExternalAddress {
        [7u8; 32]
    }

    async fn sign_transaction(
        &self,
        _record: InstructionRecord,
    ) -> anyhow::Result<SignedInstruction> {
        anyhow::bail!("user declined the signature request")
    }
}

/// Returns deterministic proof bytes derived from the public inputs, so the
/// mock chain sees distinct, stable proofs without a real proving stack.
pub struct MockProver;

fn stub_proof(public_inputs: &[Field; TRANSFER_PUBLIC_INPUT_COUNT]) -> Groth16Proof {
    let mut pi_a = [0u8; 64];
    pi_a[..32].copy_from_slice(&public_inputs[0].to_bytes_le());
    pi_a[32..].copy_from_slice(&public_inputs[1].to_bytes_le());
    let mut pi_b = [0u8; 128];
    for (chunk, input) in pi_b.chunks_mut(32).zip(&public_inputs[2..6]) {
        chunk.copy_from_slice(&input.to_bytes_le());
    }
    let mut pi_c = [0u8; 64];
    pi_c[..32].copy_from_slice(&public_inputs[6].to_bytes_le());
    Groth16Proof { pi_a, pi_b, pi_c }
}

impl ProverBackend for MockProver {
    async fn prove_transfer(
        &self,
        public_inputs: &[Field; TRANSFER_PUBLIC_INPUT_COUNT],
        _witness: &[Field],
    ) -> anyhow::Result<Groth16Proof> {
        Ok(stub_proof(public_inputs))
    }
}

/// Sleeps before proving; drives the timeout and busy-rejection tests.
pub struct SlowProver(pub Duration);

impl ProverBackend for SlowProver {
    async fn prove_transfer(
        &self,
        public_inputs: &[Field; TRANSFER_PUBLIC_INPUT_COUNT],
        _witness: &[Field],
    ) -> anyhow::Result<Groth16Proof> {
        tokio::time::sleep(self.0).await;
        Ok(stub_proof(public_inputs))
    }
}

pub struct CrashingProver;

impl ProverBackend for CrashingProver {
    async fn prove_transfer(
        &self,
        _public_inputs: &[Field; TRANSFER_PUBLIC_INPUT_COUNT],
        _witness: &[Field],
    ) -> anyhow::Result<Groth16Proof> {
        anyhow::bail!("proving backend crashed")
    }
}

pub type TestClient = ShieldedClient<MockConnection, MockWallet, MockProver>;

/// A freshly initialized client on its own chain.
pub async fn ready_client() -> (TestClient, MockConnection) {
    let connection = MockConnection::new();
    let client = client_on(connection.clone(), TEST_SEED).await;
    (client, connection)
}

/// An initialized client sharing `connection` with other clients.
pub async fn client_on(connection: MockConnection, seed: &[u8]) -> TestClient {
    let client = ShieldedClient::new(
        connection,
        MockWallet,
        MockProver,
        ClientConfig::default(),
    )
    .expect("artifact discovery needs no files present");
    client
        .initialize(seed)
        .await
        .expect("test seed is long enough");
    client
}

pub async fn client_with_prover<P: ProverBackend>(
    connection: MockConnection,
    prover: P,
    config: ClientConfig,
) -> ShieldedClient<MockConnection, MockWallet, P> {
    let client = ShieldedClient::new(connection, MockWallet, prover, config)
        .expect("artifact discovery needs no files present");
    client
        .initialize(TEST_SEED)
        .await
        .expect("test seed is long enough");
    client
}

/// Collect note amounts as a sorted list for order-insensitive assertions.
pub fn sorted_amounts(notes: &[shielded_client::Note]) -> Vec<u64> {
    let mut amounts: Vec<u64> = notes.iter().map(|n| n.amount).collect();
    amounts.sort_unstable();
    amounts
}

/// The nullifiers the chain has seen, deduplicated.
pub fn seen_nullifiers(connection: &MockConnection) -> HashSet<Field> {
    connection.chain().nullifiers.iter().copied().collect()
}
