//! The shielded client: wallet state, operation orchestration, sync.
//!
//! One client instance owns one wallet's view of one pool: its spendable
//! notes, the local mirror of the commitment tree, and the keys derived at
//! initialization. The host chain is reached only through two injected
//! capabilities (a [`PoolConnection`] that submits instructions and serves
//! commitment events, and a [`WalletAdapter`] that signs), so the core never
//! holds chain credentials or opens sockets.
//!
//! Operations are atomic over local state: everything is planned and proven
//! first, the instruction is submitted, and only a confirmed submission
//! applies the note/tree updates. A rejected or cancelled operation leaves
//! the wallet bit-identical to its pre-call snapshot. Re-entrant calls on
//! the same instance are refused with `Busy`; the only awaits are proving,
//! signing, and submission.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::address::ZkAddress;
use crate::artifacts::{self, CircuitArtifacts};
use crate::bn254::Field;
use crate::error::{ClientError, Operation};
use crate::instruction::{
    self, ExternalAddress, InstructionKind, InstructionRecord, SignedInstruction,
};
use crate::keys::{self, SpendingKeypair};
use crate::merkle::{MerkleTree, MAX_LEAVES};
use crate::note::{self, EncryptedNote, Note};
use crate::prover::{self, ProverBackend, DEFAULT_PROOF_TIMEOUT};
use crate::tx::{self, SpendPlan};

/// Asset fingerprint of the host chain's native token.
pub fn native_token_mint() -> Field {
    Field::zero()
}

/// Host-chain RPC capability injected into the client.
///
/// `submit` resolves at confirmation time (or rejection); the returned
/// string is the host chain's transaction signature. Event queries serve the
/// pool's append-only commitment log in leaf order.
#[allow(async_fn_in_trait)]
pub trait PoolConnection {
    async fn submit(&self, instruction: SignedInstruction) -> anyhow::Result<String>;
    async fn latest_root(&self, token_mint: Field) -> anyhow::Result<Field>;
    async fn commitment_events(
        &self,
        token_mint: Field,
        from_leaf_index: u64,
    ) -> anyhow::Result<Vec<CommitmentEvent>>;
}

/// Signing capability; the core never sees raw host-chain keys.
#[allow(async_fn_in_trait)]
pub trait WalletAdapter {
    fn public_key(&self) -> ExternalAddress;
    async fn sign_transaction(&self, record: InstructionRecord) -> anyhow::Result<SignedInstruction>;
}

/// One appended commitment as observed on chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentEvent {
    pub leaf_index: u64,
    pub commitment: Field,
    pub ciphertext: Option<EncryptedNote>,
}

/// Constructor options recognized by the client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub token_mint: Field,
    pub wasm_path: Option<PathBuf>,
    pub zkey_path: Option<PathBuf>,
    pub proof_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token_mint: native_token_mint(),
            wasm_path: None,
            zkey_path: None,
            proof_timeout: DEFAULT_PROOF_TIMEOUT,
        }
    }
}

/// Lifecycle of a client instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Ready,
    Busy(Operation),
    /// Records the last failed operation; the client remains usable.
    Failed(Operation),
}

/// Result of a submitted shield/transfer/unshield.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TxOutcome {
    pub signature: String,
    pub new_commitments: Vec<Field>,
    pub nullifiers_spent: Vec<Field>,
    pub new_root: Field,
}

/// Result of a wallet scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOutcome {
    pub notes: Vec<Note>,
    pub scanned_to_index: u64,
    pub total_balance: u64,
}

/// Persistable wallet state for session restore.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WalletSnapshot {
    pub notes: Vec<Note>,
    pub spent_commitments: Vec<Field>,
    pub tree: MerkleTree,
    pub scanned_to: u64,
}

struct WalletState {
    state: ClientState,
    keys: Option<SpendingKeypair>,
    viewing_key: Option<[u8; 32]>,
    notes: Vec<Note>,
    spent_commitments: HashSet<Field>,
    tree: MerkleTree,
    scanned_to: u64,
}

pub struct ShieldedClient<C, W, P> {
    connection: C,
    wallet: W,
    prover: P,
    config: ClientConfig,
    artifacts: CircuitArtifacts,
    inner: Mutex<WalletState>,
}

impl<C, W, P> ShieldedClient<C, W, P>
where
    C: PoolConnection,
    W: WalletAdapter,
    P: ProverBackend,
{
    /// Build a client around its three collaborators. The instance starts
    /// `Uninitialized`; no operation works before [`Self::initialize`].
    pub fn new(connection: C, wallet: W, prover: P, config: ClientConfig) -> anyhow::Result<Self> {
        let artifacts = artifacts::locate(config.wasm_path.clone(), config.zkey_path.clone())?;
        Ok(Self {
            connection,
            wallet,
            prover,
            config,
            artifacts,
            inner: Mutex::new(WalletState {
                state: ClientState::Uninitialized,
                keys: None,
                viewing_key: None,
                notes: Vec::new(),
                spent_commitments: HashSet::new(),
                tree: MerkleTree::new(),
                scanned_to: 0,
            }),
        })
    }

    /// Derive the session keys from `seed` and move to `Ready`.
    ///
    /// One-shot: a second call with the same seed is a no-op, a different
    /// seed is rejected. Key material is immutable for the session.
    /// Cancellable like every other operation: dropping the future before
    /// completion leaves the client `Uninitialized` with no state changes.
    pub async fn initialize(&self, seed: &[u8]) -> Result<(), ClientError> {
        let keys = SpendingKeypair::from_seed(seed)?;
        let viewing_key = keys::derive_viewing_key(seed)?;

        let mut inner = self.lock();
        match inner.state {
            ClientState::Busy(op) => Err(ClientError::Busy(op)),
            ClientState::Uninitialized => {
                tracing::debug!(owner = ?keys.owner_pubkey(), "client initialized");
                inner.keys = Some(keys);
                inner.viewing_key = Some(viewing_key);
                inner.state = ClientState::Ready;
                Ok(())
            }
            ClientState::Ready | ClientState::Failed(_) => {
                let same = inner
                    .keys
                    .as_ref()
                    .is_some_and(|existing| existing.owner_pubkey() == keys.owner_pubkey());
                if same {
                    Ok(())
                } else {
                    Err(ClientError::InvalidSeed(
                        "client is already initialized with a different seed".into(),
                    ))
                }
            }
        }
    }

    /// Move transparent funds into the pool as a fresh self-owned note.
    ///
    /// No proof is involved: the host program checks the deposit against the
    /// emitted commitment with a transparent-side rule.
    pub async fn shield(&self, amount: u64) -> Result<TxOutcome, ClientError> {
        let guard = self.begin(Operation::Shield)?;

        let (note, signature) = match self.shield_inner(amount).await {
            Ok(parts) => parts,
            Err(err) => return Err(guard.fail(err)),
        };
        let commitment = note.commitment();

        Ok(guard.complete(|inner| {
            let leaf_index = inner
                .tree
                .insert(commitment)
                .expect("tree capacity checked before submission");
            let mut stored = note;
            stored.leaf_index = Some(leaf_index);
            inner.notes.push(stored);
            tracing::info!(amount, leaf_index, "shield confirmed");
            TxOutcome {
                signature,
                new_commitments: vec![commitment],
                nullifiers_spent: Vec::new(),
                new_root: inner.tree.root(),
            }
        }))
    }

    /// Shielded-to-shielded payment; amounts stay hidden.
    pub async fn transfer(&self, recipient: &ZkAddress, amount: u64) -> Result<TxOutcome, ClientError> {
        let guard = self.begin(Operation::Transfer)?;
        match self.spend_inner(Some(recipient), None, amount).await {
            Ok((plan, signature)) => Ok(guard.complete(|inner| {
                Self::apply_spend(inner, &plan, signature, amount, "transfer confirmed")
            })),
            Err(err) => Err(guard.fail(err)),
        }
    }

    /// Exit the pool toward a transparent address; the exit amount is public.
    pub async fn unshield(
        &self,
        recipient: ExternalAddress,
        amount: u64,
    ) -> Result<TxOutcome, ClientError> {
        let guard = self.begin(Operation::Unshield)?;
        match self.spend_inner(None, Some(recipient), amount).await {
            Ok((plan, signature)) => Ok(guard.complete(|inner| {
                Self::apply_spend(inner, &plan, signature, amount, "unshield confirmed")
            })),
            Err(err) => Err(guard.fail(err)),
        }
    }

    /// Walk commitment events from `from_leaf_index` and recover every note
    /// addressed to this wallet's viewing key.
    ///
    /// Each decrypted note is re-committed and checked against the on-chain
    /// leaf; mismatches are discarded with a warning (a malicious sender can
    /// attach a ciphertext that does not open the commitment).
    pub async fn scan_for_notes(&self, from_leaf_index: u64) -> Result<ScanOutcome, ClientError> {
        let guard = self.begin(Operation::Scan)?;

        let (viewing_key, token_mint) = {
            let inner = self.lock();
            (
                inner.viewing_key.expect("initialized in begin"),
                self.config.token_mint,
            )
        };

        let events = match self
            .connection
            .commitment_events(token_mint, from_leaf_index)
            .await
        {
            Ok(events) => events,
            Err(err) => return Err(guard.fail(ClientError::SubmissionRejected(err.to_string()))),
        };

        Ok(guard.complete(|inner| {
            let mut found = Vec::new();
            let mut scanned_to = from_leaf_index;
            for event in &events {
                scanned_to = scanned_to.max(event.leaf_index.saturating_add(1));
                let Some(ciphertext) = &event.ciphertext else {
                    continue;
                };
                let Some(mut recovered) = note::decrypt_note(ciphertext, &viewing_key) else {
                    continue;
                };
                if recovered.commitment() != event.commitment {
                    let err = ClientError::ScanCorruption {
                        leaf_index: event.leaf_index,
                    };
                    tracing::warn!(%err, "discarding scanned note");
                    continue;
                }
                if recovered.token_mint != token_mint {
                    continue;
                }
                let known = inner.spent_commitments.contains(&event.commitment)
                    || inner
                        .notes
                        .iter()
                        .any(|n| n.commitment() == event.commitment);
                if known {
                    continue;
                }
                recovered.leaf_index = Some(event.leaf_index);
                found.push(recovered);
            }

            inner.notes.extend(found.iter().copied());
            inner.scanned_to = inner.scanned_to.max(scanned_to);
            let outcome = ScanOutcome {
                notes: found,
                scanned_to_index: scanned_to,
                total_balance: balance_of(&inner.notes),
            };
            tracing::info!(
                recovered = outcome.notes.len(),
                scanned_to,
                "wallet scan finished"
            );
            outcome
        }))
    }

    /// Bring the local tree in line with the chain.
    ///
    /// If the roots already agree this is a no-op. Otherwise the commitment
    /// log is replayed into a fresh tree (which also absorbs the case where
    /// our optimistic insert order lost a race) and note leaf indices are
    /// re-anchored by commitment. Once the roots agree, pending spent-note
    /// bookkeeping is considered settled and dropped.
    pub async fn sync(&self) -> Result<(), ClientError> {
        let guard = self.begin(Operation::Sync)?;
        match self.sync_inner().await {
            Ok(None) => Ok(guard.complete(|inner| inner.spent_commitments.clear())),
            Ok(Some(rebuilt)) => Ok(guard.complete(|inner| {
                for note in &mut inner.notes {
                    let commitment = note.commitment();
                    note.leaf_index = rebuilt
                        .leaves()
                        .iter()
                        .position(|leaf| *leaf == commitment)
                        .map(|index| index as u64);
                }
                inner.scanned_to = inner.scanned_to.max(rebuilt.leaf_count());
                inner.tree = rebuilt;
                inner.spent_commitments.clear();
                tracing::debug!(leaves = inner.tree.leaf_count(), "sync complete");
            })),
            Err(err) => Err(guard.fail(err)),
        }
    }

    /// Returns `None` when the local root already matches the chain, or the
    /// fully replayed tree otherwise. Replaying outside the lock keeps the
    /// swap atomic: wallet state is only touched once the replayed root is
    /// known to agree with the chain.
    async fn sync_inner(&self) -> Result<Option<MerkleTree>, ClientError> {
        let token_mint = self.config.token_mint;
        let chain_root = self
            .connection
            .latest_root(token_mint)
            .await
            .map_err(|err| ClientError::SubmissionRejected(err.to_string()))?;
        {
            let inner = self.lock();
            if inner.tree.root() == chain_root {
                return Ok(None);
            }
        }

        let events = self
            .connection
            .commitment_events(token_mint, 0)
            .await
            .map_err(|err| ClientError::SubmissionRejected(err.to_string()))?;

        let mut rebuilt = MerkleTree::new();
        for (position, event) in events.iter().enumerate() {
            if event.leaf_index != position as u64 {
                return Err(ClientError::SubmissionRejected(
                    "commitment log is not in leaf order".into(),
                ));
            }
            rebuilt
                .insert(event.commitment)
                .map_err(|_| ClientError::TreeFull)?;
        }
        if rebuilt.root() != chain_root {
            return Err(ClientError::SubmissionRejected(
                "chain root does not match the replayed commitment log".into(),
            ));
        }
        Ok(Some(rebuilt))
    }

    /// Sum of spendable note amounts.
    pub fn shielded_balance(&self) -> Result<u64, ClientError> {
        let inner = self.lock();
        self.require_initialized(&inner)?;
        Ok(balance_of(&inner.notes))
    }

    pub fn note_count(&self) -> Result<usize, ClientError> {
        let inner = self.lock();
        self.require_initialized(&inner)?;
        Ok(inner.notes.len())
    }

    pub fn leaf_count(&self) -> Result<u64, ClientError> {
        let inner = self.lock();
        self.require_initialized(&inner)?;
        Ok(inner.tree.leaf_count())
    }

    pub fn state(&self) -> ClientState {
        self.lock().state
    }

    /// Artifact locations resolved from the configuration, for backends
    /// that load the circuit lazily.
    pub fn artifacts(&self) -> &CircuitArtifacts {
        &self.artifacts
    }

    /// The receiving address external payers use to pay this wallet.
    pub fn address(&self) -> Result<ZkAddress, ClientError> {
        let inner = self.lock();
        self.require_initialized(&inner)?;
        let keys = inner.keys.as_ref().expect("checked by require_initialized");
        let viewing_key = inner.viewing_key.expect("checked by require_initialized");
        Ok(ZkAddress::new(keys.owner_pubkey(), viewing_key))
    }

    /// Snapshot the persistable wallet state.
    pub fn export_state(&self) -> Result<WalletSnapshot, ClientError> {
        let inner = self.lock();
        self.require_initialized(&inner)?;
        let mut spent: Vec<Field> = inner.spent_commitments.iter().copied().collect();
        spent.sort();
        Ok(WalletSnapshot {
            notes: inner.notes.clone(),
            spent_commitments: spent,
            tree: inner.tree.clone(),
            scanned_to: inner.scanned_to,
        })
    }

    /// Restore a snapshot taken by [`Self::export_state`].
    pub fn import_state(&self, snapshot: WalletSnapshot) -> Result<(), ClientError> {
        let mut inner = self.lock();
        self.require_initialized(&inner)?;
        if let ClientState::Busy(op) = inner.state {
            return Err(ClientError::Busy(op));
        }
        inner.notes = snapshot.notes;
        inner.spent_commitments = snapshot.spent_commitments.into_iter().collect();
        inner.tree = snapshot.tree;
        inner.scanned_to = snapshot.scanned_to;
        Ok(())
    }

    async fn shield_inner(&self, amount: u64) -> Result<(Note, String), ClientError> {
        let (note, record) = {
            let inner = self.lock();
            if inner.tree.leaf_count() >= MAX_LEAVES {
                return Err(ClientError::TreeFull);
            }
            let keys = inner.keys.as_ref().expect("initialized in begin");
            let viewing_key = inner.viewing_key.expect("initialized in begin");
            let note = note::create_note(amount, keys.owner_pubkey(), self.config.token_mint);
            let memo = note::encrypt_note(&note, &viewing_key)
                .map_err(|err| ClientError::SubmissionRejected(err.to_string()))?;
            let record = InstructionRecord {
                kind: InstructionKind::Shield,
                token_mint: self.config.token_mint,
                data: instruction::shield_data(amount, note.commitment()),
                memos: vec![memo],
                unshield_recipient: None,
            };
            (note, record)
        };
        let signature = self.sign_and_submit(record).await?;
        Ok((note, signature))
    }

    /// Shared spend pipeline for transfer and unshield: plan under the lock,
    /// prove, sign, submit. Local state is untouched until the caller
    /// applies the plan.
    async fn spend_inner(
        &self,
        recipient: Option<&ZkAddress>,
        unshield_recipient: Option<ExternalAddress>,
        amount: u64,
    ) -> Result<(SpendPlan, String), ClientError> {
        let mint = self.config.token_mint;
        let (plan, memos) = {
            let inner = self.lock();
            let keys = inner.keys.as_ref().expect("initialized in begin");
            let viewing_key = inner.viewing_key.expect("initialized in begin");

            let plan = match recipient {
                Some(addr) => tx::plan_transfer(
                    &inner.notes,
                    keys,
                    &inner.tree,
                    addr.receiving_pubkey,
                    amount,
                    mint,
                )?,
                None => tx::plan_unshield(&inner.notes, keys, &inner.tree, amount, mint)?,
            };

            let appended = plan.real_output_commitments().len() as u64;
            if inner.tree.leaf_count().saturating_add(appended) > MAX_LEAVES {
                return Err(ClientError::TreeFull);
            }

            // One memo per real output, in commitment order: payee first
            // (encrypted to the payee's viewing key), then change to self.
            let mut memos = Vec::new();
            if let Some(note) = &plan.recipient_note {
                let addr = recipient.expect("recipient note implies a recipient address");
                memos.push(
                    note::encrypt_note(note, &addr.viewing_key)
                        .map_err(|err| ClientError::SubmissionRejected(err.to_string()))?,
                );
            }
            if let Some(note) = &plan.change_note {
                memos.push(
                    note::encrypt_note(note, &viewing_key)
                        .map_err(|err| ClientError::SubmissionRejected(err.to_string()))?,
                );
            }

            (plan, memos)
        };

        let proof = prover::generate_transfer_proof(
            &self.prover,
            &plan.public_inputs,
            &plan.witness,
            self.config.proof_timeout,
        )
        .await?;

        let record = match unshield_recipient {
            None => InstructionRecord {
                kind: InstructionKind::Transfer,
                token_mint: mint,
                data: instruction::transfer_data(
                    &proof,
                    plan.public_inputs.nullifiers,
                    plan.public_inputs.output_commitments,
                    plan.public_inputs.merkle_root,
                ),
                memos,
                unshield_recipient: None,
            },
            Some(external) => InstructionRecord {
                kind: InstructionKind::Unshield,
                token_mint: mint,
                data: instruction::unshield_data(
                    &proof,
                    plan.public_inputs.nullifiers,
                    plan.change_note.as_ref().map(Note::commitment),
                    plan.public_inputs.merkle_root,
                    amount,
                ),
                memos,
                unshield_recipient: Some(external),
            },
        };

        let signature = self.sign_and_submit(record).await?;
        Ok((plan, signature))
    }

    async fn sign_and_submit(&self, record: InstructionRecord) -> Result<String, ClientError> {
        let signed = self
            .wallet
            .sign_transaction(record)
            .await
            .map_err(|err| ClientError::SubmissionRejected(err.to_string()))?;
        self.connection
            .submit(signed)
            .await
            .map_err(|err| ClientError::SubmissionRejected(err.to_string()))
    }

    fn apply_spend(
        inner: &mut WalletState,
        plan: &SpendPlan,
        signature: String,
        amount: u64,
        message: &'static str,
    ) -> TxOutcome {
        let spent: HashSet<Field> = plan.spent_notes.iter().map(Note::commitment).collect();
        inner.notes.retain(|note| !spent.contains(&note.commitment()));
        inner.spent_commitments.extend(spent.iter().copied());

        let mut new_commitments = Vec::new();
        if let Some(recipient_note) = &plan.recipient_note {
            let commitment = recipient_note.commitment();
            inner
                .tree
                .insert(commitment)
                .expect("tree capacity checked before submission");
            new_commitments.push(commitment);
            // The payee's note is theirs to recover by scanning; it is
            // deliberately not stored locally.
        }
        if let Some(change_note) = &plan.change_note {
            let commitment = change_note.commitment();
            let leaf_index = inner
                .tree
                .insert(commitment)
                .expect("tree capacity checked before submission");
            new_commitments.push(commitment);
            let mut stored = *change_note;
            stored.leaf_index = Some(leaf_index);
            inner.notes.push(stored);
        }

        tracing::info!(amount, spent = plan.spent_notes.len(), "{message}");
        TxOutcome {
            signature,
            new_commitments,
            nullifiers_spent: plan.public_inputs.nullifiers.to_vec(),
            new_root: inner.tree.root(),
        }
    }

    fn begin(&self, op: Operation) -> Result<OpGuard<'_>, ClientError> {
        let mut inner = self.lock();
        match inner.state {
            ClientState::Uninitialized => Err(ClientError::NotInitialized),
            ClientState::Busy(current) => Err(ClientError::Busy(current)),
            ClientState::Ready | ClientState::Failed(_) => {
                inner.state = ClientState::Busy(op);
                Ok(OpGuard {
                    inner: &self.inner,
                    op,
                    armed: true,
                })
            }
        }
    }

    fn require_initialized(&self, inner: &WalletState) -> Result<(), ClientError> {
        if inner.keys.is_none() {
            return Err(ClientError::NotInitialized);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, WalletState> {
        self.inner.lock().expect("wallet state mutex poisoned")
    }
}

fn balance_of(notes: &[Note]) -> u64 {
    notes
        .iter()
        .fold(0u64, |acc, note| acc.saturating_add(note.amount))
}

/// Keeps the state machine honest across every exit path: completion moves
/// Busy → Ready (with updates applied under the lock), failure moves
/// Busy → Failed with no updates, and dropping the guard (a cancelled
/// future) restores Ready untouched.
struct OpGuard<'a> {
    inner: &'a Mutex<WalletState>,
    op: Operation,
    armed: bool,
}

impl OpGuard<'_> {
    fn complete<T>(mut self, apply: impl FnOnce(&mut WalletState) -> T) -> T {
        self.armed = false;
        let mut inner = self.inner.lock().expect("wallet state mutex poisoned");
        let out = apply(&mut inner);
        inner.state = ClientState::Ready;
        out
    }

    fn fail(mut self, err: ClientError) -> ClientError {
        self.armed = false;
        let mut inner = self.inner.lock().expect("wallet state mutex poisoned");
        inner.state = ClientState::Failed(self.op);
        tracing::debug!(op = ?self.op, %err, "operation failed without state changes");
        err
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.inner.lock().expect("wallet state mutex poisoned");
            if inner.state == ClientState::Busy(self.op) {
                inner.state = ClientState::Ready;
            }
        }
    }
}
