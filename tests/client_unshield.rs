mod common;

use common::{EXTERNAL_RECIPIENT, ready_client, seen_nullifiers};
use shielded_client::error::ClientError;
use shielded_client::instruction::InstructionKind;

#[tokio::test]
async fn partial_unshield_returns_change() {
    let (client, connection) = ready_client().await;
    client.shield(10_000).await.expect("funding");

    let outcome = client
        .unshield(EXTERNAL_RECIPIENT, 3_000)
        .await
        .expect("unshield succeeds");

    assert_eq!(client.note_count().unwrap(), 1);
    assert_eq!(client.shielded_balance().unwrap(), 7_000);
    // One real nullifier plus the dummy input's nullifier.
    assert_eq!(outcome.nullifiers_spent.len(), 2);
    assert_eq!(seen_nullifiers(&connection).len(), 2);
    // Funding leaf plus the change commitment.
    assert_eq!(client.leaf_count().unwrap(), 2);
    assert_eq!(outcome.new_commitments.len(), 1);

    let chain = connection.chain();
    let record = chain.submitted.last().expect("unshield recorded");
    assert_eq!(record.kind, InstructionKind::Unshield);
    assert_eq!(record.unshield_recipient, Some(EXTERNAL_RECIPIENT));
    assert_eq!(&record.data[384..392], &3_000u64.to_le_bytes());
}

#[tokio::test]
async fn exact_unshield_emits_no_change() {
    let (client, connection) = ready_client().await;
    client.shield(500).await.expect("funding");

    let outcome = client
        .unshield(EXTERNAL_RECIPIENT, 500)
        .await
        .expect("exact unshield");

    assert_eq!(client.note_count().unwrap(), 0);
    assert_eq!(client.shielded_balance().unwrap(), 0);
    assert!(outcome.new_commitments.is_empty());
    assert_eq!(client.leaf_count().unwrap(), 1);

    // The reserved change slot is all zeros when the spend is exact.
    let chain = connection.chain();
    let record = chain.submitted.last().expect("unshield recorded");
    assert_eq!(&record.data[320..352], &[0u8; 32]);
}

#[tokio::test]
async fn unshield_beyond_selectable_value_fails() {
    let (client, _connection) = ready_client().await;
    client.shield(1_000).await.expect("funding");
    let snapshot = client.export_state().unwrap();

    let err = client
        .unshield(EXTERNAL_RECIPIENT, 2_000)
        .await
        .expect_err("insufficient");
    assert!(matches!(err, ClientError::InsufficientBalance { .. }));
    assert_eq!(client.export_state().unwrap(), snapshot);
}
