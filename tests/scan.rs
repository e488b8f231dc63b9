mod common;

use common::{OTHER_SEED, TEST_SEED, client_on, ready_client};
use shielded_client::note::{create_note, encrypt_note};
use shielded_client::{Field, derive_viewing_key};

#[tokio::test]
async fn recipient_recovers_a_transferred_note() {
    let (sender, connection) = ready_client().await;
    let recipient = client_on(connection.clone(), OTHER_SEED).await;
    let recipient_address = recipient.address().expect("recipient address");

    sender.shield(5_000).await.expect("funding");
    sender
        .transfer(&recipient_address, 2_000)
        .await
        .expect("transfer");

    let outcome = recipient.scan_for_notes(0).await.expect("scan");
    assert_eq!(outcome.notes.len(), 1);
    assert_eq!(outcome.notes[0].amount, 2_000);
    assert_eq!(outcome.total_balance, 2_000);
    assert_eq!(
        outcome.scanned_to_index,
        connection.chain().tree.leaf_count()
    );
    assert_eq!(recipient.shielded_balance().unwrap(), 2_000);

    // After syncing the tree mirror, the scanned note is spendable.
    recipient.sync().await.expect("sync");
    let sender_address = sender.address().expect("sender address");
    recipient
        .transfer(&sender_address, 1_500)
        .await
        .expect("spend the scanned note");
    assert_eq!(recipient.shielded_balance().unwrap(), 500);
}

#[tokio::test]
async fn scanning_twice_does_not_duplicate_notes() {
    let (sender, connection) = ready_client().await;
    let recipient = client_on(connection.clone(), OTHER_SEED).await;
    let recipient_address = recipient.address().expect("address");

    sender.shield(5_000).await.expect("funding");
    sender
        .transfer(&recipient_address, 2_000)
        .await
        .expect("transfer");

    recipient.scan_for_notes(0).await.expect("first scan");
    let second = recipient.scan_for_notes(0).await.expect("second scan");
    assert!(second.notes.is_empty());
    assert_eq!(recipient.note_count().unwrap(), 1);
}

#[tokio::test]
async fn scan_ignores_notes_for_other_wallets() {
    let (sender, connection) = ready_client().await;
    let recipient = client_on(connection.clone(), OTHER_SEED).await;
    let bystander_seed = b"zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong";
    let bystander = client_on(connection.clone(), bystander_seed).await;

    sender.shield(5_000).await.expect("funding");
    sender
        .transfer(&recipient.address().unwrap(), 2_000)
        .await
        .expect("transfer");

    let outcome = bystander.scan_for_notes(0).await.expect("scan");
    assert!(outcome.notes.is_empty());
    assert_eq!(outcome.total_balance, 0);
}

#[tokio::test]
async fn tampered_ciphertext_is_discarded() {
    let (client, connection) = ready_client().await;
    client.shield(1_000).await.expect("funding");

    // A ciphertext that decrypts fine but opens a different commitment than
    // the leaf it is attached to.
    let viewing_key = derive_viewing_key(TEST_SEED).expect("viewing key");
    let decoy = create_note(9_999, Field::from_u64(1234), Field::zero());
    let memo = encrypt_note(&decoy, &viewing_key).expect("encrypt");
    connection.inject_event(Field::from_u64(777), Some(memo));

    let outcome = client.scan_for_notes(0).await.expect("scan");
    assert!(outcome.notes.is_empty());
    assert_eq!(client.shielded_balance().unwrap(), 1_000);
}

#[tokio::test]
async fn second_device_rebuilds_from_chain() {
    let (first_device, connection) = ready_client().await;
    first_device.shield(4_000).await.expect("shield");
    first_device.shield(2_000).await.expect("shield");

    // Same seed on a fresh device: empty local state, full recovery by
    // sync + scan.
    let second_device = client_on(connection.clone(), TEST_SEED).await;
    second_device.sync().await.expect("sync");
    assert_eq!(
        second_device.leaf_count().unwrap(),
        connection.chain().tree.leaf_count()
    );

    let outcome = second_device.scan_for_notes(0).await.expect("scan");
    assert_eq!(outcome.notes.len(), 2);
    assert_eq!(second_device.shielded_balance().unwrap(), 6_000);
}

#[tokio::test]
async fn sync_settles_pending_spends() {
    let (client, _connection) = ready_client().await;
    client.shield(3_000).await.expect("funding");
    client
        .unshield([1u8; 32], 1_000)
        .await
        .expect("unshield");

    let before = client.export_state().unwrap();
    assert!(!before.spent_commitments.is_empty());

    client.sync().await.expect("sync");
    let after = client.export_state().unwrap();
    assert!(after.spent_commitments.is_empty());
    assert_eq!(after.notes, before.notes);
}

#[tokio::test]
async fn lagging_tree_catches_up_on_sync() {
    let (alice, connection) = ready_client().await;
    let bob = client_on(connection.clone(), OTHER_SEED).await;

    alice.shield(1_000).await.expect("alice shields");
    bob.sync().await.expect("bob catches up");
    bob.shield(2_000).await.expect("bob shields on a current tree");

    assert_eq!(connection.chain().tree.leaf_count(), 2);
    assert_eq!(bob.leaf_count().unwrap(), 2);
}
