//! Integration tests for buildmoded
//!
//! These drive the session manager against a mock host the way the service
//! and a host integration do together: capture state, send it with the
//! request, apply the returned effects.

use buildmode_api::{
    ActionKind, ContainerKind, DenyReason, Effect, GameMode, InventorySnapshot, ItemStack,
    ItemType, RestrictionMode, SessionEndReason, ARMOR_SLOTS, STORAGE_SLOTS,
};
use buildmode_config::{parse_config, PolicyConfiguration, SessionSettings};
use buildmode_core::{CoreEvent, ReconnectOutcome, SessionError, SessionManager};
use buildmode_host_api::{apply_effects, capture_state, HostAdapter, MockHost};
use buildmode_store::{AuditEventType, SqliteStore, Store};
use buildmode_util::UserId;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;

fn item(name: &str) -> ItemStack {
    ItemStack::new(ItemType::parse(name).unwrap(), 1)
}

fn settings() -> SessionSettings {
    SessionSettings {
        duration: Duration::from_secs(10 * 60),
        cooldown: Duration::from_secs(60),
        tool_item: ItemType::parse("WOODEN_AXE").unwrap(),
    }
}

fn blacklist(names: &[&str]) -> PolicyConfiguration {
    PolicyConfiguration::new(
        RestrictionMode::Blacklist,
        names.iter().map(|n| ItemType::parse(n).unwrap()),
        Vec::new(),
    )
}

/// Every one of the 41 slots occupied, with an enchanted item in the mix
fn full_inventory() -> InventorySnapshot {
    let mut inv = InventorySnapshot::empty();
    for slot in inv.storage.iter_mut() {
        *slot = Some(ItemStack::new(ItemType::parse("COBBLESTONE").unwrap(), 64));
    }
    for slot in inv.armor.iter_mut() {
        *slot = Some(item("DIAMOND_CHESTPLATE"));
    }
    inv.offhand = Some(item("TOTEM_OF_UNDYING"));
    inv.storage[0] = Some(item("DIAMOND_SWORD").with_enchantment("sharpness", 5));
    inv
}

/// Millisecond precision, as the store keeps it
fn store_now() -> DateTime<Local> {
    buildmode_util::from_epoch_millis(buildmode_util::to_epoch_millis(&buildmode_util::now()))
        .unwrap()
}

async fn host_start(
    manager: &mut SessionManager,
    host: &MockHost,
    user: UserId,
    now: DateTime<Local>,
) -> Result<(), SessionError> {
    let (mode, inventory) = capture_state(host, user).await.unwrap();
    let outcome = manager.start(user, mode, inventory, false, now)?;
    apply_effects(host, user, &outcome.effects).await.unwrap();
    Ok(())
}

#[tokio::test]
async fn test_full_session_lifecycle() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&["TNT"]), store.clone());
    let host = MockHost::new();
    let user = UserId::new();
    let original = full_inventory();
    host.connect(user, GameMode::Survival, original.clone());

    let now = buildmode_util::now();
    host_start(&mut manager, &host, user, now).await.unwrap();

    // Elevated, cleared, holding only the tool
    let player = host.player(user).unwrap();
    assert_eq!(player.mode, GameMode::Creative);
    assert_eq!(player.inventory.item_count(), 1);
    assert_eq!(
        player.inventory.storage[0].as_ref().map(|i| i.item_type.as_str()),
        Some("WOODEN_AXE")
    );

    // Restrictions apply while active
    assert_eq!(
        manager.evaluate_action(user, &ActionKind::PlaceBlock, Some(&item("TNT"))),
        buildmode_api::ActionVerdict::deny(DenyReason::IllegalItem)
    );
    assert_eq!(
        manager.evaluate_action(
            user,
            &ActionKind::OpenContainer {
                container: ContainerKind::ShulkerBox
            },
            None
        ),
        buildmode_api::ActionVerdict::deny(DenyReason::ContainerForbidden)
    );

    // Stop: every slot comes back exactly
    let later = now + chrono::Duration::minutes(3);
    let outcome = manager.end(user, SessionEndReason::UserStop, later).unwrap();
    apply_effects(&host, user, &outcome.effects).await.unwrap();

    let player = host.player(user).unwrap();
    assert_eq!(player.mode, GameMode::Survival);
    assert_eq!(player.inventory, original);
    assert_eq!(player.inventory.storage.len(), STORAGE_SLOTS);
    assert_eq!(player.inventory.armor.len(), ARMOR_SLOTS);
    assert_eq!(player.inventory.item_count(), 41);

    // Restrictions lifted, cooldown in force
    assert!(manager
        .evaluate_action(user, &ActionKind::Drop, None)
        .is_allowed());
    assert!(matches!(
        host_start(&mut manager, &host, user, later).await,
        Err(SessionError::OnCooldown { .. })
    ));

    let audits = store.get_recent_audits(10).unwrap();
    assert!(audits
        .iter()
        .any(|a| matches!(a.event, AuditEventType::SessionEnded { .. })));
}

#[tokio::test]
async fn test_empty_inventory_roundtrip() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&[]), store);
    let host = MockHost::new();
    let user = UserId::new();
    host.connect(user, GameMode::Adventure, InventorySnapshot::empty());

    let now = buildmode_util::now();
    host_start(&mut manager, &host, user, now).await.unwrap();

    let outcome = manager.end(user, SessionEndReason::UserStop, now).unwrap();
    apply_effects(&host, user, &outcome.effects).await.unwrap();

    let player = host.player(user).unwrap();
    assert_eq!(player.mode, GameMode::Adventure);
    assert!(player.inventory.is_empty());
}

#[tokio::test]
async fn test_live_expiry_restores_connected_user() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&[]), store);
    let host = MockHost::new();
    let user = UserId::new();
    host.connect(user, GameMode::Survival, full_inventory());

    let now = buildmode_util::now();
    host_start(&mut manager, &host, user, now).await.unwrap();

    let sweep = now + chrono::Duration::minutes(11);
    let events = manager.reconcile(sweep, |_| true);
    assert_eq!(events.len(), 1);

    let CoreEvent::SessionExpired { effects, duration, .. } = &events[0] else {
        panic!("expected expiry, got {:?}", events[0]);
    };
    assert_eq!(*duration, Duration::from_secs(11 * 60));

    apply_effects(&host, user, effects).await.unwrap();
    let player = host.player(user).unwrap();
    assert_eq!(player.mode, GameMode::Survival);
    assert_eq!(player.inventory, full_inventory());

    // Second sweep finds nothing
    assert!(manager.reconcile(sweep, |_| true).is_empty());

    // No new session until the host confirms the restore
    let after_cooldown = sweep + chrono::Duration::minutes(2);
    assert!(matches!(
        host_start(&mut manager, &host, user, after_cooldown).await,
        Err(SessionError::RestorePending)
    ));
    manager.acknowledge_restore(user).unwrap();
    host_start(&mut manager, &host, user, after_cooldown)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missed_expiry_events_are_recoverable() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&[]), store);
    let host = MockHost::new();
    let users: Vec<UserId> = (0..120).map(|_| UserId::new()).collect();
    let now = buildmode_util::now();
    for user in &users {
        host.connect(*user, GameMode::Survival, full_inventory());
        host_start(&mut manager, &host, *user, now).await.unwrap();
    }

    // The host never sees these events
    let sweep = now + chrono::Duration::minutes(11);
    assert_eq!(manager.reconcile(sweep, |_| true).len(), users.len());

    // It catches up by listing what is still pending
    for pending in manager.pending_restores() {
        apply_effects(&host, pending.user_id, &pending.effects)
            .await
            .unwrap();
        manager.acknowledge_restore(pending.user_id).unwrap();
    }

    assert_eq!(manager.pending_restore_count(), 0);
    for user in &users {
        let player = host.player(*user).unwrap();
        assert_eq!(player.mode, GameMode::Survival);
        assert_eq!(player.inventory, full_inventory());
    }
}

#[tokio::test]
async fn test_offline_expiry_restores_on_reconnect() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&[]), store);
    let host = MockHost::new();
    let user = UserId::new();
    host.connect(user, GameMode::Survival, full_inventory());

    let now = buildmode_util::now();
    host_start(&mut manager, &host, user, now).await.unwrap();
    host.disconnect(user);

    // Host reports presence; the sweep sees the user as away
    let sweep = now + chrono::Duration::minutes(15);
    let events = manager.reconcile(sweep, |_| false);
    assert!(matches!(events[0], CoreEvent::RestoreDeferred { .. }));
    assert!(!manager.is_active(user));

    // Offline restore is impossible
    assert!(!host.is_connected(user).await);

    host.reconnect(user);
    let outcome = manager.user_connected(user, sweep + chrono::Duration::hours(1));
    assert!(matches!(outcome, ReconnectOutcome::RestoreApplied { .. }));
    apply_effects(&host, user, outcome.effects()).await.unwrap();

    let player = host.player(user).unwrap();
    assert_eq!(player.mode, GameMode::Survival);
    assert_eq!(player.inventory, full_inventory());
}

#[tokio::test]
async fn test_failed_host_write_stops_effects() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&[]), store);
    let host = MockHost::new();
    let user = UserId::new();
    host.connect(user, GameMode::Survival, full_inventory());

    let (mode, inventory) = capture_state(&host, user).await.unwrap();
    let outcome = manager
        .start(user, mode, inventory, false, buildmode_util::now())
        .unwrap();

    host.set_fail_writes(true);
    assert!(apply_effects(&host, user, &outcome.effects).await.is_err());

    // Nothing was applied
    let player = host.player(user).unwrap();
    assert_eq!(player.mode, GameMode::Survival);
    assert_eq!(player.inventory, full_inventory());
}

#[tokio::test]
async fn test_restart_preserves_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let host = MockHost::new();
    let running = UserId::new();
    let short = UserId::new();
    let now = store_now();

    host.connect(running, GameMode::Survival, full_inventory());
    host.connect(short, GameMode::Survival, InventorySnapshot::empty());

    {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_dir(dir.path()).unwrap());
        let mut manager = SessionManager::new(settings(), blacklist(&[]), store);

        host_start(&mut manager, &host, running, now).await.unwrap();
        host_start(
            &mut manager,
            &host,
            short,
            now - chrono::Duration::minutes(8),
        )
        .await
        .unwrap();

        manager.persist().unwrap();
    }

    // Down for three minutes: short's deadline passes
    let restart = now + chrono::Duration::minutes(3);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_dir(dir.path()).unwrap());
    let mut manager = SessionManager::recover(settings(), blacklist(&[]), store, restart);

    assert!(manager.is_active(running));
    assert_eq!(manager.remaining_seconds(running, restart), 7 * 60);
    assert!(!manager.is_active(short));

    // The recovered snapshot still restores everything
    let outcome = manager
        .end(running, SessionEndReason::UserStop, restart)
        .unwrap();
    apply_effects(&host, running, &outcome.effects).await.unwrap();
    assert_eq!(host.player(running).unwrap().inventory, full_inventory());
}

#[tokio::test]
async fn test_reload_keeps_sessions() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&["TNT"]), store);
    let host = MockHost::new();
    let user = UserId::new();
    host.connect(user, GameMode::Survival, InventorySnapshot::empty());

    let now = buildmode_util::now();
    host_start(&mut manager, &host, user, now).await.unwrap();

    let config = parse_config(
        r#"
        config_version = 1

        [session]
        duration_minutes = 120
        cooldown_minutes = 0

        [restrictions]
        mode = "whitelist"
        whitelist = ["OAK_PLANKS", "not an item!"]
        "#,
    )
    .unwrap();
    assert_eq!(config.warnings.len(), 1);

    manager.reload(config.session, config.restrictions);

    // Running session keeps its deadline; only verdicts change
    assert_eq!(manager.remaining_seconds(user, now), 10 * 60);
    assert!(manager
        .evaluate_action(user, &ActionKind::PlaceBlock, Some(&item("OAK_PLANKS")))
        .is_allowed());
    assert!(!manager
        .evaluate_action(user, &ActionKind::PlaceBlock, Some(&item("TNT")))
        .is_allowed());

    // New sessions pick up the new length
    let other = UserId::new();
    host.connect(other, GameMode::Survival, InventorySnapshot::empty());
    host_start(&mut manager, &host, other, now).await.unwrap();
    assert_eq!(manager.remaining_seconds(other, now), 120 * 60);
}

#[test]
fn test_config_defaults() {
    let config = parse_config("config_version = 1").unwrap();
    assert_eq!(config.session.duration, Duration::from_secs(3600));
    assert_eq!(config.session.cooldown, Duration::from_secs(60));
    assert_eq!(config.session.tool_item.as_str(), "WOODEN_AXE");
    assert_eq!(config.service.check_interval, Duration::from_secs(30));
    assert_eq!(config.restrictions.mode, RestrictionMode::Blacklist);
}

#[test]
fn test_unlimited_session_not_swept() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut manager = SessionManager::new(settings(), blacklist(&[]), store);
    let user = UserId::new();
    let now = buildmode_util::now();

    let outcome = manager
        .start(user, GameMode::Survival, InventorySnapshot::empty(), true, now)
        .unwrap();
    assert!(outcome.session.deadline.is_none());
    assert!(outcome
        .effects
        .contains(&Effect::SetGameMode {
            mode: GameMode::Creative
        }));

    let far = now + chrono::Duration::days(30);
    assert!(manager.reconcile(far, |_| true).is_empty());
    assert_eq!(manager.remaining_seconds(user, far), u64::MAX);
}
