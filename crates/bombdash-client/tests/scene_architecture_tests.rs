//! Integration tests for the session orchestration core
//!
//! These drive the scene machine, registry, bus and sync service together the
//! way a running client does, against a scripted in-memory backend.

#[cfg(test)]
mod session_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bombdash_client::client::backend::{Method, MemoryTransport, TransportError};
    use bombdash_client::client::constants::{
        route_level_up, ROUTE_AUTH_ME, ROUTE_HEROES, ROUTE_LOGIN, ROUTE_RANKING, ROUTE_REGISTER,
        ROUTE_SCORES, ROUTE_WAGER_ENTER, ROUTE_WAGER_TIERS,
    };
    use bombdash_client::client::economy;
    use bombdash_client::client::{
        BackendSyncService, Bcoin, ClientEvent, Credentials, EventBus, EventKind, Hero, HeroKind,
        HeroStats, LifecycleStatus, Scene, SceneContext, SceneKey, ScenePayload,
        SceneStateMachine, Session, SessionRegistry, SubscriptionId, SyncError, ValidationError,
        WagerTier,
    };
    use bombdash_client::TokenStore;
    use serde_json::{json, Value};

    // ============ Fixtures ============

    struct Harness {
        bus: EventBus,
        registry: SessionRegistry,
        machine: SceneStateMachine,
        backend: Rc<MemoryTransport>,
        service: BackendSyncService<Rc<MemoryTransport>>,
    }

    fn harness() -> Harness {
        let bus = EventBus::new();
        let registry = SessionRegistry::new(bus.clone());
        let machine = SceneStateMachine::new(registry.clone());
        let backend = Rc::new(MemoryTransport::new());
        let service =
            BackendSyncService::new(backend.clone(), registry.clone(), TokenStore::in_memory());
        Harness {
            bus,
            registry,
            machine,
            backend,
            service,
        }
    }

    fn hero_json(id: u64, level: u32, xp: u64) -> Value {
        json!({
            "id": id, "user_id": 1, "hero_type": "mock", "level": level, "xp": xp,
            "hp": 100, "maxHp": 100, "damage": 1, "speed": 1, "status": "in_wallet"
        })
    }

    fn me_json(coins: &str, heroes: Vec<Value>) -> Value {
        json!({
            "success": true,
            "user": {
                "id": 1, "address": "0xfeed", "account_level": 1, "account_xp": 0,
                "coins": coins, "highest_wave_reached": 0, "heroes": heroes
            }
        })
    }

    fn session(coins: Bcoin) -> Session {
        Session {
            user_id: 1,
            wallet_address: None,
            account_level: 1,
            account_xp: 0,
            coin_balance: coins,
            highest_wave_reached: 0,
            auth_token: "jwt".into(),
        }
    }

    fn hero(id: u64, level: u32, xp: u64) -> Hero {
        Hero {
            hero_id: id,
            owner_user_id: 1,
            kind: HeroKind::Standard,
            level,
            xp,
            max_hp: 100,
            base_stats: HeroStats::default(),
            status: LifecycleStatus::InWallet,
            sprite_name: None,
            rarity: None,
            nft_id: None,
        }
    }

    fn record(bus: &EventBus, kind: EventKind) -> Rc<RefCell<Vec<ClientEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        bus.on(kind, move |event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });
        seen
    }

    fn balances(events: &[ClientEvent]) -> Vec<(Option<String>, bool)> {
        events
            .iter()
            .filter_map(ClientEvent::as_balance_update)
            .map(|update| (update.balance.clone(), update.is_error()))
            .collect()
    }

    // ============ Scene Architecture ============

    #[test]
    fn test_session_clear_over_game_session() {
        let mut h = harness();
        let ended = record(&h.bus, EventKind::SessionEnded);
        h.registry.begin_session(session(Bcoin::from_whole(100)));
        h.registry.set_heroes(vec![hero(1, 1, 0)]).unwrap();
        h.registry.select_hero(Some(1)).unwrap();

        h.machine
            .start(SceneKey::GameSession, ScenePayload::Hero(1))
            .unwrap();
        h.machine.start(SceneKey::Hud, ScenePayload::None).unwrap();
        h.machine.start(SceneKey::Pause, ScenePayload::None).unwrap();

        h.registry.clear();
        assert!(h.machine.process_transitions().is_empty());

        assert!(!h.machine.is_active(SceneKey::GameSession));
        assert!(!h.machine.is_active(SceneKey::Hud));
        assert!(!h.machine.is_active(SceneKey::Pause));
        assert_eq!(h.machine.active_scenes(), vec![SceneKey::AuthChoice]);
        assert_eq!(ended.borrow().len(), 1);
    }

    #[test]
    fn test_exactly_one_primary_through_a_session() {
        let mut h = harness();
        h.registry.begin_session(session(Bcoin::from_whole(100)));
        h.registry.set_heroes(vec![hero(1, 1, 0)]).unwrap();
        h.registry.select_hero(Some(1)).unwrap();

        let path = [
            SceneKey::MainMenu,
            SceneKey::CharacterSelection,
            SceneKey::GameSession,
            SceneKey::Hud,
            SceneKey::Pause,
            SceneKey::Forge,
            SceneKey::GameOver,
            SceneKey::Notification,
            SceneKey::MainMenu,
            SceneKey::Pvp,
        ];
        for key in path {
            let _ = h.machine.start(key, ScenePayload::None);
            let primaries = h
                .machine
                .active_scenes()
                .into_iter()
                .filter(|k| !h.machine.descriptor(*k).is_overlay())
                .count();
            assert_eq!(primaries, 1, "after starting {}", key);
        }
        assert_eq!(h.machine.primary(), SceneKey::Pvp);
    }

    /// Subscribes to balance updates for as long as it is active
    struct BalanceWatcher {
        seen: Rc<RefCell<Vec<String>>>,
        subscription: Option<SubscriptionId>,
    }

    impl Scene for BalanceWatcher {
        fn on_start(&mut self, ctx: &SceneContext, _payload: &ScenePayload) {
            let sink = self.seen.clone();
            self.subscription = Some(ctx.bus.on(EventKind::BalanceUpdate, move |event| {
                if let Some(balance) = event.as_balance_update().and_then(|u| u.balance.clone()) {
                    sink.borrow_mut().push(balance);
                }
                Ok(())
            }));
        }

        fn on_stop(&mut self, ctx: &SceneContext) {
            if let Some(id) = self.subscription.take() {
                ctx.bus.off(EventKind::BalanceUpdate, id);
            }
        }
    }

    #[test]
    fn test_emit_then_mount_does_not_redeliver() {
        let mut h = harness();
        let seen = Rc::new(RefCell::new(Vec::new()));
        h.machine.register_scene(
            SceneKey::Notification,
            BalanceWatcher {
                seen: seen.clone(),
                subscription: None,
            },
        );
        h.registry.begin_session(session(Bcoin::ZERO));

        h.registry.set_coin_balance(Bcoin::from_whole(100)).unwrap();
        h.machine
            .start(SceneKey::Notification, ScenePayload::None)
            .unwrap();
        assert!(seen.borrow().is_empty());

        h.registry.set_coin_balance(Bcoin::from_whole(99)).unwrap();
        h.machine.stop(SceneKey::Notification).unwrap();
        h.registry.set_coin_balance(Bcoin::from_whole(98)).unwrap();

        assert_eq!(*seen.borrow(), vec!["99.00".to_string()]);
        assert_eq!(h.bus.subscriber_count(EventKind::BalanceUpdate), 0);
    }

    // ============ Backend Sync ============

    #[tokio::test]
    async fn test_pin_login_installs_session() {
        let h = harness();
        let started = record(&h.bus, EventKind::SessionStarted);
        h.backend
            .respond(
                Method::Post,
                ROUTE_LOGIN,
                200,
                json!({"success": true, "token": "fresh-jwt"}),
            )
            .respond(
                Method::Get,
                ROUTE_AUTH_ME,
                200,
                me_json("100", vec![hero_json(1, 1, 60)]),
            );
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let session = h
            .service
            .login(
                Credentials::Pin {
                    username: "alice".into(),
                    pin: "1234".into(),
                },
                &ticket,
            )
            .await
            .unwrap();

        assert_eq!(session.coin_balance, Bcoin::from_whole(100));
        assert_eq!(session.auth_token, "fresh-jwt");
        assert_eq!(h.registry.heroes().len(), 1);
        assert_eq!(h.service.tokens().token(), Some("fresh-jwt".to_string()));
        assert_eq!(
            *started.borrow(),
            vec![ClientEvent::SessionStarted { user_id: 1 }]
        );
        let me_request = &h.backend.sent()[1];
        assert_eq!(me_request.token.as_deref(), Some("fresh-jwt"));
    }

    #[tokio::test]
    async fn test_rejected_stored_token_is_discarded() {
        let h = harness();
        h.service.tokens().save_token("expired").unwrap();
        h.backend.respond(
            Method::Get,
            ROUTE_AUTH_ME,
            403,
            json!({"success": false, "message": "Token invalid or expired."}),
        );
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let result = h
            .service
            .login(Credentials::Token("expired".into()), &ticket)
            .await;

        assert_eq!(result.unwrap_err(), SyncError::AuthExpired);
        assert_eq!(h.service.tokens().token(), None);
        assert!(!h.registry.is_logged_in());
    }

    #[tokio::test]
    async fn test_sequential_balance_updates_arrive_in_order() {
        let h = harness();
        let seen = record(&h.bus, EventKind::BalanceUpdate);
        h.registry.begin_session(session(Bcoin::ZERO));
        h.backend
            .respond(Method::Get, ROUTE_AUTH_ME, 200, me_json("100", vec![]))
            .respond(Method::Get, ROUTE_AUTH_ME, 200, me_json("99.00", vec![]));

        h.service.update_balance(1).await.unwrap();
        h.service.update_balance(1).await.unwrap();

        assert_eq!(
            balances(&seen.borrow()),
            vec![
                (Some("100.00".to_string()), false),
                (Some("99.00".to_string()), false)
            ]
        );
        assert_eq!(h.registry.coin_balance(), Some(Bcoin::from_whole(99)));
    }

    #[tokio::test]
    async fn test_failed_balance_update_keeps_last_known() {
        let h = harness();
        let seen = record(&h.bus, EventKind::BalanceUpdate);
        h.registry.begin_session(session(Bcoin::from_whole(42)));
        h.backend
            .fail(Method::Get, ROUTE_AUTH_ME, TransportError::Timeout);

        let result = h.service.update_balance(1).await;

        assert!(matches!(result, Err(SyncError::Transient(_))));
        assert_eq!(
            balances(&seen.borrow()),
            vec![(Some("42.00".to_string()), true)]
        );
        assert_eq!(h.registry.coin_balance(), Some(Bcoin::from_whole(42)));
    }

    #[tokio::test]
    async fn test_balance_update_without_session_still_emits_once() {
        let h = harness();
        let seen = record(&h.bus, EventKind::BalanceUpdate);

        let result = h.service.update_balance(1).await;

        assert_eq!(
            result.unwrap_err(),
            SyncError::Validation(ValidationError::NoSession)
        );
        assert_eq!(balances(&seen.borrow()), vec![(None, true)]);
        assert!(h.backend.sent().is_empty());
    }

    #[tokio::test]
    async fn test_level_up_replaces_hero_verbatim() {
        let h = harness();
        let updates = record(&h.bus, EventKind::HeroUpdated);
        let changed = record(&h.bus, EventKind::BalanceChanged);
        h.registry.begin_session(session(Bcoin::from_whole(10)));
        h.registry.set_heroes(vec![hero(5, 1, 120)]).unwrap();
        h.backend.respond(
            Method::Post,
            &route_level_up(5),
            200,
            json!({"success": true, "hero": hero_json(5, 2, 120)}),
        );
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let leveled = h.service.level_up_hero(5, "0xtx", &ticket).await.unwrap();

        assert_eq!(leveled.level, 2);
        assert_eq!(h.registry.hero(5).map(|h| h.level), Some(2));
        assert_eq!(
            *updates.borrow(),
            vec![ClientEvent::HeroUpdated {
                hero_id: 5,
                level: 2,
                xp: 120
            }]
        );
        assert_eq!(changed.borrow().len(), 1);
        assert_eq!(
            h.backend.sent()[0].body,
            Some(json!({ "txHash": "0xtx" }))
        );
    }

    #[tokio::test]
    async fn test_level_up_never_lowers_level() {
        let h = harness();
        let failed = record(&h.bus, EventKind::TransactionFailed);
        h.registry.begin_session(session(Bcoin::from_whole(10)));
        h.registry.set_heroes(vec![hero(5, 3, 500)]).unwrap();
        h.backend.respond(
            Method::Post,
            &route_level_up(5),
            200,
            json!({"success": true, "hero": hero_json(5, 2, 500)}),
        );
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let result = h.service.level_up_hero(5, "0xtx", &ticket).await;

        assert!(matches!(result, Err(SyncError::Rejected(_))));
        assert_eq!(h.registry.hero(5).map(|h| h.level), Some(3));
        assert_eq!(failed.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_level_up_without_xp_never_reaches_backend() {
        let h = harness();
        h.registry.begin_session(session(Bcoin::from_whole(10)));
        h.registry.set_heroes(vec![hero(5, 2, 120)]).unwrap();
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let result = h.service.level_up_hero(5, "0xtx", &ticket).await;

        assert_eq!(
            result.unwrap_err(),
            SyncError::Validation(ValidationError::InsufficientXp {
                required: 200,
                available: 120
            })
        );
        assert!(h.backend.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let mut h = harness();
        h.registry.begin_session(session(Bcoin::from_whole(10)));
        h.registry.set_heroes(vec![hero(1, 1, 0)]).unwrap();
        let ticket = h
            .machine
            .start(SceneKey::CharacterSelection, ScenePayload::None)
            .unwrap();
        h.backend.respond(
            Method::Get,
            ROUTE_HEROES,
            200,
            json!({"success": true, "heroes": [hero_json(1, 1, 0), hero_json(2, 1, 0)]}),
        );

        // The player backs out before the roster arrives
        h.machine
            .start(SceneKey::MainMenu, ScenePayload::None)
            .unwrap();
        let result = h.service.fetch_heroes(1, &ticket).await;

        assert_eq!(
            result.unwrap_err(),
            SyncError::StaleResponse {
                scene: SceneKey::CharacterSelection
            }
        );
        assert_eq!(h.registry.heroes().len(), 1);
    }

    #[tokio::test]
    async fn test_level_up_lands_after_scene_stopped() {
        let mut h = harness();
        let changed = record(&h.bus, EventKind::BalanceChanged);
        let failed = record(&h.bus, EventKind::TransactionFailed);
        h.registry.begin_session(session(Bcoin::from_whole(10)));
        h.registry.set_heroes(vec![hero(5, 1, 120)]).unwrap();
        let ticket = h
            .machine
            .start(SceneKey::CharacterSelection, ScenePayload::None)
            .unwrap();
        h.backend.respond(
            Method::Post,
            &route_level_up(5),
            200,
            json!({"success": true, "hero": hero_json(5, 2, 120)}),
        );

        h.machine
            .start(SceneKey::MainMenu, ScenePayload::None)
            .unwrap();
        let result = h.service.level_up_hero(5, "0xtx", &ticket).await;

        assert_eq!(
            result.unwrap_err(),
            SyncError::StaleResponse {
                scene: SceneKey::CharacterSelection
            }
        );
        assert_eq!(h.registry.hero(5).map(|h| h.level), Some(2));
        assert_eq!(changed.borrow().len(), 1);
        assert!(failed.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_failed_balance_reports_balance_from_before_the_call() {
        let h = harness();
        let seen = record(&h.bus, EventKind::BalanceUpdate);
        h.registry.begin_session(session(Bcoin::from_whole(42)));
        h.backend
            .respond(Method::Get, ROUTE_AUTH_ME, 200, me_json("100", vec![]));
        let Harness {
            registry, service, ..
        } = &h;

        // Another account logs in while the refresh is out
        let (result, ()) = tokio::join!(service.update_balance(1), async {
            registry.begin_session(Session {
                user_id: 2,
                ..session(Bcoin::from_whole(7))
            });
        });

        assert_eq!(
            result.unwrap_err(),
            SyncError::Validation(ValidationError::NoSession)
        );
        assert_eq!(
            balances(&seen.borrow()),
            vec![(Some("42.00".to_string()), true)]
        );
        assert_eq!(h.registry.coin_balance(), Some(Bcoin::from_whole(7)));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let h = harness();
        h.backend
            .respond(
                Method::Post,
                ROUTE_REGISTER,
                201,
                json!({"success": true, "message": "User registered."}),
            )
            .respond(
                Method::Post,
                ROUTE_LOGIN,
                200,
                json!({"success": true, "token": "new-jwt"}),
            )
            .respond(Method::Get, ROUTE_AUTH_ME, 200, me_json("0", vec![]));
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let session = h
            .service
            .register("bob".into(), "4321".into(), &ticket)
            .await
            .unwrap();

        assert_eq!(session.auth_token, "new-jwt");
        assert!(h.registry.is_logged_in());
        let paths: Vec<String> = h.backend.sent().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec![ROUTE_REGISTER, ROUTE_LOGIN, ROUTE_AUTH_ME]);
        assert_eq!(
            h.backend.sent()[0].body,
            Some(json!({"username": "bob", "pin": "4321"}))
        );
    }

    #[tokio::test]
    async fn test_taken_username_is_rejected_without_login() {
        let h = harness();
        h.backend.respond(
            Method::Post,
            ROUTE_REGISTER,
            409,
            json!({"success": false, "message": "Username already taken."}),
        );
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let result = h
            .service
            .register("bob".into(), "4321".into(), &ticket)
            .await;

        assert_eq!(
            result.unwrap_err(),
            SyncError::Rejected("Username already taken.".into())
        );
        assert_eq!(h.backend.sent_to(ROUTE_LOGIN), 0);
    }

    #[tokio::test]
    async fn test_submitted_score_raises_best_wave() {
        let h = harness();
        h.registry.begin_session(session(Bcoin::from_whole(10)));
        h.backend
            .respond(Method::Post, ROUTE_SCORES, 200, json!({"success": true}));

        assert!(h.service.submit_score(7).await.unwrap());
        assert!(!h.service.submit_score(5).await.unwrap());

        assert_eq!(
            h.registry.session().map(|s| s.highest_wave_reached),
            Some(7)
        );
        let sent = h.backend.sent();
        assert_eq!(sent[0].body, Some(json!({"score": 7})));
        assert_eq!(sent[0].token.as_deref(), Some("jwt"));
    }

    #[tokio::test]
    async fn test_score_without_session_is_not_sent() {
        let h = harness();

        let result = h.service.submit_score(7).await;

        assert_eq!(
            result.unwrap_err(),
            SyncError::Validation(ValidationError::NoSession)
        );
        assert!(h.backend.sent().is_empty());
    }

    #[tokio::test]
    async fn test_ranking_needs_no_session() {
        let h = harness();
        h.backend.respond(
            Method::Get,
            ROUTE_RANKING,
            200,
            json!({"success": true, "ranking": [
                {"rank": 1, "address": "0xbeef", "wave": 31},
                {"rank": 2, "address": "0xcafe", "wave": 20}
            ]}),
        );
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let ranking = h.service.fetch_ranking(&ticket).await.unwrap();

        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].player, "0xbeef");
        assert_eq!(ranking[1].wave, 20);
        assert_eq!(h.backend.sent()[0].token, None);
    }

    #[tokio::test]
    async fn test_wager_tiers_fetched_once_per_session() {
        let h = harness();
        h.registry.begin_session(session(Bcoin::from_whole(10)));
        h.backend.respond(
            Method::Get,
            ROUTE_WAGER_TIERS,
            200,
            json!({"success": true, "tiers": [
                {"id": 1, "name": "Bronze", "bcoin_cost": 10, "xp_cost": 10},
                {"id": 2, "name": "Silver", "bcoin_cost": "50", "xp_cost": 50}
            ]}),
        );
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let first = h.service.fetch_wager_tiers(&ticket).await.unwrap();
        let second = h.service.fetch_wager_tiers(&ticket).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[1].bcoin_cost, Bcoin::from_whole(50));
        assert_eq!(h.backend.sent_to(ROUTE_WAGER_TIERS), 1);

        h.registry.clear();
        assert_eq!(h.registry.wager_tiers(), None);
    }

    // ============ Wager Economy ============

    #[test]
    fn test_wager_affordability_scenario() {
        let tier = WagerTier {
            tier_id: 2,
            display_name: "Silver".into(),
            bcoin_cost: Bcoin::from_whole(50),
            xp_cost: 50,
        };
        let coins = Bcoin::from_whole(100);
        let heroes = vec![hero(1, 1, 60), hero(2, 1, 40)];

        assert!(economy::can_afford_wager(&tier, &heroes[0], coins));
        assert!(!economy::can_afford_wager(&tier, &heroes[1], coins));

        let listing = economy::eligible_heroes_for_tier(&tier, &heroes, coins);
        let marks: Vec<(u64, bool)> = listing
            .iter()
            .map(|entry| (entry.hero.hero_id, entry.is_eligible()))
            .collect();
        assert_eq!(marks, vec![(1, true), (2, false)]);
    }

    #[tokio::test]
    async fn test_unaffordable_wager_never_reaches_backend() {
        let h = harness();
        h.registry.begin_session(session(Bcoin::from_whole(100)));
        h.registry.set_heroes(vec![hero(2, 1, 40)]).unwrap();
        h.registry
            .set_wager_tiers(vec![WagerTier {
                tier_id: 2,
                display_name: "Silver".into(),
                bcoin_cost: Bcoin::from_whole(50),
                xp_cost: 50,
            }])
            .unwrap();
        let ticket = h.machine.ticket(SceneKey::Boot).unwrap();

        let result = h.service.enter_wager(2, 2, &ticket).await;

        assert_eq!(
            result.unwrap_err(),
            SyncError::Validation(ValidationError::InsufficientXp {
                required: 50,
                available: 40
            })
        );
        assert_eq!(h.backend.sent_to(ROUTE_WAGER_ENTER), 0);
    }
}
