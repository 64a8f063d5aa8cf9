//! Integration tests for rooms and games, driven through the loopback
//! peer transport so every event a member receives is observed on the
//! wire.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use roomrelay_protocol::{
    Handshake, Platform, RoomFilter, RoomInstruction, RoomParameters, ServerEvent,
};
use roomrelay_room::{Departure, GameTable, LockState, Room, RoomError};
use roomrelay_session::{ClientSession, PeerSender};
use roomrelay_transport::{
    ConnectionKey, Delivery, LoopbackPeer, LoopbackTransport, PeerMessage,
};

// =========================================================================
// Helpers
// =========================================================================

struct Client {
    session: Arc<ClientSession>,
    peer: LoopbackPeer,
}

impl Client {
    fn events(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Some(PeerMessage::Data { data, .. }) = self.peer.try_recv() {
            out.push(ServerEvent::decode(data).expect("server sent undecodable event"));
        }
        out
    }
}

struct World {
    transport: Arc<LoopbackTransport>,
}

impl World {
    fn new() -> Self {
        Self {
            transport: Arc::new(LoopbackTransport::new()),
        }
    }

    fn client(&self, id: &str) -> Client {
        self.client_with_version(id, "1.0")
    }

    fn client_with_version(&self, id: &str, version: &str) -> Client {
        let peer = self.transport.connect(Bytes::new());
        let handshake = Handshake {
            user_id: id.into(),
            display_name: id.to_lowercase(),
            game_key: "kart".into(),
            game_version: version.into(),
            platform: Platform::Android,
            ..Handshake::default()
        };
        let sender = Arc::new(PeerSender::new(self.transport.clone(), peer.id()));
        Client {
            session: Arc::new(ClientSession::new(
                ConnectionKey::peer(peer.id()),
                &handshake,
                sender,
            )),
            peer,
        }
    }
}

fn room_with(max_players: u32) -> Arc<Room> {
    Room::new(
        "lobby1",
        "kart",
        "1.0",
        Platform::Android,
        RoomParameters {
            max_players,
            ..RoomParameters::default()
        },
    )
}

fn tagged(tags: &[(u8, u8)]) -> RoomParameters {
    RoomParameters {
        filter: tags.iter().copied().collect(),
        ..RoomParameters::default()
    }
}

/// Membership, master and departed set agree with each other.
async fn assert_consistent(room: &Room) {
    let core = room.lock().await;
    let ids = core.member_ids();
    match core.master_id() {
        Some(master) => assert!(ids.iter().any(|id| id == master)),
        None => assert!(ids.is_empty()),
    }
    for id in &ids {
        assert!(!core.has_departed(id), "{id} is both member and departed");
    }
    assert!(ids.len() <= core.params().max_players as usize);
}

// =========================================================================
// Join and roster
// =========================================================================

#[tokio::test]
async fn test_join_exchanges_player_connected_and_keeps_master() {
    let world = World::new();
    let mut a = world.client("A");
    let mut b = world.client("B");
    let room = room_with(2);

    room.lock().await.add_player(&a.session);
    assert_eq!(a.events(), vec![ServerEvent::MasterChanged { id: "A".into() }]);

    {
        let mut core = room.lock().await;
        core.check_join(&b.session, None).unwrap();
        core.add_player(&b.session);
    }

    assert_eq!(
        a.events(),
        vec![ServerEvent::PlayerConnected {
            id: "B".into(),
            display_name: "b".into(),
            platform: Platform::Android,
            connection_id: b.peer.id().into_inner(),
        }]
    );
    let events = b.events();
    assert_eq!(
        events,
        vec![
            ServerEvent::PlayerConnected {
                id: "A".into(),
                display_name: "a".into(),
                platform: Platform::Android,
                connection_id: a.peer.id().into_inner(),
            },
            ServerEvent::MasterChanged { id: "A".into() },
        ]
    );
    assert!(!events.contains(&ServerEvent::MasterChanged { id: "B".into() }));
    assert_consistent(&room).await;
}

#[tokio::test]
async fn test_join_full_room_fails_and_leaves_membership_unchanged() {
    let world = World::new();
    let a = world.client("A");
    let b = world.client("B");
    let room = room_with(1);

    let mut core = room.lock().await;
    core.add_player(&a.session);

    assert_eq!(
        core.check_join(&b.session, None),
        Err(RoomError::RoomFull("lobby1".into()))
    );
    assert_eq!(core.member_ids(), vec!["A".to_owned()]);
}

#[tokio::test]
async fn test_join_checks_version_before_password() {
    let world = World::new();
    let old = world.client_with_version("B", "0.9");
    let room = Room::new(
        "vault",
        "kart",
        "1.0",
        Platform::Android,
        RoomParameters {
            password: Some("hunter2".into()),
            ..RoomParameters::default()
        },
    );

    let core = room.lock().await;
    assert!(matches!(
        core.check_join(&old.session, None),
        Err(RoomError::VersionMismatch { .. })
    ));

    let b = world.client("C");
    assert_eq!(
        core.check_join(&b.session, Some("wrong")),
        Err(RoomError::PasswordMismatch("vault".into()))
    );
    assert!(core.check_join(&b.session, Some("hunter2")).is_ok());
    // Create-or-join never asks for the password.
    assert!(core.check_create_or_join(&b.session).is_ok());
}

// =========================================================================
// Cache replay
// =========================================================================

#[tokio::test]
async fn test_cache_is_replayed_before_any_relay_traffic() {
    let world = World::new();
    let mut a = world.client("A");
    let mut b = world.client("B");
    let room = room_with(4);

    {
        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.process(
            &a.session,
            RoomInstruction::RawDataCache {
                key: "score".into(),
                data: Bytes::from_static(&[42]),
            },
            Delivery::default(),
        );
    }
    assert!(a.events().contains(&ServerEvent::CacheData {
        key: "score".into(),
        data: Bytes::from_static(&[42]),
    }));

    {
        let mut core = room.lock().await;
        core.add_player(&b.session);
        core.process(
            &a.session,
            RoomInstruction::Broadcast {
                data: Bytes::from_static(b"go"),
            },
            Delivery::Unreliable,
        );
    }

    let events = b.events();
    let cache_at = events
        .iter()
        .position(|e| matches!(e, ServerEvent::CacheData { key, .. } if key == "score"))
        .expect("cache replayed");
    let raw_at = events
        .iter()
        .position(|e| matches!(e, ServerEvent::RoomRaw { .. }))
        .expect("broadcast relayed");
    assert!(cache_at < raw_at);
}

#[tokio::test]
async fn test_cache_overwrite_keeps_latest_value() {
    let world = World::new();
    let a = world.client("A");
    let mut b = world.client("B");
    let room = room_with(4);

    let mut core = room.lock().await;
    core.add_player(&a.session);
    for value in [1u8, 2, 3] {
        core.process(
            &a.session,
            RoomInstruction::RawDataCache {
                key: "round".into(),
                data: Bytes::from(vec![value]),
            },
            Delivery::default(),
        );
    }
    core.add_player(&b.session);

    let replayed: Vec<_> = b
        .events()
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::CacheData { .. }))
        .collect();
    assert_eq!(
        replayed,
        vec![ServerEvent::CacheData {
            key: "round".into(),
            data: Bytes::from_static(&[3]),
        }]
    );
}

// =========================================================================
// Relay
// =========================================================================

#[tokio::test]
async fn test_broadcast_excludes_sender_and_reaches_everyone_else() {
    let world = World::new();
    let mut clients: Vec<_> = ["A", "B", "C"].iter().map(|id| world.client(id)).collect();
    let room = room_with(3);

    let mut core = room.lock().await;
    for c in &clients {
        core.add_player(&c.session);
    }
    for c in &mut clients {
        c.events();
    }

    core.process(
        &clients[1].session,
        RoomInstruction::Broadcast {
            data: Bytes::from_static(b"hello"),
        },
        Delivery::ReliableUnordered,
    );

    let expected = ServerEvent::RoomRaw {
        sender_id: "B".into(),
        data: Bytes::from_static(b"hello"),
    };
    assert_eq!(clients[0].events(), vec![expected.clone()]);
    assert!(clients[1].events().is_empty());
    assert_eq!(clients[2].events(), vec![expected]);
}

#[tokio::test]
async fn test_direct_send_to_unknown_target_is_dropped() {
    let world = World::new();
    let a = world.client("A");
    let mut b = world.client("B");
    let room = room_with(2);

    let mut core = room.lock().await;
    core.add_player(&a.session);
    core.add_player(&b.session);
    b.events();

    core.process(
        &a.session,
        RoomInstruction::RawDataToClient {
            target_id: "nobody".into(),
            data: Bytes::from_static(b"x"),
        },
        Delivery::default(),
    );
    assert!(b.events().is_empty());

    core.process(
        &a.session,
        RoomInstruction::RawDataToClient {
            target_id: "B".into(),
            data: Bytes::from_static(b"x"),
        },
        Delivery::default(),
    );
    assert_eq!(
        b.events(),
        vec![ServerEvent::RoomRaw {
            sender_id: "A".into(),
            data: Bytes::from_static(b"x"),
        }]
    );
}

// =========================================================================
// Leave, rejoin and teardown
// =========================================================================

#[tokio::test]
async fn test_rejoin_requires_prior_departure() {
    let world = World::new();
    let a = world.client("A");
    let stranger = world.client("S");
    let room = room_with(2);

    let mut core = room.lock().await;
    core.add_player(&a.session);
    assert_eq!(core.remove_player(&a.session, Instant::now()), Departure::Emptied);

    assert!(core.check_rejoin(&a.session).is_ok());
    assert!(matches!(
        core.check_rejoin(&stranger.session),
        Err(RoomError::RejoinNotAuthorized { .. })
    ));

    core.add_player(&a.session);
    assert!(core.liveness().is_active());
    assert!(!core.has_departed("A"));
    assert_eq!(core.master_id(), Some("A"));

    // One departure buys one rejoin.
    assert!(matches!(
        core.check_rejoin(&a.session),
        Err(RoomError::RejoinNotAuthorized { .. })
    ));
}

#[tokio::test]
async fn test_rejoin_ignores_lock_but_not_capacity() {
    let world = World::new();
    let a = world.client("A");
    let b = world.client("B");
    let c = world.client("C");
    let room = room_with(2);

    let mut core = room.lock().await;
    core.add_player(&a.session);
    core.add_player(&b.session);
    core.process(&a.session, RoomInstruction::Lock, Delivery::default());
    assert_eq!(core.lock_state(), LockState::Locked);

    core.remove_player(&b.session, Instant::now());
    assert!(core.check_rejoin(&b.session).is_ok());

    core.add_player(&c.session);
    assert_eq!(
        core.check_rejoin(&b.session),
        Err(RoomError::RoomFull("lobby1".into()))
    );
}

#[tokio::test]
async fn test_empty_room_is_reaped_and_game_dropped() {
    let world = World::new();
    let a = world.client("A");
    let mut games = GameTable::new();
    let room = room_with(2);
    games.insert_room(room.clone()).unwrap();

    let emptied = Instant::now();
    {
        let mut core = room.lock().await;
        core.add_player(&a.session);
        core.remove_player(&a.session, emptied);
    }

    let idle = Duration::from_secs(30);
    assert!(!room.lock().await.is_reapable(emptied + Duration::from_secs(10), idle));
    assert!(room.lock().await.is_reapable(emptied + idle, idle));

    let removed = games.remove_room("kart", "LOBBY1").expect("room linked");
    removed.lock().await.mark_destroyed();

    assert!(room.lock().await.liveness().is_destroyed());
    assert_eq!(games.game_count(), 0);
}

// =========================================================================
// Room selection
// =========================================================================

#[tokio::test]
async fn test_random_candidate_skips_password_locked_and_full_rooms() {
    let world = World::new();
    let a = world.client("A");
    let seeker = world.client("Z");
    let any = RoomFilter::new();

    let protected = Room::new(
        "p",
        "kart",
        "1.0",
        Platform::Android,
        RoomParameters {
            password: Some("pw".into()),
            ..RoomParameters::default()
        },
    );
    assert!(!protected.lock().await.is_random_candidate(&seeker.session, &any));
    // Password rooms are still listed.
    assert!(protected.lock().await.is_listed_for(&seeker.session, &any));

    let full = room_with(1);
    full.lock().await.add_player(&a.session);
    assert!(!full.lock().await.is_random_candidate(&seeker.session, &any));
    assert!(!full.lock().await.is_listed_for(&seeker.session, &any));

    let private = Room::new(
        "hidden",
        "kart",
        "1.0",
        Platform::Android,
        RoomParameters {
            is_public: false,
            ..RoomParameters::default()
        },
    );
    assert!(!private.lock().await.is_random_candidate(&seeker.session, &any));
    assert!(!private.lock().await.is_listed_for(&seeker.session, &any));

    let open = room_with(4);
    assert!(open.lock().await.is_random_candidate(&seeker.session, &any));
}

#[tokio::test]
async fn test_filter_match_requires_every_queried_pair() {
    let world = World::new();
    let seeker = world.client("Z");
    let room = Room::new("r", "kart", "1.0", Platform::Android, tagged(&[(1, 2), (3, 4)]));
    let core = room.lock().await;

    let subset: RoomFilter = [(1u8, 2u8)].into_iter().collect();
    let wrong_value: RoomFilter = [(1u8, 9u8)].into_iter().collect();
    let extra_key: RoomFilter = [(1u8, 2u8), (5u8, 6u8)].into_iter().collect();

    assert!(core.is_random_candidate(&seeker.session, &subset));
    assert!(!core.is_random_candidate(&seeker.session, &wrong_value));
    assert!(!core.is_random_candidate(&seeker.session, &extra_key));
}

#[tokio::test]
async fn test_listing_reports_counts_and_password_flag() {
    let world = World::new();
    let a = world.client("A");
    let room = Room::new(
        "Arena",
        "kart",
        "1.0",
        Platform::Android,
        RoomParameters {
            max_players: 8,
            password: Some("pw".into()),
            ..RoomParameters::default()
        },
    );
    room.lock().await.add_player(&a.session);

    let listing = room.lock().await.listing();
    assert_eq!(listing.id, "Arena");
    assert!(listing.has_password);
    assert_eq!(listing.player_count, 1);
    assert_eq!(listing.max_players, 8);
}
