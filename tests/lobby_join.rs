mod common;

use common::{error_code, kinds, system_texts, Table};
use serde_json::json;
use tavernkeep::gateway::ServerMessage;
use tavernkeep::lobby::ConnectionId;

fn joined_as(msgs: &[ServerMessage]) -> Option<String> {
    msgs.iter().find_map(|m| match m {
        ServerMessage::Joined(view) => Some(view.you.clone()),
        _ => None,
    })
}

#[test]
fn first_joiner_becomes_gm_and_names_are_made_unique() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Rin", "tavern");

    t.connect(3);
    t.send(3, json!({"type": "identify", "name": "rin"}));
    t.send(3, json!({"type": "join_lobby", "lobby": "tavern"}));
    assert_eq!(joined_as(&t.drain(3)).as_deref(), Some("rin2"));

    t.with_lobby("tavern", |l| {
        assert_eq!(l.gm.as_deref(), Some("Mara"));
        assert_eq!(l.users(), vec!["Mara", "Rin", "rin2"]);
    });
}

#[test]
fn unidentified_joiner_gets_placeholder_name() {
    let mut t = Table::new();
    t.connect(1);
    t.send(1, json!({"type": "join_lobby", "lobby": "tavern"}));
    assert_eq!(joined_as(&t.drain(1)).as_deref(), Some("Adventurer"));
}

#[test]
fn join_sends_snapshot_then_notifies_room() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.connect(2);
    t.send(2, json!({"type": "identify", "name": "Tom"}));
    t.drain(2);
    t.send(2, json!({"type": "join_lobby", "lobby": "tavern"}));
    assert_eq!(kinds(&t.drain(2)), vec!["joined", "map_state", "campaign_state", "system", "state"]);
    let gm_view = t.drain(1);
    assert_eq!(system_texts(&gm_view), vec!["Tom joined the lobby"]);
    assert_eq!(kinds(&gm_view), vec!["system", "state"]);
}

#[test]
fn first_password_locks_the_lobby() {
    let mut t = Table::new();
    t.connect(1);
    t.send(1, json!({"type": "identify", "name": "Mara"}));
    t.send(1, json!({"type": "join_lobby", "lobby": "vault", "password": "hunter2"}));
    assert!(system_texts(&t.drain(1)).contains(&"Lobby password set".to_string()));

    t.connect(2);
    t.drain(2);
    t.send(2, json!({"type": "join_lobby", "lobby": "vault", "password": "wrong"}));
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("rejected"));
    t.send(2, json!({"type": "join_lobby", "lobby": "vault"}));
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("rejected"));
    t.with_lobby("vault", |l| assert_eq!(l.members.len(), 1));

    t.send(2, json!({"type": "join_lobby", "lobby": "vault", "password": "hunter2"}));
    assert!(joined_as(&t.drain(2)).is_some());
}

#[test]
fn gm_password_command_replaces_the_secret() {
    let mut t = Table::new();
    t.sit(1, "Mara", "vault");
    t.chat(1, "/password swordfish");
    assert!(system_texts(&t.drain(1)).contains(&"The GM changed the lobby password".to_string()));

    t.connect(2);
    t.send(2, json!({"type": "join_lobby", "lobby": "vault"}));
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("rejected"));
    t.send(2, json!({"type": "join_lobby", "lobby": "vault", "password": "swordfish"}));
    assert!(joined_as(&t.drain(2)).is_some());
}

#[test]
fn ban_kicks_and_blocks_until_unban() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Tom", "tavern");

    t.chat(1, "/ban tom");
    let tom = t.drain(2);
    assert!(tom.iter().any(|m| matches!(m, ServerMessage::Kicked { lobby, .. } if lobby == "tavern")));
    assert!(system_texts(&t.drain(1)).contains(&"Tom was removed from the lobby".to_string()));
    assert!(t.hub.session(ConnectionId(2)).unwrap().lobby.is_none());

    t.chat(2, "let me back in");
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("validation"));
    t.send(2, json!({"type": "join_lobby", "lobby": "tavern"}));
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("rejected"));

    t.chat(1, "/unban Tom");
    t.send(2, json!({"type": "join_lobby", "lobby": "tavern"}));
    assert_eq!(joined_as(&t.drain(2)).as_deref(), Some("Tom"));
}

#[test]
fn kick_removes_without_banning() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Tom", "tavern");
    t.chat(1, "/kick Tom");
    assert!(kinds(&t.drain(2)).contains(&"kicked"));
    t.with_lobby("tavern", |l| assert_eq!(l.users(), vec!["Mara"]));

    t.chat(1, "/kick Mara");
    assert_eq!(error_code(&t.drain(1)).as_deref(), Some("validation"));
    t.chat(1, "/kick Nobody");
    assert_eq!(error_code(&t.drain(1)).as_deref(), Some("not_found"));

    t.send(2, json!({"type": "join_lobby", "lobby": "tavern"}));
    assert!(joined_as(&t.drain(2)).is_some());
}

#[test]
fn gm_cannot_ban_their_own_name_in_any_case() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Rin", "tavern");

    for spelling in ["/ban Mara", "/ban mara", "/ban MARA"] {
        t.chat(1, spelling);
        let gm = t.drain(1);
        assert_eq!(error_code(&gm).as_deref(), Some("validation"));
        assert!(!kinds(&gm).contains(&"kicked"));
    }
    t.with_lobby("tavern", |l| {
        assert!(l.banned.is_empty());
        assert_eq!(l.gm.as_deref(), Some("Mara"));
        assert_eq!(l.users(), vec!["Mara", "Rin"]);
    });
    assert!(t.drain(2).is_empty());
}

#[test]
fn switching_lobbies_leaves_the_old_one() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Tom", "tavern");

    t.send(2, json!({"type": "join_lobby", "lobby": "cellar"}));
    let tom = t.drain(2);
    assert_eq!(joined_as(&tom).as_deref(), Some("Tom"));
    let mara = t.drain(1);
    assert!(system_texts(&mara).contains(&"Tom left the lobby".to_string()));
    assert!(mara.iter().any(
        |m| matches!(m, ServerMessage::Lobbies { lobbies } if lobbies == &vec!["cellar".to_string(), "tavern".to_string()])
    ));
    t.with_lobby("tavern", |l| assert_eq!(l.users(), vec!["Mara"]));
    t.with_lobby("cellar", |l| assert_eq!(l.gm.as_deref(), Some("Tom")));
}

#[test]
fn rejoining_current_lobby_and_blank_names_are_refused() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.send(1, json!({"type": "join_lobby", "lobby": "tavern"}));
    assert_eq!(error_code(&t.drain(1)).as_deref(), Some("validation"));
    t.send(1, json!({"type": "join_lobby", "lobby": "   "}));
    assert_eq!(error_code(&t.drain(1)).as_deref(), Some("validation"));
}

#[test]
fn gm_keeps_the_seat_across_reconnects() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Tom", "tavern");
    t.disconnect(1);
    t.with_lobby("tavern", |l| {
        assert_eq!(l.users(), vec!["Tom"]);
        assert_eq!(l.gm.as_deref(), Some("Mara"));
    });

    t.sit(3, "Mara", "tavern");
    t.chat(3, "/lock on");
    assert!(error_code(&t.drain(3)).is_none());
    t.with_lobby("tavern", |l| assert!(l.settings.locked_until_start));
}

#[test]
fn players_cannot_use_gm_actions() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Tom", "tavern");
    t.send(2, json!({"type": "map_init", "width": 10, "height": 10}));
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("unauthorized"));
    t.chat(2, "/kick Mara");
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("unauthorized"));
    t.with_lobby("tavern", |l| assert_eq!(l.users().len(), 2));
}

#[test]
fn renaming_inside_a_lobby_waits_for_next_join() {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.send(1, json!({"type": "identify", "name": "Morgana"}));
    let out = t.drain(1);
    assert_eq!(kinds(&out), vec!["identified", "system"]);
    t.with_lobby("tavern", |l| assert_eq!(l.users(), vec!["Mara"]));
}
