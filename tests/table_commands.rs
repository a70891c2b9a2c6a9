mod common;

use common::{error_code, kinds, system_texts, test_config, Table};
use serde_json::json;
use tavernkeep::gateway::commands::HELP_TEXT;
use tavernkeep::gateway::ServerMessage;
use tavernkeep::lobby::ChatKind;

fn table() -> Table {
    let mut t = Table::new();
    t.sit(1, "Mara", "tavern");
    t.sit(2, "Rin", "tavern");
    t.sit(3, "Tom", "tavern");
    t
}

fn rolls(msgs: &[ServerMessage]) -> Vec<tavernkeep::lobby::RollEntry> {
    msgs.iter()
        .filter_map(|m| match m {
            ServerMessage::Roll(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn chat_and_emotes_are_logged_and_broadcast() {
    let mut t = table();
    t.chat(2, "  hello there  ");
    t.chat(2, "/me sharpens a dagger");
    t.chat(2, "   ");
    let tom = t.drain(3);
    let entries: Vec<_> = tom
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Chat(e) => Some((e.from.clone(), e.text.clone(), e.kind)),
            _ => None,
        })
        .collect();
    assert_eq!(
        entries,
        vec![
            ("Rin".to_string(), "hello there".to_string(), ChatKind::Say),
            ("Rin".to_string(), "sharpens a dagger".to_string(), ChatKind::Action),
        ]
    );
    t.with_lobby("tavern", |l| assert_eq!(l.chat_log.len(), 2));
}

#[test]
fn whispers_reach_only_the_pair() {
    let mut t = table();
    t.chat(2, "/w tom meet me outside");
    let tom = t.drain(3);
    match tom.as_slice() {
        [ServerMessage::Whisper { from, to, text, .. }] => {
            assert_eq!((from.as_str(), to.as_str(), text.as_str()), ("Rin", "Tom", "meet me outside"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(kinds(&t.drain(2)), vec!["whisper"]);
    assert!(t.drain(1).is_empty());
    t.with_lobby("tavern", |l| assert!(l.chat_log.is_empty()));

    t.chat(2, "/w Nobody hi");
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("not_found"));
}

#[test]
fn rolls_and_macros() {
    let mut t = table();
    t.send(2, json!({"type": "roll", "expression": "3d6+2"}));
    let seen = rolls(&t.drain(3));
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].by, "Rin");
    assert_eq!(seen[0].rolls.len(), 3);
    assert_eq!(seen[0].total, seen[0].rolls.iter().map(|r| *r as i64).sum::<i64>() + 2);

    t.chat(2, "/macro add hit d20+5");
    assert_eq!(system_texts(&t.drain(2)), vec!["Macro 'hit' saved: d20+5"]);
    t.drain_all();
    t.chat(2, "/r hit");
    let seen = rolls(&t.drain(1));
    assert_eq!(seen[0].label.as_deref(), Some("hit"));
    assert!((6..=25).contains(&seen[0].total));

    // Macros are per player.
    t.chat(3, "/r hit");
    assert_eq!(error_code(&t.drain(3)).as_deref(), Some("validation"));

    t.chat(2, "/macro add bad 2x7");
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("validation"));
    t.chat(2, "/macro list");
    assert_eq!(system_texts(&t.drain(2)), vec!["hit: d20+5"]);
    t.chat(2, "/macro del hit");
    t.chat(2, "/macro list");
    assert_eq!(system_texts(&t.drain(2)), vec!["Macro 'hit' deleted", "You have no macros"]);
}

#[test]
fn advantage_keeps_the_higher_die() {
    let mut t = table();
    t.chat(2, "/roll adv");
    let seen = rolls(&t.drain(2));
    assert_eq!(seen[0].rolls.len(), 2);
    assert_eq!(seen[0].used.len(), 1);
    assert_eq!(seen[0].used[0], *seen[0].rolls.iter().max().unwrap());

    t.send(2, json!({"type": "roll", "expression": "1000d6"}));
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("validation"));
}

#[test]
fn encounter_turns_are_narrated() {
    let mut t = table();
    t.chat(1, "/init Goblin 12");
    assert_eq!(error_code(&t.drain(1)).as_deref(), Some("validation"));

    t.chat(1, "/encounter start");
    assert!(system_texts(&t.drain(2)).contains(&"Roll for initiative! An encounter begins.".to_string()));
    t.chat(1, "/init Goblin 12");
    t.chat(1, "/init Rin 18");
    t.with_lobby("tavern", |l| {
        let names: Vec<_> = l.encounter.order.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Rin", "Goblin"]);
        assert_eq!(l.encounter.current().map(|c| c.name.as_str()), Some("Goblin"));
    });
    t.drain_all();

    t.chat(1, "/next");
    assert_eq!(system_texts(&t.drain(3)), vec!["It is Rin's turn"]);
    t.chat(1, "/init remove Goblin");
    t.chat(2, "/next");
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("unauthorized"));

    t.chat(1, "/encounter end");
    t.with_lobby("tavern", |l| {
        assert!(!l.encounter.active);
        assert!(l.encounter.order.is_empty());
    });
}

#[test]
fn lock_silences_players_until_start() {
    let mut t = table();
    t.chat(1, "/lock on");
    assert!(system_texts(&t.drain(2)).contains(&"The lobby is locked until the campaign starts".to_string()));

    t.chat(2, "anyone there?");
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("locked"));
    t.chat(2, "/r d20");
    assert_eq!(error_code(&t.drain(2)).as_deref(), Some("locked"));
    t.chat(2, "/help");
    assert_eq!(system_texts(&t.drain(2)), vec![HELP_TEXT.to_string()]);
    t.chat(1, "GM may still talk");
    assert!(error_code(&t.drain(1)).is_none());

    t.chat(1, "/start");
    t.drain_all();
    t.chat(2, "finally");
    assert!(error_code(&t.drain(2)).is_none());
}

#[test]
fn require_character_nags_players_without_sheets() {
    let mut t = table();
    t.send(2, json!({"type": "character_upsert", "sheet": {"class": "Rogue"}}));
    t.drain_all();
    t.chat(1, "/requirechar on");
    assert!(!kinds(&t.drain(2)).contains(&"character_required"));
    assert!(kinds(&t.drain(3)).contains(&"character_required"));
    t.with_lobby("tavern", |l| assert_eq!(l.characters_needed(), vec!["Tom"]));
}

#[test]
fn unknown_commands_and_bad_usage_answer_the_sender() {
    let mut t = table();
    t.chat(2, "/dance");
    let out = t.drain(2);
    assert_eq!(error_code(&out).as_deref(), Some("validation"));
    assert!(t.drain(3).is_empty());
    t.chat(1, "/init Orc fast");
    assert!(common::errors(&t.drain(1))[0].1.starts_with("Usage: /init"));
}

#[test]
fn flooding_is_rate_limited() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.max_events = 3;
    config.rate_limit.window_ms = 60_000;
    let mut t = Table::build(config, None);
    t.connect(1);
    t.send(1, json!({"type": "join_lobby", "lobby": "tavern"}));
    t.chat(1, "one");
    t.chat(1, "two");
    t.chat(1, "three");
    let out = t.drain(1);
    assert_eq!(common::errors(&out).len(), 1);
    assert_eq!(error_code(&out).as_deref(), Some("rate_limited"));
    t.with_lobby("tavern", |l| assert_eq!(l.chat_log.len(), 2));
}
