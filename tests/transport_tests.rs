use uuid::Uuid;
use voclaria_live::transport::messages::{
    ChangeOp, PresenceBeat, ReactionChangeMessage, ReactionRowMessage,
};
use voclaria_live::ReactionKind;

#[test]
fn test_presence_beat_serialization() {
    let session_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let beat = PresenceBeat {
        session_id,
        user_id,
        at: "2026-08-27T14:30:00Z".to_string(),
        leaving: false,
    };

    let json = serde_json::to_string(&beat).unwrap();
    assert!(json.contains(&session_id.to_string()));
    assert!(json.contains("\"leaving\":false"));

    let deserialized: PresenceBeat = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.session_id, session_id);
    assert_eq!(deserialized.user_id, user_id);
    assert!(!deserialized.leaving);
}

#[test]
fn test_presence_beat_leaving_defaults_false() {
    let json = format!(
        r#"{{"session_id":"{}","user_id":"{}","at":"2026-08-27T14:30:00Z"}}"#,
        Uuid::new_v4(),
        Uuid::new_v4()
    );

    let beat: PresenceBeat = serde_json::from_str(&json).unwrap();
    assert!(!beat.leaving, "missing leaving field means a normal heartbeat");
}

#[test]
fn test_reaction_row_uses_type_key() {
    let row = ReactionRowMessage {
        session_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        kind: ReactionKind::Heart,
    };

    let json = serde_json::to_string(&row).unwrap();
    assert!(json.contains("\"type\":\"heart\""), "wire key is `type`, lowercase kind");

    let deserialized: ReactionRowMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.kind, ReactionKind::Heart);
}

#[test]
fn test_reaction_change_insert() {
    let session_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let json = format!(
        r#"{{
            "op": "insert",
            "old": null,
            "new": {{"session_id":"{session_id}","user_id":"{user_id}","type":"wow"}}
        }}"#
    );

    let msg: ReactionChangeMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(msg.op, ChangeOp::Insert);
    assert!(msg.old.is_none());
    let new = msg.new.expect("insert carries the new row");
    assert_eq!(new.kind, ReactionKind::Wow);
    assert_eq!(new.session_id, session_id);
}

#[test]
fn test_reaction_change_update_carries_both_rows() {
    let session_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let json = format!(
        r#"{{
            "op": "update",
            "old": {{"session_id":"{session_id}","user_id":"{user_id}","type":"heart"}},
            "new": {{"session_id":"{session_id}","user_id":"{user_id}","type":"like"}}
        }}"#
    );

    let msg: ReactionChangeMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(msg.op, ChangeOp::Update);
    assert_eq!(msg.old.unwrap().kind, ReactionKind::Heart);
    assert_eq!(msg.new.unwrap().kind, ReactionKind::Like);
}

#[test]
fn test_change_op_wire_names() {
    assert_eq!(serde_json::to_string(&ChangeOp::Insert).unwrap(), "\"insert\"");
    assert_eq!(serde_json::to_string(&ChangeOp::Update).unwrap(), "\"update\"");
    assert_eq!(serde_json::to_string(&ChangeOp::Delete).unwrap(), "\"delete\"");
}
