//! Session lifecycle as seen by connected clients

mod common;

use common::{drain, local_hub};
use logline::protocol::{CursorPosition, ServerEvent};

#[tokio::test]
async fn test_two_clients_share_edits_and_presence() {
    let hub = local_hub();

    // First client gets an empty document and sees itself
    let mut a = hub.connect().await;
    let events = drain(&mut a);
    assert_eq!(
        events[0],
        ServerEvent::DocumentInit {
            content: String::new(),
            users: 1
        }
    );
    assert!(matches!(&events[1], ServerEvent::PresenceUpdate { count: 1, .. }));

    // Second client joins; the first learns about it
    let mut b = hub.connect().await;
    let events = drain(&mut a);
    match &events[..] {
        [ServerEvent::PresenceUpdate { count: 2, users }] => {
            let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
            assert_eq!(ids, vec![a.id(), b.id()]);
        }
        other => panic!("unexpected events: {other:?}"),
    }
    drain(&mut b);

    // An edit from the second client reaches the first, not the sender
    hub.handle_frame(
        b.id(),
        r#"{"event":"document:edit","data":{"content":"hello"}}"#,
    )
    .await;

    match drain(&mut a).as_slice() {
        [ServerEvent::DocumentUpdate { content, .. }] => assert_eq!(content, "hello"),
        other => panic!("unexpected events: {other:?}"),
    }
    assert!(drain(&mut b).is_empty());
    assert_eq!(hub.document().await, "hello");

    // A late joiner starts from the current content
    let mut c = hub.connect().await;
    assert_eq!(
        drain(&mut c)[0],
        ServerEvent::DocumentInit {
            content: "hello".to_string(),
            users: 3
        }
    );

    // The second client leaves
    let b_id = b.id().to_string();
    hub.disconnect(&b_id).await;
    drop(b);

    let events = drain(&mut a);
    assert!(matches!(&events[0], ServerEvent::PresenceUpdate { count: 2, .. }));
    assert!(events.contains(&ServerEvent::CursorRemoved { user_id: b_id.clone() }));
    assert!(events.contains(&ServerEvent::UserLeft(b_id)));
    assert_eq!(hub.connection_count().await, 2);
}

#[tokio::test]
async fn test_cursor_frames_are_relayed_with_sender_identity() {
    let hub = local_hub();
    let mut a = hub.connect().await;
    let mut b = hub.connect().await;
    drain(&mut a);
    drain(&mut b);

    hub.handle_frame(
        a.id(),
        r#"{"event":"cursor:move","data":{"position":{"lineNumber":3,"column":7}}}"#,
    )
    .await;

    assert!(drain(&mut a).is_empty());
    match drain(&mut b).as_slice() {
        [ServerEvent::CursorUpdate(cursor)] => {
            assert_eq!(cursor.user_id, a.id());
            assert_eq!(cursor.color, a.identity.color);
            assert_eq!(cursor.position, CursorPosition { line: 3, column: 7 });
            assert!(cursor.selection.is_none());
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_frames_only_reach_the_sender() {
    let hub = local_hub();
    let mut a = hub.connect().await;
    let mut b = hub.connect().await;
    drain(&mut a);
    drain(&mut b);

    hub.handle_frame(a.id(), "not json at all").await;
    hub.handle_frame(a.id(), r#"{"event":"document:edit","data":{"text":"x"}}"#)
        .await;
    hub.handle_frame(a.id(), r#"{"event":"cursor:move","data":{}}"#)
        .await;
    hub.handle_frame(a.id(), r#"{"event":"chat:message","data":{"text":"hi"}}"#)
        .await;

    assert_eq!(
        drain(&mut a),
        vec![
            ServerEvent::error("Invalid message"),
            ServerEvent::error("Failed to process edit"),
            ServerEvent::error("Failed to process cursor"),
        ]
    );
    assert!(drain(&mut b).is_empty());
    assert_eq!(hub.document().await, "");
    assert_eq!(hub.connection_count().await, 2);
}

#[tokio::test]
async fn test_wire_encoding_of_init() {
    let hub = local_hub();
    let mut a = hub.connect().await;
    let init = drain(&mut a).remove(0);

    let value: serde_json::Value = serde_json::from_str(&init.to_json().unwrap()).unwrap();
    assert_eq!(value["event"], "document:init");
    assert_eq!(value["data"]["content"], "");
    assert_eq!(value["data"]["users"], 1);
}
