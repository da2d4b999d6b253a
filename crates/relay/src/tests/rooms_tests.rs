use shared::domain::{ControlId, ControlValue, Epoch, Euler};

use super::*;

fn value(z: f32) -> SessionMessage {
    SessionMessage::ValueUpdate {
        control_id: ControlId::new("dial-1"),
        value: ControlValue::Rotation(Euler::around_z(z)),
        epoch: Epoch(1),
    }
}

#[tokio::test]
async fn join_assigns_ids_and_announces_presence() {
    let registry = RoomRegistry::new(16);
    let mut first = registry.join("lobby").await;
    let second = registry.join("lobby").await;

    assert_eq!(first.participant_id, ParticipantId(1));
    assert_eq!(second.participant_id, ParticipantId(2));
    assert_eq!(second.participant_count, 2);
    assert_eq!(registry.participant_count("lobby").await, 2);

    assert_eq!(
        first.frames.recv().await.expect("presence"),
        RelayFrame::Presence {
            participant_count: 1
        }
    );
    assert_eq!(
        first.frames.recv().await.expect("presence"),
        RelayFrame::Presence {
            participant_count: 2
        }
    );
}

#[tokio::test]
async fn publish_stamps_increasing_sequence_for_every_member() {
    let registry = RoomRegistry::new(16);
    let mut a = registry.join("lobby").await;
    let mut b = registry.join("lobby").await;
    let _ = a.frames.recv().await;
    let _ = a.frames.recv().await;
    let _ = b.frames.recv().await;

    assert_eq!(registry.publish("lobby", b.participant_id, value(10.0)).await, Some(1));
    assert_eq!(registry.publish("lobby", a.participant_id, value(20.0)).await, Some(2));

    for member in [&mut a, &mut b] {
        let RelayFrame::Message(first) = member.frames.recv().await.expect("frame") else {
            panic!("expected a message");
        };
        let RelayFrame::Message(second) = member.frames.recv().await.expect("frame") else {
            panic!("expected a message");
        };
        assert_eq!((first.seq, first.sender), (1, ParticipantId(2)));
        assert_eq!((second.seq, second.sender), (2, ParticipantId(1)));
        assert_eq!(second.message, value(20.0));
    }
}

#[tokio::test]
async fn rooms_are_independent_and_removed_when_empty() {
    let registry = RoomRegistry::new(16);
    let a = registry.join("one").await;
    let b = registry.join("two").await;
    assert_eq!(registry.room_count().await, 2);
    assert_eq!(registry.publish("two", b.participant_id, value(1.0)).await, Some(1));
    assert_eq!(registry.publish("one", a.participant_id, value(1.0)).await, Some(1));

    registry.leave("one", a.participant_id).await;
    assert_eq!(registry.room_count().await, 1);
    assert_eq!(registry.publish("one", a.participant_id, value(2.0)).await, None);
}

#[tokio::test]
async fn leaving_announces_the_new_count() {
    let registry = RoomRegistry::new(16);
    let mut stay = registry.join("lobby").await;
    let go = registry.join("lobby").await;
    registry.leave("lobby", go.participant_id).await;

    let mut frames = Vec::new();
    while let Ok(frame) = stay.frames.try_recv() {
        frames.push(frame);
    }
    assert_eq!(
        frames.last(),
        Some(&RelayFrame::Presence {
            participant_count: 1
        })
    );
}

#[tokio::test]
async fn slow_members_lag_instead_of_blocking() {
    let registry = RoomRegistry::new(2);
    let mut slow = registry.join("lobby").await;
    let fast = registry.join("lobby").await;
    for z in 0..5 {
        registry.publish("lobby", fast.participant_id, value(z as f32)).await;
    }

    assert!(matches!(
        slow.frames.recv().await,
        Err(broadcast::error::RecvError::Lagged(_))
    ));
}
