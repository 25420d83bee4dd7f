mod common;

use common::{test_env, text_message};
use uuid::Uuid;

use chat_service::error::AppError;
use chat_service::models::{MessageKind, MessageStatus};
use chat_service::services::SendMessageRequest;
use chat_service::store::HistoryCursor;

#[tokio::test]
async fn direct_message_reaches_read_through_the_status_machine() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();

    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("hi"))
        .await
        .unwrap();
    assert_eq!(message.status(), MessageStatus::Sent);

    let updated = env
        .state
        .service
        .mark_delivered(b, conversation.id, &[message.id])
        .await
        .unwrap();
    assert_eq!(updated[0].status(), MessageStatus::Delivered);

    let updated = env
        .state
        .service
        .mark_read(b, conversation.id, &[message.id])
        .await
        .unwrap();
    let final_state = &updated[0];
    assert_eq!(final_state.status(), MessageStatus::Read);
    assert!(final_state.delivered_to.contains_key(&b));
    assert!(final_state.read_by.contains_key(&b));
    assert_eq!(final_state.delivered_to.len(), 1);
    assert_eq!(final_state.read_by.len(), 1);
}

#[tokio::test]
async fn status_never_reverts_after_read() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("hi"))
        .await
        .unwrap();

    env.state
        .service
        .mark_read(b, conversation.id, &[message.id])
        .await
        .unwrap();
    // A late delivery ack must not downgrade the aggregate.
    let updated = env
        .state
        .service
        .mark_delivered(b, conversation.id, &[message.id])
        .await
        .unwrap();
    assert_eq!(updated[0].status(), MessageStatus::Read);
}

#[tokio::test]
async fn two_devices_acking_concurrently_record_one_entry() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("hi"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = env.state.service.clone();
        let conversation_id = conversation.id;
        let message_id = message.id;
        handles.push(tokio::spawn(async move {
            service.mark_read(b, conversation_id, &[message_id]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("no duplicate-entry error");
    }

    let history = env
        .state
        .service
        .history(a, conversation.id, HistoryCursor::default(), None)
        .await
        .unwrap();
    assert_eq!(history[0].read_by.len(), 1);
    assert!(history[0].read_by.contains_key(&b));
}

#[tokio::test]
async fn ack_from_a_non_participant_is_rejected() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("hi"))
        .await
        .unwrap();

    let err = env
        .state
        .service
        .mark_read(Uuid::new_v4(), conversation.id, &[message.id])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
}

#[tokio::test]
async fn repeated_reaction_is_a_no_op_and_different_reaction_replaces() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("hi"))
        .await
        .unwrap();

    let after_first = env
        .state
        .service
        .add_reaction(b, message.id, "👍".into())
        .await
        .unwrap();
    assert_eq!(after_first.reactions.len(), 1);

    let after_repeat = env
        .state
        .service
        .add_reaction(b, message.id, "👍".into())
        .await
        .unwrap();
    assert_eq!(after_repeat.reactions.len(), 1);
    assert_eq!(after_repeat.reactions[0].emoji, "👍");

    let after_change = env
        .state
        .service
        .add_reaction(b, message.id, "❤️".into())
        .await
        .unwrap();
    assert_eq!(after_change.reactions.len(), 1);
    assert_eq!(after_change.reactions[0].emoji, "❤️");
    assert_eq!(after_change.reactions[0].user_id, b);
}

#[tokio::test]
async fn racing_identical_reactions_leave_exactly_one() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("hi"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = env.state.service.clone();
        let message_id = message.id;
        handles.push(tokio::spawn(async move {
            service.add_reaction(b, message_id, "🔥".into()).await
        }));
    }
    for handle in handles {
        // Losing the insert race is absorbed, never surfaced.
        handle.await.unwrap().expect("toggle race must not error");
    }

    let current = env
        .state
        .service
        .history(a, conversation.id, HistoryCursor::default(), None)
        .await
        .unwrap();
    assert_eq!(current[0].reactions.len(), 1);
}

#[tokio::test]
async fn unreact_removes_and_tolerates_absence() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("hi"))
        .await
        .unwrap();

    env.state
        .service
        .add_reaction(b, message.id, "👍".into())
        .await
        .unwrap();
    let removed = env.state.service.remove_reaction(b, message.id).await.unwrap();
    assert!(removed.reactions.is_empty());

    // Second removal: the other racer already won.
    let removed_again = env.state.service.remove_reaction(b, message.id).await.unwrap();
    assert!(removed_again.reactions.is_empty());
}

#[tokio::test]
async fn editing_is_text_only_and_sender_only() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("first"))
        .await
        .unwrap();

    let err = env
        .state
        .service
        .edit_message(b, message.id, "hijacked".into())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));

    let edited = env
        .state
        .service
        .edit_message(a, message.id, "second".into())
        .await
        .unwrap();
    assert!(edited.edited);
    assert_eq!(edited.content, "second");
    assert_eq!(edited.edit_history.len(), 1);
    assert_eq!(edited.edit_history[0].content, "first");

    let image = env
        .state
        .service
        .send_message(
            a,
            conversation.id,
            SendMessageRequest {
                content: "holiday".into(),
                kind: Some(MessageKind::Image),
                media: Some(chat_service::models::MediaInfo {
                    url: "https://cdn.example/img/1.jpg".into(),
                    file_name: "beach.jpg".into(),
                    mime_type: Some("image/jpeg".into()),
                    size_bytes: Some(123_456),
                }),
                reply_to: None,
                expires_in_seconds: None,
            },
        )
        .await
        .unwrap();
    let err = env
        .state
        .service
        .edit_message(a, image.id, "new caption".into())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn delete_for_everyone_is_sender_only_and_hides_from_all() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("oops"))
        .await
        .unwrap();

    let err = env
        .state
        .service
        .delete_message(b, message.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));

    env.state.service.delete_message(a, message.id, true).await.unwrap();
    for viewer in [a, b] {
        let history = env
            .state
            .service
            .history(viewer, conversation.id, HistoryCursor::default(), None)
            .await
            .unwrap();
        assert!(history.is_empty());
    }
}

#[tokio::test]
async fn delete_for_me_hides_only_for_the_actor() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("keep it"))
        .await
        .unwrap();

    env.state.service.delete_message(b, message.id, false).await.unwrap();

    let for_b = env
        .state
        .service
        .history(b, conversation.id, HistoryCursor::default(), None)
        .await
        .unwrap();
    assert!(for_b.is_empty());

    let for_a = env
        .state
        .service
        .history(a, conversation.id, HistoryCursor::default(), None)
        .await
        .unwrap();
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_a[0].id, message.id);
}

#[tokio::test]
async fn forwarding_copies_and_never_mutates_the_original() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let source = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let target = env.state.service.find_or_create_direct(a, c).await.unwrap();
    let original = env
        .state
        .service
        .send_message(a, source.id, text_message("forward me"))
        .await
        .unwrap();

    let created = env
        .state
        .service
        .forward_message(a, original.id, &[target.id])
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    let copy = &created[0];
    assert_eq!(copy.conversation_id, target.id);
    assert_eq!(copy.content, "forward me");
    let provenance = copy.forwarded_from.as_ref().unwrap();
    assert_eq!(provenance.message_id, original.id);
    assert_eq!(provenance.conversation_id, source.id);
    assert_eq!(provenance.sender_id, a);

    let untouched = env
        .state
        .service
        .history(b, source.id, HistoryCursor::default(), None)
        .await
        .unwrap();
    assert_eq!(untouched.len(), 1);
    assert_eq!(untouched[0].content, "forward me");
    assert_eq!(untouched[0].sender_id, a);
    assert_eq!(untouched[0].conversation_id, source.id);
    assert!(untouched[0].forwarded_from.is_none());
}

#[tokio::test]
async fn forwarding_into_a_foreign_conversation_is_rejected() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let source = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let foreign = env
        .state
        .service
        .find_or_create_direct(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap();
    let original = env
        .state
        .service
        .send_message(a, source.id, text_message("secret"))
        .await
        .unwrap();

    let err = env
        .state
        .service
        .forward_message(a, original.id, &[foreign.id])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));

    // Nothing was created in the foreign conversation.
    let foreign_history = env
        .state
        .service
        .history(
            foreign.participants[0],
            foreign.id,
            HistoryCursor::default(),
            None,
        )
        .await
        .unwrap();
    assert!(foreign_history.is_empty());
}

#[tokio::test]
async fn history_pages_ascending_with_cursors() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();
    for i in 0..5 {
        env.state
            .service
            .send_message(a, conversation.id, text_message(&format!("m{i}")))
            .await
            .unwrap();
    }

    let first_page = env
        .state
        .service
        .history(b, conversation.id, HistoryCursor::default(), Some(2))
        .await
        .unwrap();
    assert_eq!(
        first_page.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["m0", "m1"]
    );
    assert!(first_page[0].sequence < first_page[1].sequence);

    let rest = env
        .state
        .service
        .history(
            b,
            conversation.id,
            HistoryCursor {
                after: Some(first_page[1].created_at),
                before: None,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        rest.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["m2", "m3", "m4"]
    );
}

#[tokio::test]
async fn search_spans_conversations_and_skips_deleted() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let with_b = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let with_c = env.state.service.find_or_create_direct(a, c).await.unwrap();

    env.state
        .service
        .send_message(a, with_b.id, text_message("project kickoff notes"))
        .await
        .unwrap();
    let doomed = env
        .state
        .service
        .send_message(a, with_c.id, text_message("kickoff reminder"))
        .await
        .unwrap();
    env.state.service.delete_message(a, doomed.id, true).await.unwrap();

    let hits = env.state.service.search(a, "kickoff", None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].conversation_id, with_b.id);

    // B sees only their own conversations.
    let hits = env.state.service.search(b, "kickoff", None).await.unwrap();
    assert_eq!(hits.len(), 1);

    let err = env
        .state
        .service
        .search(b, "kickoff", Some(with_c.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn replies_must_target_the_same_conversation() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let here = env.state.service.find_or_create_direct(a, b).await.unwrap();
    let elsewhere = env
        .state
        .service
        .find_or_create_direct(a, Uuid::new_v4())
        .await
        .unwrap();
    let foreign_parent = env
        .state
        .service
        .send_message(a, elsewhere.id, text_message("over here"))
        .await
        .unwrap();

    let err = env
        .state
        .service
        .send_message(
            a,
            here.id,
            SendMessageRequest {
                reply_to: Some(foreign_parent.id),
                ..text_message("reply")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn oversized_and_empty_content_is_rejected() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();

    let err = env
        .state
        .service
        .send_message(a, conversation.id, text_message("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let oversized = "x".repeat(env.state.config.max_message_len + 1);
    let err = env
        .state
        .service
        .send_message(a, conversation.id, text_message(&oversized))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn transient_store_failures_are_retried_to_success() {
    let env = test_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conversation = env.state.service.find_or_create_direct(a, b).await.unwrap();

    // Two injected failures, three configured attempts: the send recovers.
    env.store.inject_transient_faults(2);
    let message = env
        .state
        .service
        .send_message(a, conversation.id, text_message("eventually"))
        .await
        .unwrap();
    assert_eq!(message.content, "eventually");
}
