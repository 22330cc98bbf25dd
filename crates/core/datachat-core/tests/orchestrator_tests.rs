//! Orchestrator behaviour against the in-memory assistant service
//!
//! Tests drive full turns through `FakeAssistantService` with a
//! `ManualClock`, so polling never waits on real time. The wall-clock bound
//! is also checked on paused tokio time with the default clock.

use datachat_core::testing::{tool_call, FakeAssistantService, ManualClock, ScriptStep};
use datachat_core::*;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(fake: &Arc<FakeAssistantService>, config: OrchestratorConfig) -> (Orchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let orchestrator = Orchestrator::new(fake.clone(), config).with_clock(clock.clone());
    (orchestrator, clock)
}

fn quick_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_secs(1),
        run_timeout: Duration::from_secs(10),
        ..OrchestratorConfig::default()
    }
}

/// Upload + text turn completing on the first poll
#[tokio::test]
async fn test_summarize_columns_scenario() {
    let fake = Arc::new(
        FakeAssistantService::new()
            .with_script(vec![
                ScriptStep::Status(RunStatus::Queued),
                ScriptStep::Status(RunStatus::Completed),
            ])
            .with_reply_text("3 columns: A, B, C"),
    );
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(
            &mut session,
            "Summarize columns",
            vec![NewFile::new("data.csv", b"A,B,C\n1,2,3\n".to_vec())],
        )
        .await
        .unwrap();

    let entries = session.transcript().entries();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].role(), Role::User);
    assert_eq!(entries[0].text(), "Summarize columns");
    let files: Vec<_> = entries[0].files().collect();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "data.csv");
    assert!(files[0].remote_id.is_some());

    assert_eq!(entries[1].role(), Role::Assistant);
    assert_eq!(entries[1].text(), "3 columns: A, B, C");
    assert!(entries[1].error().is_none());

    assert_eq!(fake.call_count("create_thread"), 1);
    assert_eq!(fake.call_count("upload_file"), 1);
    assert_eq!(fake.call_count("create_run"), 1);
    assert_eq!(fake.call_count("get_run"), 1);
}

#[tokio::test]
async fn test_empty_turn_rejected_without_remote_calls() {
    let fake = Arc::new(FakeAssistantService::new());
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    let err = orchestrator
        .submit_turn(&mut session, "", Vec::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidTurn);
    assert!(fake.calls().is_empty());
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn test_single_tool_cycle_answered_once() {
    let fake = Arc::new(
        FakeAssistantService::new()
            .with_script(vec![
                ScriptStep::Status(RunStatus::InProgress),
                ScriptStep::RequiresAction(vec![tool_call(
                    "call-1",
                    "analyze_data",
                    serde_json::json!({"dataset_name": "data.csv", "question": "mean?"}),
                )]),
                ScriptStep::Status(RunStatus::InProgress),
                ScriptStep::Status(RunStatus::Completed),
            ])
            .with_reply_text("The mean is 2."),
    );
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(
            &mut session,
            "What is the mean?",
            vec![NewFile::new("data.csv", b"x\n1\n3\n".to_vec())],
        )
        .await
        .unwrap();

    let outputs = fake.submitted_outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].tool_call_id, "call-1");
    assert!(outputs[0].output.starts_with("Analysis of data.csv complete."));
    assert_eq!(fake.call_count("submit_tool_outputs"), 1);

    let assistant_entries = session
        .transcript()
        .entries()
        .iter()
        .filter(|e| e.role() == Role::Assistant)
        .count();
    assert_eq!(assistant_entries, 1);
    assert_eq!(session.transcript().last().unwrap().text(), "The mean is 2.");
}

#[tokio::test]
async fn test_repeated_requires_action_not_resubmitted() {
    let call = tool_call(
        "call-7",
        "analyze_data",
        serde_json::json!({"dataset_name": "x", "question": "y"}),
    );
    let fake = Arc::new(
        FakeAssistantService::new()
            .with_script(vec![
                ScriptStep::RequiresAction(vec![call.clone()]),
                ScriptStep::RequiresAction(vec![call]),
                ScriptStep::Status(RunStatus::Completed),
            ])
            .with_reply_text("done"),
    );
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "go", Vec::new())
        .await
        .unwrap();

    assert_eq!(fake.call_count("submit_tool_outputs"), 1);
    assert_eq!(fake.submitted_outputs().len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_answered_with_error_payload() {
    let fake = Arc::new(
        FakeAssistantService::new()
            .with_script(vec![
                ScriptStep::RequiresAction(vec![tool_call("call-9", "drop_tables", serde_json::json!({}))]),
                ScriptStep::Status(RunStatus::Completed),
            ])
            .with_reply_text("Sorry, I could not do that."),
    );
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "drop everything", Vec::new())
        .await
        .unwrap();

    let outputs = fake.submitted_outputs();
    let payload: serde_json::Value = serde_json::from_str(&outputs[0].output).unwrap();
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["kind"], "unknown_tool");
    assert!(session.transcript().last().unwrap().error().is_none());
}

#[tokio::test]
async fn test_stalled_run_times_out() {
    let fake = Arc::new(
        FakeAssistantService::new().with_script(vec![ScriptStep::Status(RunStatus::InProgress)]),
    );
    let (orchestrator, clock) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "slow question", Vec::new())
        .await
        .unwrap();

    let last = session.transcript().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(last.error(), Some(ErrorKind::RunTimeout));
    assert!(last.text().contains("timed out"));

    assert_eq!(clock.now(), Duration::from_secs(10));
    assert_eq!(fake.call_count("get_run"), 10);
    assert_eq!(fake.call_count("cancel_run"), 0);
    assert_eq!(fake.call_count("list_messages"), 0);
}

#[tokio::test]
async fn test_timeout_cancels_when_configured() {
    let fake = Arc::new(
        FakeAssistantService::new().with_script(vec![ScriptStep::Status(RunStatus::Queued)]),
    );
    let config = OrchestratorConfig {
        cancel_on_timeout: true,
        ..quick_config()
    };
    let (orchestrator, _) = orchestrator(&fake, config);
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "q", Vec::new())
        .await
        .unwrap();

    assert_eq!(fake.call_count("cancel_run"), 1);
    assert_eq!(
        session.transcript().last().unwrap().error(),
        Some(ErrorKind::RunTimeout)
    );
    // cancelling is not terminal yet
    assert!(session.active_run().is_some());
}

#[tokio::test]
async fn test_last_sleep_capped_by_remaining_time() {
    let fake = Arc::new(
        FakeAssistantService::new().with_script(vec![ScriptStep::Status(RunStatus::InProgress)]),
    );
    let config = OrchestratorConfig {
        poll_interval: Duration::from_secs(4),
        run_timeout: Duration::from_secs(10),
        ..OrchestratorConfig::default()
    };
    let (orchestrator, clock) = orchestrator(&fake, config);
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "q", Vec::new())
        .await
        .unwrap();

    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(4),
            Duration::from_secs(4),
            Duration::from_secs(2)
        ]
    );
}

#[tokio::test]
async fn test_failed_run_records_reason() {
    let fake = Arc::new(
        FakeAssistantService::new()
            .with_script(vec![ScriptStep::Failed("rate limit exceeded".into())]),
    );
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "q", Vec::new())
        .await
        .unwrap();

    let last = session.transcript().last().unwrap();
    assert_eq!(last.error(), Some(ErrorKind::RunFailed));
    assert!(last.text().contains("rate limit exceeded"));
}

#[tokio::test]
async fn test_cancelled_and_expired_are_failures() {
    for status in [RunStatus::Cancelled, RunStatus::Expired] {
        let fake = Arc::new(FakeAssistantService::new().with_script(vec![ScriptStep::Status(status)]));
        let (orchestrator, _) = orchestrator(&fake, quick_config());
        let mut session = Session::new("s-1", "asst-1");

        orchestrator
            .submit_turn(&mut session, "q", Vec::new())
            .await
            .unwrap();

        assert_eq!(
            session.transcript().last().unwrap().error(),
            Some(ErrorKind::RunFailed)
        );
    }
}

#[tokio::test]
async fn test_remote_unavailable_becomes_entry() {
    let fake = Arc::new(FakeAssistantService::new().fail_on("create_thread"));
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(
            &mut session,
            "hello",
            vec![NewFile::new("data.csv", b"a\n".to_vec())],
        )
        .await
        .unwrap();

    let entries = session.transcript().entries();
    assert_eq!(entries.len(), 2);
    let files: Vec<_> = entries[0].files().collect();
    assert_eq!(files[0].name, "data.csv");
    assert!(files[0].remote_id.is_none());
    assert_eq!(entries[1].error(), Some(ErrorKind::RemoteUnavailable));
    assert!(session.thread_id().is_none());
    assert_eq!(fake.call_count("upload_file"), 0);
}

#[tokio::test]
async fn test_transcript_is_append_only_across_turns() {
    let fake = Arc::new(FakeAssistantService::new().with_reply_text("first"));
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "one", Vec::new())
        .await
        .unwrap();
    let before: Vec<TranscriptEntry> = session.transcript().entries().to_vec();

    orchestrator
        .submit_turn(&mut session, "two", Vec::new())
        .await
        .unwrap();
    let after = session.transcript().entries();

    assert!(after.len() >= before.len());
    assert_eq!(&after[..before.len()], &before[..]);
    let seqs: Vec<u64> = after.iter().map(|e| e.seq()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(fake.call_count("create_thread"), 1);
}

#[tokio::test]
async fn test_only_new_messages_collected() {
    let fake = Arc::new(FakeAssistantService::new().with_reply_text("first answer"));
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "one", Vec::new())
        .await
        .unwrap();
    orchestrator
        .submit_turn(&mut session, "two", Vec::new())
        .await
        .unwrap();

    let last = session.transcript().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert!(!last.text().contains("first answer"));
}

#[tokio::test]
async fn test_generated_files_and_images() {
    let fake = Arc::new(
        FakeAssistantService::new()
            .with_file("file-chart", "chart.png", vec![0x89, 0x50, 0x4e, 0x47])
            .with_file("file-out", "summary.csv", b"col,count\nA,3\n".to_vec())
            .with_reply(
                vec![
                    RemotePart::Text {
                        text: "Here is the chart.".into(),
                        file_ids: Vec::new(),
                    },
                    RemotePart::ImageFile {
                        file_id: "file-chart".into(),
                    },
                ],
                vec!["file-out".into()],
            ),
    );
    let config = OrchestratorConfig {
        eager_downloads: true,
        ..quick_config()
    };
    let (orchestrator, _) = orchestrator(&fake, config);
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "chart it", Vec::new())
        .await
        .unwrap();

    let last = session.transcript().last().unwrap();
    assert!(matches!(last.parts()[1], ContentPart::Image { .. }));
    let names: Vec<&str> = last.files().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["file-chart.png", "summary.csv"]);
    assert!(session.is_cached("file-chart"));
    assert!(session.is_cached("file-out"));

    let reference = FileReference::remote("summary.csv", "file-out");
    let downloads_before = fake.call_count("download_file");
    let bytes = orchestrator.download(&mut session, &reference).await.unwrap();
    assert_eq!(bytes, b"col,count\nA,3\n".to_vec());
    assert_eq!(fake.call_count("download_file"), downloads_before);
}

#[tokio::test]
async fn test_empty_completion_gets_placeholder() {
    let fake = Arc::new(FakeAssistantService::new());
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "anything?", Vec::new())
        .await
        .unwrap();

    let last = session.transcript().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert!(last.error().is_none());
    assert!(!last.text().is_empty());
}

#[tokio::test]
async fn test_download_unknown_file_not_found() {
    let fake = Arc::new(FakeAssistantService::new());
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    let err = orchestrator
        .download(&mut session, &FileReference::remote("gone.csv", "file-missing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);

    let err = orchestrator
        .download(&mut session, &FileReference::local("local.csv"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn test_download_expired_remote_file() {
    let fake = Arc::new(
        FakeAssistantService::new().with_reply(
            vec![RemotePart::Text {
                text: "see attached".into(),
                file_ids: vec!["file-expired".into()],
            }],
            Vec::new(),
        ),
    );
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "export", Vec::new())
        .await
        .unwrap();
    let reference = session.transcript().last().unwrap().files().next().cloned().unwrap();
    assert_eq!(reference.name, "file-expired");

    let len_before = session.transcript().len();
    let err = orchestrator.download(&mut session, &reference).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert_eq!(session.transcript().len(), len_before);
}

#[tokio::test]
async fn test_reset_clears_everything_but_identity() {
    let fake = Arc::new(FakeAssistantService::new().with_reply_text("hi"));
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "hello", Vec::new())
        .await
        .unwrap();
    assert!(session.thread_id().is_some());

    let session = orchestrator.reset(session);
    assert_eq!(session.transcript().len(), 0);
    assert!(session.thread_id().is_none());
    assert_eq!(session.id(), "s-1");
    assert_eq!(session.assistant_id(), "asst-1");
}

#[tokio::test]
async fn test_moderation_failure_does_not_block() {
    let fake = Arc::new(
        FakeAssistantService::new()
            .fail_on("moderate")
            .with_reply_text("ok"),
    );
    let config = OrchestratorConfig {
        moderation_enabled: true,
        ..quick_config()
    };
    let (orchestrator, _) = orchestrator(&fake, config);
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "hello", Vec::new())
        .await
        .unwrap();
    assert_eq!(session.transcript().last().unwrap().text(), "ok");
}

#[tokio::test]
async fn test_flagged_text_rejected() {
    let fake = Arc::new(FakeAssistantService::new().flag_everything());
    let config = OrchestratorConfig {
        moderation_enabled: true,
        ..quick_config()
    };
    let (orchestrator, _) = orchestrator(&fake, config);
    let mut session = Session::new("s-1", "asst-1");

    let err = orchestrator
        .submit_turn(&mut session, "bad words", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Flagged);
    assert_eq!(fake.calls(), vec!["moderate".to_string()]);
}

/// A poll that never answers is cut off at the turn deadline
#[tokio::test(start_paused = true)]
async fn test_hung_poll_bounded_by_deadline() {
    let fake = Arc::new(
        FakeAssistantService::new()
            .with_script(vec![ScriptStep::Status(RunStatus::InProgress)])
            .with_delay("get_run", Duration::from_secs(3600)),
    );
    let config = OrchestratorConfig {
        poll_interval: Duration::from_secs(1),
        run_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(fake.clone(), config);
    let mut session = Session::new("s-1", "asst-1");

    let started = tokio::time::Instant::now();
    orchestrator
        .submit_turn(&mut session, "slow question", Vec::new())
        .await
        .unwrap();

    assert!(started.elapsed() <= Duration::from_secs(6));
    let last = session.transcript().last().unwrap();
    assert_eq!(last.error(), Some(ErrorKind::RunTimeout));
    assert!(session.active_run().is_some());
    assert_eq!(fake.call_count("list_messages"), 0);
}

#[tokio::test]
async fn test_hung_upload_bounded_by_deadline() {
    let fake = Arc::new(
        FakeAssistantService::new().with_delay("upload_file", Duration::from_secs(3600)),
    );
    let (orchestrator, clock) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(
            &mut session,
            "look at this",
            vec![NewFile::new("data.csv", b"a\n1\n".to_vec())],
        )
        .await
        .unwrap();

    assert_eq!(clock.now(), Duration::from_secs(10));
    let entries = session.transcript().entries();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].files().all(|f| f.remote_id.is_none()));
    assert_eq!(entries[1].error(), Some(ErrorKind::RunTimeout));
    assert_eq!(fake.call_count("create_run"), 0);
}

#[tokio::test]
async fn test_outstanding_run_blocks_next_turn() {
    let fake = Arc::new(
        FakeAssistantService::new().with_script(vec![ScriptStep::Status(RunStatus::InProgress)]),
    );
    let config = OrchestratorConfig {
        run_timeout: Duration::from_secs(3),
        ..quick_config()
    };
    let (orchestrator, _) = orchestrator(&fake, config);
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(&mut session, "first", Vec::new())
        .await
        .unwrap();
    assert_eq!(
        session.transcript().last().unwrap().error(),
        Some(ErrorKind::RunTimeout)
    );
    assert!(session.active_run().is_some());

    let err = orchestrator
        .submit_turn(&mut session, "second", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionBusy);
    assert_eq!(session.transcript().len(), 2);
    assert_eq!(fake.call_count("create_run"), 1);
    assert_eq!(fake.call_count("add_message"), 1);
    assert_eq!(fake.call_count("cancel_run"), 0);

    // the earlier run finishes in the background
    fake.set_script(vec![ScriptStep::Status(RunStatus::Completed)]);
    orchestrator
        .submit_turn(&mut session, "third", Vec::new())
        .await
        .unwrap();
    assert!(session.active_run().is_none());
    assert_eq!(fake.call_count("create_run"), 2);
    assert_eq!(session.transcript().len(), 4);
    assert!(session.transcript().last().unwrap().error().is_none());
}

#[tokio::test]
async fn test_partial_upload_failure_keeps_local_reference() {
    let fake = Arc::new(FakeAssistantService::new().fail_after("upload_file", 1));
    let (orchestrator, _) = orchestrator(&fake, quick_config());
    let mut session = Session::new("s-1", "asst-1");

    orchestrator
        .submit_turn(
            &mut session,
            "compare these",
            vec![
                NewFile::new("jan.csv", b"a\n1\n".to_vec()),
                NewFile::new("feb.csv", b"a\n2\n".to_vec()),
            ],
        )
        .await
        .unwrap();

    let entries = session.transcript().entries();
    assert_eq!(entries.len(), 2);
    let files: Vec<_> = entries[0].files().collect();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "jan.csv");
    assert!(files[0].remote_id.is_some());
    assert_eq!(files[1].name, "feb.csv");
    assert!(files[1].remote_id.is_none());
    assert_eq!(entries[1].error(), Some(ErrorKind::RemoteUnavailable));

    assert_eq!(session.uploaded_files().len(), 1);
    assert_eq!(fake.call_count("upload_file"), 2);
    assert_eq!(fake.call_count("add_message"), 0);
    assert_eq!(fake.call_count("create_run"), 0);
}
