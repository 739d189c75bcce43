// Fusion coordinator integration tests: completion paths, placeholders,
// exactly-once finalization and requester notification

mod fixtures;

use fixtures::{wait_for_result, Harness};
use serde_json::{json, Value};
use society_protocol::bus::Intent;
use society_protocol::fusion::{
    FusionError, FusionOutcome, FusionStatus, NO_RESPONSE_PLACEHOLDER,
};
use society_protocol::Priority;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_all_participants_answer() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;
    harness.answering_agent("Anima", "Trust the process.").await;
    harness.answering_agent("GPTSoul", "Measure twice.").await;
    let mut cli = harness
        .recording_agent("CLI", vec![Intent::FusionResponse])
        .await;

    let id = fusion
        .request_fusion(
            "CLI",
            &["Anima", "GPTSoul"],
            "how should we proceed?",
            Some(json!({"topic": "release"})),
            Some(Duration::from_secs(10)),
        )
        .await
        .unwrap();

    let result = wait_for_result(&fusion, &id, Duration::from_secs(5)).await;
    assert_eq!(result.outcome, FusionOutcome::Completed);
    assert!(result.missing.is_empty());
    assert_eq!(result.participants, vec!["Anima", "GPTSoul"]);
    assert_eq!(result.responses["Anima"], "Trust the process.");
    assert!(result.combined_response.contains("[Anima]: Trust the process."));
    assert!(result.combined_response.contains("[GPTSoul]: Measure twice."));
    assert!(result.duration_ms < 5_000);

    let notice = tokio::time::timeout(Duration::from_secs(5), cli.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.sender, "fusion_protocol");
    assert_eq!(notice.payload["fusion_id"], json!(id));
    assert_eq!(notice.payload["response"], json!(result.combined_response));
    assert_eq!(notice.payload["outcome"], json!("completed"));

    assert!(fusion.pending_fusions().is_empty());
    assert!(fusion.get_fusion_status(&id).await.unwrap().is_completed());
}

#[tokio::test]
async fn test_combined_response_names_each_participant_once() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;
    harness.answering_agent("Anima", "Feel it out.").await;
    harness.answering_agent("GPTSoul", "Check the numbers.").await;
    harness.silent_agent("Engine").await;

    let id = fusion
        .request_fusion(
            "CLI",
            &["Anima", "GPTSoul", "Engine"],
            "how do we ship?",
            None,
            Some(Duration::from_millis(300)),
        )
        .await
        .unwrap();
    let result = wait_for_result(&fusion, &id, Duration::from_secs(5)).await;
    let combined = &result.combined_response;

    let signature = combined
        .lines()
        .find_map(|line| line.strip_prefix("Fused from: "))
        .expect("signature line");
    let signed: Vec<&str> = signature.split(" + ").collect();
    assert_eq!(signed, vec!["Anima", "GPTSoul", "Engine"]);

    for agent in ["Anima", "GPTSoul", "Engine"] {
        let label = format!("[{agent}]:");
        assert_eq!(combined.matches(label.as_str()).count(), 1, "section for {agent}");
    }
    assert_eq!(combined.matches(NO_RESPONSE_PLACEHOLDER).count(), 1);
}

#[tokio::test]
async fn test_silent_participant_gets_placeholder_at_deadline() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;
    harness.answering_agent("GPTSoul", "Because the data says so.").await;
    harness.silent_agent("Anima").await;

    let started = Instant::now();
    let id = fusion
        .request_fusion(
            "CLI",
            &["Anima", "GPTSoul"],
            "why and how should we proceed?",
            None,
            Some(Duration::from_millis(500)),
        )
        .await
        .unwrap();

    // GPTSoul answered, Anima still pending
    tokio::time::sleep(Duration::from_millis(100)).await;
    match fusion.get_fusion_status(&id).await.unwrap() {
        FusionStatus::Pending {
            responded, pending, ..
        } => {
            assert_eq!(responded, vec!["GPTSoul"]);
            assert_eq!(pending, vec!["Anima"]);
        }
        other => panic!("expected pending, got {other:?}"),
    }

    let result = wait_for_result(&fusion, &id, Duration::from_secs(5)).await;
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(result.outcome, FusionOutcome::TimedOut);
    assert_eq!(result.missing, vec!["Anima"]);
    assert!(result.combined_response.contains("Because the data says so."));
    assert!(result
        .combined_response
        .contains(&format!("[Anima]: {NO_RESPONSE_PLACEHOLDER}")));
    assert!(result.duration_ms >= 500);
    assert!(result.combined_response.contains("reasons"));
}

#[tokio::test]
async fn test_finalizes_exactly_once() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;
    harness.answering_agent("Anima", "one").await;
    harness.answering_agent("GPTSoul", "two").await;
    let mut cli = harness
        .recording_agent("CLI", vec![Intent::FusionResponse])
        .await;

    // Deadline close to the answers so both paths race
    let id = fusion
        .request_fusion("CLI", &["Anima", "GPTSoul"], "what now?", None, Some(Duration::from_millis(5)))
        .await
        .unwrap();
    wait_for_result(&fusion, &id, Duration::from_secs(5)).await;

    // Anything still in flight has had time to land
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.bus.flush().await.unwrap();

    let persisted: Vec<_> = harness
        .store
        .load_fusion_results()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.fusion_id == id)
        .collect();
    assert_eq!(persisted.len(), 1);

    let mut notices = 0;
    while let Ok(message) = cli.try_recv() {
        if message.payload["fusion_id"] == json!(id) {
            notices += 1;
        }
    }
    assert_eq!(notices, 1);
    assert!(!fusion.cancel_fusion(&id).await);
}

#[tokio::test]
async fn test_rejects_fewer_than_two_distinct_agents() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;

    let err = fusion
        .request_fusion::<&str>("CLI", &[], "anyone?", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FusionError::InvalidFusionRequest { distinct: 0 }));

    let err = fusion
        .request_fusion("CLI", &["Anima", "Anima"], "anyone?", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FusionError::InvalidFusionRequest { distinct: 1 }));

    // Rejected requests send nothing
    harness.bus.flush().await.unwrap();
    assert!(harness.store.load_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_participants_are_collapsed() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;
    harness.answering_agent("Anima", "a").await;
    harness.answering_agent("GPTSoul", "b").await;

    let id = fusion
        .request_fusion(
            "CLI",
            &["Anima", "GPTSoul", "Anima"],
            "what?",
            None,
            Some(Duration::from_secs(10)),
        )
        .await
        .unwrap();

    let result = wait_for_result(&fusion, &id, Duration::from_secs(5)).await;
    assert_eq!(result.participants, vec!["Anima", "GPTSoul"]);
    assert_eq!(result.outcome, FusionOutcome::Completed);
}

#[tokio::test]
async fn test_late_and_foreign_responses_are_ignored() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;
    harness.silent_agent("Anima").await;
    harness.silent_agent("GPTSoul").await;

    let id = fusion
        .request_fusion("CLI", &["Anima", "GPTSoul"], "what?", None, Some(Duration::from_secs(10)))
        .await
        .unwrap();

    let respond = |from: &'static str, text: &'static str| {
        let bus = harness.bus.clone();
        let id = id.clone();
        async move {
            bus.send(
                from,
                "fusion_protocol",
                Intent::FusionResponse,
                json!({ "fusion_id": id, "response": text }),
                Priority::NORMAL,
            )
            .await
            .unwrap();
        }
    };

    respond("Stranger", "not invited").await;
    respond("Anima", "first draft").await;
    respond("Anima", "final answer").await;
    harness.bus.flush().await.unwrap();
    assert!(fusion.get_fusion_status(&id).await.unwrap().is_pending());

    respond("GPTSoul", "agreed").await;
    let result = wait_for_result(&fusion, &id, Duration::from_secs(5)).await;
    assert_eq!(result.responses["Anima"], "final answer");
    assert!(!result.responses.contains_key("Stranger"));

    // After completion a straggler changes nothing
    respond("GPTSoul", "changed my mind").await;
    harness.bus.flush().await.unwrap();
    let again = fusion.get_fusion_result(&id).await.unwrap().unwrap();
    assert_eq!(again.responses["GPTSoul"], "agreed");
}

#[tokio::test]
async fn test_cancel_all_fills_placeholders() {
    let harness = Harness::new().await;
    let fusion = harness.fusion().await;
    harness.silent_agent("Anima").await;
    harness.silent_agent("GPTSoul").await;
    let mut cli = harness
        .recording_agent("CLI", vec![Intent::FusionResponse])
        .await;

    for _ in 0..3 {
        fusion
            .request_fusion("CLI", &["Anima", "GPTSoul"], "what?", None, Some(Duration::from_secs(60)))
            .await
            .unwrap();
    }
    assert_eq!(fusion.pending_fusions().len(), 3);

    assert_eq!(fusion.cancel_all().await, 3);
    assert!(fusion.pending_fusions().is_empty());
    harness.bus.flush().await.unwrap();

    let mut outcomes = Vec::new();
    while let Ok(message) = cli.try_recv() {
        outcomes.push(message.payload["outcome"].clone());
    }
    assert_eq!(outcomes, vec![Value::from("cancelled"); 3]);
}

#[tokio::test]
async fn test_result_survives_coordinator_restart() {
    let harness = Harness::new().await;
    let id = {
        let fusion = harness.fusion().await;
        harness.silent_agent("Anima").await;
        harness.silent_agent("GPTSoul").await;
        let id = fusion
            .request_fusion("CLI", &["Anima", "GPTSoul"], "what?", None, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(fusion.cancel_fusion(&id).await);
        id
    };

    let fresh = harness.fusion().await;
    match fresh.get_fusion_status(&id).await.unwrap() {
        FusionStatus::Completed { outcome, .. } => assert_eq!(outcome, FusionOutcome::Cancelled),
        other => panic!("expected completed, got {other:?}"),
    }
}
