mod support;

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc::error::TryRecvError;
use warden_core::{
    HistoryStore, InMemoryHistoryStore, ItemOutcome, ItemProcessor, JobEvent,
    JobStatus, NotificationStage, OutcomeKind,
};
use warden_server::infra::{
    jobs::{JobControlError, JobControlPlane, JobStoreSettings},
    notify::Notifier,
};

use support::{
    FailingSink, GatedProcessor, PanickingProcessor, RecordingSink,
    ScriptedProcessor, eventually, ids, next_entered, wait_for_result,
    wait_for_status,
};

fn plane_with(processor: Arc<dyn ItemProcessor>) -> JobControlPlane {
    JobControlPlane::new(
        processor,
        Arc::new(InMemoryHistoryStore::new()),
        Notifier::disabled(),
        JobStoreSettings::default(),
    )
}

#[tokio::test]
async fn batch_of_three_produces_expected_report() -> anyhow::Result<()> {
    let processor = Arc::new(
        ScriptedProcessor::new()
            .with(ItemOutcome::valued("A", Some("Alpha".into()), 10.0))
            .with(ItemOutcome::flagged("B", Some("Bravo".into()), "banned"))
            .with(ItemOutcome::valued("C", Some("Charlie".into()), 5.0)),
    );
    let plane = plane_with(processor.clone());

    let created = plane.create_job(ids(&["A", "B", "C"]), None).await?;
    let report = wait_for_result(&plane, created.job_id).await;

    assert_eq!(report.status, JobStatus::Complete);
    assert!(!report.stopped_early);
    let summary = &report.report.summary;
    assert_eq!(summary.requested, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.clean, 2);
    assert_eq!(summary.flagged, 1);
    assert_eq!(summary.stage1_errors, 0);
    assert_eq!(summary.total_value, 15.0);

    let successful: Vec<&str> = report
        .report
        .successful
        .iter()
        .map(|outcome| outcome.id.as_str())
        .collect();
    assert_eq!(successful, vec!["A", "C"]);
    assert_eq!(processor.calls(), ids(&["A", "B", "C"]));
    Ok(())
}

#[tokio::test]
async fn items_are_processed_once_in_submission_order() -> anyhow::Result<()> {
    let processor = Arc::new(ScriptedProcessor::new());
    let plane = plane_with(processor.clone());

    let created = plane
        .create_job(ids(&["z", " y ", "z", "", "x", "y"]), None)
        .await?;
    assert_eq!(created.requested, 3);
    assert_eq!(created.duplicates_removed, 3);

    wait_for_result(&plane, created.job_id).await;
    assert_eq!(processor.calls(), ids(&["z", "y", "x"]));
    assert_eq!(processor.call_count(), 3);
    Ok(())
}

#[tokio::test]
async fn pause_waits_for_in_flight_item_and_resume_continues()
-> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = plane_with(processor.clone());
    let job_id = plane.create_job(ids(&["a", "b", "c"]), None).await?.job_id;

    assert_eq!(next_entered(&mut entered).await, "a");
    let ack = plane.pause(job_id).await?;
    assert_eq!(ack.status, JobStatus::Processing);
    // A second pause before it takes effect is acknowledged again.
    assert_eq!(plane.pause(job_id).await?.status, JobStatus::Processing);

    processor.release(1);
    wait_for_status(&plane, job_id, JobStatus::Paused).await;

    let partial = plane.partial_report(job_id).await?;
    assert_eq!(partial.status, JobStatus::Paused);
    assert_eq!(partial.cursor, 1);
    assert_eq!(partial.report.summary.processed, 1);
    assert_eq!(partial.report.summary.pending, 2);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(entered.try_recv(), Err(TryRecvError::Empty));

    let resumed = plane.resume(job_id).await?;
    assert_eq!(resumed.status, JobStatus::Processing);
    processor.release(2);

    let report = wait_for_result(&plane, job_id).await;
    assert_eq!(report.report.summary.processed, 3);
    assert!(!report.stopped_early);
    Ok(())
}

#[tokio::test]
async fn resume_before_pause_takes_effect_is_rejected() -> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = plane_with(processor.clone());
    let job_id = plane.create_job(ids(&["a", "b"]), None).await?.job_id;
    let mut subscription = plane.subscribe(job_id, None).await?;

    assert_eq!(next_entered(&mut entered).await, "a");
    plane.pause(job_id).await?;
    let err = plane.resume(job_id).await.unwrap_err();
    assert_eq!(
        err,
        JobControlError::InvalidTransition {
            action: "resume",
            status: JobStatus::Processing,
        }
    );
    assert!(plane.get(job_id).await?.pause_requested);

    // The pause still lands at the item boundary.
    processor.release(1);
    wait_for_status(&plane, job_id, JobStatus::Paused).await;
    plane.resume(job_id).await?;
    assert_eq!(next_entered(&mut entered).await, "b");
    processor.release(1);
    wait_for_result(&plane, job_id).await;

    let mut lifecycle = Vec::new();
    while let Some(frame) = subscription.next_frame().await {
        match frame.event {
            JobEvent::Paused { .. } | JobEvent::Resumed { .. } => {
                lifecycle.push(frame.event.event_name())
            }
            _ => {}
        }
    }
    assert_eq!(lifecycle, vec!["paused", "resumed"]);
    Ok(())
}

#[tokio::test]
async fn stop_completes_early_with_skipped_remainder() -> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = plane_with(processor.clone());
    let job_id = plane
        .create_job(ids(&["a", "b", "c", "d"]), None)
        .await?
        .job_id;

    assert_eq!(next_entered(&mut entered).await, "a");
    processor.release(1);
    assert_eq!(next_entered(&mut entered).await, "b");

    let ack = plane.stop(job_id).await?;
    assert_eq!(ack.status, JobStatus::Stopping);
    processor.release(1);

    let report = wait_for_result(&plane, job_id).await;
    assert_eq!(report.status, JobStatus::Complete);
    assert!(report.stopped_early);
    let summary = &report.report.summary;
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.skipped, 2);
    assert_eq!(entered.try_recv(), Err(TryRecvError::Empty));
    Ok(())
}

#[tokio::test]
async fn stop_while_paused_finishes_without_more_work() -> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = plane_with(processor.clone());
    let job_id = plane.create_job(ids(&["a", "b"]), None).await?.job_id;

    next_entered(&mut entered).await;
    plane.pause(job_id).await?;
    processor.release(1);
    wait_for_status(&plane, job_id, JobStatus::Paused).await;

    plane.stop(job_id).await?;
    let report = wait_for_result(&plane, job_id).await;
    assert!(report.stopped_early);
    assert_eq!(report.report.summary.processed, 1);
    assert_eq!(report.report.summary.skipped, 1);
    assert_eq!(entered.try_recv(), Err(TryRecvError::Empty));
    Ok(())
}

#[tokio::test]
async fn invalid_control_signals_are_rejected() -> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = plane_with(processor.clone());
    let job_id = plane.create_job(ids(&["a", "b"]), None).await?.job_id;
    next_entered(&mut entered).await;

    let err = plane.resume(job_id).await.unwrap_err();
    assert!(matches!(
        err,
        JobControlError::InvalidTransition {
            action: "resume",
            status: JobStatus::Processing
        }
    ));

    plane.pause(job_id).await?;
    processor.release(1);
    wait_for_status(&plane, job_id, JobStatus::Paused).await;
    let err = plane.pause(job_id).await.unwrap_err();
    assert!(err.is_conflict());

    plane.resume(job_id).await?;
    processor.release(1);
    wait_for_result(&plane, job_id).await;

    for result in [
        plane.pause(job_id).await,
        plane.resume(job_id).await,
        plane.stop(job_id).await,
    ] {
        assert_eq!(result.unwrap_err(), JobControlError::JobTerminal);
    }
    Ok(())
}

#[tokio::test]
async fn processor_panic_fails_the_job_and_keeps_results()
-> anyhow::Result<()> {
    let plane = plane_with(Arc::new(PanickingProcessor {
        poison: "boom".into(),
    }));
    let job_id = plane
        .create_job(ids(&["ok", "boom", "never"]), None)
        .await?
        .job_id;

    let report = wait_for_result(&plane, job_id).await;
    assert_eq!(report.status, JobStatus::Error);
    assert!(report.failure.as_deref().is_some_and(|f| f.contains("boom")));
    assert_eq!(report.report.summary.processed, 1);
    assert_eq!(report.report.summary.pending, 2);

    let err = plane.resume(job_id).await.unwrap_err();
    assert_eq!(err, JobControlError::JobTerminal);
    Ok(())
}

#[tokio::test]
async fn upstream_errors_are_outcomes_not_failures() -> anyhow::Result<()> {
    let processor = Arc::new(
        ScriptedProcessor::new()
            .with(ItemOutcome::stage1_error("a", "timeout"))
            .with(ItemOutcome::stage2_error("b", None, "502")),
    );
    let plane = plane_with(processor);
    let job_id = plane.create_job(ids(&["a", "b", "c"]), None).await?.job_id;

    let report = wait_for_result(&plane, job_id).await;
    assert_eq!(report.status, JobStatus::Complete);
    let summary = &report.report.summary;
    assert_eq!(summary.stage1_errors, 1);
    assert_eq!(summary.stage2_errors, 1);
    assert_eq!(summary.clean, 2);
    assert_eq!(summary.total_value, 1.0);
    Ok(())
}

#[tokio::test]
async fn clean_stage_one_error_and_flagged_batch() -> anyhow::Result<()> {
    let processor = Arc::new(
        ScriptedProcessor::new()
            .with(ItemOutcome::clean("A", Some("Alpha".into())))
            .with(ItemOutcome::stage1_error("B", "connection refused"))
            .with(ItemOutcome::flagged("C", None, "trade ban")),
    );
    let plane = plane_with(processor);
    let job_id = plane.create_job(ids(&["A", "B", "C"]), None).await?.job_id;

    let report = wait_for_result(&plane, job_id).await;
    let summary = &report.report.summary;
    assert_eq!(summary.requested, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.clean, 1);
    assert_eq!(summary.flagged, 1);
    assert_eq!(summary.stage1_errors, 1);
    assert_eq!(summary.stage2_errors, 0);

    let mut subscription = plane.subscribe(job_id, None).await?;
    let mut recorded = Vec::new();
    while let Some(frame) = subscription.next_frame().await {
        if let JobEvent::Log { entry } = frame.event
            && let Some(id) = entry.related_id
        {
            recorded.push(id);
        }
    }
    assert_eq!(recorded, ids(&["A", "B", "C"]));
    Ok(())
}

#[tokio::test]
async fn drained_job_partial_report_matches_final_result()
-> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = plane_with(processor.clone());
    let job_id = plane.create_job(ids(&["a", "b"]), None).await?.job_id;

    next_entered(&mut entered).await;
    let running = plane.partial_report(job_id).await?;
    assert_eq!(running.report.summary.pending, 2);

    processor.release(2);
    let report = wait_for_result(&plane, job_id).await;
    let partial = plane.partial_report(job_id).await?;
    assert_eq!(partial.status, JobStatus::Complete);
    assert_eq!(partial.cursor, 2);
    assert_eq!(partial.report.summary, report.report.summary);
    assert_eq!(partial.report.successful, report.report.successful);
    Ok(())
}

#[tokio::test]
async fn live_subscriber_sees_ordered_sequenced_frames() -> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = plane_with(processor.clone());
    let job_id = plane.create_job(ids(&["a", "b", "c"]), None).await?.job_id;
    next_entered(&mut entered).await;

    let mut subscription = plane.subscribe(job_id, None).await?;
    processor.release(3);

    let mut frames = Vec::new();
    loop {
        let next = subscription.next_frame();
        match tokio::time::timeout(support::WAIT_LIMIT, next).await? {
            Some(frame) => frames.push(frame),
            None => break,
        }
    }

    let sequences: Vec<u64> =
        frames.iter().map(|frame| frame.sequence).collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sequences, sorted, "frames strictly increasing");

    let completed: Vec<usize> = frames
        .iter()
        .filter_map(|frame| match &frame.event {
            JobEvent::ItemCompleted { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![0, 1, 2]);

    let tail: Vec<&str> = frames
        .iter()
        .rev()
        .take(2)
        .map(|frame| frame.event.event_name())
        .collect();
    assert_eq!(tail, vec!["stream_end", "complete"]);
    Ok(())
}

#[tokio::test]
async fn late_subscriber_replays_logs_and_final_event() -> anyhow::Result<()> {
    let plane = plane_with(Arc::new(ScriptedProcessor::new()));
    let job_id = plane.create_job(ids(&["a", "b"]), None).await?.job_id;
    wait_for_result(&plane, job_id).await;

    let mut subscription = plane.subscribe(job_id, None).await?;
    let mut frames = Vec::new();
    while let Some(frame) = subscription.next_frame().await {
        frames.push(frame);
    }

    let related: Vec<&str> = frames
        .iter()
        .filter_map(|frame| match &frame.event {
            JobEvent::Log { entry } => entry.related_id.as_deref(),
            _ => None,
        })
        .collect();
    assert_eq!(related, vec!["a", "b"]);
    assert!(frames.iter().all(|frame| !matches!(
        frame.event,
        JobEvent::ItemCompleted { .. }
    )));

    let terminal = frames
        .iter()
        .find(|frame| frame.event.is_terminal())
        .expect("terminal frame replayed");
    assert_eq!(terminal.event.event_name(), "complete");
    assert!(frames.last().is_some_and(|frame| frame.is_stream_end()));

    // Resuming after the terminal frame only yields the end marker.
    let mut resumed = plane.subscribe(job_id, Some(terminal.sequence)).await?;
    let first = resumed.next_frame().await.expect("end marker");
    assert!(first.is_stream_end());
    assert!(resumed.next_frame().await.is_none());
    Ok(())
}

#[tokio::test]
async fn notifications_follow_the_lifecycle() -> anyhow::Result<()> {
    let (sink, mut delivered) = RecordingSink::new();
    let plane = JobControlPlane::new(
        Arc::new(ScriptedProcessor::new()),
        Arc::new(InMemoryHistoryStore::new()),
        Notifier::new(sink, Duration::from_secs(1)),
        JobStoreSettings::default(),
    );

    let job_id = plane
        .create_job(ids(&["a"]), Some("https://hooks.example.com/warden"))
        .await?
        .job_id;
    wait_for_result(&plane, job_id).await;

    let mut stages = Vec::new();
    while stages.len() < 2 {
        let (target, notification) =
            tokio::time::timeout(support::WAIT_LIMIT, delivered.recv())
                .await?
                .expect("sink open");
        assert_eq!(target.as_str(), "https://hooks.example.com/warden");
        assert_eq!(notification.job_id, job_id);
        stages.push(notification.stage);
    }
    assert!(stages.contains(&NotificationStage::Started));
    assert!(stages.contains(&NotificationStage::Complete));
    Ok(())
}

#[tokio::test]
async fn failing_notification_sink_does_not_affect_the_job()
-> anyhow::Result<()> {
    let sink = Arc::new(FailingSink::default());
    let plane = JobControlPlane::new(
        Arc::new(ScriptedProcessor::new()),
        Arc::new(InMemoryHistoryStore::new()),
        Notifier::new(sink.clone(), Duration::from_secs(1)),
        JobStoreSettings::default(),
    );

    let job_id = plane
        .create_job(ids(&["a", "b"]), Some("https://hooks.example.com/down"))
        .await?
        .job_id;
    let report = wait_for_result(&plane, job_id).await;
    assert_eq!(report.status, JobStatus::Complete);
    assert_eq!(report.report.summary.processed, 2);
    assert!(report.failure.is_none());

    eventually("both deliveries attempted", || {
        let sink = sink.clone();
        async move { sink.attempts() >= 2 }
    })
    .await;
    assert_eq!(plane.get(job_id).await?.status, JobStatus::Complete);
    Ok(())
}

#[tokio::test]
async fn finished_results_are_merged_into_history() -> anyhow::Result<()> {
    let history = Arc::new(InMemoryHistoryStore::new());
    let plane = JobControlPlane::new(
        Arc::new(
            ScriptedProcessor::new()
                .with(ItemOutcome::flagged("b", None, "banned")),
        ),
        history.clone(),
        Notifier::disabled(),
        JobStoreSettings::default(),
    );

    let job_id = plane.create_job(ids(&["a", "b"]), None).await?.job_id;
    wait_for_result(&plane, job_id).await;

    eventually("history merged", || {
        let history = history.clone();
        async move { history.len().await == 2 }
    })
    .await;
    let b = history.get("b").await?.expect("b recorded");
    assert_eq!(b.kind, OutcomeKind::VerifiedFlagged);
    Ok(())
}

fn short_retention(retention: Duration) -> JobStoreSettings {
    JobStoreSettings {
        idle_retention: retention,
        ..JobStoreSettings::default()
    }
}

#[tokio::test]
async fn idle_terminal_job_is_evicted() -> anyhow::Result<()> {
    let plane = JobControlPlane::new(
        Arc::new(ScriptedProcessor::new()),
        Arc::new(InMemoryHistoryStore::new()),
        Notifier::disabled(),
        short_retention(Duration::from_millis(50)),
    );
    let job_id = plane.create_job(ids(&["a"]), None).await?.job_id;
    wait_for_result(&plane, job_id).await;

    eventually("job evicted", || {
        let plane = plane.clone();
        async move { !plane.contains(job_id).await }
    })
    .await;
    assert_eq!(
        plane.get(job_id).await.unwrap_err(),
        JobControlError::JobNotFound
    );
    Ok(())
}

#[tokio::test]
async fn attached_subscriber_defers_eviction() -> anyhow::Result<()> {
    let plane = JobControlPlane::new(
        Arc::new(ScriptedProcessor::new()),
        Arc::new(InMemoryHistoryStore::new()),
        Notifier::disabled(),
        short_retention(Duration::from_millis(80)),
    );
    let job_id = plane.create_job(ids(&["a"]), None).await?.job_id;
    wait_for_result(&plane, job_id).await;

    let subscription = plane.subscribe(job_id, None).await?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(plane.contains(job_id).await);
    assert_eq!(plane.get(job_id).await?.subscribers, 1);

    drop(subscription);
    eventually("job evicted after detach", || {
        let plane = plane.clone();
        async move { !plane.contains(job_id).await }
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn running_job_is_never_evicted() -> anyhow::Result<()> {
    let (processor, mut entered) = GatedProcessor::new();
    let plane = JobControlPlane::new(
        processor.clone(),
        Arc::new(InMemoryHistoryStore::new()),
        Notifier::disabled(),
        short_retention(Duration::from_millis(20)),
    );
    let job_id = plane.create_job(ids(&["a"]), None).await?.job_id;
    next_entered(&mut entered).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(plane.contains(job_id).await);
    processor.release(1);
    wait_for_result(&plane, job_id).await;
    Ok(())
}

#[tokio::test]
async fn list_reports_every_retained_job() -> anyhow::Result<()> {
    let plane = plane_with(Arc::new(ScriptedProcessor::new()));
    let first = plane.create_job(ids(&["a"]), None).await?.job_id;
    let second = plane.create_job(ids(&["b", "c"]), None).await?.job_id;

    let listed = plane.list().await;
    assert_eq!(listed.len(), 2);
    let requested_for = |job_id| {
        listed
            .iter()
            .find(|job| job.job_id == job_id)
            .map(|job| job.requested)
    };
    assert_eq!(requested_for(first), Some(1));
    assert_eq!(requested_for(second), Some(2));
    Ok(())
}
