mod test_harness;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use minnow::admission::{CapacityLedger, ProbeData, Selection, SelectionPolicy};
use minnow::config::JobSelectionPolicy;
use minnow::job::{EngineKind, JobSpec, ResourceProfile, ShardId};
use minnow::resources::Resources;
use test_harness::resources;

/// Run the selection gates for a job against a node with the given per-job
/// limits and total limits, with nothing currently reserved.
async fn select(
    job_resources: Resources,
    per_job_limits: Resources,
    total_limits: Resources,
) -> Selection {
    let policy = SelectionPolicy::new(
        JobSelectionPolicy::default().with_per_job_limits(per_job_limits),
    );
    let ledger = CapacityLedger::new(total_limits);
    let job = JobSpec::new("candidate", EngineKind::Noop).with_resources(job_resources);
    let profile = ResourceProfile::new(job.resources, Resources::default(), total_limits);
    policy
        .select(&CancellationToken::new(), &job, &profile, &ledger.snapshot())
        .await
        .expect("selection should not error")
}

#[tokio::test]
async fn test_per_job_limits_grid() {
    // (job, limits, accepted)
    let cases = [
        (("1", "500Mb"), ("2", "1Gb"), true),
        (("1", "500Mb"), ("1", "500Mb"), true),
        (("2", "1Gb"), ("1", "500Mb"), false),
        (("250m", "200Mb"), ("1", "500Mb"), true),
        (("250m", "200Mb"), ("", ""), true),
        (("", ""), ("", ""), true),
        // A job that declares nothing cannot preempt a bounded node.
        (("", ""), ("250m", "200Mb"), false),
    ];
    for ((job_cpu, job_memory), (limit_cpu, limit_memory), accepted) in cases {
        let selection = select(
            resources(job_cpu, job_memory),
            resources(limit_cpu, limit_memory),
            Resources::default(),
        )
        .await;
        if accepted {
            assert_eq!(
                selection,
                Selection::Accept,
                "job ({}, {}) vs limits ({}, {})",
                job_cpu,
                job_memory,
                limit_cpu,
                limit_memory
            );
        } else {
            assert!(
                matches!(selection, Selection::RejectTerminal(_)),
                "job ({}, {}) vs limits ({}, {}) should be terminal, got {:?}",
                job_cpu,
                job_memory,
                limit_cpu,
                limit_memory,
                selection
            );
        }
    }
}

#[tokio::test]
async fn test_envelope_gate_is_terminal() {
    // CPU limit 500m with a 1-core job can never fit on this node.
    let selection = select(
        resources("1", ""),
        Resources::default(),
        resources("500m", ""),
    )
    .await;
    assert!(matches!(selection, Selection::RejectTerminal(_)));
}

#[tokio::test]
async fn test_boundary_cpu_exactly_at_limit() {
    let selection = select(resources("1", ""), Resources::default(), resources("1", "")).await;
    assert_eq!(selection, Selection::Accept);
}

#[tokio::test]
async fn test_capacity_gate_is_transient() {
    let total = resources("2", "1Gb");
    let policy = SelectionPolicy::new(JobSelectionPolicy::default());
    let ledger = CapacityLedger::new(total);
    ledger.try_reserve(
        &ShardId {
            job_id: "running".to_string(),
            index: 0,
        },
        resources("1500m", "600Mb"),
    );

    let job = JobSpec::new("candidate", EngineKind::Noop).with_resources(resources("1", "500Mb"));
    let profile = ResourceProfile::new(job.resources, Resources::default(), total);
    let selection = policy
        .select(&CancellationToken::new(), &job, &profile, &ledger.snapshot())
        .await
        .unwrap();
    assert!(matches!(selection, Selection::RejectTransient(_)));
}

#[tokio::test]
async fn test_probe_receives_job_and_system_total() {
    // The probe sees a job sized at exactly half the node in both
    // dimensions and accepts it.
    let captured: Arc<Mutex<Option<ProbeData>>> = Arc::new(Mutex::new(None));
    let state = Arc::clone(&captured);
    let app = Router::new().route(
        "/probe",
        post(move |Json(body): Json<ProbeData>| {
            let state = Arc::clone(&state);
            async move {
                *state.lock() = Some(body);
                StatusCode::OK
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let total = resources("100m", "100Mb");
    let policy = SelectionPolicy::new(
        JobSelectionPolicy::default().with_probe_url(format!("http://{}/probe", addr)),
    );
    let ledger = CapacityLedger::new(total);
    let job = JobSpec::new("half", EngineKind::Noop).with_resources(resources("50m", "50Mb"));
    let profile = ResourceProfile::new(job.resources, Resources::default(), total);

    let selection = policy
        .select(&CancellationToken::new(), &job, &profile, &ledger.snapshot())
        .await
        .unwrap();
    assert_eq!(selection, Selection::Accept);

    let probe = captured.lock().take().expect("probe should have been called");
    assert_eq!(probe.job.id, "half");
    assert_eq!(
        probe.resources.job.cpu_millicores,
        probe.resources.system_total.cpu_millicores / 2,
        "the job cpu was not half the system total"
    );
    assert_eq!(
        probe.resources.job.memory_bytes,
        probe.resources.system_total.memory_bytes / 2,
        "the job memory was not half the system total"
    );
}

#[tokio::test]
async fn test_probe_rejection_is_terminal() {
    let app = Router::new().route(
        "/probe",
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let policy = SelectionPolicy::new(
        JobSelectionPolicy::default().with_probe_url(format!("http://{}/probe", addr)),
    );
    let ledger = CapacityLedger::new(Resources::default());
    let job = JobSpec::new("candidate", EngineKind::Noop);
    let profile = ResourceProfile::new(job.resources, Resources::default(), Resources::default());

    let selection = policy
        .select(&CancellationToken::new(), &job, &profile, &ledger.snapshot())
        .await
        .unwrap();
    assert!(matches!(selection, Selection::RejectTerminal(_)));
}

#[tokio::test]
async fn test_probe_transport_error_rejects() {
    // Nothing listens on this port.
    let policy = SelectionPolicy::new(
        JobSelectionPolicy::default().with_probe_url("http://127.0.0.1:9/probe".to_string()),
    );
    let ledger = CapacityLedger::new(Resources::default());
    let job = JobSpec::new("candidate", EngineKind::Noop);
    let profile = ResourceProfile::new(job.resources, Resources::default(), Resources::default());

    let selection = policy
        .select(&CancellationToken::new(), &job, &profile, &ledger.snapshot())
        .await
        .unwrap();
    assert!(matches!(selection, Selection::RejectTerminal(_)));
}
