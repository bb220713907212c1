use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use minnow::config::{
    NodeConfig, SandboxConfig, StorageDaemonConfig, UploadGatewayConfig,
};
use minnow::error::NodeError;
use minnow::ipfs::IpfsClient;
use minnow::job::{EngineKind, JobSpec, PublisherKind};
use minnow::node::{ComputeNode, SubmitOutcome};
use minnow::publisher::car::CarToolPacker;
use minnow::publisher::estuary::EstuaryPublisher;
use minnow::publisher::ipfs::IpfsPublisher;
use minnow::publisher::pinner::PinningPublisher;
use minnow::publisher::Publisher;
use minnow::resources::Resources;
use minnow::verifier::NoopVerifier;
use minnow::worker::{DockerExecutor, Executor, NoopExecutor, ShardOutcome};

const EXIT_OK: i32 = 0;
const EXIT_GENERIC: i32 = 1;
const EXIT_ADMISSION_DENIED: i32 = 2;
const EXIT_CAPACITY_EXHAUSTED: i32 = 3;
const EXIT_PUBLISH_FAILED: i32 = 4;

#[derive(Parser, Debug)]
#[command(name = "minnow")]
#[command(about = "Submit one job to a local compute node and wait for it")]
struct Args {
    /// Host identifier stamped into published result names
    #[arg(long, default_value = "local")]
    host_id: String,

    /// Total CPU capacity, e.g. "2" or "500m" (empty = unlimited)
    #[arg(long, default_value = "")]
    cpu_limit: String,

    /// Total memory capacity, e.g. "1Gb" (empty = unlimited)
    #[arg(long, default_value = "")]
    memory_limit: String,

    /// Per-job CPU ceiling (empty = no bound)
    #[arg(long, default_value = "")]
    per_job_cpu: String,

    /// Per-job memory ceiling (empty = no bound)
    #[arg(long, default_value = "")]
    per_job_memory: String,

    /// External selection probe URL
    #[arg(long)]
    probe_url: Option<String>,

    /// Job id (defaults to a random uuid)
    #[arg(long)]
    job_id: Option<String>,

    /// Execution engine: "docker" or "noop"
    #[arg(long, default_value = "docker")]
    engine: String,

    /// Container image for the docker engine
    #[arg(long, default_value = "ubuntu:22.04")]
    image: String,

    /// CPU the job declares, e.g. "250m" (empty = unspecified)
    #[arg(long, default_value = "")]
    job_cpu: String,

    /// Memory the job declares, e.g. "100Mb" (empty = unspecified)
    #[arg(long, default_value = "")]
    job_memory: String,

    /// Number of shard executions
    #[arg(long, default_value = "1")]
    concurrency: usize,

    /// Publisher: "ipfs" (primary path) or "estuary" (multi-endpoint
    /// upload, requires --api-key). With "ipfs" and an --api-key, results
    /// are additionally pinned through the gateway.
    #[arg(long, default_value = "ipfs")]
    publisher: String,

    /// Upload gateway API key
    #[arg(long)]
    api_key: Option<String>,

    /// Multiaddress of the storage daemon HTTP API
    #[arg(long, default_value = "/ip4/127.0.0.1/tcp/5001")]
    ipfs_api: String,

    /// Job entrypoint, passed through to the engine
    #[arg(trailing_var_arg = true)]
    entrypoint: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let code = run(args).await;
    std::process::exit(code);
}

async fn run(args: Args) -> i32 {
    let total_limits = match Resources::parse(&args.cpu_limit, &args.memory_limit) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("invalid --cpu-limit/--memory-limit: {}", err);
            return EXIT_GENERIC;
        }
    };
    let per_job_limits = match Resources::parse(&args.per_job_cpu, &args.per_job_memory) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("invalid --per-job-cpu/--per-job-memory: {}", err);
            return EXIT_GENERIC;
        }
    };
    let job_resources = match Resources::parse(&args.job_cpu, &args.job_memory) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("invalid --job-cpu/--job-memory: {}", err);
            return EXIT_GENERIC;
        }
    };

    let engine = match args.engine.as_str() {
        "docker" => EngineKind::Docker,
        "noop" => EngineKind::Noop,
        other => {
            eprintln!("unknown engine {:?}, expected docker or noop", other);
            return EXIT_GENERIC;
        }
    };

    let mut config = NodeConfig {
        host_id: args.host_id.clone(),
        total_limits,
        ..Default::default()
    };
    config.job_selection_policy.per_job_limits = per_job_limits;
    config.job_selection_policy.probe_url = args.probe_url.clone();

    let executor: Arc<dyn Executor> = match engine {
        EngineKind::Docker => Arc::new(DockerExecutor::new(SandboxConfig {
            image: args.image.clone(),
            ..Default::default()
        })),
        EngineKind::Noop => Arc::new(NoopExecutor::new()),
    };

    let car = Arc::new(CarToolPacker::default());
    let daemon = match IpfsClient::new(StorageDaemonConfig {
        api_address: args.ipfs_api.clone(),
        ..Default::default()
    }) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("invalid --ipfs-api: {}", err);
            return EXIT_GENERIC;
        }
    };

    let primary: Arc<dyn Publisher> = Arc::new(IpfsPublisher::new(daemon, Arc::clone(&car) as _));
    let (publisher, publisher_kind): (Arc<dyn Publisher>, PublisherKind) =
        match (args.publisher.as_str(), &args.api_key) {
            ("ipfs", None) => (primary, PublisherKind::Ipfs),
            ("ipfs", Some(api_key)) => {
                let gateway = UploadGatewayConfig::new(api_key.clone());
                (
                    Arc::new(PinningPublisher::new(primary, gateway)) as _,
                    PublisherKind::Ipfs,
                )
            }
            ("estuary", Some(api_key)) => {
                let gateway = UploadGatewayConfig::new(api_key.clone());
                match EstuaryPublisher::new(gateway, Arc::clone(&car) as _) {
                    Ok(estuary) => (Arc::new(estuary) as _, PublisherKind::Estuary),
                    Err(err) => {
                        eprintln!("invalid upload gateway config: {}", err);
                        return EXIT_GENERIC;
                    }
                }
            }
            ("estuary", None) => {
                eprintln!("--publisher estuary requires --api-key");
                return EXIT_GENERIC;
            }
            (other, _) => {
                eprintln!("unknown publisher {:?}, expected ipfs or estuary", other);
                return EXIT_GENERIC;
            }
        };

    let ctx = CancellationToken::new();
    let node = ComputeNode::new(
        config,
        executor,
        Arc::new(NoopVerifier),
        publisher,
        ctx.clone(),
    );
    node.start();

    let job_id = args
        .job_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let job = JobSpec {
        publisher: publisher_kind,
        ..JobSpec::new(job_id, engine)
    }
    .with_resources(job_resources)
    .with_entrypoint(args.entrypoint.clone())
    .with_concurrency(args.concurrency);
    let total_shards = job.total_shards();

    let mut reports = node.subscribe();
    let outcome = match node.submit(job).await {
        Ok(outcome) => outcome,
        Err(NodeError::AlreadyReserved(shard)) => {
            eprintln!("job already reserved: {}", shard);
            return EXIT_ADMISSION_DENIED;
        }
        Err(err) => {
            eprintln!("submit failed: {}", err);
            return EXIT_GENERIC;
        }
    };

    match outcome {
        SubmitOutcome::Rejected(reason) => {
            eprintln!("admission denied: {}", reason);
            return EXIT_ADMISSION_DENIED;
        }
        SubmitOutcome::Queued => {
            eprintln!("no capacity available, bid queued");
            return EXIT_CAPACITY_EXHAUSTED;
        }
        SubmitOutcome::Admitted => {}
    }

    let mut code = EXIT_OK;
    let mut seen = 0;
    while seen < total_shards {
        let report = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                node.shutdown().await;
                return EXIT_GENERIC;
            }
            report = reports.recv() => report,
        };
        match report {
            Ok(report) => {
                seen += 1;
                match report.outcome {
                    ShardOutcome::Published(spec) => {
                        println!("{} published cid={} name={}", report.shard, spec.cid, spec.name);
                    }
                    ShardOutcome::Failed {
                        stage,
                        kind,
                        reason,
                    } => {
                        eprintln!("{} failed at {}: {}", report.shard, stage, reason);
                        code = if kind == "AllEndpointsFailed" {
                            EXIT_PUBLISH_FAILED
                        } else {
                            EXIT_GENERIC
                        };
                    }
                }
            }
            Err(_) => break,
        }
    }

    node.shutdown().await;
    code
}
