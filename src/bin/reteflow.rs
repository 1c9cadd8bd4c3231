//! reteflow CLI: inspect and run eddy-routed networks locally.
//!
//! Usage:
//!   reteflow schema --config network.yaml
//!   reteflow route --config network.yaml --input facts.jsonl
//!   reteflow queue drain --queue conflict-set [--db path]

use clap::{Parser, Subcommand};
use reteflow::runtime::{DEFAULT_STREAM, INGEST};
use reteflow::{
    BroadcastRouter, ChannelId, CollectorSink, ConflictSetNode, Fact, FactFields, FilterNode, LocalCluster,
    MatchCondition, NetworkConfig, Node, QueueSink, RouterNode, RoutingPolicy, Sink, SinkConfig, SqliteQueue,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

/// Component id of the terminal node in networks built by `route`
const CONFLICT_SET: &str = "conflict-set";

#[derive(Parser)]
#[command(
    name = "reteflow",
    version,
    about = "Adaptive eddy routing for streaming Rete networks"
)]
struct Cli {
    /// Log level written to stderr (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the output channels each router declares
    Schema {
        /// Network configuration (YAML)
        #[arg(long)]
        config: PathBuf,
    },
    /// Run JSON-lines facts through the network on a local cluster
    Route {
        /// Network configuration (YAML)
        #[arg(long)]
        config: PathBuf,
        /// One fact per line; `-` reads stdin
        #[arg(long, default_value = "-")]
        input: PathBuf,
    },
    /// Inspect a durable queue database
    Queue {
        #[command(subcommand)]
        action: QueueAction,
        /// Path to SQLite queue database
        #[arg(long, global = true)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Pop and print every message on a queue
    Drain {
        /// Queue name
        #[arg(long)]
        queue: String,
    },
}

/// Get the default queue database path (~/.local/share/reteflow/queue.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let reteflow_dir = data_dir.join("reteflow");
    std::fs::create_dir_all(&reteflow_dir).ok();
    reteflow_dir.join("queue.db")
}

fn load_config(path: &PathBuf) -> Result<NetworkConfig, String> {
    NetworkConfig::load(path).map_err(|e| format!("cannot load '{}': {}", path.display(), e))
}

fn cmd_schema(config: &PathBuf) -> i32 {
    let network = match load_config(config) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let mut declared = BTreeMap::new();
    for router in &network.routers {
        match router.policy.build(router.eddies.clone()) {
            Ok(policy) => {
                declared.insert(router.id.to_string(), policy.declare_outputs().field_names());
            }
            Err(e) => {
                eprintln!("Error: router '{}': {}", router.id, e);
                return 1;
            }
        }
    }
    match serde_yaml::to_string(&declared) {
        Ok(text) => {
            print!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Where `route` sends derived facts, kept so results can be reported.
enum Terminal {
    Collector(Arc<CollectorSink>),
    Queue(String),
}

fn build_sink(config: &SinkConfig) -> (Arc<dyn Sink>, Terminal) {
    match config {
        SinkConfig::Collector => {
            let sink = Arc::new(CollectorSink::new(CONFLICT_SET));
            (sink.clone(), Terminal::Collector(sink))
        }
        SinkConfig::Queue { servers, queue } => {
            let sink = QueueSink::new(SqliteQueue::new(), servers.clone(), queue.clone());
            (Arc::new(sink), Terminal::Queue(queue.clone()))
        }
    }
}

/// ingest -> routers -> eddies -> conflict set -> sink
///
/// Eddies that are not routers themselves pass every fact straight on to
/// the conflict set. A router that is another router's eddy is fed by its
/// parent only, never by ingest.
fn build_cluster(network: &NetworkConfig, sink: Arc<dyn Sink>) -> Result<LocalCluster, String> {
    let mut cluster = LocalCluster::new();
    let router_ids: BTreeSet<&ChannelId> = network.routers.iter().map(|r| &r.id).collect();
    let nested: BTreeSet<&ChannelId> = network.routers.iter().flat_map(|r| &r.eddies).collect();
    let mut eddy_feeds: BTreeMap<ChannelId, Vec<ChannelId>> = BTreeMap::new();

    for router in &network.routers {
        let mut instances: Vec<Box<dyn Node>> = Vec::with_capacity(router.parallelism);
        for _ in 0..router.parallelism {
            let policy = router.policy.build(router.eddies.clone()).map_err(|e| e.to_string())?;
            instances.push(Box::new(RouterNode::new(router.id.clone(), policy)));
        }
        let node_config = router.node_config().map_err(|e| e.to_string())?;
        cluster.add_node(node_config, instances).map_err(|e| e.to_string())?;
        if !nested.contains(&router.id) {
            cluster.subscribe(router.id.clone(), INGEST, DEFAULT_STREAM);
        }
        for eddy in &router.eddies {
            eddy_feeds.entry(eddy.clone()).or_default().push(router.id.clone());
        }
    }

    let pass_through: Arc<dyn MatchCondition> = Arc::new(|fact: &Fact| Some(fact.graph_fragment().clone()));
    for (eddy, feeders) in &eddy_feeds {
        if !router_ids.contains(eddy) {
            let policy = BroadcastRouter::new(vec![ChannelId::from(CONFLICT_SET)]).map_err(|e| e.to_string())?;
            let filter: Box<dyn Node> = Box::new(FilterNode::new(eddy.clone(), pass_through.clone(), Arc::new(policy)));
            cluster.add_node(serde_json::Value::Null, vec![filter]).map_err(|e| e.to_string())?;
            cluster.subscribe(CONFLICT_SET, eddy.clone(), CONFLICT_SET);
        }
        for router in feeders {
            cluster.subscribe(eddy.clone(), router.clone(), eddy.clone());
        }
    }

    let conflict_set: Box<dyn Node> = Box::new(ConflictSetNode::new(CONFLICT_SET, sink));
    let retry = network.conflict_set_config().map_err(|e| e.to_string())?;
    cluster.add_node(retry, vec![conflict_set]).map_err(|e| e.to_string())?;
    Ok(cluster)
}

fn read_facts(input: &PathBuf) -> Result<Vec<FactFields>, String> {
    let reader: Box<dyn BufRead> = if input.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(input).map_err(|e| format!("cannot open '{}': {}", input.display(), e))?;
        Box::new(BufReader::new(file))
    };
    let mut facts = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = serde_json::from_str(&line).map_err(|e| format!("line {}: {}", n + 1, e))?;
        facts.push(fields);
    }
    Ok(facts)
}

async fn cmd_route(config: &PathBuf, input: &PathBuf) -> i32 {
    let result = async {
        let network = load_config(config)?;
        let facts = read_facts(input)?;
        let (sink, terminal) = build_sink(&network.sink);
        let running = build_cluster(&network, sink)?.start().map_err(|e| e.to_string())?;

        for fields in &facts {
            running.submit(fields.to_values()).map_err(|e| e.to_string())?;
        }
        running.wait_idle().await;
        let report = running.shutdown().await;
        info!(?report, "route finished");
        Ok::<_, String>((terminal, report))
    }
    .await;

    let (terminal, report) = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match terminal {
        Terminal::Collector(sink) => {
            for fact in sink.take() {
                match serde_json::to_string(&fact) {
                    Ok(line) => println!("{}", line),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return 1;
                    }
                }
            }
        }
        Terminal::Queue(queue) => eprintln!("Derived facts published to queue '{}'", queue),
    }
    eprintln!(
        "submitted {}, completed {}, failed {} (acks {}, fails {})",
        report.submitted, report.completed, report.failed, report.acks, report.fails
    );
    if report.failed > 0 {
        2
    } else {
        0
    }
}

fn cmd_queue_drain(db: Option<PathBuf>, queue: &str) -> i32 {
    let db_path = db.unwrap_or_else(default_db_path);
    let store = match SqliteQueue::open(&db_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to open queue database: {}", e);
            return 1;
        }
    };
    match store.drain(queue) {
        Ok(messages) => {
            for payload in messages {
                println!("{}", String::from_utf8_lossy(&payload));
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    let code = match cli.command {
        Commands::Schema { config } => cmd_schema(&config),
        Commands::Route { config, input } => cmd_route(&config, &input).await,
        Commands::Queue { action, db } => match action {
            QueueAction::Drain { queue } => cmd_queue_drain(db, &queue),
        },
    };
    std::process::exit(code);
}
