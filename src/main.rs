//! Gridhold
//!
//! `server` runs the world server, `client` attaches an interactive
//! line client for one identity, `generate` writes a starter world file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use gridhold::{
    config::{ServerConfig, DEFAULT_BIND},
    network::{
        launch,
        protocol::{
            CloseRequest, MeleeAttackRequest, MoveRequest, OpenRequest, RangeAttackRequest,
            ViewRequest,
        },
        DeliveryPolicy, GameClient, Request, Response,
    },
    world::{generation::starter_world, Direction, World},
    VERSION,
};

/// How long to wait for the worker to drain after shutdown.
const WORKER_DRAIN: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "gridhold", version, about = "Authoritative grid world server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the world server.
    Server(ServerArgs),
    /// Connect an interactive client for one identity.
    Client(ClientArgs),
    /// Write a starter world file.
    Generate(GenerateArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// Listen address [env: GRIDHOLD_BIND]
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// World file [env: GRIDHOLD_WORLD]
    #[arg(long)]
    world: Option<PathBuf>,
    /// Inactivity window in seconds [env: GRIDHOLD_IDLE_TIMEOUT_SECS]
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
    /// synchronous, buffered or buffered:<n> [env: GRIDHOLD_DELIVERY]
    #[arg(long)]
    delivery: Option<DeliveryPolicy>,
    /// Connection limit [env: GRIDHOLD_MAX_CONNECTIONS]
    #[arg(long)]
    max_connections: Option<usize>,
    /// Open/Close cooldown in seconds [env: GRIDHOLD_ACTION_COOLDOWN_SECS]
    #[arg(long)]
    action_cooldown_secs: Option<u64>,
    /// Dice seed [env: GRIDHOLD_SEED]
    #[arg(long)]
    seed: Option<u64>,
}

impl ServerArgs {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(v) = self.bind {
            config.bind_addr = v;
        }
        if let Some(v) = self.world {
            config.world_path = v;
        }
        if let Some(v) = self.idle_timeout_secs {
            config.idle_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.delivery {
            config.delivery = v;
        }
        if let Some(v) = self.max_connections {
            config.max_connections = v;
        }
        if let Some(v) = self.action_cooldown_secs {
            config.action_cooldown_secs = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config
    }
}

#[derive(Args)]
struct ClientArgs {
    /// Entity identifier to act and subscribe as.
    id: Uuid,
    /// Server address.
    #[arg(long, default_value_t = DEFAULT_BIND)]
    addr: SocketAddr,
}

#[derive(Args)]
struct GenerateArgs {
    /// Output file.
    path: PathBuf,
    /// Interior cells per side of the room.
    #[arg(long, default_value_t = 8)]
    size: u32,
    /// Player identifier to place; repeatable. One is generated if none are given.
    #[arg(long = "player")]
    players: Vec<Uuid>,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
        Command::Generate(args) => generate(args),
    }
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = args.apply(ServerConfig::from_env()?);
    info!("Gridhold Server v{}", VERSION);
    info!(
        world = %config.world_path.display(),
        delivery = %config.delivery,
        idle_secs = config.idle_timeout.as_secs(),
        "Configuration loaded"
    );

    let world = World::load(&config.world_path)
        .with_context(|| format!("loading world from {}", config.world_path.display()))?;

    let (server, worker) = launch(config, world).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            server.shutdown();
        }
    }
    drop(server);

    match tokio::time::timeout(WORKER_DRAIN, worker).await {
        Ok(Ok(world)) => info!(
            entities = world.entities.len(),
            state_hash = %hex::encode(world.state_hash()),
            entities_hash = %hex::encode(world.entities_hash()),
            "Final world"
        ),
        Ok(Err(e)) => warn!("World worker failed: {}", e),
        Err(_) => warn!("World worker still busy, exiting"),
    }

    Ok(())
}

const CLIENT_HELP: &str = "\
commands:
  n | e | s | w         step north, east, south or west
  view                  look around
  open <id>             open a door
  close <id>            close a door
  melee <id>            melee attack
  range <id>            range attack
  quit";

fn parse_command(line: &str, me: Uuid) -> anyhow::Result<Option<Request>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let mut target = || -> anyhow::Result<Uuid> {
        let raw = words.next().context("missing target id")?;
        raw.parse().with_context(|| format!("bad target id {raw:?}"))
    };

    let step = |direction| Request::Move(MoveRequest { actor_id: me, direction });

    let request = match verb {
        "n" | "north" => step(Direction::North),
        "e" | "east" => step(Direction::East),
        "s" | "south" => step(Direction::South),
        "w" | "west" => step(Direction::West),
        "view" | "v" => Request::View(ViewRequest { actor_id: me }),
        "open" => Request::Open(OpenRequest { actor_id: me, target_id: target()? }),
        "close" => Request::Close(CloseRequest { actor_id: me, target_id: target()? }),
        "melee" => Request::MeleeAttack(MeleeAttackRequest { attacker_id: me, target_id: target()? }),
        "range" => Request::RangeAttack(RangeAttackRequest { attacker_id: me, target_id: target()? }),
        "quit" | "q" => return Ok(None),
        other => bail!("unknown command {other:?}"),
    };
    Ok(Some(request))
}

fn describe(response: &Response) -> String {
    match response {
        Response::MeleeAttack(r) | Response::RangeAttack(r) if r.did_hit => format!(
            "{} hit {} for {}, {} health left",
            r.attacker_id, r.target_id, r.damage, r.health_remaining
        ),
        Response::MeleeAttack(r) | Response::RangeAttack(r) => {
            format!("{} missed {}", r.attacker_id, r.target_id)
        }
        Response::Toggle(r) => format!(
            "{} {} {}",
            r.actor_id,
            if r.is_open { "opened" } else { "closed" },
            r.target_id
        ),
        Response::Move(r) => format!("{} moved to ({}, {})", r.actor_id, r.x, r.y),
        Response::View(r) => {
            let mut out = format!("{} sees {} entities", r.actor_id, r.objects.len());
            for entity in &r.objects {
                out.push_str(&format!("\n  {entity}"));
            }
            out
        }
        Response::Wrapper(children) => children.iter().map(describe).collect::<Vec<_>>().join("\n"),
    }
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let mut client = GameClient::connect(args.addr, args.id)
        .await
        .with_context(|| format!("connecting to {}", args.addr))?;
    println!("connected as {}\n{}", client.id, CLIENT_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line, client.id) {
                    Ok(Some(request)) => client.producer.send(&request).await?,
                    Ok(None) => break,
                    Err(e) => println!("{e:#}\n{CLIENT_HELP}"),
                }
            }
            response = client.subscriber.next_response() => {
                let response = response?;
                println!("{}", describe(&response));
                println!(
                    "[local world: {} entities, entities hash {}]",
                    client.world().entities.len(),
                    hex::encode(&client.world().entities_hash()[..4])
                );
            }
            rejection = client.producer.next_rejection() => {
                let rejection = rejection?;
                println!("rejected ({:?}): {}", rejection.reason, rejection.message);
            }
        }
    }

    Ok(())
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        bail!("{} exists; pass --force to overwrite", args.path.display());
    }

    let players = if args.players.is_empty() {
        vec![Uuid::new_v4()]
    } else {
        args.players
    };

    let world = starter_world(args.size, &players)?;
    world
        .save(&args.path)
        .with_context(|| format!("writing {}", args.path.display()))?;

    info!(
        path = %args.path.display(),
        entities = world.entities.len(),
        "World written"
    );
    for id in &players {
        println!("player {id}");
    }
    Ok(())
}
