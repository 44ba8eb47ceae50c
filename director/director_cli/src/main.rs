use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use director_catalog::CatalogEntry;
use director_grammar::build_grammar;
use director_router::{
    decode_response, ActorRef, CommandRouter, DirectorConfig, StaticInference, TracingConsole,
};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "director", version, about = "Routes free-text directives to actions")]
struct Cli {
    /// Router configuration file. Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs one directive end to end and prints the report.
    Route(RouteArgs),
    /// Prints the ranked candidates of both catalogs.
    Retrieve {
        /// Directive text.
        text: String,
    },
    /// Prints the grammar a directive would be constrained by.
    Grammar {
        /// Directive text.
        text: String,
    },
    /// Decodes a planner response and prints the action.
    Decode {
        /// Response text. Read from `--file` when omitted.
        response: Option<String>,
        /// File holding the response text.
        #[arg(long, conflicts_with = "response")]
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Directive text.
    text: String,
    /// Actor the directive is issued for.
    #[arg(long, default_value = "operator")]
    instigator: String,
    /// Planner response to use instead of the configured runner.
    #[arg(long)]
    response: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DirectorConfig::load(path)?,
        None => DirectorConfig::default(),
    };

    match cli.command {
        Commands::Route(args) => handle_route(&config, args).await,
        Commands::Retrieve { text } => {
            let router = config.router_builder()?.build();
            let (console, world) = router.retrieve(&text);
            let render = |name: &str, score: f32| json!({ "name": name, "score": score });
            print_json(&json!({
                "console": console.iter().map(|c| render(c.name(), c.score)).collect::<Vec<_>>(),
                "world": world.iter().map(|c| render(c.name(), c.score)).collect::<Vec<_>>(),
            }))
        }
        Commands::Grammar { text } => {
            let router = config.router_builder()?.build();
            let (console, world) = router.retrieve(&text);
            let intents: Vec<&str> = world.iter().map(|c| c.name()).collect();
            let commands: Vec<&str> = console.iter().map(|c| c.name()).collect();
            print!("{}", build_grammar(&intents, &commands));
            Ok(())
        }
        Commands::Decode { response, file } => {
            let text = match (response, file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("reading response {}", path.display()))?,
                (None, None) => bail!("pass a response or --file"),
            };
            let action = decode_response(&text)?;
            print_json(&serde_json::to_value(&action)?)
        }
    }
}

async fn handle_route(config: &DirectorConfig, args: RouteArgs) -> Result<()> {
    let mut builder = config
        .router_builder()?
        .console_executor(Arc::new(TracingConsole));
    if let Some(response) = args.response {
        builder = builder.inference(Arc::new(StaticInference::new(response)));
    }
    let router: CommandRouter = builder.build();

    // Every catalogued intent gets a handler that reports the command.
    for entry in router.world_catalog().snapshot().iter() {
        router.register_action(entry.key(), |command, instigator| {
            info!(
                intent = %command.intent,
                target = command.target.as_deref().unwrap_or(""),
                instigator = %instigator,
                "command dispatched"
            );
            Ok(())
        });
    }

    let Some(report) = router
        .route_and_wait(&args.text, ActorRef::new(args.instigator))
        .await
    else {
        bail!("directive was not routed: configure [inference].program or pass --response");
    };
    print_json(&serde_json::to_value(&report)?)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
