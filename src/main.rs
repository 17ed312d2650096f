use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use devsite_launcher::{
    default_config_path, load_config, CreationState, Instance, Launcher, Result, StructureKind,
};

#[derive(Parser)]
#[command(name = "devsite-launcher", version, about = "Manage local CMS development sites")]
struct Cli {
    /// Config file (defaults to ~/.devsite_launcher/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and start a new instance
    Create {
        name: String,
        #[arg(long)]
        php: Option<String>,
        #[arg(long)]
        db_engine: Option<String>,
        #[arg(long)]
        db_version: Option<String>,
        #[arg(long, default_value = "nested-public")]
        layout: StructureKind,
        /// Release to download (configured default if omitted)
        #[arg(long)]
        release: Option<String>,
        #[arg(long = "hostname")]
        hostnames: Vec<String>,
    },
    /// List instances with live status
    List,
    /// Show one instance
    Describe { name: String },
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    /// Deregister an instance and remove its directory
    Delete { name: String },
    ImportDb { name: String, file: PathBuf },
    ExportDb { name: String, file: PathBuf },
    /// Show the container tool's version
    ToolVersion,
}

fn print_instance(instance: &Instance, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(instance)?);
        return Ok(());
    }
    println!(
        "{:<24} {:<8} php {:<5} {} {:<6} {}",
        instance.name,
        instance.status.to_string(),
        instance.php_version,
        instance.database.engine,
        instance.database.version,
        instance.primary_url().unwrap_or("-")
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;
    let launcher = Launcher::new(config)?;
    let json = cli.json;

    match cli.command {
        Command::Create {
            name,
            php,
            db_engine,
            db_version,
            layout,
            release,
            hostnames,
        } => {
            let mut request = launcher.request(&name, layout);
            if let Some(php) = php {
                request.php_version = php;
            }
            if let Some(engine) = db_engine {
                request.database.engine = engine;
            }
            if let Some(version) = db_version {
                request.database.version = version;
            }
            request.release = release;
            request.additional_hostnames = hostnames;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, stopping after the current step");
                    on_signal.cancel();
                }
            });

            let mut progress = launcher.subscribe_progress();
            tokio::spawn(async move {
                while let Ok(event) = progress.recv().await {
                    if let CreationState::Running { step } = event.state {
                        log::info!("[{}] {}: {}", event.instance, step, event.message);
                    }
                }
            });

            let instance = launcher.create(&request, &cancel).await?;
            print_instance(&instance, json)
        }
        Command::List => {
            let instances = launcher.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&instances)?);
                return Ok(());
            }
            for instance in &instances {
                print_instance(instance, false)?;
            }
            Ok(())
        }
        Command::Describe { name } => print_instance(&launcher.get(&name).await?, json),
        Command::Start { name } => print_instance(&launcher.start(&name).await?, json),
        Command::Stop { name } => print_instance(&launcher.stop(&name).await?, json),
        Command::Restart { name } => print_instance(&launcher.restart(&name).await?, json),
        Command::Delete { name } => launcher.delete(&name).await,
        Command::ImportDb { name, file } => launcher.import_db(&name, &file).await,
        Command::ExportDb { name, file } => launcher.export_db(&name, &file).await,
        Command::ToolVersion => {
            println!("{}", launcher.tool_version().await?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let json = cli.json;
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                if let Ok(body) = serde_json::to_string(&e) {
                    eprintln!("{body}");
                }
            } else {
                eprintln!("error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}
