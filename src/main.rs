use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use shuttle_vpn::config::{Config, LOCAL_CONFIG_FILE};
use shuttle_vpn::probe::{ProbeResult, Prober};
use shuttle_vpn::sshuttle::{StartOutcome, StatusReport, StopOutcome, TunnelController, TunnelState};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "shuttle-vpn")]
#[command(about = "Route a fixed set of hosts over SSH with sshuttle")]
#[command(version)]
#[command(disable_help_subcommand = true, disable_help_flag = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./shuttle-vpn.toml, then ~/.shuttle-vpn/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

// Every command is also accepted as `--<name>`
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Resolve configured hosts and tunnel their addresses
    #[command(long_flag = "start")]
    Start,
    /// Tunnel all traffic
    #[command(long_flag = "start-all")]
    StartAll,
    /// Stop the running tunnel
    #[command(long_flag = "stop")]
    Stop,
    /// Stop, then start
    #[command(long_flag = "restart")]
    Restart,
    /// Show whether the tunnel is running and which addresses it routes
    #[command(long_flag = "status")]
    Status,
    /// Delete the persisted address list
    #[command(long_flag = "cleanup")]
    Cleanup,
    /// Check that a host answers over HTTP(S)
    #[command(long_flag = "test")]
    Test {
        /// Hostname or URL
        host: String,
    },
    /// Check every configured host
    #[command(long_flag = "testall")]
    Testall,
    /// Generate default config file
    #[command(long_flag = "init")]
    Init,
    /// Show usage
    #[command(long_flag = "help")]
    Help,
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayVersion => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    }
}

/// Exit status for invocations that only print usage
fn usage_exit_code(command: Option<&Commands>) -> Option<i32> {
    match command {
        None | Some(Commands::Help) => Some(1),
        Some(_) => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_cli();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(code) = usage_exit_code(cli.command.as_ref()) {
        let _ = Cli::command().print_help();
        std::process::exit(code);
    }
    let Some(command) = cli.command else {
        unreachable!("usage_exit_code covers a missing command")
    };

    if command == Commands::Init {
        let path = PathBuf::from(LOCAL_CONFIG_FILE);
        if path.exists() {
            error!("{} already exists, not overwriting", path.display());
            std::process::exit(1);
        }
        Config::default().save(&path)?;
        println!("Created default config: {}", path.display());
        return Ok(());
    }

    let config = Config::discover(cli.config.as_deref())?;

    match run(command, config).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Returns Ok(false) when the command ran but found a problem
async fn run(command: Commands, config: Config) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Commands::Test { ref host } => {
            let prober = Prober::new(Duration::from_secs(config.probe.timeout_secs))?;
            let result = prober.probe(host).await;
            print_probe(&result);
            return Ok(result.reachability.is_reachable());
        }
        Commands::Testall => {
            let prober = Prober::new(Duration::from_secs(config.probe.timeout_secs))?;
            let results = prober.probe_all(&config.hosts).await;
            for result in &results {
                print_probe(result);
            }
            return Ok(results.iter().all(|r| r.reachability.is_reachable()));
        }
        _ => {}
    }

    let controller = TunnelController::new(config)?;
    match command {
        Commands::Start => {
            info!("Starting tunnel...");
            print_start(&controller.start().await?);
        }
        Commands::StartAll => {
            info!("Starting full tunnel...");
            print_start(&controller.start_all().await?);
        }
        Commands::Stop => {
            info!("Stopping tunnel...");
            print_stop(&controller.stop().await?);
        }
        Commands::Restart => {
            info!("Restarting tunnel...");
            print_start(&controller.restart().await?);
        }
        Commands::Status => print_status(&controller.status()?),
        Commands::Cleanup => {
            if controller.cleanup()? {
                println!("Removed {}", controller.config().paths.ip_file.display());
            } else {
                println!("Nothing to clean up");
            }
        }
        Commands::Test { .. } | Commands::Testall | Commands::Init | Commands::Help => {
            unreachable!("handled before the controller is built")
        }
    }
    Ok(true)
}

fn print_start(outcome: &StartOutcome) {
    match outcome {
        StartOutcome::Started { targets, added } => {
            println!("Tunnel started: {} addresses", targets.len());
            for ip in targets {
                let marker = if added.contains(ip) { " (new)" } else { "" };
                println!("  {}{}", ip, marker);
            }
        }
        StartOutcome::StartedAll => println!("Tunnel started: all traffic"),
        StartOutcome::AlreadyRunning { pid } => {
            println!("Tunnel already running (pid {})", pid)
        }
    }
}

fn print_stop(outcome: &StopOutcome) {
    match outcome {
        StopOutcome::Stopped { pid } => println!("Tunnel stopped (pid {})", pid),
        StopOutcome::StaleRemoved { pid: Some(pid) } => {
            println!("Tunnel was not running; removed stale PID file (pid {})", pid)
        }
        StopOutcome::StaleRemoved { pid: None } => {
            println!("Tunnel was not running; removed unreadable PID file")
        }
        StopOutcome::NotRunning => println!("Tunnel is not running"),
    }
}

fn print_status(report: &StatusReport) {
    match report.state {
        TunnelState::Running { pid } => println!("Tunnel Status: Running (pid {})", pid),
        TunnelState::Stale { pid } => println!(
            "Tunnel Status: Not running (stale PID file, pid {})",
            pid.map_or_else(|| "?".to_string(), |p| p.to_string())
        ),
        TunnelState::Stopped => println!("Tunnel Status: Not running"),
    }
    println!("  Remote: {}", report.remote);
    println!("  PID file: {}", report.pid_file.display());
    println!("  Addresses: {} ({})", report.ips.len(), report.ip_file.display());
    for ip in &report.ips {
        println!("    {}", ip);
    }
}

fn print_probe(result: &ProbeResult) {
    let mark = if result.reachability.is_reachable() {
        "OK"
    } else {
        "FAIL"
    };
    println!("[{}] {} ({}): {}", mark, result.host, result.url, result.reachability);
}
