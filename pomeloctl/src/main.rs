use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use pomelo_ipc::{
    read_message, socket_path, write_message, Command, ExportFormat, HistoryEntry, IpcError,
    Response, SessionStatus,
};
use tokio::io::BufReader;
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "pomeloctl")]
#[command(about = "Control a running Pomelo timer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the countdown
    Start,
    /// Pause the countdown
    Pause,
    /// Start when paused, pause when running
    Toggle,
    /// Back to the first work session
    Reset,
    /// Show the current phase and remaining time
    Status,
    /// Name the current work session
    Label { name: String },
    /// Set all four durations in minutes (queued until reset while running)
    Configure {
        #[arg(long)]
        work: u64,
        #[arg(long)]
        short_break: u64,
        #[arg(long)]
        long_break: u64,
        /// Work sessions before a long break
        #[arg(long)]
        cycle: u32,
    },
    /// List recorded work sessions, newest first
    History {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print the whole history as CSV or JSON
    Export {
        #[arg(value_enum, default_value_t = Format::Csv)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => ExportFormat::Csv,
            Format::Json => ExportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = to_command(cli.command);

    match send_command(command).await? {
        Response::Ok => println!("OK"),
        Response::Status(status) => print_status(&status),
        Response::History(entries) => print_history(&entries),
        Response::Export(content) => print!("{}", content),
        Response::Error(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn to_command(command: Commands) -> Command {
    match command {
        Commands::Start => Command::Start,
        Commands::Pause => Command::Pause,
        Commands::Toggle => Command::Toggle,
        Commands::Reset => Command::Reset,
        Commands::Status => Command::Status,
        Commands::Label { name } => Command::SetLabel { name },
        Commands::Configure {
            work,
            short_break,
            long_break,
            cycle,
        } => Command::Configure {
            work,
            short_break,
            long_break,
            sessions_until_long_break: cycle,
        },
        Commands::History { limit } => Command::History { limit },
        Commands::Export { format } => Command::Export {
            format: format.into(),
        },
    }
}

async fn send_command(cmd: Command) -> Result<Response, IpcError> {
    let stream = UnixStream::connect(socket_path())
        .await
        .map_err(|_| IpcError::ConnectionRefused)?;
    let (reader, mut writer) = stream.into_split();
    write_message(&mut writer, &cmd).await?;
    read_message(&mut BufReader::new(reader)).await
}

fn print_status(status: &SessionStatus) {
    println!("Phase:     {}", status.phase.title());
    println!("State:     {}", status.state.as_str());
    println!("Label:     {}", status.label);
    println!(
        "Remaining: {:02}:{:02} of {:02}:{:02}",
        status.remaining / 60,
        status.remaining % 60,
        status.total / 60,
        status.total % 60
    );
    println!(
        "Session:   #{} ({} completed)",
        status.work_ordinal, status.completed_work_sessions
    );
}

fn print_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No sessions recorded yet.");
        return;
    }
    for entry in entries {
        println!(
            "{}  {:>3}m / {:>3}m  {}",
            entry.start_time.format("%Y-%m-%d %H:%M"),
            (entry.actual + 30) / 60,
            (entry.planned + 30) / 60,
            entry.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Commands, clap::Error> {
        Cli::try_parse_from(args).map(|cli| cli.command)
    }

    #[test]
    fn configure_needs_every_duration() {
        assert!(parse(&["pomeloctl", "configure", "--work", "50"]).is_err());

        let command = parse(&[
            "pomeloctl",
            "configure",
            "--work",
            "50",
            "--short-break",
            "10",
            "--long-break",
            "30",
            "--cycle",
            "2",
        ])
        .unwrap();
        assert_eq!(
            to_command(command),
            Command::Configure {
                work: 50,
                short_break: 10,
                long_break: 30,
                sessions_until_long_break: 2,
            }
        );
    }

    #[test]
    fn export_defaults_to_csv() {
        let command = parse(&["pomeloctl", "export"]).unwrap();
        assert_eq!(
            to_command(command),
            Command::Export {
                format: ExportFormat::Csv
            }
        );
    }
}
