use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use netmon::events::{Event, EventKind, Timestamp};
use netmon::monitoring::{
    merge_streams, rank_connections, write_json_lines, Connection, EventStore, RankKey, ServicePorts,
    SortOrder,
};
use shared::ConnectionSummary;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "netmon-cli")]
#[command(about = "Offline analysis of network event logs", long_about = None)]
struct Cli {
    /// Log diagnostics (skipped records etc.) at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file providing the HTTP/HTTPS ports
    #[arg(long, global = true, default_value = netmon::config::settings::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the TCP connections of an address
    Connections {
        #[arg(short, long)]
        input: PathBuf,

        /// Address whose connections are reconstructed
        #[arg(short, long)]
        focus: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the payload timeline of one connection
    Detail {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        focus: String,

        /// Position in the `connections` listing
        #[arg(short = 'n', long)]
        index: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show DNS clients, addresses, hostnames and web servers
    Indices {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Rank closed connections
    Rank {
        #[arg(short, long)]
        input: PathBuf,

        /// duration, transferred-client, transferred-server or transferred
        #[arg(short, long, default_value = "duration")]
        by: RankKey,

        #[arg(short, long)]
        descending: bool,

        /// Show only the first N entries
        #[arg(short, long)]
        last: Option<usize>,
    },

    /// Merge time-ordered event files into one JSON Lines file
    Merge {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Print events in human-readable form
    Events {
        #[arg(short, long)]
        input: PathBuf,

        /// Only events with this tag (e.g. tcp-data, dns-query)
        #[arg(short, long)]
        r#type: Option<String>,
    },

    /// Convert between timestamp strings and microseconds since the epoch
    Time {
        #[arg(long, conflicts_with = "from_micros", required_unless_present = "from_micros")]
        to_micros: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        from_micros: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    TermLogger::init(level, simplelog::Config::default(), TerminalMode::Stderr, ColorChoice::Auto)?;

    let ports = netmon::config::load_config_from(&cli.config).service_ports();

    match cli.command {
        Commands::Connections { input, focus, json } => show_connections(&input, &focus, json, ports)?,
        Commands::Detail {
            input,
            focus,
            index,
            json,
        } => show_detail(&input, &focus, index, json, ports)?,
        Commands::Indices { input, json } => show_indices(&input, json, ports)?,
        Commands::Rank {
            input,
            by,
            descending,
            last,
        } => show_ranking(&input, by, descending, last, ports)?,
        Commands::Merge { output, inputs } => merge_files(&output, &inputs)?,
        Commands::Events { input, r#type } => show_events(&input, r#type.as_deref(), ports)?,
        Commands::Time {
            to_micros,
            from_micros,
        } => convert_time(to_micros.as_deref(), from_micros)?,
    }

    Ok(())
}

fn open_store(input: &Path, ports: ServicePorts) -> Result<EventStore> {
    let store = EventStore::open(input, ports)
        .with_context(|| format!("failed to load events from {}", input.display()))?;

    let report = store.report();
    if report.skipped > 0 {
        eprintln!(
            "{} {} malformed record(s) skipped",
            "warning:".yellow().bold(),
            report.skipped
        );
    }
    Ok(store)
}

fn print_banner(title: &str, subtitle: &str) {
    println!("\n{}", "═══════════════════════════════════════════════════════".cyan());
    println!("{} {}", title.bright_cyan().bold(), subtitle.white());
    println!("{}\n", "═══════════════════════════════════════════════════════".cyan());
}

fn endpoint_label(ip: &str, hostname: Option<&str>) -> String {
    match hostname {
        Some(host) => format!("{} ({})", ip, host),
        None => ip.to_string(),
    }
}

fn show_connections(input: &Path, focus: &str, json: bool, ports: ServicePorts) -> Result<()> {
    let store = open_store(input, ports)?;
    let connections = store.reconstruct(focus);
    let summaries: Vec<ConnectionSummary> = connections.iter().map(Connection::summary).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    print_banner("Connections", focus);

    if summaries.is_empty() {
        println!("{}", "No connections for this address.".yellow());
        return Ok(());
    }

    for (i, conn) in summaries.iter().enumerate() {
        print_connection(i, conn);
    }

    Ok(())
}

fn print_connection(index: usize, conn: &ConnectionSummary) {
    let state = match &conn.end {
        Some(end) => format!("closed {}", end).green(),
        None => "never closed".yellow(),
    };

    println!(
        "[{}] {} {}:{} -> {}:{}  {}",
        index.to_string().bright_white().bold(),
        conn.begin.bright_black(),
        endpoint_label(&conn.client_ip, conn.client_hostname.as_deref()),
        conn.client_port,
        endpoint_label(&conn.server_ip, conn.server_hostname.as_deref()),
        conn.server_port,
        state
    );
    println!("  {} {}", "Last packet:".bright_blue(), conn.time_last_packet);
    println!(
        "  {} client {} / server {} ({} events)",
        "Payload:".bright_blue(),
        conn.client_payload,
        conn.server_payload,
        conn.payload_events
    );
    println!(
        "  {} client {} / server {}",
        "Transferred:".bright_blue(),
        conn.transferred_client,
        conn.transferred_server
    );
    println!();
}

fn show_detail(input: &Path, focus: &str, index: usize, json: bool, ports: ServicePorts) -> Result<()> {
    let store = open_store(input, ports)?;
    let connections = store.reconstruct(focus);
    let count = connections.len();
    let conn = connections
        .get(index)
        .ok_or_else(|| anyhow!("no connection #{} for {} ({} connections)", index, focus, count))?;

    let rows = conn.payload_rows();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    print_banner("Connection", &format!("#{} of {}", index, focus));
    print_connection(index, &conn.summary());

    if rows.is_empty() {
        println!("{}", "No payload events.".yellow());
        return Ok(());
    }

    for row in rows {
        let direction = if row.direction.starts_with("Client") {
            row.direction.red()
        } else {
            row.direction.blue()
        };
        println!("{}  {:<16}  {:>10}", row.timestamp.bright_black(), direction, row.payload);
    }
    println!();

    Ok(())
}

fn show_indices(input: &Path, json: bool, ports: ServicePorts) -> Result<()> {
    let store = open_store(input, ports)?;
    let sets = store.indices().to_sets();

    if json {
        println!("{}", serde_json::to_string_pretty(&sets)?);
        return Ok(());
    }

    print_banner("Indices", &input.display().to_string());

    let groups = [
        ("DNS clients:", &sets.dns_clients),
        ("IP addresses:", &sets.ip_addresses),
        ("Hostnames:", &sets.hostnames),
        ("HTTP servers:", &sets.http_servers),
        ("HTTPS servers:", &sets.https_servers),
    ];
    for (title, values) in groups {
        println!("{} {}", title.bright_blue().bold(), values.len());
        for value in values {
            println!("  {}", value);
        }
        println!();
    }

    Ok(())
}

fn show_ranking(
    input: &Path,
    by: RankKey,
    descending: bool,
    last: Option<usize>,
    ports: ServicePorts,
) -> Result<()> {
    let store = open_store(input, ports)?;
    let order = if descending {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };

    let mut ranked = rank_connections(store.events(), by, order);
    if let Some(n) = last {
        ranked.truncate(n);
    }

    print_banner("Connections by", &by.to_string());

    if ranked.is_empty() {
        println!("{}", "No closed connections.".yellow());
        return Ok(());
    }

    for end in ranked {
        let base = &end.base;
        println!(
            "{} {}:{} <-> {}:{}",
            base.timestamp.to_string().bright_black(),
            endpoint_label(&base.source_ip, base.source_hostname.as_deref()),
            end.source_port,
            endpoint_label(&base.destination_ip, base.destination_hostname.as_deref()),
            end.destination_port
        );
        println!(
            "  {} {:.6}s  {} {}  {} {}",
            "Duration:".bright_blue(),
            end.duration_micros() as f64 / 1_000_000.0,
            "Client:".bright_blue(),
            end.transferred_client,
            "Server:".bright_blue(),
            end.transferred_server
        );
    }
    println!();

    Ok(())
}

fn merge_files(output: &Path, inputs: &[PathBuf]) -> Result<()> {
    let mut streams = Vec::with_capacity(inputs.len());
    for input in inputs {
        streams.push(open_store(input, ServicePorts::default())?.into_events());
    }

    let merged = merge_streams(streams);
    let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    write_json_lines(&merged, BufWriter::new(file))?;

    println!(
        "{} {} events from {} files into {}",
        "Merged".green().bold(),
        merged.len(),
        inputs.len(),
        output.display()
    );
    Ok(())
}

fn show_events(input: &Path, tag: Option<&str>, ports: ServicePorts) -> Result<()> {
    let store = open_store(input, ports)?;

    let kind = match tag {
        Some(tag) => Some(EventKind::from_tag(tag).ok_or_else(|| anyhow!("unknown event type '{}'", tag))?),
        None => None,
    };

    let selected = store.events().iter().filter(|ev| match (kind, tag) {
        // dns-query and dns-response share a kind, so compare the tag itself
        (Some(EventKind::Dns), Some(tag)) => ev.tag() == tag,
        (Some(kind), _) => ev.kind() == kind,
        (None, _) => true,
    });

    let mut count = 0;
    for event in selected {
        print_event(event);
        count += 1;
    }

    if count == 0 {
        println!("{}", "No matching events.".yellow());
    }
    Ok(())
}

fn print_event(event: &Event) {
    println!("{} {}", format!("#{}", event.base().number).bright_black(), event);
}

fn convert_time(to_micros: Option<&str>, from_micros: Option<i64>) -> Result<()> {
    match (to_micros, from_micros) {
        (Some(s), _) => {
            let ts: Timestamp = s.parse()?;
            println!("{}", ts.as_micros());
        }
        (None, Some(micros)) => {
            let ts = Timestamp::from_micros(micros)
                .ok_or_else(|| anyhow!("{} is out of the representable range", micros))?;
            println!("{}", ts);
        }
        (None, None) => bail!("one of --to-micros or --from-micros is required"),
    }
    Ok(())
}
