use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use log::{error, info, warn};
use std::path::Path;
use std::time::Duration;

use super::DEFAULT_CONFIG_FILE;
use crate::config::Config;
use crate::modbus::{available_ports, RtuTransport, SimulatedTransport, Transport};
use crate::output::{ConsoleFormat, ConsoleSink, CsvLogSink};
use crate::registers::{DataType, RegisterDecoder, RegisterEntry};
use crate::services::{AcquisitionService, StopReason};

/// Loads the configuration named by `--config`, else `dass.toml` when it
/// exists, else the defaults; then applies command line overrides.
pub fn load_config(matches: &ArgMatches) -> Result<Config> {
    let explicit = matches.try_get_one::<String>("config").ok().flatten();
    let mut config = match explicit {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)?,
        None => {
            info!("📄 No configuration file, using defaults");
            Config::default()
        }
    };
    config.apply_matches(matches)?;
    Ok(config)
}

pub async fn handle_subcommands(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("ports", _)) => list_ports(),
        Some(("init-config", sub)) => init_config(sub),
        Some(("validate", sub)) => validate(sub),
        Some(("probe", sub)) => probe(sub).await,
        Some(("run", sub)) => run(sub).await,
        Some((other, _)) => bail!("Unknown command '{}'", other),
        None => bail!("No command given, see --help"),
    }
}

fn list_ports() -> Result<()> {
    let ports = available_ports()?;
    println!("📡 Available Serial Ports:");
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
    }
    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {} ({})", index + 1, port.name, port.description);
    }
    Ok(())
}

fn init_config(matches: &ArgMatches) -> Result<()> {
    let output = matches
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_FILE);
    if Path::new(output).exists() && !matches.get_flag("force") {
        bail!("{} already exists, pass --force to overwrite it", output);
    }
    Config::default().save_to_file(output)?;
    println!("✅ Wrote default configuration to {}", output);
    Ok(())
}

fn validate(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let map = config.validate()?;

    println!("✅ Configuration is valid");
    println!(
        "   Port {} @ {} baud, timeout {} ms, polling every {} ms, mode {:?}",
        config.serial.port,
        config.serial.baud_rate,
        config.serial.timeout_ms,
        config.acquisition.polling_interval_ms,
        config.acquisition.mode
    );
    println!("   {:<6} {:<8} {:<8} {:<8} {}", "Slave", "Address", "Type", "Enabled", "Channel");
    for entry in map.entries() {
        println!(
            "   {:<6} {:<8} {:<8} {:<8} {}",
            entry.slave_id, entry.address, entry.data_type, entry.enabled, entry.channel_name
        );
    }
    Ok(())
}

async fn probe(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let slave: u8 = required(matches, "slave")?.parse().context("--slave must be 1-247")?;
    let address: u16 = required(matches, "address")?.parse().context("--address must be 0-65535")?;
    let data_type: DataType = required(matches, "type")?.parse().map_err(anyhow::Error::msg)?;

    let entry = RegisterEntry::new(slave, address, data_type, "probe");
    let mut transport = RtuTransport::open(
        &config.serial.port,
        config.serial.baud_rate,
        config.io_timeout(),
        &config.serial.parity,
    )?;

    info!("🔍 Probing {}", entry);
    let result = transport
        .read_holding_registers(slave, address, entry.word_count(), config.io_timeout())
        .await;
    transport.close();

    let words = result?;
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    let value = RegisterDecoder::new(config.acquisition.word_order).decode(&entry, &words)?;
    println!("📥 Slave {} register {}: 0x{} -> {} = {}", slave, address, hex::encode(bytes), data_type, value);
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(id)
        .with_context(|| format!("--{} is required", id))
}

/// Positive, finite number of seconds.
fn parse_duration_secs(text: &str) -> Result<Duration> {
    let secs: f64 = text
        .trim()
        .parse()
        .with_context(|| format!("--duration must be a number of seconds, got '{}'", text))?;
    if secs.is_nan() || secs <= 0.0 {
        bail!("--duration must be greater than 0, got '{}'", text);
    }
    Duration::try_from_secs_f64(secs).with_context(|| format!("--duration '{}' is out of range", text))
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let format = match matches.get_one::<String>("format").map(String::as_str) {
        Some("json") => ConsoleFormat::Json,
        _ => ConsoleFormat::Table,
    };
    let duration = matches
        .get_one::<String>("duration")
        .map(|s| parse_duration_secs(s))
        .transpose()?;

    let simulate = matches.get_flag("simulate");
    let mut service = AcquisitionService::new(config)?;
    let channel_names = service.channel_names();

    service.add_sink(Box::new(ConsoleSink::stdout(format)))?;
    if service.config().logging.csv_enabled {
        match CsvLogSink::create(&service.config().logging.directory, &channel_names) {
            Ok(sink) => service.add_sink(Box::new(sink))?,
            Err(e) => warn!("⚠️  CSV logging disabled: {}", e),
        }
    }

    if simulate {
        let acq = &service.config().acquisition;
        let transport = SimulatedTransport::new(service.register_map(), acq.word_order, acq.raw_channel_count);
        service.connect_with(Box::new(transport))?;
    } else {
        service.connect()?;
    }

    let session = service.start().await?;
    info!("🔄 Session {} acquiring {} channels, press Ctrl+C to stop", session, channel_names.len());

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    let failed = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupt received, stopping");
            false
        }
        _ = deadline => {
            info!("⏰ Duration elapsed, stopping");
            false
        }
        reason = service.wait() => reason == Some(StopReason::FailureThreshold),
    };

    let stats = service.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if failed {
        error!("❌ Acquisition ended on repeated read failures");
        bail!("acquisition halted after repeated read failures");
    }
    Ok(())
}
