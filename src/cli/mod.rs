pub mod commands;

use clap::{Arg, ArgAction, Command};

pub use commands::handle_subcommands;

pub const DEFAULT_CONFIG_FILE: &str = "dass.toml";

pub fn build_cli() -> Command {
    Command::new("dass")
        .version(crate::VERSION)
        .about("Multi-channel serial / Modbus RTU data acquisition")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Serial port, overrides the configuration")
                .global(true),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_name("RATE")
                .help("Baud rate, overrides the configuration")
                .global(true),
        )
        .subcommand(Command::new("ports").about("List available serial ports"))
        .subcommand(
            Command::new("init-config")
                .about("Write a default configuration file")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .default_value(DEFAULT_CONFIG_FILE)
                        .help("Where to write the file"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing file"),
                ),
        )
        .subcommand(Command::new("validate").about("Check the configuration and print the register map"))
        .subcommand(
            Command::new("probe")
                .about("Read one register entry once and print the raw and decoded value")
                .arg(
                    Arg::new("slave")
                        .long("slave")
                        .value_name("ID")
                        .required(true)
                        .help("Slave address (1-247)"),
                )
                .arg(
                    Arg::new("address")
                        .long("address")
                        .value_name("ADDR")
                        .required(true)
                        .help("Starting holding register address"),
                )
                .arg(
                    Arg::new("type")
                        .long("type")
                        .value_name("TYPE")
                        .default_value("UINT16")
                        .help("INT16, UINT16, INT32, UINT32 or FLOAT32"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Acquire continuously until Ctrl+C, the duration ends or the link fails")
                .arg(
                    Arg::new("interval-ms")
                        .short('i')
                        .long("interval-ms")
                        .value_name("MS")
                        .help("Polling interval, overrides the configuration"),
                )
                .arg(
                    Arg::new("simulate")
                        .long("simulate")
                        .action(ArgAction::SetTrue)
                        .help("Use generated signals instead of a serial port"),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_name("FORMAT")
                        .value_parser(["table", "json"])
                        .default_value("table")
                        .help("Console output format"),
                )
                .arg(
                    Arg::new("no-log")
                        .long("no-log")
                        .action(ArgAction::SetTrue)
                        .help("Disable the CSV log file"),
                )
                .arg(
                    Arg::new("log-dir")
                        .long("log-dir")
                        .value_name("DIR")
                        .help("Directory for CSV log files"),
                )
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn global_overrides_reach_subcommands() {
        let matches = build_cli()
            .try_get_matches_from(["dass", "run", "--port", "/dev/ttyUSB3", "--simulate", "-f", "json"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(sub.get_one::<String>("port").map(String::as_str), Some("/dev/ttyUSB3"));
        assert!(sub.get_flag("simulate"));
        assert_eq!(sub.get_one::<String>("format").map(String::as_str), Some("json"));
    }

    #[test]
    fn probe_requires_slave_and_address() {
        assert!(build_cli().try_get_matches_from(["dass", "probe", "--slave", "1"]).is_err());
    }
}
