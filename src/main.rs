use std::collections::HashSet;
use std::fs;
use std::io::{self, BufReader};

use anyhow::Context;
use log::{error, info};
use serde::Serialize;

use netspec::{
    mac_vendor, parse_bond_spec, parse_net_spec, Attachment, Platform, SpecContext,
    VmNetworkConfig,
};

const APP_NAME: &str = "netspec";

const SUB_CMD_NET: &str = "net";
const SUB_CMD_BOND: &str = "bond";
const SUB_CMD_REPLAY: &str = "replay";

const DEFAULT_NAMESPACE: &str = "minimega";

#[derive(Serialize)]
struct Parsed<'a, T: Serialize> {
    spec: &'a str,
    canonical: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor: Option<&'static str>,
    config: T,
}

fn main() {
    let app = clap::Command::new(APP_NAME)
        .version(clap::crate_version!())
        .about("Parse, validate and normalize VM network and bond specs")
        .subcommand_required(true)
        .subcommand(
            clap::Command::new(SUB_CMD_NET)
                .about("Parse interface specs such as 'my_bridge,foo,de:ad:be:ef:ca:fe'")
                .arg(config_arg(false))
                .arg(
                    clap::Arg::new("DRIVER")
                        .long("driver")
                        .action(clap::ArgAction::Append)
                        .help("NIC driver supported by the hypervisor, in addition to the platform config"),
                )
                .arg(specs_arg())
                .arg(verbose_arg()),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_BOND)
                .about("Parse bond specs such as '0,1,balance-tcp,active,no-lacp-fallback'")
                .arg(specs_arg())
                .arg(verbose_arg()),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_REPLAY)
                .about("Replay 'vm config networks' and 'vm config bonds' lines and print them normalized")
                .arg(config_arg(true))
                .arg(
                    clap::Arg::new("NAMESPACE")
                        .long("namespace")
                        .default_value(DEFAULT_NAMESPACE)
                        .help("Namespace used to resolve VLAN aliases"),
                )
                .arg(
                    clap::Arg::new("UUID")
                        .long("uuid")
                        .default_value("")
                        .help("UUID of the VM the config belongs to"),
                )
                .arg(
                    clap::Arg::new("INPUT")
                        .required(true)
                        .help("File containing persisted VM config lines"),
                )
                .arg(verbose_arg()),
        );

    let matches = app.get_matches();

    match matches.subcommand() {
        Some((SUB_CMD_NET, cmd)) => {
            setup_logger(cmd);

            if let Err(err) = net(cmd) {
                error!("Parsing netspec failed: {err:#}");
                std::process::exit(1)
            }
        }
        Some((SUB_CMD_BOND, cmd)) => {
            setup_logger(cmd);

            if let Err(err) = bond(cmd) {
                error!("Parsing bondspec failed: {err:#}");
                std::process::exit(1)
            }
        }
        Some((SUB_CMD_REPLAY, cmd)) => {
            setup_logger(cmd);

            match replay(cmd) {
                Ok(..) => {
                    info!("Successfully replayed config");
                }
                Err(err) => {
                    error!("Replaying config failed: {err:#}");
                    std::process::exit(1)
                }
            }
        }
        _ => unreachable!("Unrecognized subcommand"),
    }
}

fn config_arg(required: bool) -> clap::Arg {
    clap::Arg::new("CONFIG")
        .long("config")
        .required(required)
        .help("Platform config in YAML format listing NIC drivers and namespace VLAN aliases")
}

fn specs_arg() -> clap::Arg {
    clap::Arg::new("SPEC")
        .required(true)
        .num_args(1..)
        .help("Specs to parse")
}

fn verbose_arg() -> clap::Arg {
    clap::Arg::new("VERBOSE")
        .long("verbose")
        .action(clap::ArgAction::SetTrue)
        .help("Enables DEBUG log level")
}

fn net(cmd: &clap::ArgMatches) -> Result<(), anyhow::Error> {
    let mut drivers = match cmd.get_one::<String>("CONFIG") {
        Some(path) => Platform::load(path)?.drivers(),
        None => HashSet::new(),
    };
    drivers.extend(cmd.get_many::<String>("DRIVER").unwrap_or_default().cloned());

    let parsed = cmd
        .get_many::<String>("SPEC")
        .unwrap_or_default()
        .map(|spec| -> Result<_, anyhow::Error> {
            let iface = parse_net_spec(spec, &drivers)
                .with_context(|| format!("Invalid netspec '{spec}'"))?;

            let vendor = match &iface.attachment {
                Attachment::Wired(wired) => wired.mac.as_deref().and_then(mac_vendor),
                Attachment::Wireless(_) => None,
            };

            Ok(Parsed {
                spec,
                canonical: iface.to_string(),
                vendor,
                config: iface,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    print!("{}", serde_yaml::to_string(&parsed)?);

    Ok(())
}

fn bond(cmd: &clap::ArgMatches) -> Result<(), anyhow::Error> {
    let parsed = cmd
        .get_many::<String>("SPEC")
        .unwrap_or_default()
        .map(|spec| -> Result<_, anyhow::Error> {
            let bond = parse_bond_spec(spec)
                .with_context(|| format!("Invalid bondspec '{spec}'"))?;

            Ok(Parsed {
                spec,
                canonical: bond.to_string(),
                vendor: None,
                config: bond,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    print!("{}", serde_yaml::to_string(&parsed)?);

    Ok(())
}

fn replay(cmd: &clap::ArgMatches) -> Result<(), anyhow::Error> {
    let config = cmd
        .get_one::<String>("CONFIG")
        .expect("--config is required");
    let namespace = cmd
        .get_one::<String>("NAMESPACE")
        .expect("--namespace has a default");
    let uuid = cmd.get_one::<String>("UUID").expect("--uuid has a default");
    let input = cmd.get_one::<String>("INPUT").expect("INPUT is required");

    let platform = Platform::load(config)?;
    let drivers = platform.drivers();
    let ctx = SpecContext {
        namespace: namespace.as_str(),
        drivers: &drivers,
        resolver: &platform,
    };

    info!("Replaying config from {input:?}...");

    let file = fs::File::open(input).with_context(|| format!("Opening {input:?}"))?;
    let mut vm = VmNetworkConfig::new(uuid);
    vm.read_config(BufReader::new(file), &ctx)?;

    info!("Networks: {}", vm.network_string());
    info!("Bonds: {}", vm.bond_string());

    vm.write_config(&mut io::stdout().lock())
        .context("Writing config")
}

fn setup_logger(matches: &clap::ArgMatches) {
    let verbose_arg = "VERBOSE";

    let mut log_builder = env_logger::Builder::new();
    if matches
        .try_get_one::<bool>(verbose_arg)
        .is_ok_and(|arg| arg.is_some_and(|&value| value))
    {
        log_builder.filter(None, log::LevelFilter::Debug);
    } else {
        log_builder.filter(None, log::LevelFilter::Info);
    }
    log_builder.init();
}
