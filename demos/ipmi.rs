use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use ipmilan::config::{Config, PingPolicy};
use ipmilan::ipmi::{command, AuthType, ChassisPowerState, PrivilegeLevel, Session};
use std::error::Error;
use std::str::FromStr;
use std::time::Duration;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn main() -> Result<()> {
    env_logger::init();

    match cmd_ipmi().get_matches().subcommand() {
        Some(("chassis", args)) => match args.subcommand() {
            Some(("status", args)) => run_chassis_status(args)?,
            Some(("control", args)) => run_chassis_control(args)?,
            _ => cmd_chassis().print_long_help()?,
        },
        Some(("mc", args)) => match args.subcommand() {
            Some(("info", args)) => run_mc_info(args)?,
            _ => cmd_mc().print_long_help()?,
        },
        Some(("raw", args)) => run_raw(args)?,
        Some(("ping", args)) => run_ping(args)?,
        _ => cmd_ipmi().print_long_help()?,
    }

    Ok(())
}

fn cmd_ipmi() -> Command {
    Command::new("IPMI")
        .version("0.1.0")
        .subcommand(cmd_chassis())
        .subcommand(cmd_mc())
        .subcommand(cmd_raw())
        .subcommand(cmd_ping())
}

fn cmd_chassis() -> Command {
    Command::new("chassis")
        .subcommand(cmd_chassis_control())
        .subcommand(cmd_chassis_status())
}

fn cmd_chassis_control() -> Command {
    session_args(Command::new("control")).arg(Arg::new("state").required(true).index(4))
}

fn cmd_chassis_status() -> Command {
    session_args(Command::new("status"))
}

fn cmd_mc() -> Command {
    Command::new("mc").subcommand(session_args(Command::new("info")))
}

fn cmd_raw() -> Command {
    session_args(Command::new("raw"))
        .arg(
            Arg::new("netfn")
                .required(true)
                .index(4)
                .value_parser(parse_u8),
        )
        .arg(
            Arg::new("cmd")
                .required(true)
                .index(5)
                .value_parser(parse_u8),
        )
        .arg(
            Arg::new("data")
                .index(6)
                .num_args(0..)
                .value_parser(parse_u8),
        )
        .arg(
            Arg::new("lun")
                .long("lun")
                .default_value("0")
                .value_parser(parse_u8),
        )
}

fn cmd_ping() -> Command {
    Command::new("ping")
        .arg(Arg::new("addr").required(true).index(1))
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_parser(value_parser!(u16)),
        )
}

fn session_args(cmd: Command) -> Command {
    cmd.arg(Arg::new("addr").required(true).index(1))
        .arg(Arg::new("username").required(true).index(2))
        .arg(Arg::new("password").required(true).index(3))
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_parser(value_parser!(u16)),
        )
        .arg(Arg::new("auth").short('A').long("auth"))
        .arg(Arg::new("privilege").short('L').long("privilege"))
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_parser(parse_u8),
        )
        .arg(
            Arg::new("channel")
                .short('b')
                .long("channel")
                .default_value("0")
                .value_parser(parse_u8),
        )
        .arg(
            Arg::new("transit")
                .short('T')
                .long("transit")
                .value_parser(parse_u8),
        )
        .arg(
            Arg::new("transit-channel")
                .short('B')
                .long("transit-channel")
                .default_value("0")
                .value_parser(parse_u8),
        )
        .arg(
            Arg::new("timeout")
                .short('N')
                .long("timeout")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("retries")
                .short('R')
                .long("retries")
                .value_parser(value_parser!(u32)),
        )
        .arg(Arg::new("ping").long("ping").action(ArgAction::SetTrue))
        .arg(
            Arg::new("xor-vendor")
                .long("xor-vendor")
                .action(ArgAction::Append)
                .value_parser(value_parser!(u32)),
        )
}

fn parse_u8(value: &str) -> std::result::Result<u8, String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse::<u8>(),
    };
    parsed.map_err(|e| format!("{}: {}", value, e))
}

fn value<'a>(args: &'a ArgMatches, id: &str) -> Result<&'a str> {
    args.get_one::<String>(id)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("missing {}", id).into())
}

fn config(args: &ArgMatches) -> Result<Config> {
    let mut config = Config::new(value(args, "addr")?)
        .username(value(args, "username")?)
        .password(value(args, "password")?);

    if let Some(port) = args.get_one::<u16>("port") {
        config = config.port(*port);
    }

    if let Some(auth) = args.get_one::<String>("auth") {
        config = config.auth_type(AuthType::from_str(auth)?);
    }

    if let Some(privilege) = args.get_one::<String>("privilege") {
        config = config.privilege_level(PrivilegeLevel::from_str(privilege)?);
    }

    let channel = args.get_one::<u8>("channel").copied().unwrap_or(0);
    if let Some(target) = args.get_one::<u8>("target") {
        config = config.target(*target, channel);
    }

    let transit_channel = args.get_one::<u8>("transit-channel").copied().unwrap_or(0);
    if let Some(transit) = args.get_one::<u8>("transit") {
        config = config.transit(*transit, transit_channel);
    }

    if let Some(timeout) = args.get_one::<u64>("timeout") {
        config = config.timeout(Duration::from_secs(*timeout));
    }

    if let Some(retries) = args.get_one::<u32>("retries") {
        config = config.retries(*retries);
    }

    if args.get_flag("ping") {
        config = config.ping(PingPolicy::Require);
    }

    if let Some(vendors) = args.get_many::<u32>("xor-vendor") {
        for iana in vendors {
            config = config.xor_challenge_vendor(*iana);
        }
    }

    Ok(config)
}

fn run_chassis_control(args: &ArgMatches) -> Result<()> {
    let state = ChassisPowerState::from_str(value(args, "state")?)?;
    ipmilan::run_chassis_control(config(args)?, state)?;
    Ok(())
}

fn run_chassis_status(args: &ArgMatches) -> Result<()> {
    if ipmilan::run_chassis_status(config(args)?)? {
        println!("power on.");
    } else {
        println!("power off.");
    }
    Ok(())
}

fn run_mc_info(args: &ArgMatches) -> Result<()> {
    let mut session = ipmilan::open_with(config(args)?)?;
    let res = command::get_device_id(&mut session)?;
    let data = res.data();
    if data.len() >= 6 {
        println!("Device ID          : {}", data[0]);
        println!("Device Revision    : {}", data[1] & 0x0F);
        println!("Firmware Revision  : {}.{:02x}", data[2] & 0x7F, data[3]);
        println!("IPMI Version       : {}.{}", data[4] & 0x0F, data[4] >> 4);
    }
    ipmilan::close(session)?;
    Ok(())
}

fn run_raw(args: &ArgMatches) -> Result<()> {
    let netfn = *args.get_one::<u8>("netfn").ok_or("missing netfn")?;
    let cmd = *args.get_one::<u8>("cmd").ok_or("missing cmd")?;
    let lun = args.get_one::<u8>("lun").copied().unwrap_or(0);
    let data: Vec<u8> = args
        .get_many::<u8>("data")
        .map(|values| values.copied().collect())
        .unwrap_or_default();

    let config = config(args)?;
    let target = config.target_address();
    let channel = config.target_channel();

    let mut session = ipmilan::open_with(config)?;
    let (code, res) = ipmilan::raw_command(&mut session, netfn, lun, target, channel, cmd, &data)?;
    ipmilan::close(session)?;

    println!("completion code: {}", code);
    let bytes: Vec<String> = res.iter().map(|b| format!("{:02x}", b)).collect();
    println!("{}", bytes.join(" "));
    Ok(())
}

fn run_ping(args: &ArgMatches) -> Result<()> {
    let mut config = Config::new(value(args, "addr")?);
    if let Some(port) = args.get_one::<u16>("port") {
        config = config.port(*port);
    }

    let mut session = Session::new(config)?;
    session.connect()?;
    let pong = session.ping()?;
    println!(
        "pong: iana {}, ipmi {}",
        pong.iana(),
        if pong.ipmi_supported() { "supported" } else { "not supported" }
    );
    Ok(())
}
