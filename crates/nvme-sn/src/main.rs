//! nvme-sn-tool: print the model, firmware revision and serial number of an
//! NVMe drive.

use std::path::PathBuf;

use clap::Parser;
use nvme_sn_lib::byteorder::ByteOrder;

mod cli;

#[derive(Parser)]
#[command(
    name = "nvme-sn-tool",
    version,
    about = "Print the model, firmware revision and serial number of an NVMe drive"
)]
struct Args {
    /// NVMe device node, e.g. /dev/nvme0 (default: `default_device` from config)
    device: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Also show controller capabilities (vendor, version, namespaces)
    #[arg(short, long)]
    capabilities: bool,

    /// Read settings from FILE instead of the default config path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save the effective settings (DEVICE becomes `default_device`) and exit
    #[arg(long)]
    write_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opts = cli::Options {
        device: args.device,
        json: args.json,
        capabilities: args.capabilities,
        config: args.config,
        write_config: args.write_config,
    };

    let json = opts.json;
    if let Err(e) = cli::run(opts, ByteOrder::host()) {
        if e.goes_to_stdout(json) {
            println!("{e}");
        } else {
            eprintln!("{e}");
        }
        std::process::exit(1);
    }
}
