// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use devpath_sys::{LookupRoots, Mode, Translator};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Only the path inside the filesystem
    File,
    /// Partition and file path
    Hd,
    /// Full hardware path
    Full,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::File => Mode::ShortFormPathFile,
            ModeArg::Hd => Mode::ShortFormPathHD,
            ModeArg::Full => Mode::FullPath,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "file-devpath")]
#[command(about = "Print the UEFI device path of a file on local storage")]
struct Args {
    path: PathBuf,

    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    mode: ModeArg,

    /// TOML file overriding the mount table, sysfs and root locations
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let roots = match &args.config {
        Some(path) => LookupRoots::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => LookupRoots::default(),
    };

    let translator = Translator::new(roots);
    let device_path = translator
        .translate(&args.path, args.mode.into())
        .with_context(|| format!("failed to translate {}", args.path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&device_path)?);
    } else {
        println!("{device_path}");
    }

    Ok(())
}
