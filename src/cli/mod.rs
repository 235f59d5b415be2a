mod config;
pub mod paths;
mod repl;

use std::collections::HashMap;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

use crate::{config::apl_config, console::StdConsole};

use self::config::cli_config;
use self::repl::Repl;

#[derive(Parser, Debug)]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Loads a file, executing its lines in order ("load" can be elided)
    Load(LoadArgs),
    /// Enters the interactive session ("repl" can be elided)
    Repl(ReplArgs),
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// The file to be loaded
    #[clap(value_parser)]
    apl_file: Utf8PathBuf,

    /// Config file, containing the lowest precedence parameters
    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,

    /// Maximum depth of the state indicator (defaults to 1000)
    #[clap(long, value_parser)]
    max_depth: Option<usize>,

    /// Initial index origin, 0 or 1 (defaults to 1)
    #[clap(long, value_parser)]
    index_origin: Option<i64>,
}

#[derive(Parser, Debug)]
struct LoadCli {
    #[clap(value_parser = parse_filename)]
    apl_file: Utf8PathBuf,

    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,

    #[clap(long, value_parser)]
    max_depth: Option<usize>,

    #[clap(long, value_parser)]
    index_origin: Option<i64>,
}

impl LoadArgs {
    fn into_cli(self) -> LoadCli {
        LoadCli {
            apl_file: self.apl_file,
            config: self.config,
            max_depth: self.max_depth,
            index_origin: self.index_origin,
        }
    }
}

#[derive(Args, Debug)]
struct ReplArgs {
    /// Optional file to be loaded before entering the session
    #[clap(long, value_parser)]
    load: Option<Utf8PathBuf>,

    /// Config file, containing the lowest precedence parameters
    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,

    /// Maximum depth of the state indicator (defaults to 1000)
    #[clap(long, value_parser)]
    max_depth: Option<usize>,

    /// Initial index origin, 0 or 1 (defaults to 1)
    #[clap(long, value_parser)]
    index_origin: Option<i64>,
}

#[derive(Parser, Debug)]
struct ReplCli {
    #[clap(long, value_parser)]
    load: Option<Utf8PathBuf>,

    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,

    #[clap(long, value_parser)]
    max_depth: Option<usize>,

    #[clap(long, value_parser)]
    index_origin: Option<i64>,
}

impl ReplArgs {
    fn into_cli(self) -> ReplCli {
        ReplCli {
            load: self.load,
            config: self.config,
            max_depth: self.max_depth,
            index_origin: self.index_origin,
        }
    }
}

/// A file name that is not one of the subcommand names.
fn parse_filename(file: &str) -> Result<Utf8PathBuf> {
    if matches!(file, "help" | "load" | "repl") {
        anyhow::bail!("{file} is a subcommand");
    }
    Ok(Utf8PathBuf::from(file))
}

/// CLI arguments that override config values, keyed like the config file.
fn overrides(max_depth: Option<usize>, index_origin: Option<i64>) -> HashMap<&'static str, String> {
    let mut map = HashMap::new();
    if let Some(depth) = max_depth {
        map.insert("max_depth", depth.to_string());
    }
    if let Some(io) = index_origin {
        map.insert("index_origin", io.to_string());
    }
    map
}

impl ReplCli {
    fn run(&self) -> Result<()> {
        let overrides = overrides(self.max_depth, self.index_origin);
        let cli_settings = cli_config(self.config.as_ref(), Some(&overrides));
        let settings = apl_config(None, None).clone();
        let mut repl = Repl::new(settings, Box::new(StdConsole))?;
        if let Some(file) = &self.load {
            repl.load_file(file)?;
        }
        if repl.is_running() {
            repl.start(cli_settings)?;
        }
        Ok(())
    }
}

impl LoadCli {
    fn run(&self) -> Result<()> {
        let overrides = overrides(self.max_depth, self.index_origin);
        cli_config(self.config.as_ref(), Some(&overrides));
        let settings = apl_config(None, None).clone();
        let mut repl = Repl::new(settings, Box::new(StdConsole))?;
        repl.load_file(&self.apl_file)
    }
}

/// Parses CLI arguments and continues the program flow accordingly
pub fn parse_and_run() -> Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    paths::create_apl_dir()?;
    if let Ok(repl_cli) = ReplCli::try_parse() {
        repl_cli.run()
    } else if let Ok(load_cli) = LoadCli::try_parse() {
        load_cli.run()
    } else {
        match Cli::parse().command {
            Command::Repl(repl_args) => repl_args.into_cli().run(),
            Command::Load(load_args) => load_args.into_cli().run(),
        }
    }
}
