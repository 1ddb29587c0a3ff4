use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kvmap",
    about = "kvmap: map object graphs onto a flat key-value store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON file backing the key-value store
    #[arg(long, global = true, default_value = "kvmap.json")]
    pub store: PathBuf,

    /// TOML file with lock settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Save a small sample graph of people
    Demo,
    /// Show a person through a lazy proxy
    Show(PersonArgs),
    /// List raw store keys
    Keys(KeysArgs),
    /// Read one raw store value
    Get(GetArgs),
    /// Increment a person's age in place
    Birthday(PersonArgs),
    /// Append a tag to a person's tag list
    Tag(TagArgs),
    /// Remove a person and everything saved with them
    Remove(PersonArgs),
}

#[derive(Args)]
pub struct PersonArgs {
    /// Key value of the person, e.g. `1`
    pub id: String,
}

#[derive(Args)]
pub struct KeysArgs {
    #[arg(short, long, default_value = "")]
    pub prefix: String,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
}

#[derive(Args)]
pub struct TagArgs {
    pub id: String,
    pub tag: String,
}
