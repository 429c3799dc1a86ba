use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::labels::parse_label;
use crate::ProfileType;

#[derive(Debug, Parser)]
pub struct Opt {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Profile continuously, uploading one profile per tick
    Run {
        /// path to the agent config
        #[clap(short, long, default_value = "Agent.toml")]
        config: PathBuf,
        /// collector address, overrides the config
        #[clap(long)]
        collector: Option<String>,
        /// service name, overrides the config
        #[clap(long)]
        service: Option<String>,
        /// extra label in the form of "key=value", may be repeated
        #[clap(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
        /// seed for the tick jitter
        #[clap(long)]
        seed: Option<u64>,
    },
    /// Capture and upload a single profile, then exit
    Once {
        #[clap(short, long, default_value = "Agent.toml")]
        config: PathBuf,
        /// profile type, e.g. "cpu" or "heap"
        #[clap(short = 't', long = "type")]
        ptype: ProfileType,
    },
}
