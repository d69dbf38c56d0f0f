use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "corrald")]
#[command(about = "Cluster provisioning control plane")]
#[command(version)]
pub struct Args {
    /// Path to the server config file (YAML); defaults apply when omitted
    #[arg(short, long, value_name = "FILE", env = "CORRAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Override the bind address from the config file
    #[arg(long, value_name = "ADDR")]
    pub bind_addr: Option<String>,

    /// Override the bind port from the config file
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Path to a .env file to load before startup
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}
