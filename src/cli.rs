use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mds", version, about = "Serve git-backed package sources over the OBS remote API")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Directory that relative paths (mappings, repositories) resolve against
    #[arg(long, global = true, default_value = ".")]
    pub workdir: PathBuf,

    /// Project mapping file
    #[arg(long, global = true, default_value = "mappings.toml")]
    pub mappings: PathBuf,

    /// Directory holding package repositories as `<group>/<package>`
    #[arg(long, global = true, default_value = "packages-git")]
    pub packages_root: PathBuf,

    /// Index database [default: <cache dir>/mds/index.db]
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh the index, then serve requests (SIGHUP refreshes again)
    Serve {
        /// HTTP port to listen on
        port: u16,

        /// Seconds between checks of a waiting lastevents request
        #[arg(long, default_value_t = 2)]
        poll_interval: u64,
    },
    /// Refresh the index once and exit
    Refresh,
}
