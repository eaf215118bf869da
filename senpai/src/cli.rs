use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "senpai", version)]
#[command(about = "Resolve a playable source for an anime episode", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, global = true, env = "SENPAI_CONFIG")]
    pub config: Option<String>,

    /// Print upstream metrics in the Prometheus text format before exiting
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the fallback chain for one episode and print the result
    Play(PlayArgs),
    /// Print the static candidate list without any network calls
    Candidates(MediaArgs),
    /// Print the URL slug derived from a title
    Slug {
        title: String,
    },
}

#[derive(Debug, Args)]
pub struct MediaArgs {
    /// AniList id
    #[arg(long)]
    pub anilist_id: u64,

    /// MyAnimeList id
    #[arg(long)]
    pub mal_id: Option<u64>,

    /// Episode number, starting at 1
    #[arg(long, short, default_value_t = 1)]
    pub episode: u32,

    #[arg(long, default_value = "")]
    pub title: String,

    /// Resume position in seconds
    #[arg(long)]
    pub start_at: Option<u32>,

    /// Preferred track, `sub` or `dub` (overrides playback.preferred_language)
    #[arg(long)]
    pub language: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PlayArgs {
    #[command(flatten)]
    pub media: MediaArgs,

    /// Switch to this candidate index once the automatic phase settles
    #[arg(long)]
    pub select: Option<usize>,

    /// Continue with the following episode afterwards
    #[arg(long)]
    pub next_episode: bool,

    /// Mobile client profile (preload at most one candidate)
    #[arg(long)]
    pub mobile: bool,
}
