use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    name = "abrdl",
    version,
    about = "Adaptive-bitrate stream downloader",
    long_about = "Downloads the audio and video tracks of a video as separate files.\n\
                  \n\
                  Tokens required by the streaming servers are minted through an external\n\
                  proof-of-origin provider service and rotated in-session whenever the server\n\
                  rejects them, so long downloads keep going without restarting."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the log file (default: current directory)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Base URL of the proof-of-origin provider service
    #[arg(long, global = true, env = "ABRDL_PROVIDER_URL")]
    pub provider_url: Option<String>,

    /// Overall HTTP request timeout in seconds (0 disables it)
    #[arg(long, global = true, default_value = "0")]
    pub timeout: u64,

    /// HTTP connection timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP read timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    pub read_timeout: u64,

    /// Metadata resolution timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    pub bootstrap_timeout: u64,

    /// Token mint timeout in seconds
    #[arg(long, global = true, default_value = "45")]
    pub mint_timeout: u64,

    /// Stream session open timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    pub open_timeout: u64,

    /// Custom HTTP headers ("Name: Value"), repeatable
    #[arg(short = 'H', long = "header", global = true)]
    pub headers: Vec<String>,

    /// Proxy URL (supports http, https, socks5)
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(long, global = true, default_value = "all")]
    pub proxy_type: String,

    /// Proxy username (if proxy requires authentication)
    #[arg(long, global = true)]
    pub proxy_user: Option<String>,

    /// Proxy password (if proxy requires authentication)
    #[arg(long, global = true)]
    pub proxy_pass: Option<String>,

    /// Disable every proxy, including the system one
    #[arg(long, global = true, conflicts_with = "proxy")]
    pub no_proxy: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show video details and the available formats
    Info {
        /// Video URL or identifier
        url: String,
    },

    /// Download the audio and/or video track of a video
    Download {
        /// Video URL or identifier
        url: String,

        /// Video quality (360p, 480p, 720p, 1080p) or an audio quality (AUDIO_QUALITY_MEDIUM)
        #[arg(short, long)]
        quality: Option<String>,

        /// Container (webm or mp4)
        #[arg(short, long)]
        format: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Download only the audio track
        #[arg(long, conflicts_with = "video_only")]
        audio_only: bool,

        /// Download only the video track
        #[arg(long)]
        video_only: bool,

        /// Keep partially written files when the download fails
        #[arg(long)]
        keep_partial: bool,

        /// Disable progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Show configuration information
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_flags() {
        let args = CliArgs::try_parse_from([
            "abrdl",
            "download",
            "n1PCW0C1aiM",
            "-q",
            "720p",
            "-f",
            "mp4",
            "-o",
            "out",
            "-H",
            "Referer: https://www.youtube.com",
        ])
        .unwrap();

        assert_eq!(args.headers, vec!["Referer: https://www.youtube.com"]);
        match args.command {
            Commands::Download {
                url,
                quality,
                format,
                output,
                ..
            } => {
                assert_eq!(url, "n1PCW0C1aiM");
                assert_eq!(quality.as_deref(), Some("720p"));
                assert_eq!(format.as_deref(), Some("mp4"));
                assert_eq!(output, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_track_mode_flags_conflict() {
        let result =
            CliArgs::try_parse_from(["abrdl", "download", "abc123", "--audio-only", "--video-only"]);
        assert!(result.is_err());
    }
}
