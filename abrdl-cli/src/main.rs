use std::path::PathBuf;
use std::time::Duration;

use abrdl_engine::{
    Container, DownloadCoordinator, EngineConfig, ProxyAuth, ProxyConfig, ProxyType, TrackMode,
    TrackPreference,
};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{Level, debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod error;
mod utils;

use cli::{CliArgs, Commands};
use commands::download::DownloadOptions;
use config::AppConfig;
use error::AppError;
use utils::parse_headers;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const LOG_FILE: &str = "abrdl.log";

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Held until exit so buffered log lines reach the file
    let _guard = init_logging(&args)?;

    info!("==================================================================");
    info!("abrdl {} - adaptive-bitrate stream downloader", env!("CARGO_PKG_VERSION"));
    info!("==================================================================");

    let result = run(args).await;
    if let Err(e) = &result {
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
    }
    result
}

async fn run(args: CliArgs) -> Result<(), AppError> {
    let app_config = AppConfig::load(args.config.as_deref())?;
    debug!(?app_config, "Loaded configuration");

    let provider_url = args
        .provider_url
        .clone()
        .unwrap_or_else(|| app_config.provider_url.clone());

    match &args.command {
        Commands::Config { show, reset } => {
            if *reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults ({})", path.display());
            } else if *show {
                println!("{}", app_config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
            Ok(())
        }

        Commands::Info { url } => {
            let engine_config = engine_config(&args, &app_config)?;
            let coordinator =
                DownloadCoordinator::with_reference_collaborators(engine_config, &provider_url)?;
            commands::info::run(&coordinator, url).await
        }

        Commands::Download {
            url,
            quality,
            format,
            output,
            audio_only,
            video_only,
            keep_partial,
            no_progress,
        } => {
            let container: Container = format
                .as_deref()
                .unwrap_or(&app_config.container)
                .parse()
                .map_err(AppError::InvalidInput)?;
            let mode = match (*audio_only, *video_only) {
                (true, _) => TrackMode::AudioOnly,
                (_, true) => TrackMode::VideoOnly,
                _ => TrackMode::Both,
            };
            let quality = quality.as_deref().unwrap_or(&app_config.quality);
            let preference = TrackPreference::from_quality(Some(quality), container, mode);

            let mut engine_config = engine_config(&args, &app_config)?;
            engine_config.remove_partial_files = app_config.remove_partial_files && !*keep_partial;

            let options = DownloadOptions {
                url: url.clone(),
                preference,
                output_dir: output.clone().unwrap_or_else(|| app_config.output_dir.clone()),
                show_progress: !*no_progress && !args.quiet,
            };
            commands::download::run(engine_config, &provider_url, options).await
        }
    }
}

/// Installs stderr and file logging. The returned guard flushes the file
/// writer on drop.
fn init_logging(args: &CliArgs) -> Result<WorkerGuard, AppError> {
    let filter = || {
        if args.quiet {
            EnvFilter::new("error")
        } else if args.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::from_default_env().add_directive(Level::INFO.into())
        }
    };

    let log_dir = args.log_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&log_dir)?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, LOG_FILE));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter()),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(filter()),
        )
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    Ok(guard)
}

/// Engine configuration from command line flags, falling back to the config file.
fn engine_config(args: &CliArgs, app_config: &AppConfig) -> Result<EngineConfig, AppError> {
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s, read={}s",
        args.timeout, args.connect_timeout, args.read_timeout
    );

    let mut builder = EngineConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_read_timeout(Duration::from_secs(args.read_timeout))
        .with_bootstrap_timeout(Duration::from_secs(args.bootstrap_timeout))
        .with_mint_timeout(Duration::from_secs(args.mint_timeout))
        .with_open_timeout(Duration::from_secs(args.open_timeout));

    if let Some(user_agent) = &app_config.user_agent {
        builder = builder.with_user_agent(user_agent);
    }
    for (name, value) in parse_headers(&args.headers) {
        builder = builder.with_header(name, value);
    }

    builder = match proxy_config(args, app_config)? {
        Some(proxy) => builder.with_proxy(proxy),
        None => builder.with_system_proxy(!args.no_proxy),
    };

    Ok(builder.build())
}

fn proxy_config(args: &CliArgs, app_config: &AppConfig) -> Result<Option<ProxyConfig>, AppError> {
    if args.no_proxy {
        // No proxy flag overrides everything else
        info!("All proxy settings disabled (--no-proxy flag)");
        return Ok(None);
    }

    let Some(proxy_url) = args.proxy.as_ref().or(app_config.proxy.as_ref()) else {
        return Ok(None);
    };

    let mut proxy = ProxyConfig::from_url(proxy_url);
    let proxy_type: ProxyType = args.proxy_type.parse().map_err(AppError::InvalidInput)?;
    if proxy_type != ProxyType::All {
        proxy.proxy_type = proxy_type;
    }

    // Configure proxy authentication if both username and password are provided
    if let (Some(username), Some(password)) = (&args.proxy_user, &args.proxy_pass) {
        proxy.auth = Some(ProxyAuth {
            username: username.clone(),
            password: password.clone(),
        });
    }

    info!(
        proxy_url = %proxy.url,
        proxy_type = ?proxy.proxy_type,
        has_auth = proxy.auth.is_some(),
        "Using explicit proxy configuration"
    );
    Ok(Some(proxy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["abrdl", "info", "abc123"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_reach_engine_config() {
        let args = parse(&["--mint-timeout", "5", "-H", "X-Test: 1"]);
        let config = engine_config(&args, &AppConfig::default()).unwrap();

        assert_eq!(config.mint_timeout, Duration::from_secs(5));
        assert_eq!(config.http.headers.get("x-test").unwrap(), "1");
        assert!(config.http.proxy.is_none());
        assert!(config.http.use_system_proxy);
    }

    #[test]
    fn test_explicit_proxy_with_credentials() {
        let args = parse(&[
            "--proxy",
            "socks5://127.0.0.1:1080",
            "--proxy-user",
            "user",
            "--proxy-pass",
            "secret",
        ]);
        let proxy = proxy_config(&args, &AppConfig::default()).unwrap().unwrap();

        assert_eq!(proxy.proxy_type, ProxyType::Socks5);
        assert_eq!(proxy.auth.unwrap().username, "user");
    }

    #[test]
    fn test_config_file_proxy_and_no_proxy() {
        let app_config = AppConfig {
            proxy: Some("http://proxy.local:8080".to_string()),
            ..Default::default()
        };
        let proxy = proxy_config(&parse(&[]), &app_config).unwrap().unwrap();
        assert_eq!(proxy.url, "http://proxy.local:8080");

        let args = parse(&["--no-proxy"]);
        assert!(proxy_config(&args, &app_config).unwrap().is_none());
        assert!(!engine_config(&args, &app_config).unwrap().http.use_system_proxy);
    }

    #[test]
    fn test_invalid_proxy_type() {
        let args = parse(&["--proxy", "http://p:1", "--proxy-type", "ftp"]);
        assert!(matches!(
            proxy_config(&args, &AppConfig::default()),
            Err(AppError::InvalidInput(_))
        ));
    }
}
