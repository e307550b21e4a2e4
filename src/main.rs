use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use upload_harvester::{
    CaptchaConfig, Credentials, DownloadMode, SiteProfile, TwoCaptchaProvider, UploadHarvester,
};

const RULE: &str = "=============================";

#[derive(Parser)]
#[command(name = "upload-harvester")]
#[command(about = "Download every document uploaded to a SlideShare account")]
#[command(version)]
struct Cli {
    /// Account login
    #[arg(long, env = "SLIDESHARE_USERNAME")]
    username: Option<String>,

    /// Account password
    #[arg(long, env = "SLIDESHARE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory receiving downloads. Without it the run is a dry run.
    #[arg(long, env = "HARVEST_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// Record what would be downloaded even if a directory is set
    #[arg(long)]
    dry_run: bool,

    /// 2Captcha API key used to solve the login challenge
    #[arg(long, env = "TWOCAPTCHA_APIKEY", hide_env_values = true)]
    captcha_key: Option<String>,

    /// Seconds to wait for a captcha solution
    #[arg(long, default_value_t = 120)]
    captcha_timeout: u64,

    /// JSON file overriding the login URL and page locators
    #[arg(long)]
    site_profile: Option<PathBuf>,

    /// Stop after this many listing pages
    #[arg(long)]
    max_pages: Option<usize>,

    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    raw.parse()
        .map_err(|_| format!("unknown log level '{raw}' (off, error, warn, info, debug, trace)"))
}

fn init_logging(level: LevelFilter) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build();
    if let Err(err) = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("failed to initialise logging: {err}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let mut builder = UploadHarvester::builder();

    if let Some(path) = &cli.site_profile {
        match SiteProfile::from_json_file(path) {
            Ok(site) => builder = builder.with_site_profile(site),
            Err(err) => {
                log::error!("{err}");
                return ExitCode::FAILURE;
            }
        }
    }

    match cli.captcha_key.filter(|key| !key.is_empty()) {
        Some(key) => {
            let config = CaptchaConfig {
                timeout: std::time::Duration::from_secs(cli.captcha_timeout),
                ..CaptchaConfig::default()
            };
            builder =
                builder.with_captcha_provider(Arc::new(TwoCaptchaProvider::with_config(key, config)));
        }
        None => log::warn!("no captcha key configured; the login challenge cannot be solved"),
    }

    if let Some(max_pages) = cli.max_pages {
        builder = builder.with_max_pages(max_pages);
    }

    let credentials = Credentials {
        username: cli.username,
        password: cli.password,
    };
    let mode = if cli.dry_run {
        DownloadMode::DryRun
    } else {
        DownloadMode::from_target(cli.download_dir.filter(|dir| !dir.as_os_str().is_empty()))
    };

    let harvester = builder.build();
    let report = harvester.run(&credentials, &mode).await;

    match serde_json::to_string_pretty(report.records()) {
        Ok(json) => {
            println!("{RULE}");
            println!("{json}");
            println!("{RULE}");
        }
        Err(err) => log::error!("failed to render records: {err}"),
    }

    match report.error() {
        Some(err) => {
            log::error!("harvest stopped: {err}");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}
