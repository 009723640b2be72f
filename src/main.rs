//! edgesync: publish a directory to S3 and invalidate what changed in
//! CloudFront.

use clap::{ArgAction, Parser};
use derive_more::Display;
use edgesync_cdn::CdnHandle;
use edgesync_cdn::backend::CloudFrontBackend;
use edgesync_config::Config;
use edgesync_engine::error::ErrorKind as SyncErrorKind;
use edgesync_engine::{Context, LogObserver, SyncOptions};
use edgesync_storage::StoreHandle;
use edgesync_storage::backend::{S3Backend, S3Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edgesync", version, about = "Sync a local directory to S3 and invalidate changed paths in CloudFront")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "EDGESYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Directory to publish, overriding `source` from the configuration
    #[arg(short, long)]
    source: Option<PathBuf>,
    /// Maximum number of concurrent uploads
    #[arg(long)]
    concurrency: Option<usize>,
    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,
    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

/// Why the process is exiting unsuccessfully; each maps to its own status.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
enum Failure {
    #[display("configuration")]
    Config,
    #[display("remote listing")]
    RemoteList,
    #[display("local read")]
    LocalRead,
    #[display("upload")]
    Upload,
    #[display("invalidation")]
    Invalidation,
}
impl Failure {
    fn status(self) -> u8 {
        match self {
            Self::Config => 2,
            Self::RemoteList => 3,
            Self::LocalRead => 4,
            Self::Upload => 5,
            Self::Invalidation => 6,
        }
    }
}
impl From<&SyncErrorKind> for Failure {
    fn from(kind: &SyncErrorKind) -> Self {
        match kind {
            SyncErrorKind::RemoteList => Self::RemoteList,
            SyncErrorKind::LocalRead(_) => Self::LocalRead,
            SyncErrorKind::Upload(_) => Self::Upload,
            SyncErrorKind::Invalidation => Self::Invalidation,
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn load_config(cli: &Cli) -> Result<Config, Failure> {
    let fail = |err: edgesync_config::error::Error| {
        tracing::error!("{err:?}");
        Failure::Config
    };
    let mut figment = Config::figment(cli.config.as_deref()).map_err(fail)?;
    if let Some(source) = &cli.source {
        figment = figment.merge(("source", source));
    }
    if let Some(concurrency) = cli.concurrency {
        figment = figment.merge(("upload.concurrency", concurrency));
    }
    Config::from_figment(figment).map_err(fail)
}

fn store(config: &Config) -> Result<StoreHandle, Failure> {
    let settings = S3Settings {
        bucket: config.store.bucket.clone(),
        prefix: config.store.prefix.clone(),
        region: config.store.region.clone(),
        endpoint: config.store.endpoint.clone(),
        key_id: config.store.key_id.clone(),
        key_secret: config.store.key_secret.clone(),
        max_attempts: config.store.max_attempts,
    };
    match S3Backend::new(format!("s3:{}", config.store.bucket), settings) {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(err) => {
            tracing::error!("{err:?}");
            Err(Failure::Config)
        },
    }
}

fn cdn(config: &Config) -> CdnHandle {
    let (key_id, key_secret) = config.cdn_credentials();
    Arc::new(CloudFrontBackend::new(&config.cdn.distribution_id, key_id, key_secret, config.cdn.max_attempts))
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let config = load_config(&cli)?;
    let store = store(&config)?;
    let cdn = cdn(&config);
    let options = SyncOptions::from(&config.upload);
    let ctx = Context { store: &store, cdn: &cdn, source: &config.source, options: &options, observer: &LogObserver };
    match edgesync_engine::sync(ctx).await {
        Ok(report) => {
            tracing::debug!(uploaded = report.uploaded.len(), invalidation = ?report.invalidation, "Finished");
            Ok(())
        },
        Err(err) => {
            let failure = Failure::from(&*err);
            tracing::error!(stage = %failure, "{err:?}");
            Err(failure)
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => ExitCode::from(failure.status()),
    }
}
