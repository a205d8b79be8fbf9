use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rdsbackup::backup::{self, RunOutcome};
use rdsbackup::config::{Config, Overrides, Settings};
use rdsbackup::context::RunContext;
use rdsbackup::locator;
use rdsbackup::rds::AwsRds;

#[derive(Parser)]
#[command(name = "rdsbackup", version)]
#[command(about = "Easy cross-region AWS RDS backups")]
#[command(
    after_help = "AWS Authentication:\n  Either use the -K and -S flags, or\n  set the AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables."
)]
struct Cli {
    /// RDS instance whose latest snapshot is copied
    db_instance_id: String,

    /// AWS region of source RDS instance [default: us-east-1]
    #[arg(short, long, value_name = "REGION")]
    source: Option<String>,

    /// AWS region to store backup RDS snapshot [default: us-west-1]
    #[arg(short, long, value_name = "REGION")]
    dest: Option<String>,

    /// AWS key ID
    #[arg(short = 'K', long, value_name = "KEYID", env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    awskey: Option<String>,

    /// AWS secret key
    #[arg(short = 'S', long, value_name = "SECRET", env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    awssecret: Option<String>,

    /// Purge oldest snapshots from dest region if more than COUNT exist (0 = never)
    #[arg(short, long, value_name = "COUNT")]
    purge: Option<usize>,

    /// Silence all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Config file (default: ./rdsbackup.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fail if the copy is not finished after this many seconds (default: wait forever)
    #[arg(long, value_name = "SECONDS")]
    max_wait: Option<u64>,

    /// Seconds between copy status checks [default: 10]
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "rdsbackup=error"
    } else {
        "rdsbackup=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let file = Config::load(cli.config.as_deref())?;
    let settings = Settings::resolve(
        Overrides {
            instance_id: cli.db_instance_id,
            source: cli.source,
            dest: cli.dest,
            access_key_id: cli.awskey,
            secret_access_key: cli.awssecret,
            purge: cli.purge,
            poll_interval: cli.poll_interval,
            max_wait: cli.max_wait,
        },
        file,
    )?;

    let api = AwsRds::connect(
        &settings.credentials,
        &[settings.source_region.as_str(), settings.dest_region.as_str()],
    )
    .await?;

    let account_id = locator::resolve_account_id(&api).await?;
    let ctx = RunContext::new(&settings, account_id);

    match backup::run(&api, &ctx).await? {
        RunOutcome::AlreadyCopied { copy_id } => {
            tracing::info!("Nothing to do: {} is already up to date.", copy_id);
        }
        RunOutcome::Completed {
            copy_id,
            status,
            purged,
        } => {
            tracing::info!(
                "Copy {} finished ({}), purged {} old snapshots.",
                copy_id,
                status,
                purged.len()
            );
        }
    }

    tracing::info!("All done!");
    Ok(())
}
