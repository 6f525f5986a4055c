use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use epg_weaver::{
    config::Config,
    database::Database,
    models::{
        GuideMapping, GuideSourceCreateRequest, GuideSourceUpdateRequest,
        OutputChannelCreateRequest,
    },
    pipeline::Pipeline,
};

#[derive(Parser)]
#[command(name = "epg-weaver")]
#[command(version = "0.1.0")]
#[command(about = "Builds one merged XMLTV guide for your channels from upstream EPG sources")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Data directory for cached downloads and the generated guide (overrides config file)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download and store guide sources
    Ingest {
        /// Only this source, even when disabled
        #[arg(long, value_name = "ID")]
        source: Option<Uuid>,
    },
    /// Fill missing programme metadata from the enabled providers
    Enrich,
    /// Write the merged guide and signal the guide server
    Build,
    /// Ingest, enrich, build and reload in one go
    Run,
    /// Manage guide sources
    Sources {
        #[command(subcommand)]
        command: SourceCommand,
    },
    /// List upstream channels declared by the ingested sources
    GuideChannels {
        #[arg(long, value_name = "ID")]
        source: Option<Uuid>,
    },
    /// Manage output channels
    Channels {
        #[command(subcommand)]
        command: ChannelCommand,
    },
}

#[derive(Subcommand)]
enum SourceCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        disabled: bool,
    },
    Update {
        id: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        disabled: bool,
    },
    /// Delete a source with its stored data and cached downloads
    Remove { id: Uuid },
}

#[derive(Subcommand)]
enum ChannelCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        number: i64,
        #[arg(long)]
        disabled: bool,
        #[arg(long, value_name = "MIME")]
        logo_mime: Option<String>,
        /// Guide source supplying programmes
        #[arg(long, value_name = "ID", requires = "guide_channel")]
        source: Option<Uuid>,
        /// Upstream channel id within the guide source
        #[arg(long, value_name = "CHANNEL", requires = "source")]
        guide_channel: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Replace a channel's tags
    Tags { id: Uuid, tags: Vec<String> },
    /// Change or clear a channel's guide mapping
    Map {
        id: Uuid,
        #[arg(long, value_name = "ID", requires = "guide_channel")]
        source: Option<Uuid>,
        #[arg(long, value_name = "CHANNEL", requires = "source")]
        guide_channel: Option<String>,
    },
    Remove { id: Uuid },
}

fn guide_mapping(source: Option<Uuid>, guide_channel: Option<String>) -> Option<GuideMapping> {
    match (source, guide_channel) {
        (Some(source_id), Some(channel_id)) => Some(GuideMapping {
            source_id,
            channel_id,
        }),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("epg_weaver={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EPG Weaver v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_path(data_dir);
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;

    let pipeline = Pipeline::from_config(database.clone(), &config)?;

    match cli.command {
        Command::Ingest { source: Some(id) } => {
            let source = database
                .get_guide_source(id)
                .await?
                .ok_or_else(|| anyhow!("guide source {id} not found"))?;
            let summary = pipeline.ingestor().ingest_source(&source).await?;
            println!(
                "{}: {} channels, {} programmes ({} orphaned)",
                source.name,
                summary.channel_count,
                summary.programme_count,
                summary.orphaned_programmes
            );
        }
        Command::Ingest { source: None } => {
            let report = pipeline.ingestor().ingest_all().await?;
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(summary) => println!(
                        "{}: {} channels, {} programmes ({} orphaned)",
                        outcome.source_name,
                        summary.channel_count,
                        summary.programme_count,
                        summary.orphaned_programmes
                    ),
                    Err(e) => println!("{}: failed: {}", outcome.source_name, e),
                }
            }
        }
        Command::Enrich => {
            let summary = pipeline.enrichment().enrich_output_channels(&database).await?;
            println!(
                "Enriched {} of {} candidate programmes across {} channels",
                summary.updated, summary.candidates, summary.channels
            );
        }
        Command::Build => {
            let (summary, reloaded) = pipeline.build_and_reload().await?;
            println!(
                "Wrote {} channels and {} programmes to {}{}",
                summary.channels,
                summary.programmes,
                pipeline.synthesizer().output_file().display(),
                if reloaded { "" } else { " (guide server not reloaded)" }
            );
        }
        Command::Run => {
            let report = pipeline.run().await?;
            println!(
                "Ingested {} sources ({} failed), enriched {} programmes, published {} channels with {} programmes",
                report.ingest.succeeded(),
                report.ingest.failed(),
                report.enrichment.updated,
                report.synthesis.channels,
                report.synthesis.programmes
            );
        }
        Command::Sources { command } => match command {
            SourceCommand::List => {
                for source in database.list_guide_sources().await? {
                    println!(
                        "{}\t{}\t{}\t{}",
                        source.id,
                        if source.enabled { "enabled" } else { "disabled" },
                        source.name,
                        source.url
                    );
                }
            }
            SourceCommand::Add {
                name,
                url,
                disabled,
            } => {
                let source = database
                    .create_guide_source(&GuideSourceCreateRequest {
                        name,
                        url,
                        enabled: !disabled,
                    })
                    .await?;
                println!("{}", source.id);
            }
            SourceCommand::Update {
                id,
                name,
                url,
                disabled,
            } => {
                database
                    .update_guide_source(
                        id,
                        &GuideSourceUpdateRequest {
                            name,
                            url,
                            enabled: !disabled,
                        },
                    )
                    .await?;
            }
            SourceCommand::Remove { id } => {
                if !pipeline.ingestor().delete_source(id).await? {
                    return Err(anyhow!("guide source {id} not found"));
                }
            }
        },
        Command::GuideChannels { source } => {
            let grouped = match source {
                Some(id) => {
                    let source = database
                        .get_guide_source(id)
                        .await?
                        .ok_or_else(|| anyhow!("guide source {id} not found"))?;
                    let channels = database.list_guide_channels(id).await?;
                    vec![(source, channels)]
                }
                None => database.list_all_guide_channels().await?,
            };
            for (source, channels) in grouped {
                for channel in channels {
                    println!(
                        "{}\t{}\t{}",
                        source.name,
                        channel.channel_id,
                        channel.display_name.unwrap_or_default()
                    );
                }
            }
        }
        Command::Channels { command } => match command {
            ChannelCommand::List => {
                for channel in database.list_output_channels().await? {
                    let guide = channel
                        .guide
                        .as_ref()
                        .map(|g| format!("{}:{}", g.source_id, g.channel_id))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        channel.id,
                        channel.number,
                        if channel.enabled { "enabled" } else { "disabled" },
                        channel.name,
                        guide,
                        channel.tags.join(",")
                    );
                }
            }
            ChannelCommand::Add {
                name,
                number,
                disabled,
                logo_mime,
                source,
                guide_channel,
                tags,
            } => {
                let channel = database
                    .create_output_channel(&OutputChannelCreateRequest {
                        name,
                        number,
                        enabled: !disabled,
                        logo_mime,
                        guide: guide_mapping(source, guide_channel),
                        tags,
                    })
                    .await?;
                println!("{}", channel.id);
            }
            ChannelCommand::Tags { id, tags } => {
                database.set_output_channel_tags(id, &tags).await?;
            }
            ChannelCommand::Map {
                id,
                source,
                guide_channel,
            } => {
                let mapping = guide_mapping(source, guide_channel);
                database
                    .set_output_channel_guide(id, mapping.as_ref())
                    .await?;
            }
            ChannelCommand::Remove { id } => {
                if !database.delete_output_channel(id).await? {
                    return Err(anyhow!("channel {id} not found"));
                }
            }
        },
    }

    Ok(())
}
