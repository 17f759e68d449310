use std::{io, path::PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    features::{entities::GroupId, export::write_features_csv},
    import::{
        session::ImportSession,
        source::{FsFileSource, SourceHandle},
    },
    storage::feature_store::{FeatureStore, FileFeatureStore},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "tngimport", version, long_about = None)]
#[command(about = "Bulk import of Track & Graph features from CSV files", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default uses $XDG_DATA_HOME/tngimport or $HOME/.local/share/tngimport"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Create the features described by a CSV file. Nothing is created if any row is invalid")]
    Import {
        #[arg(long, short, help = "Group receiving the features")]
        group: GroupId,
        #[arg(help = "CSV file with a header containing at least name and type columns")]
        file: PathBuf,
    },
    #[command(about = "Write the features of a group as CSV")]
    Export {
        #[arg(long, short)]
        group: GroupId,
        #[arg(help = "Output file. Prints to stdout when omitted")]
        file: Option<PathBuf>,
    },
    #[command(about = "Show the features of a group")]
    List {
        #[arg(long, short)]
        group: GroupId,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args
        .dir
        .map_or_else(create_application_default_path, Ok)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir.join("logs"), logging_level, args.log)?;

    let store = FileFeatureStore::new(app_dir.join("features"))?;

    match args.commands {
        Commands::Import { group, file } => import(store, group, file).await,
        Commands::Export { group, file } => {
            let features = store.features_in(group).await?;
            match file {
                Some(path) => write_features_csv(&features, std::fs::File::create(path)?),
                None => write_features_csv(&features, io::stdout().lock()),
            }
        }
        Commands::List { group } => {
            for feature in store.features_in(group).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    feature.display_index,
                    feature.name,
                    feature.feature_type,
                    feature
                        .default_value
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

async fn import(store: FileFeatureStore, group: GroupId, file: PathBuf) -> Result<()> {
    let session = ImportSession::new(store, FsFileSource);
    session.set_source(SourceHandle::new(file));
    session.begin_import(group);

    match session.wait_until_done().await {
        Some(Ok(summary)) => {
            info!("Import finished {summary:?}");
            println!(
                "Imported {} features into group {}",
                summary.imported, summary.group_id
            );
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow!("Import did not start")),
    }
}
