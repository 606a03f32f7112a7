use anyhow::Result;
use bike_image_uploader::app::App;
use bike_image_uploader::models::{ImageReference, UploadResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "bike-image-uploader")]
#[command(about = "Upload bike photos to object storage")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload one or more images for a bike.
    Upload {
        entity_id: String,
        /// Local paths, file:// URIs or http(s) URLs.
        #[arg(required = true, value_name = "REFERENCE")]
        references: Vec<String>,
    },
    /// Upload a file containing base64 image data.
    UploadBase64 { entity_id: String, file: PathBuf },
    /// List the public URLs stored for a bike.
    List { entity_id: String },
    /// Delete an image by its public URL.
    Delete { url: String },
    /// Check that the configured bucket is visible.
    CheckBucket,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(app: &App, command: Command) -> Result<bool> {
    match command {
        Command::Upload {
            entity_id,
            references,
        } => {
            if let [single] = references.as_slice() {
                let result = app.upload(&ImageReference::new(single.as_str()), &entity_id).await;
                print_json(&result)?;
                return Ok(result.is_success());
            }
            let outcome = app.upload_references(&entity_id, &references).await;
            print_json(&outcome)?;
            Ok(outcome.urls.len() == references.len())
        }
        Command::UploadBase64 { entity_id, file } => {
            let result = app.upload_base64_file(&entity_id, &file).await?;
            print_json(&result)?;
            Ok(matches!(result, UploadResult::Success(_)))
        }
        Command::List { entity_id } => {
            print_json(&app.list(&entity_id).await?)?;
            Ok(true)
        }
        Command::Delete { url } => {
            app.delete(&url).await?;
            info!("Deleted {}", url);
            Ok(true)
        }
        Command::CheckBucket => match app.check_bucket().await {
            Some(warning) => {
                print_json(&warning)?;
                Ok(false)
            }
            None => Ok(true),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bike_image_uploader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let app = match App::new().await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    match execute(&app, args.command).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(2),
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}
