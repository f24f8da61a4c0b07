use anyhow::Result;
use clap::Parser;
use heic2jpg::codec::JpegCodec;
use heic2jpg::ledger::ConversionLedger;
use heic2jpg::models::{Config, ConversionOptions};
use heic2jpg::pipeline::{ConversionPipeline, PipelineServices};
use heic2jpg::store::{Authenticator, DriveClient};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "heic2jpg")]
#[command(about = "Convert HEIC files from Google Drive to compressed JPG files")]
struct CliArgs {
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JPG quality (1-100)
    #[arg(short, long, value_parser = parse_quality)]
    quality: Option<u32>,

    /// Maximum width in pixels
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum height in pixels
    #[arg(long)]
    max_height: Option<u32>,

    /// Google Drive folder ID to process
    #[arg(long)]
    folder_id: Option<String>,

    /// Google API OAuth client credentials file
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Conversion ledger file
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Offer to delete the original HEIC files after converting them
    #[arg(long)]
    delete_originals: bool,

    /// Delete originals without asking for confirmation
    #[arg(short, long, requires = "delete_originals")]
    yes: bool,
}

fn parse_quality(input: &str) -> std::result::Result<u32, String> {
    let quality: u32 = input
        .parse()
        .map_err(|_| format!("Invalid quality '{}'. Expected a number from 1 to 100", input))?;
    if (1..=100).contains(&quality) {
        Ok(quality)
    } else {
        Err(format!("Quality {} is out of range. Expected 1 to 100", quality))
    }
}

fn confirm_deletion(file_count: usize) -> io::Result<bool> {
    if file_count == 0 {
        return Ok(false);
    }

    println!(
        "\n{} HEIC files have been successfully converted to JPG.",
        file_count
    );
    print!("Do you want to delete the original HEIC files from Google Drive? (y/N): ");
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().lock().read_line(&mut response)?;
    Ok(is_affirmative(&response))
}

fn is_affirmative(response: &str) -> bool {
    matches!(response.trim().to_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heic2jpg=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    let config = Config::from_env();

    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| config.default_output_dir.clone());
    let options = match ConversionOptions::new(
        args.quality.unwrap_or(config.default_quality),
        args.max_width.unwrap_or(config.default_max_width),
        args.max_height.unwrap_or(config.default_max_height),
        output_dir,
        args.folder_id.clone(),
    ) {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Starting heic2jpg");

    match run(&args, &config, &options).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Conversion failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: &CliArgs, config: &Config, options: &ConversionOptions) -> Result<()> {
    let ledger_path = args
        .ledger
        .clone()
        .unwrap_or_else(|| config.ledger_path(options.output_dir()));
    let ledger = ConversionLedger::open(&ledger_path)?;

    let credentials = args
        .credentials
        .clone()
        .unwrap_or_else(|| config.credentials_file.clone());
    let auth = Authenticator::new(credentials, config.token_file.clone());
    let drive = DriveClient::connect(auth).await?;

    let mut pipeline = ConversionPipeline::with_services(
        PipelineServices {
            store: Box::new(drive),
            codec: Box::new(JpegCodec::new()),
        },
        ledger,
    );

    let report = pipeline.run(options).await?;
    println!("{}", report);

    if args.delete_originals && report.converted > 0 {
        let confirmed = args.yes || confirm_deletion(report.converted)?;
        if confirmed {
            let deleted = pipeline.delete_originals(&report).await;
            println!("Deleted {} original HEIC files from Google Drive", deleted);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quality_valid() {
        assert_eq!(parse_quality("85").unwrap(), 85);
        assert_eq!(parse_quality("1").unwrap(), 1);
        assert_eq!(parse_quality("100").unwrap(), 100);
    }

    #[test]
    fn test_parse_quality_out_of_range() {
        assert!(parse_quality("0").unwrap_err().contains("out of range"));
        assert!(parse_quality("101").unwrap_err().contains("out of range"));
        assert!(parse_quality("-5").is_err());
        assert!(parse_quality("high").is_err());
    }

    #[test]
    fn test_cli_defaults_are_unset() {
        let args = CliArgs::try_parse_from(["heic2jpg"]).unwrap();
        assert!(args.output.is_none());
        assert!(args.quality.is_none());
        assert!(!args.delete_originals);
    }

    #[test]
    fn test_cli_flags() {
        let args = CliArgs::try_parse_from([
            "heic2jpg",
            "-o",
            "blog",
            "-q",
            "70",
            "--max-width",
            "1600",
            "--max-height",
            "900",
            "--folder-id",
            "abc123",
            "--delete-originals",
            "--yes",
        ])
        .unwrap();

        assert_eq!(args.output, Some(PathBuf::from("blog")));
        assert_eq!(args.quality, Some(70));
        assert_eq!(args.max_width, Some(1600));
        assert_eq!(args.max_height, Some(900));
        assert_eq!(args.folder_id.as_deref(), Some("abc123"));
        assert!(args.delete_originals && args.yes);
    }

    #[test]
    fn test_cli_rejects_invalid_quality() {
        assert!(CliArgs::try_parse_from(["heic2jpg", "--quality", "150"]).is_err());
    }

    #[test]
    fn test_yes_requires_delete_originals() {
        assert!(CliArgs::try_parse_from(["heic2jpg", "--yes"]).is_err());
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }
}
