use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use stravacli::cli::download::{run_download, Destination, DownloadOptions};
use stravacli::cli::output::authorized_line;
use stravacli::config::env::OAUTH_TIMEOUT_ENV;
use stravacli::types::DataFormat;
use stravacli::{Session, SessionOptions, StravaError};

#[derive(Parser)]
#[command(name = "stravadown", version, about = "Downloads activities from Strava.")]
struct Cli {
    /// Activity IDs to download
    #[arg(required = true, value_name = "ID")]
    activities: Vec<u64>,

    /// Format in which to download activities
    #[arg(short = 't', long = "type", value_enum, ignore_case = true, default_value = "original")]
    format: DataFormat,

    /// Label activity files by number, rather than by their titles
    #[arg(short = 'N', long)]
    number: bool,

    /// Use the web-scrape method to download activities (allows downloading
    /// activities other than your own)
    #[arg(short = 's', long)]
    scrape: bool,

    /// Look for ACCESS_TOKEN in environment variable rather than ~/.stravacli
    #[arg(short = 'E', long)]
    env: bool,

    /// Give up waiting for the OAuth browser redirect after this many milliseconds
    #[arg(long, env = OAUTH_TIMEOUT_ENV)]
    oauth_timeout: Option<u64>,

    /// Write activity to standard output
    #[arg(short = 'c', long, conflicts_with = "directory")]
    stdout: bool,

    /// Directory in which to store activity files (default is current directory)
    #[arg(short = 'd', long)]
    directory: Option<PathBuf>,
}

impl Cli {
    fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            ids: self.activities.clone(),
            format: self.format,
            by_number: self.number,
            scrape: self.scrape,
            destination: if self.stdout {
                Destination::Stdout
            } else {
                Destination::Directory(self.directory.clone().unwrap_or_default())
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    stravacli::cli::init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        stravacli::cli::exit_with(e, Cli::command());
    }
}

async fn run(cli: Cli) -> Result<(), StravaError> {
    let options = cli.download_options();
    options.validate()?;

    let session =
        Session::connect(&SessionOptions::from_env(cli.env, true, cli.oauth_timeout)).await?;
    println!("{}", authorized_line(&session.athlete));

    let stdout = std::io::stdout();
    run_download(&session, &options, &mut stdout.lock()).await?;
    Ok(())
}
