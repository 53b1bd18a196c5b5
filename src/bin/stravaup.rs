use std::path::PathBuf;

use clap::{ArgGroup, CommandFactory, Parser};

use stravacli::activity::ActivityFormat;
use stravacli::cli::output::authorized_line;
use stravacli::cli::upload::{prepare_uploads, run_upload, UploadInput, UploadOptions};
use stravacli::config::env::OAUTH_TIMEOUT_ENV;
use stravacli::oauth::SystemBrowser;
use stravacli::{Session, SessionOptions, StravaError};

#[derive(Parser)]
#[command(name = "stravaup", version, about = "Uploads activities to Strava.")]
#[command(group(ArgGroup::new("input").required(true).args(["activities", "stdin"])))]
struct Cli {
    /// Activity files to upload (plain or gzipped .tcx, .gpx, .fit)
    #[arg(value_name = "FILE")]
    activities: Vec<PathBuf>,

    /// Read activity file from standard input
    #[arg(short = 'c', long)]
    stdin: bool,

    /// Don't browse to activities after upload
    #[arg(short = 'P', long)]
    no_popup: bool,

    /// Look for ACCESS_TOKEN in environment variable rather than ~/.stravacli
    #[arg(short = 'E', long)]
    env: bool,

    /// Give up waiting for the OAuth browser redirect after this many milliseconds
    #[arg(long, env = OAUTH_TIMEOUT_ENV)]
    oauth_timeout: Option<u64>,

    /// Make activities private
    #[arg(short = 'p', long, help_heading = "Activity file details")]
    private: bool,

    /// Force files to be interpreted as being of given type (default is to
    /// autodetect based on name, or contents for stdin)
    #[arg(short = 't', long = "type", value_enum, help_heading = "Activity file details")]
    format: Option<ActivityFormat>,

    /// Parse name/description fields from GPX and TCX files
    #[arg(
        short = 'x',
        long,
        conflicts_with_all = ["title", "desc"],
        help_heading = "Activity file details"
    )]
    xml_desc: bool,

    /// Activity title
    #[arg(short = 'T', long, help_heading = "Activity file details")]
    title: Option<String>,

    /// Activity description
    #[arg(short = 'D', long, help_heading = "Activity file details")]
    desc: Option<String>,

    /// Type of activity, e.g. ride, run, swim, hike, walk (default is taken
    /// from the user profile)
    #[arg(short = 'A', long, help_heading = "Activity file details")]
    activity_type: Option<String>,
}

impl Cli {
    fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            input: if self.stdin {
                UploadInput::Stdin
            } else {
                UploadInput::Files(self.activities.clone())
            },
            forced_format: self.format,
            private: self.private,
            xml_desc: self.xml_desc,
            title: self.title.clone(),
            description: self.desc.clone(),
            activity_type: self.activity_type.clone(),
            popup: !self.no_popup,
            ..UploadOptions::default()
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
    let options = cli.upload_options();
    let activities = prepare_uploads(&options, std::io::stdin().lock())?;

    let session =
        Session::connect(&SessionOptions::from_env(cli.env, false, cli.oauth_timeout)).await?;
    println!("{}", authorized_line(&session.athlete));

    run_upload(&session, activities, &options, &SystemBrowser).await?;
    Ok(())
}
