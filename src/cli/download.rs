use std::io::Write;
use std::path::PathBuf;

use crate::activity::render::ScrapeMetadata;
use crate::cli::output::print_warning;
use crate::error::StravaError;
use crate::session::Session;
use crate::types::{ActivityFile, DataFormat};

pub const STDOUT_LABEL: &str = "<stdout>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    /// Write files here; an empty path means the current directory.
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub ids: Vec<u64>,
    pub format: DataFormat,
    /// Name files `<id><ext>` instead of by activity title.
    pub by_number: bool,
    /// Skip the export endpoint and rebuild files from the activity page.
    pub scrape: bool,
    pub destination: Destination,
}

impl DownloadOptions {
    pub fn validate(&self) -> Result<(), StravaError> {
        if self.destination == Destination::Stdout && self.ids.len() != 1 {
            return Err(StravaError::Usage(
                "specify only one activity with -c/--stdout".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Where each downloaded activity went.
    pub written: Vec<String>,
    /// Activities that were not found.
    pub skipped: Vec<u64>,
}

/// Download activities one at a time, in order.
///
/// Missing activities are reported and skipped. Activities the export
/// endpoint refuses are scraped instead. Anything else aborts the batch.
pub async fn run_download<W: Write>(
    session: &Session,
    options: &DownloadOptions,
    stdout: &mut W,
) -> Result<DownloadReport, StravaError> {
    options.validate()?;
    let web = session.web()?;
    let mut report = DownloadReport::default();

    for &activity_id in &options.ids {
        let uri = session.endpoints().activity_page(activity_id);

        let mut downloaded = None;
        if !options.scrape {
            match web.get_activity_data(activity_id, options.format).await {
                Ok(file) => downloaded = Some(file),
                Err(StravaError::NotFound(_)) => {
                    print_warning(&format!("Activity {activity_id} not found (check {uri})."));
                    report.skipped.push(activity_id);
                    continue;
                }
                Err(StravaError::Forbidden(_)) => {
                    print_warning(&format!(
                        "Not allowed to download activity {activity_id}; switching to web-scrape."
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        let file = match downloaded {
            Some(file) => file,
            None => {
                let metadata = scrape_metadata(session, activity_id).await;
                match web
                    .scrape_activity_data(activity_id, options.format, &metadata)
                    .await
                {
                    Ok(file) => file,
                    Err(StravaError::NotFound(_)) => {
                        print_warning(&format!("Activity {activity_id} not found (check {uri})."));
                        report.skipped.push(activity_id);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let written = save(&file, activity_id, options, stdout)?;
        eprintln!("  Wrote {written} from {uri}");
        report.written.push(written);
    }

    Ok(report)
}

/// Title, start time and sport for a scraped file. The activity may belong
/// to someone else, so an API failure only loses metadata.
async fn scrape_metadata(session: &Session, activity_id: u64) -> ScrapeMetadata {
    match session
        .api
        .get_activity(&session.access_token, activity_id)
        .await
    {
        Ok(activity) => ScrapeMetadata {
            name: activity.name,
            start: activity.start_date,
            activity_type: activity.activity_type,
        },
        Err(e) => {
            tracing::debug!(activity_id, error = %e, "no API metadata for scraped activity");
            ScrapeMetadata::default()
        }
    }
}

fn save<W: Write>(
    file: &ActivityFile,
    activity_id: u64,
    options: &DownloadOptions,
    stdout: &mut W,
) -> Result<String, StravaError> {
    match &options.destination {
        Destination::Stdout => {
            stdout.write_all(&file.content)?;
            stdout.flush()?;
            Ok(STDOUT_LABEL.to_string())
        }
        Destination::Directory(dir) => {
            let name = if options.by_number {
                format!("{activity_id}{}", file.extension())
            } else {
                file.filename.clone()
            };
            let path = dir.join(name);
            std::fs::write(&path, &file.content)?;
            Ok(path.display().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(ids: Vec<u64>, destination: Destination) -> DownloadOptions {
        DownloadOptions {
            ids,
            format: DataFormat::Original,
            by_number: false,
            scrape: false,
            destination,
        }
    }

    #[test]
    fn stdout_takes_exactly_one_id() {
        assert!(options(vec![1], Destination::Stdout).validate().is_ok());
        let err = options(vec![1, 2], Destination::Stdout).validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(options(vec![1, 2], Destination::Directory(PathBuf::new()))
            .validate()
            .is_ok());
    }

    #[test]
    fn save_by_number_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(vec![77], Destination::Directory(dir.path().to_path_buf()));
        opts.by_number = true;
        let file = ActivityFile {
            filename: "Morning_Ride.fit".into(),
            content: b"FIT".to_vec(),
        };
        let written = save(&file, 77, &opts, &mut Vec::<u8>::new()).unwrap();
        assert!(written.ends_with("77.fit"));
        assert_eq!(std::fs::read(dir.path().join("77.fit")).unwrap(), b"FIT");
    }

    #[test]
    fn save_to_stdout_writes_raw_bytes() {
        let file = ActivityFile {
            filename: "x.gpx".into(),
            content: vec![0, 159, 146, 150],
        };
        let mut out: Vec<u8> = Vec::new();
        let written = save(&file, 1, &options(vec![1], Destination::Stdout), &mut out).unwrap();
        assert_eq!(written, STDOUT_LABEL);
        assert_eq!(out, vec![0, 159, 146, 150]);
    }
}
