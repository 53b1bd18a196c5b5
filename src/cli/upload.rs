use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use crate::activity::{ActivityFormat, PreparedActivity};
use crate::api::rest::{UPLOAD_POLL_INTERVAL, UPLOAD_WAIT_LIMIT};
use crate::cli::output::uploaded_line;
use crate::error::StravaError;
use crate::oauth::BrowserLauncher;
use crate::session::Session;
use crate::types::UploadRequest;

/// Where activities to upload come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadInput {
    Files(Vec<PathBuf>),
    Stdin,
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub input: UploadInput,
    pub forced_format: Option<ActivityFormat>,
    pub private: bool,
    /// Take title and description from the GPX/TCX file itself.
    pub xml_desc: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub activity_type: Option<String>,
    pub popup: bool,
    pub poll_interval: Duration,
    pub wait_limit: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            input: UploadInput::Stdin,
            forced_format: None,
            private: false,
            xml_desc: false,
            title: None,
            description: None,
            activity_type: None,
            popup: true,
            poll_interval: UPLOAD_POLL_INTERVAL,
            wait_limit: UPLOAD_WAIT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { activity_id: u64 },
    Duplicate { activity_id: u64 },
    Empty,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    /// Input label and what became of it, in input order.
    pub outcomes: Vec<(String, UploadOutcome)>,
}

/// Read and type every input up front, so a bad file name or undetectable
/// stdin is a usage error before anything is uploaded.
pub fn prepare_uploads<R: Read>(
    options: &UploadOptions,
    mut stdin: R,
) -> Result<Vec<PreparedActivity>, StravaError> {
    match &options.input {
        UploadInput::Stdin => {
            let mut data = Vec::new();
            stdin.read_to_end(&mut data)?;
            Ok(vec![PreparedActivity::from_stdin(data, options.forced_format)?])
        }
        UploadInput::Files(paths) => paths
            .iter()
            .map(|path| {
                let data = std::fs::read(path).map_err(|e| {
                    StravaError::Usage(format!("can't open '{}': {e}", path.display()))
                })?;
                PreparedActivity::from_file(path, data, options.forced_format)
            })
            .collect(),
    }
}

/// Upload activities one at a time, in order.
///
/// Duplicates and empty files are reported and skipped; any other upload
/// failure aborts the batch.
pub async fn run_upload(
    session: &Session,
    activities: Vec<PreparedActivity>,
    options: &UploadOptions,
    browser: &dyn BrowserLauncher,
) -> Result<UploadReport, StravaError> {
    let mut report = UploadReport::default();

    for activity in activities {
        println!(
            "Uploading {} activity from {}...",
            activity.kind_label(),
            activity.label
        );
        if activity.is_empty() {
            println!("  ({} is empty, ignored)", activity.label);
            report.outcomes.push((activity.label, UploadOutcome::Empty));
            continue;
        }

        let outcome = match upload_one(session, &activity, options).await {
            Ok(activity_id) => UploadOutcome::Uploaded { activity_id },
            Err(StravaError::UploadFailed(msg)) => {
                if let Some(existing) = parse_duplicate_of(&msg) {
                    let found = session.api.get_activity(&session.access_token, existing).await?;
                    UploadOutcome::Duplicate {
                        activity_id: found.id,
                    }
                } else if msg.starts_with("The file is empty") {
                    println!("  ({} is empty, ignored)", activity.label);
                    UploadOutcome::Empty
                } else {
                    return Err(StravaError::UploadFailed(msg));
                }
            }
            Err(e) => return Err(e),
        };

        let (activity_id, duplicate) = match outcome {
            UploadOutcome::Uploaded { activity_id } => (activity_id, false),
            UploadOutcome::Duplicate { activity_id } => (activity_id, true),
            UploadOutcome::Empty => {
                report.outcomes.push((activity.label, outcome));
                continue;
            }
        };
        let uri = session.endpoints().activity_page(activity_id);
        eprintln!("{}", uploaded_line(&uri, duplicate));
        if options.popup {
            browser.open(&uri);
        }
        report.outcomes.push((activity.label, outcome));
    }

    Ok(report)
}

async fn upload_one(
    session: &Session,
    activity: &PreparedActivity,
    options: &UploadOptions,
) -> Result<u64, StravaError> {
    let (name, description) = if options.xml_desc {
        let meta = activity.xml_metadata();
        (meta.title, meta.description)
    } else {
        (options.title.clone(), options.description.clone())
    };
    let request = UploadRequest {
        data: activity.compressed()?,
        file_name: activity.upload_file_name(),
        data_type: activity.data_type(),
        name,
        description,
        private: options.private,
        activity_type: options.activity_type.clone(),
    };
    tracing::debug!(file = %request.file_name, data_type = %request.data_type, "uploading");

    let status = session
        .api
        .upload_activity(&session.access_token, request)
        .await?;
    session
        .api
        .wait_for_upload(
            &session.access_token,
            status,
            options.poll_interval,
            options.wait_limit,
        )
        .await
}

/// The existing activity id in a Strava "... duplicate of activity N"
/// upload error.
pub fn parse_duplicate_of(msg: &str) -> Option<u64> {
    let words: Vec<&str> = msg.split_whitespace().collect();
    let [.., a, b, c, id] = words.as_slice() else {
        return None;
    };
    if [*a, *b, *c] != ["duplicate", "of", "activity"] {
        return None;
    }
    id.trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn duplicate_message_parsing() {
        assert_eq!(
            parse_duplicate_of("ride.gpx.gz duplicate of activity 1234567"),
            Some(1234567)
        );
        assert_eq!(parse_duplicate_of("duplicate of activity 99."), Some(99));
        assert_eq!(parse_duplicate_of("The file is empty."), None);
        assert_eq!(parse_duplicate_of("duplicate of activity"), None);
        assert_eq!(parse_duplicate_of("not a duplicate of run 5"), None);
    }

    #[test]
    fn stdin_input_is_sniffed() {
        let options = UploadOptions::default();
        let prepared = prepare_uploads(&options, Cursor::new(b"<gpx></gpx>".to_vec())).unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].format, ActivityFormat::Gpx);
    }

    #[test]
    fn missing_file_is_usage_error() {
        let options = UploadOptions {
            input: UploadInput::Files(vec![PathBuf::from("/nonexistent/ride.gpx")]),
            ..UploadOptions::default()
        };
        let err = prepare_uploads(&options, std::io::empty()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("can't open '/nonexistent/ride.gpx'"));
    }

    #[test]
    fn files_prepared_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.gpx");
        let second = dir.path().join("b.tcx");
        std::fs::write(&first, "<gpx></gpx>").unwrap();
        std::fs::write(&second, "<TrainingCenterDatabase/>").unwrap();
        let options = UploadOptions {
            input: UploadInput::Files(vec![first, second]),
            ..UploadOptions::default()
        };
        let prepared = prepare_uploads(&options, std::io::empty()).unwrap();
        let formats: Vec<_> = prepared.iter().map(|p| p.format).collect();
        assert_eq!(formats, vec![ActivityFormat::Gpx, ActivityFormat::Tcx]);
    }
}
