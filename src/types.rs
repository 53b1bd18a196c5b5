use serde::{Deserialize, Serialize};

/// The authenticated athlete, as returned by `GET /athlete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

/// Summary of an activity, as returned by `GET /activities/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, rename = "type")]
    pub activity_type: Option<String>,
}

/// State of an upload, as returned by `POST /uploads` and `GET /uploads/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub id: u64,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub activity_id: Option<u64>,
}

/// Metadata and payload of a new upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Gzip-compressed activity file.
    pub data: Vec<u8>,
    pub file_name: String,
    /// Strava data type, e.g. `gpx.gz`.
    pub data_type: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub private: bool,
    pub activity_type: Option<String>,
}

/// Export formats offered by the website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DataFormat {
    Original,
    Tcx,
    Gpx,
}

impl DataFormat {
    /// Path suffix of the website export endpoint.
    pub fn export_suffix(self) -> &'static str {
        match self {
            DataFormat::Original => "export_original",
            DataFormat::Tcx => "export_tcx",
            DataFormat::Gpx => "export_gpx",
        }
    }

    /// Format to render when scraping; there is no "original" to scrape.
    pub fn for_scrape(self) -> DataFormat {
        match self {
            DataFormat::Original => DataFormat::Tcx,
            other => other,
        }
    }

    pub fn extension(self) -> Option<&'static str> {
        match self {
            DataFormat::Original => None,
            DataFormat::Tcx => Some(".tcx"),
            DataFormat::Gpx => Some(".gpx"),
        }
    }
}

/// A downloaded activity file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl ActivityFile {
    /// Extension of `filename` including the dot, or an empty string.
    pub fn extension(&self) -> &str {
        match self.filename.rfind('.') {
            Some(idx) if idx > 0 => &self.filename[idx..],
            _ => "",
        }
    }
}
