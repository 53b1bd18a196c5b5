pub mod compress;
pub mod detect;
pub mod render;
pub mod xml;

use std::path::Path;

use crate::error::StravaError;

pub use detect::ActivityFormat;
pub use xml::XmlMetadata;

pub const STDIN_LABEL: &str = "<stdin>";

/// An activity file read and typed, ready to be sent as a gzip upload.
#[derive(Debug, Clone)]
pub struct PreparedActivity {
    /// Where the data came from, for progress messages.
    pub label: String,
    pub format: ActivityFormat,
    /// Whether the input itself was gzip-compressed.
    pub gzipped_input: bool,
    content: Vec<u8>,
}

impl PreparedActivity {
    /// Type a file by its name (`.gz` stripped first) unless `forced`.
    pub fn from_file(
        path: &Path,
        data: Vec<u8>,
        forced: Option<ActivityFormat>,
    ) -> Result<Self, StravaError> {
        let format = match forced {
            Some(format) => format,
            None => {
                let extension = detect::extension_from_name(path);
                ActivityFormat::from_extension(&extension).ok_or_else(|| {
                    let shown = if extension.is_empty() {
                        "(none)".to_string()
                    } else {
                        extension
                    };
                    StravaError::Usage(format!(
                        "Don't know how to handle extension {shown} (allowed are {}).",
                        ActivityFormat::allowed_list()
                    ))
                })?
            }
        };
        Self::build(path.display().to_string(), format, data)
    }

    /// Type standard input by its content unless `forced`.
    pub fn from_stdin(data: Vec<u8>, forced: Option<ActivityFormat>) -> Result<Self, StravaError> {
        let gzipped = detect::is_gzip(&data);
        let content = if gzipped { compress::gunzip(&data)? } else { data };
        let format = match forced {
            Some(format) => format,
            None => ActivityFormat::sniff(&content).ok_or_else(|| {
                StravaError::Usage(format!("Could not determine file type of {STDIN_LABEL}"))
            })?,
        };
        Ok(Self {
            label: STDIN_LABEL.to_string(),
            format,
            gzipped_input: gzipped,
            content,
        })
    }

    fn build(label: String, format: ActivityFormat, data: Vec<u8>) -> Result<Self, StravaError> {
        let gzipped = detect::is_gzip(&data);
        let content = if gzipped { compress::gunzip(&data)? } else { data };
        Ok(Self {
            label,
            format,
            gzipped_input: gzipped,
            content,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.content.iter().all(u8::is_ascii_whitespace)
    }

    /// How the input was typed, e.g. `.gpx.gz`.
    pub fn kind_label(&self) -> String {
        let gz = if self.gzipped_input { ".gz" } else { "" };
        format!("{}{gz}", self.format.extension())
    }

    pub fn data_type(&self) -> String {
        self.format.gz_data_type()
    }

    /// Name sent along with the upload, which Strava keeps as `external_id`.
    pub fn upload_file_name(&self) -> String {
        let stem = Path::new(&self.label)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|_| self.label != STDIN_LABEL)
            .unwrap_or_else(|| format!("activity{}", self.format.extension()));
        if stem.to_ascii_lowercase().ends_with(".gz") {
            stem
        } else {
            format!("{stem}.gz")
        }
    }

    /// Gzip-compressed payload.
    pub fn compressed(&self) -> Result<Vec<u8>, StravaError> {
        compress::gzip(&self.content)
    }

    /// Title and description embedded in a GPX or TCX file; FIT carries none.
    pub fn xml_metadata(&self) -> XmlMetadata {
        match self.format {
            ActivityFormat::Gpx => xml::gpx_metadata(&self.content),
            ActivityFormat::Tcx => xml::tcx_metadata(&self.content),
            ActivityFormat::Fit => XmlMetadata::default(),
        }
    }
}
