use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const SNIFF_WINDOW: usize = 200;

/// Activity file formats Strava accepts for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ActivityFormat {
    Tcx,
    Gpx,
    Fit,
}

impl ActivityFormat {
    pub const ALL: [ActivityFormat; 3] = [ActivityFormat::Tcx, ActivityFormat::Gpx, ActivityFormat::Fit];

    pub fn extension(self) -> &'static str {
        match self {
            ActivityFormat::Tcx => ".tcx",
            ActivityFormat::Gpx => ".gpx",
            ActivityFormat::Fit => ".fit",
        }
    }

    /// Strava `data_type` for a gzip-compressed file of this format.
    pub fn gz_data_type(self) -> String {
        format!("{}.gz", &self.extension()[1..])
    }

    /// Match a lowercase extension such as `.gpx`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// Whether `content` (uncompressed) looks like this format.
    pub fn matches(self, content: &[u8]) -> bool {
        match self {
            ActivityFormat::Tcx => contains(head(content), b"<TrainingCenterDatabase"),
            ActivityFormat::Gpx => contains(head(content), b"<gpx"),
            ActivityFormat::Fit => content.get(8..12) == Some(b".FIT".as_slice()),
        }
    }

    /// First format whose signature matches `content`.
    pub fn sniff(content: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.matches(content))
    }

    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|f| f.extension())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn is_gzip(content: &[u8]) -> bool {
    content.starts_with(&GZIP_MAGIC)
}

/// Lowercased activity extension of `name` with any `.gz` stripped, so
/// `Run.GPX.gz` gives `.gpx`. Compression itself is judged by content.
pub fn extension_from_name(name: &Path) -> String {
    let ext = lower_ext(name);
    if ext == ".gz" {
        let inner = name.file_stem().map(Path::new).unwrap_or(Path::new(""));
        lower_ext(inner)
    } else {
        ext
    }
}

fn lower_ext(name: &Path) -> String {
    name.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn head(content: &[u8]) -> &[u8] {
    &content[..content.len().min(SNIFF_WINDOW)]
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
