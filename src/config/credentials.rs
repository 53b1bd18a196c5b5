use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::StravaError;

pub const API_SECTION: &str = "API";
pub const WEB_SECTION: &str = "Web";

pub const CLIENT_ID: &str = "CLIENT_ID";
pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const REFRESH_TOKEN: &str = "REFRESH_TOKEN";
pub const EMAIL: &str = "EMAIL";
pub const PASSWORD_B64: &str = "PASSWORD_B64";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Blank,
    Comment(String),
    Entry { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    lines: Vec<Line>,
}

impl Section {
    fn entry_mut(&mut self, key: &str) -> Option<&mut String> {
        self.lines.iter_mut().find_map(|line| match line {
            Line::Entry { key: k, value } if k.eq_ignore_ascii_case(key) => Some(value),
            _ => None,
        })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value } if k.eq_ignore_ascii_case(key) => Some(value.as_str()),
            _ => None,
        })
    }
}

/// INI-style credential file with `[section]` headers and `key = value` pairs.
///
/// Section names are case-sensitive, keys are not. Comments, unknown keys and
/// unknown sections survive a load/persist cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    preamble: Vec<Line>,
    sections: Vec<Section>,
    dirty: bool,
}

impl CredentialStore {
    /// Load the file at `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StravaError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no credentials file, starting empty");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(StravaError::ConfigError {
                    path: path.to_path_buf(),
                    detail: format!("Cannot read file: {e}"),
                })
            }
        };
        Self::parse(&content).map_err(|detail| StravaError::ConfigError {
            path: path.to_path_buf(),
            detail,
        })
    }

    pub fn parse(input: &str) -> Result<Self, String> {
        let mut store = Self::default();

        for (idx, raw) in input.lines().enumerate() {
            let lineno = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                store.push_line(Line::Blank);
                continue;
            }

            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                store.push_line(Line::Comment(trimmed.to_string()));
                continue;
            }

            // Indented lines continue the previous value
            if raw.starts_with(char::is_whitespace) {
                if let Some(Line::Entry { value, .. }) = store
                    .sections
                    .last_mut()
                    .and_then(|section| section.lines.last_mut())
                {
                    value.push('\n');
                    value.push_str(trimmed);
                    continue;
                }
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .ok_or_else(|| format!("line {lineno}: unterminated section header"))?
                    .trim();
                if name.is_empty() {
                    return Err(format!("line {lineno}: empty section name"));
                }
                if store.section(name).is_some() {
                    return Err(format!("line {lineno}: duplicate section '{name}'"));
                }
                store.sections.push(Section {
                    name: name.to_string(),
                    lines: Vec::new(),
                });
                continue;
            }

            let section = store
                .sections
                .last_mut()
                .ok_or_else(|| format!("line {lineno}: expected '[section]' before '{trimmed}'"))?;

            let sep = trimmed
                .find(['=', ':'])
                .ok_or_else(|| format!("line {lineno}: expected 'key = value'"))?;
            let key = trimmed[..sep].trim();
            let value = trimmed[sep + 1..].trim();
            if key.is_empty() {
                return Err(format!("line {lineno}: empty key"));
            }

            match section.entry_mut(key) {
                Some(existing) => *existing = value.to_string(),
                None => section.lines.push(Line::Entry {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
        }

        Ok(store)
    }

    /// Look up `key` in `section`. Never fails; absent keys are `None`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)
    }

    /// Set `key` in `section`, marking the store dirty only if the stored
    /// value actually changes. Returns whether it changed.
    pub fn set_if_changed(&mut self, section: &str, key: &str, value: &str) -> bool {
        if self.get(section, key) == Some(value) {
            return false;
        }

        let idx = match self.sections.iter().position(|s| s.name == section) {
            Some(idx) => idx,
            None => {
                if self.needs_separator() {
                    self.push_line(Line::Blank);
                }
                self.sections.push(Section {
                    name: section.to_string(),
                    lines: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        let target = &mut self.sections[idx];
        match target.entry_mut(key) {
            Some(existing) => *existing = value.to_string(),
            None => target.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
        self.dirty = true;
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the store to `path` if anything changed since it was loaded.
    ///
    /// The new content goes to a sibling temp file that is then renamed over
    /// the target, so readers see either the old or the new file. The temp
    /// file carries the permissions of the file it replaces; a new file is
    /// owner-only.
    pub fn persist_if_dirty(&mut self, path: &Path) -> Result<bool, StravaError> {
        if !self.dirty {
            return Ok(false);
        }

        let tmp = temp_path_for(path);
        if let Err(e) = write_private(&tmp, path, self.render().as_bytes())
            .and_then(|()| std::fs::rename(&tmp, path))
        {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        self.dirty = false;
        tracing::debug!(path = %path.display(), "credentials file written");
        Ok(true)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.preamble {
            render_line(&mut out, line);
        }
        for section in &self.sections {
            out.push_str(&format!("[{}]\n", section.name));
            for line in &section.lines {
                render_line(&mut out, line);
            }
        }
        out
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Comments and blank lines before the first header form the preamble.
    fn push_line(&mut self, line: Line) {
        match self.sections.last_mut() {
            Some(section) => section.lines.push(line),
            None => self.preamble.push(line),
        }
    }

    /// Whether a new section needs a blank line to set it apart.
    fn needs_separator(&self) -> bool {
        match self.sections.last() {
            Some(section) => !matches!(section.lines.last(), Some(Line::Blank)),
            None => !matches!(self.preamble.last(), None | Some(Line::Blank)),
        }
    }
}

fn render_line(out: &mut String, line: &Line) {
    match line {
        Line::Blank => {}
        Line::Comment(text) => out.push_str(text),
        Line::Entry { key, value } => {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&value.replace('\n', "\n\t"));
        }
    }
    out.push('\n');
}

/// Write `contents` to `tmp` with the permissions of `target`, or 0600 when
/// `target` does not exist yet.
fn write_private(tmp: &Path, target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    match std::fs::metadata(target) {
        Ok(meta) => std::fs::set_permissions(tmp, meta.permissions()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| ".stravacli".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Everything the authorization flow knows about the user's accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub web_email: Option<String>,
    pub web_password: Option<String>,
}

impl Credentials {
    /// Credentials consisting of a caller-supplied access token only.
    pub fn explicit(access_token: &str) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            ..Self::default()
        }
    }

    /// Read the `API` and `Web` sections. Empty values count as absent.
    pub fn from_store(store: &CredentialStore, path: &Path) -> Result<Self, StravaError> {
        let mut creds = Self::api_from_store(store);
        creds.read_web_section(store, path)?;
        Ok(creds)
    }

    fn api_from_store(store: &CredentialStore) -> Self {
        let field = |key| non_empty(store.get(API_SECTION, key));
        Self {
            client_id: field(CLIENT_ID),
            client_secret: field(CLIENT_SECRET),
            access_token: field(ACCESS_TOKEN),
            refresh_token: field(REFRESH_TOKEN),
            web_email: None,
            web_password: None,
        }
    }

    /// Fill in the website login from the `Web` section, decoding the
    /// base64 password.
    pub fn read_web_section(
        &mut self,
        store: &CredentialStore,
        path: &Path,
    ) -> Result<(), StravaError> {
        self.web_email = non_empty(store.get(WEB_SECTION, EMAIL));
        self.web_password = match non_empty(store.get(WEB_SECTION, PASSWORD_B64)) {
            Some(encoded) => {
                let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
                    StravaError::ConfigError {
                        path: path.to_path_buf(),
                        detail: format!("Web.PASSWORD_B64 is not valid base64: {e}"),
                    }
                })?;
                let password = String::from_utf8(bytes).map_err(|_| StravaError::ConfigError {
                    path: path.to_path_buf(),
                    detail: "Web.PASSWORD_B64 does not decode to UTF-8 text".into(),
                })?;
                Some(password)
            }
            None => None,
        };
        Ok(())
    }

    pub fn client_pair(&self) -> Option<(&str, &str)> {
        Some((self.client_id.as_deref()?, self.client_secret.as_deref()?))
    }

    pub fn web_login(&self) -> Option<(&str, &str)> {
        Some((self.web_email.as_deref()?, self.web_password.as_deref()?))
    }

    /// Copy the `API` fields into `store`. Returns whether anything changed.
    pub fn write_api_section(&self, store: &mut CredentialStore) -> bool {
        let fields = [
            (CLIENT_ID, &self.client_id),
            (CLIENT_SECRET, &self.client_secret),
            (ACCESS_TOKEN, &self.access_token),
            (REFRESH_TOKEN, &self.refresh_token),
        ];
        let mut changed = false;
        for (key, value) in fields {
            if let Some(value) = value {
                changed |= store.set_if_changed(API_SECTION, key, value);
            }
        }
        changed
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# personal Strava settings
[API]
CLIENT_ID = 1234
CLIENT_SECRET = s3cret
access_token = tok-old

[Web]
EMAIL = runner@example.com
PASSWORD_B64 = aHVudGVyMg==
; keep this
NOTE: hand-written
";

    #[test]
    fn parse_reads_sections_case_insensitive_keys() {
        let store = CredentialStore::parse(SAMPLE).unwrap();
        assert_eq!(store.get("API", "CLIENT_ID"), Some("1234"));
        assert_eq!(store.get("API", "ACCESS_TOKEN"), Some("tok-old"));
        assert_eq!(store.get("API", "refresh_token"), None);
        assert_eq!(store.get("Web", "note"), Some("hand-written"));
        assert_eq!(store.get("web", "EMAIL"), None);
        assert!(!store.is_dirty());
    }

    #[test]
    fn parse_rejects_key_outside_section() {
        let err = CredentialStore::parse("CLIENT_ID = 1\n").unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn parse_rejects_unterminated_header() {
        assert!(CredentialStore::parse("[API\n").is_err());
    }

    #[test]
    fn parse_joins_continuation_lines() {
        let store = CredentialStore::parse("[API]\nNOTES = first\n  second\n").unwrap();
        assert_eq!(store.get("API", "NOTES"), Some("first\nsecond"));
    }

    #[test]
    fn set_if_changed_only_marks_dirty_on_change() {
        let mut store = CredentialStore::parse(SAMPLE).unwrap();
        assert!(!store.set_if_changed("API", "ACCESS_TOKEN", "tok-old"));
        assert!(!store.is_dirty());
        assert!(store.set_if_changed("API", "ACCESS_TOKEN", "tok-new"));
        assert!(store.is_dirty());
        assert_eq!(store.get("API", "access_token"), Some("tok-new"));
    }

    #[test]
    fn set_if_changed_creates_missing_section() {
        let mut store = CredentialStore::default();
        assert!(store.set_if_changed("API", "REFRESH_TOKEN", "r1"));
        assert_eq!(store.get("API", "REFRESH_TOKEN"), Some("r1"));
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(&dir.path().join("absent")).unwrap();
        assert_eq!(store, CredentialStore::default());
    }

    #[test]
    fn persist_if_dirty_is_noop_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stravacli");
        std::fs::write(&path, SAMPLE).unwrap();
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let mut store = CredentialStore::load(&path).unwrap();
        store.set_if_changed("API", "CLIENT_ID", "1234");
        assert!(!store.persist_if_dirty(&path).unwrap());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE);
        let after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn persist_if_dirty_does_not_create_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stravacli");
        let mut store = CredentialStore::load(&path).unwrap();
        assert!(!store.persist_if_dirty(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn persist_keeps_unrelated_fields_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stravacli");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut store = CredentialStore::load(&path).unwrap();
        store.set_if_changed("API", "ACCESS_TOKEN", "tok-new");
        assert!(store.persist_if_dirty(&path).unwrap());
        assert!(!store.is_dirty());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("# personal Strava settings"));
        assert!(written.contains("; keep this"));
        assert!(written.contains("NOTE = hand-written"));
        assert!(written.contains("access_token = tok-new"));
        assert!(!dir.path().join(".stravacli.tmp").exists());
    }

    #[test]
    fn render_keeps_blank_lines_of_untouched_file() {
        let input = "# header\n\n[API]\nCLIENT_ID = 1\n\n\n[Web]\nEMAIL = a@b\n";
        let store = CredentialStore::parse(input).unwrap();
        assert_eq!(store.render(), input);
    }

    #[test]
    fn new_section_is_separated_by_one_blank_line() {
        let mut store = CredentialStore::parse("[Web]\nEMAIL = a@b\n").unwrap();
        store.set_if_changed("API", "ACCESS_TOKEN", "tok");
        assert_eq!(store.render(), "[Web]\nEMAIL = a@b\n\n[API]\nACCESS_TOKEN = tok\n");
    }

    #[cfg(unix)]
    #[test]
    fn persist_keeps_restrictive_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stravacli");
        std::fs::write(&path, SAMPLE).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let mut store = CredentialStore::load(&path).unwrap();
        store.set_if_changed("API", "ACCESS_TOKEN", "new");
        assert!(store.persist_if_dirty(&path).unwrap());

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn persist_keeps_custom_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stravacli");
        std::fs::write(&path, SAMPLE).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let mut store = CredentialStore::load(&path).unwrap();
        store.set_if_changed("API", "ACCESS_TOKEN", "new");
        store.persist_if_dirty(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn persist_creates_new_file_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stravacli");
        let mut store = CredentialStore::load(&path).unwrap();
        store.set_if_changed("API", "ACCESS_TOKEN", "new");
        store.persist_if_dirty(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn api_fields_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".stravacli");
        let creds = Credentials {
            client_id: Some("1234".into()),
            client_secret: Some("s3cret".into()),
            access_token: Some("acc".into()),
            refresh_token: Some("ref".into()),
            web_email: None,
            web_password: None,
        };

        let mut store = CredentialStore::load(&path).unwrap();
        assert!(creds.write_api_section(&mut store));
        store.persist_if_dirty(&path).unwrap();

        let reloaded = Credentials::from_store(&CredentialStore::load(&path).unwrap(), &path)
            .unwrap();
        assert_eq!(reloaded, creds);
    }

    #[test]
    fn web_password_is_base64_decoded() {
        let store = CredentialStore::parse(SAMPLE).unwrap();
        let creds = Credentials::from_store(&store, Path::new("/tmp/x")).unwrap();
        assert_eq!(creds.web_login(), Some(("runner@example.com", "hunter2")));
        assert_eq!(creds.client_pair(), Some(("1234", "s3cret")));
    }

    #[test]
    fn invalid_base64_password_is_config_error() {
        let store = CredentialStore::parse("[Web]\nEMAIL = a@b\nPASSWORD_B64 = !!!\n").unwrap();
        let err = Credentials::from_store(&store, Path::new("/tmp/x")).unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn empty_values_count_as_absent() {
        let store = CredentialStore::parse("[API]\nCLIENT_ID =\nCLIENT_SECRET = x\n").unwrap();
        let creds = Credentials::from_store(&store, Path::new("/tmp/x")).unwrap();
        assert_eq!(creds.client_id, None);
        assert_eq!(creds.client_pair(), None);
    }
}
