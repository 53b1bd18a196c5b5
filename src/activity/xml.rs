/// Title and description embedded in a GPX or TCX file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// GPX `name` and `desc`, from the root element or its `metadata` child.
pub fn gpx_metadata(content: &[u8]) -> XmlMetadata {
    let doc = String::from_utf8_lossy(content);
    let field = |name: &str| {
        element_text(&doc, &[name]).or_else(|| element_text(&doc, &["metadata", name]))
    };
    XmlMetadata {
        title: field("name"),
        description: field("desc"),
    }
}

/// TCX `Activities/Activity/Notes`: the first line is the title, the rest
/// the description.
pub fn tcx_metadata(content: &[u8]) -> XmlMetadata {
    let doc = String::from_utf8_lossy(content);
    let Some(notes) = element_text(&doc, &["Activities", "Activity", "Notes"]) else {
        return XmlMetadata::default();
    };
    match notes.split_once('\n') {
        Some((title, rest)) => XmlMetadata {
            title: Some(title.trim().to_string()),
            description: Some(rest.trim().to_string()).filter(|d| !d.is_empty()),
        },
        None => XmlMetadata {
            title: Some(notes),
            description: None,
        },
    }
}

/// Text of the first element at `path` below the document root, matching
/// local names so namespace prefixes do not matter.
fn element_text(doc: &str, path: &[&str]) -> Option<String> {
    let mut stack: Vec<&str> = Vec::new();
    let mut rest = doc;

    while let Some(lt) = rest.find('<') {
        rest = &rest[lt..];

        if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map(|i| &after[i + 3..]).unwrap_or("");
            continue;
        }
        if let Some(after) = rest.strip_prefix("<![CDATA[") {
            rest = after.find("]]>").map(|i| &after[i + 3..]).unwrap_or("");
            continue;
        }
        if rest.starts_with("<?") || rest.starts_with("<!") {
            rest = rest.find('>').map(|i| &rest[i + 1..]).unwrap_or("");
            continue;
        }

        let end = rest.find('>')?;
        let tag = &rest[1..end];
        rest = &rest[end + 1..];

        if tag.starts_with('/') {
            stack.pop();
            continue;
        }

        let self_closing = tag.ends_with('/');
        stack.push(local_name(tag));
        if stack.len() == path.len() + 1 && stack[1..] == *path {
            if self_closing {
                return None;
            }
            let text = collect_text(rest);
            return Some(text.trim().to_string()).filter(|t| !t.is_empty());
        }
        if self_closing {
            stack.pop();
        }
    }
    None
}

fn local_name(tag: &str) -> &str {
    let name = tag
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default();
    name.rsplit(':').next().unwrap_or(name)
}

/// Character data up to the next child or closing tag.
fn collect_text(mut rest: &str) -> String {
    let mut text = String::new();
    loop {
        if let Some(after) = rest.strip_prefix("<![CDATA[") {
            let end = after.find("]]>").unwrap_or(after.len());
            text.push_str(&after[..end]);
            rest = after.get(end + 3..).unwrap_or("");
            continue;
        }
        if rest.is_empty() || rest.starts_with('<') {
            break;
        }
        let end = rest.find('<').unwrap_or(rest.len());
        text.push_str(&unescape(&rest[..end]));
        rest = &rest[end..];
    }
    text
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPX_10: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.0" xmlns="http://www.topografix.com/GPX/1/0">
  <!-- <name>not this</name> -->
  <name>Morning &amp; Evening Ride</name>
  <desc><![CDATA[Windy <really>]]></desc>
  <trk><name>Track name</name></trk>
</gpx>"#;

    const GPX_11: &str = r#"<?xml version="1.0"?>
<gpx version="1.1"><metadata><name>Lakeside loop</name></metadata><trk><name>ignored</name></trk></gpx>"#;

    const TCX: &str = r#"<?xml version="1.0"?>
<tcx:TrainingCenterDatabase xmlns:tcx="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
 <tcx:Activities>
  <tcx:Activity Sport="Running">
   <tcx:Id>2024-05-01T12:00:00Z</tcx:Id>
   <tcx:Lap StartTime="2024-05-01T12:00:00Z"/>
   <tcx:Notes>Tempo run
Felt strong
negative split</tcx:Notes>
  </tcx:Activity>
 </tcx:Activities>
</tcx:TrainingCenterDatabase>"#;

    #[test]
    fn gpx_root_name_and_desc() {
        let meta = gpx_metadata(GPX_10.as_bytes());
        assert_eq!(meta.title.as_deref(), Some("Morning & Evening Ride"));
        assert_eq!(meta.description.as_deref(), Some("Windy <really>"));
    }

    #[test]
    fn gpx_metadata_name_fallback() {
        let meta = gpx_metadata(GPX_11.as_bytes());
        assert_eq!(meta.title.as_deref(), Some("Lakeside loop"));
        assert_eq!(meta.description, None);
    }

    #[test]
    fn tcx_notes_split_into_title_and_description() {
        let meta = tcx_metadata(TCX.as_bytes());
        assert_eq!(meta.title.as_deref(), Some("Tempo run"));
        assert_eq!(meta.description.as_deref(), Some("Felt strong\nnegative split"));
    }

    #[test]
    fn tcx_without_notes() {
        let meta = tcx_metadata(b"<TrainingCenterDatabase><Activities/></TrainingCenterDatabase>");
        assert_eq!(meta, XmlMetadata::default());
    }

    #[test]
    fn unescape_numeric_entities() {
        assert_eq!(unescape("caf&#233; &#x41;&bogus; & x"), "caf\u{e9} A&bogus; & x");
    }
}
