use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Deserialize;

use crate::error::StravaError;
use crate::types::DataFormat;

/// Activity details the streams endpoint does not carry.
#[derive(Debug, Clone, Default)]
pub struct ScrapeMetadata {
    pub name: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub activity_type: Option<String>,
}

/// Sample streams behind an activity page. `time` holds seconds since
/// the start; the other streams are indexed in step with it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityStreams {
    pub time: Vec<i64>,
    #[serde(default)]
    pub latlng: Vec<[f64; 2]>,
    #[serde(default)]
    pub altitude: Vec<f64>,
    #[serde(default)]
    pub distance: Vec<f64>,
    #[serde(default)]
    pub heartrate: Vec<u32>,
    #[serde(default)]
    pub cadence: Vec<u32>,
}

struct Sample {
    time: DateTime<Utc>,
    position: Option<[f64; 2]>,
    altitude: Option<f64>,
    distance: Option<f64>,
    heartrate: Option<u32>,
    cadence: Option<u32>,
}

/// Render scraped streams as a GPX or TCX document.
pub fn render_activity(
    activity_id: u64,
    metadata: &ScrapeMetadata,
    streams: &ActivityStreams,
    format: DataFormat,
) -> Result<String, StravaError> {
    if streams.time.is_empty() {
        return Err(StravaError::ProtocolError(format!(
            "activity {activity_id} has no time stream to rebuild a file from"
        )));
    }
    let start = metadata.start.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let samples = streams
        .time
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            let time = TimeDelta::try_seconds(*offset)
                .and_then(|delta| start.checked_add_signed(delta))
                .ok_or_else(|| {
                    StravaError::ProtocolError(format!(
                        "activity {activity_id} has an out-of-range time offset {offset}"
                    ))
                })?;
            Ok(Sample {
                time,
                position: streams.latlng.get(i).copied(),
                altitude: streams.altitude.get(i).copied(),
                distance: streams.distance.get(i).copied(),
                heartrate: streams.heartrate.get(i).copied(),
                cadence: streams.cadence.get(i).copied(),
            })
        })
        .collect::<Result<Vec<Sample>, StravaError>>()?;

    let name = metadata
        .name
        .clone()
        .unwrap_or_else(|| format!("Activity {activity_id}"));
    Ok(match format {
        DataFormat::Gpx => render_gpx(&name, metadata, start, &samples),
        DataFormat::Tcx | DataFormat::Original => render_tcx(metadata, start, &samples),
    })
}

fn render_gpx(name: &str, metadata: &ScrapeMetadata, start: DateTime<Utc>, samples: &[Sample]) -> String {
    let mut out = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<gpx version=\"1.1\" creator=\"stravacli\" xmlns=\"http://www.topografix.com/GPX/1/1\"",
        " xmlns:gpxtpx=\"http://www.garmin.com/xmlschemas/TrackPointExtension/v1\">\n",
    ));
    out.push_str(&format!(
        " <metadata><name>{}</name><time>{}</time></metadata>\n <trk>\n  <name>{}</name>\n",
        escape(name),
        timestamp(start),
        escape(name)
    ));
    if let Some(kind) = &metadata.activity_type {
        out.push_str(&format!("  <type>{}</type>\n", escape(kind)));
    }
    out.push_str("  <trkseg>\n");
    for sample in samples {
        // GPX track points cannot exist without a position.
        let Some([lat, lon]) = sample.position else {
            continue;
        };
        out.push_str(&format!("   <trkpt lat=\"{lat}\" lon=\"{lon}\">"));
        if let Some(ele) = sample.altitude {
            out.push_str(&format!("<ele>{ele}</ele>"));
        }
        out.push_str(&format!("<time>{}</time>", timestamp(sample.time)));
        if sample.heartrate.is_some() || sample.cadence.is_some() {
            out.push_str("<extensions><gpxtpx:TrackPointExtension>");
            if let Some(hr) = sample.heartrate {
                out.push_str(&format!("<gpxtpx:hr>{hr}</gpxtpx:hr>"));
            }
            if let Some(cad) = sample.cadence {
                out.push_str(&format!("<gpxtpx:cad>{cad}</gpxtpx:cad>"));
            }
            out.push_str("</gpxtpx:TrackPointExtension></extensions>");
        }
        out.push_str("</trkpt>\n");
    }
    out.push_str("  </trkseg>\n </trk>\n</gpx>\n");
    out
}

fn render_tcx(metadata: &ScrapeMetadata, start: DateTime<Utc>, samples: &[Sample]) -> String {
    let total_seconds = samples
        .last()
        .map(|s| (s.time - start).num_seconds())
        .unwrap_or(0);
    let total_distance = samples.iter().rev().find_map(|s| s.distance).unwrap_or(0.0);

    let mut out = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<TrainingCenterDatabase xmlns=\"http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2\">\n",
        " <Activities>\n",
    ));
    out.push_str(&format!(
        "  <Activity Sport=\"{}\">\n   <Id>{}</Id>\n   <Lap StartTime=\"{}\">\n",
        tcx_sport(metadata.activity_type.as_deref()),
        timestamp(start),
        timestamp(start)
    ));
    out.push_str(&format!(
        "    <TotalTimeSeconds>{total_seconds}</TotalTimeSeconds>\n    <DistanceMeters>{total_distance}</DistanceMeters>\n"
    ));
    out.push_str("    <Intensity>Active</Intensity>\n    <TriggerMethod>Manual</TriggerMethod>\n    <Track>\n");
    for sample in samples {
        out.push_str(&format!("     <Trackpoint><Time>{}</Time>", timestamp(sample.time)));
        if let Some([lat, lon]) = sample.position {
            out.push_str(&format!(
                "<Position><LatitudeDegrees>{lat}</LatitudeDegrees><LongitudeDegrees>{lon}</LongitudeDegrees></Position>"
            ));
        }
        if let Some(ele) = sample.altitude {
            out.push_str(&format!("<AltitudeMeters>{ele}</AltitudeMeters>"));
        }
        if let Some(dist) = sample.distance {
            out.push_str(&format!("<DistanceMeters>{dist}</DistanceMeters>"));
        }
        if let Some(hr) = sample.heartrate {
            out.push_str(&format!("<HeartRateBpm><Value>{hr}</Value></HeartRateBpm>"));
        }
        if let Some(cad) = sample.cadence {
            out.push_str(&format!("<Cadence>{cad}</Cadence>"));
        }
        out.push_str("</Trackpoint>\n");
    }
    out.push_str("    </Track>\n   </Lap>\n");
    if let Some(name) = &metadata.name {
        out.push_str(&format!("   <Notes>{}</Notes>\n", escape(name)));
    }
    out.push_str("  </Activity>\n </Activities>\n</TrainingCenterDatabase>\n");
    out
}

fn tcx_sport(activity_type: Option<&str>) -> &'static str {
    match activity_type {
        Some("Run") | Some("TrailRun") | Some("VirtualRun") => "Running",
        Some("Ride") | Some("VirtualRide") | Some("EBikeRide") | Some("GravelRide")
        | Some("MountainBikeRide") => "Biking",
        _ => "Other",
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::xml;
    use chrono::TimeZone;

    fn streams() -> ActivityStreams {
        serde_json::from_value(serde_json::json!({
            "time": [0, 10, 20],
            "latlng": [[47.6, -122.3], [47.601, -122.301], [47.602, -122.302]],
            "altitude": [10.0, 10.5, 11.0],
            "distance": [0.0, 12.5, 25.0],
            "heartrate": [120, 130, 140]
        }))
        .unwrap()
    }

    fn metadata() -> ScrapeMetadata {
        ScrapeMetadata {
            name: Some("Lunch <Run>".into()),
            start: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            activity_type: Some("Run".into()),
        }
    }

    #[test]
    fn gpx_has_points_times_and_escaped_name() {
        let gpx = render_activity(1, &metadata(), &streams(), DataFormat::Gpx).unwrap();
        assert!(gpx.contains("<trkpt lat=\"47.601\" lon=\"-122.301\"><ele>10.5</ele><time>2024-05-01T12:00:10Z</time>"));
        assert!(gpx.contains("<gpxtpx:hr>140</gpxtpx:hr>"));
        assert_eq!(
            xml::gpx_metadata(gpx.as_bytes()).title.as_deref(),
            Some("Lunch <Run>")
        );
    }

    #[test]
    fn tcx_has_lap_totals_and_sport() {
        let tcx = render_activity(1, &metadata(), &streams(), DataFormat::Tcx).unwrap();
        assert!(tcx.contains("<Activity Sport=\"Running\">"));
        assert!(tcx.contains("<TotalTimeSeconds>20</TotalTimeSeconds>"));
        assert!(tcx.contains("<DistanceMeters>25</DistanceMeters>"));
        assert!(tcx.contains("<HeartRateBpm><Value>130</Value></HeartRateBpm>"));
        assert_eq!(
            xml::tcx_metadata(tcx.as_bytes()).title.as_deref(),
            Some("Lunch <Run>")
        );
    }

    #[test]
    fn missing_start_falls_back_to_epoch() {
        let tcx = render_activity(7, &ScrapeMetadata::default(), &streams(), DataFormat::Original)
            .unwrap();
        assert!(tcx.contains("<Id>1970-01-01T00:00:00Z</Id>"));
        assert!(tcx.contains("Sport=\"Other\""));
    }

    #[test]
    fn gpx_skips_samples_without_position() {
        let indoor = ActivityStreams {
            time: vec![0, 1],
            ..ActivityStreams::default()
        };
        let gpx = render_activity(3, &ScrapeMetadata::default(), &indoor, DataFormat::Gpx).unwrap();
        assert!(!gpx.contains("<trkpt"));
        assert!(gpx.contains("<name>Activity 3</name>"));
    }

    #[test]
    fn empty_streams_are_rejected() {
        let err = render_activity(3, &ScrapeMetadata::default(), &ActivityStreams::default(), DataFormat::Gpx)
            .unwrap_err();
        assert_eq!(err.code(), "parse_error");
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let streams: ActivityStreams =
            serde_json::from_value(serde_json::json!({ "time": [0, i64::MAX] })).unwrap();
        let err = render_activity(1, &ScrapeMetadata::default(), &streams, DataFormat::Tcx)
            .unwrap_err();
        assert_eq!(err.code(), "parse_error");
        assert!(err.to_string().contains("out-of-range time offset"));
    }

    #[test]
    fn offset_past_last_representable_date_is_rejected() {
        let streams = ActivityStreams {
            // Fits in a TimeDelta but not in a DateTime once added.
            time: vec![0, 400_000 * 365 * 86_400],
            ..ActivityStreams::default()
        };
        let err = render_activity(1, &metadata(), &streams, DataFormat::Gpx).unwrap_err();
        assert_eq!(err.code(), "parse_error");
    }
}
