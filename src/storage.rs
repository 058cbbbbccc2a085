use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TripResult;
use crate::trip::{TrackPoint, TripState, Waypoint};

/// Output format for a recorded track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Kml,
    Gpx,
}

impl ExportFormat {
    /// Guess from a file extension, case-insensitive
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(ExportFormat::Json),
            "kml" | "kmz" => Some(ExportFormat::Kml),
            "gpx" => Some(ExportFormat::Gpx),
            _ => None,
        }
    }
}

/// Recorded track and waypoints, ready to serialize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackExport {
    pub exported_at: DateTime<Utc>,
    pub trip_a_meters: f64,
    pub trip_b_meters: f64,
    pub track: Vec<TrackPoint>,
    pub waypoints: Vec<Waypoint>,
}

impl TrackExport {
    pub fn new(track: &[TrackPoint], waypoints: &[Waypoint], trips: &TripState) -> Self {
        TrackExport {
            exported_at: Utc::now(),
            trip_a_meters: trips.trip_a,
            trip_b_meters: trips.trip_b,
            track: track.to_vec(),
            waypoints: waypoints.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// KML document: the track as one tessellated line, each waypoint as a
    /// point placemark named by its label
    pub fn to_kml(&self) -> String {
        let line = self
            .track
            .iter()
            .map(|p| format!("{},{},0", p.longitude, p.latitude))
            .collect::<Vec<_>>()
            .join(" ");

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n");
        xml.push_str("  <Document>\n");
        xml.push_str("    <Placemark>\n");
        xml.push_str("      <LineString>\n");
        xml.push_str("        <tessellate>1</tessellate>\n");
        xml.push_str(&format!("        <coordinates>{}</coordinates>\n", line));
        xml.push_str("      </LineString>\n");
        xml.push_str("    </Placemark>\n");

        for wp in &self.waypoints {
            xml.push_str("    <Placemark>\n");
            xml.push_str(&format!("      <name>{}</name>\n", escape_xml(&wp.label)));
            xml.push_str(&format!(
                "      <Point><coordinates>{},{},0</coordinates></Point>\n",
                wp.longitude, wp.latitude
            ));
            xml.push_str("    </Placemark>\n");
        }

        xml.push_str("  </Document>\n");
        xml.push_str("</kml>\n");
        xml
    }

    /// GPX 1.1 document with the waypoints and a single track segment
    pub fn to_gpx_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<gpx version=\"1.1\" creator=\"trip_meter\">\n");
        xml.push_str("  <metadata>\n");
        xml.push_str(&format!("    <time>{}</time>\n", self.exported_at.to_rfc3339()));
        xml.push_str("  </metadata>\n");

        for wp in &self.waypoints {
            xml.push_str(&format!("  <wpt lat=\"{}\" lon=\"{}\">\n", wp.latitude, wp.longitude));
            xml.push_str(&format!("    <time>{}</time>\n", wp.captured_at.to_rfc3339()));
            xml.push_str(&format!("    <name>{}</name>\n", escape_xml(&wp.label)));
            xml.push_str("  </wpt>\n");
        }

        xml.push_str("  <trk>\n");
        xml.push_str("    <name>Trip track</name>\n");
        xml.push_str("    <trkseg>\n");
        for point in &self.track {
            xml.push_str(&format!(
                "      <trkpt lat=\"{}\" lon=\"{}\"></trkpt>\n",
                point.latitude, point.longitude
            ));
        }
        xml.push_str("    </trkseg>\n");
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");

        xml
    }

    pub fn render(&self, format: ExportFormat) -> TripResult<String> {
        Ok(match format {
            ExportFormat::Json => self.to_json()?,
            ExportFormat::Kml => self.to_kml(),
            ExportFormat::Gpx => self.to_gpx_xml(),
        })
    }

    pub fn write_to(&self, path: &Path, format: ExportFormat) -> TripResult<()> {
        fs::write(path, self.render(format)?)?;
        log::info!(
            "Exported {} track points and {} waypoints to {}",
            self.track.len(),
            self.waypoints.len(),
            path.display()
        );
        Ok(())
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_export() -> TrackExport {
        let track = vec![
            TrackPoint {
                latitude: 45.0,
                longitude: 9.0,
            },
            TrackPoint {
                latitude: 45.001,
                longitude: 9.002,
            },
        ];
        let waypoints = vec![Waypoint {
            latitude: 45.001,
            longitude: 9.002,
            label: "1234.57".to_string(),
            captured_at: Utc::now(),
        }];
        let trips = TripState {
            trip_a: 10.0,
            trip_b: 1244.57,
            ..Default::default()
        };
        TrackExport::new(&track, &waypoints, &trips)
    }

    #[test]
    fn test_kml_uses_lon_lat_order() {
        let kml = sample_export().to_kml();
        assert!(kml.contains("<coordinates>9,45,0 9.002,45.001,0</coordinates>"));
        assert!(kml.contains("<tessellate>1</tessellate>"));
        assert!(kml.contains("<name>1234.57</name>"));
        assert!(kml.contains("<Point><coordinates>9.002,45.001,0</coordinates></Point>"));
    }

    #[test]
    fn test_empty_track_kml() {
        let export = TrackExport::new(&[], &[], &TripState::default());
        let kml = export.to_kml();
        assert!(kml.contains("<coordinates></coordinates>"));
        assert!(!kml.contains("<Point>"));
    }

    #[test]
    fn test_gpx_generation() {
        let gpx = sample_export().to_gpx_xml();
        assert!(gpx.starts_with("<?xml"));
        assert!(gpx.contains("<trkpt lat=\"45.001\" lon=\"9.002\">"));
        assert!(gpx.contains("<wpt lat=\"45.001\" lon=\"9.002\">"));
        assert!(gpx.contains("<name>1234.57</name>"));
        assert_eq!(gpx.matches("<trkpt").count(), 2);
    }

    #[test]
    fn test_json_roundtrip_keeps_counts() {
        let json = sample_export().to_json().unwrap();
        let back: TrackExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.track.len(), 2);
        assert_eq!(back.waypoints[0].label, "1234.57");
        assert_eq!(back.trip_b_meters, 1244.57);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out/track.KML")), Some(ExportFormat::Kml));
        assert_eq!(ExportFormat::from_path(Path::new("a.gpx")), Some(ExportFormat::Gpx));
        assert_eq!(ExportFormat::from_path(Path::new("a.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("track")), None);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_xml("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
