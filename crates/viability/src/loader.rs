//! Data loading from JSON files

use crate::Result;
use coverage::station::GAIN_TABLE_LEN;
use coverage::{NormativeTables, Service, Station, Technology};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use terrain::GeoPoint;
use tracing::{debug, info};

const MAX_ID_CHARS: usize = 128;
const MAX_NAME_CHARS: usize = 256;

/// Site coordinates, when both are present and on the globe
fn site(lat: Option<f64>, lon: Option<f64>) -> Option<GeoPoint> {
    let (lat, lon) = (lat?, lon?);
    let on_globe = lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0;
    on_globe.then(|| GeoPoint::new(lat, lon))
}

/// Station identifiers keep letters, digits, `-` and `_`
fn clean_station_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .take(MAX_ID_CHARS)
        .collect()
}

/// Operator names also keep spaces and common punctuation
fn clean_station_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || " -_.,()&'/".contains(*c))
        .take(MAX_NAME_CHARS)
        .collect()
}

fn parse_service(raw: &str) -> Option<Service> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "FM" => Some(Service::Fm),
        "RTR" => Some(Service::Rtr),
        "TV" => Some(Service::Tv),
        "RTV" => Some(Service::Rtv),
        "RADCOM" | "RADCOM_FM" => Some(Service::RadCom),
        _ => None,
    }
}

fn parse_technology(raw: Option<&str>) -> Technology {
    match raw.map(|t| t.trim().to_ascii_lowercase()) {
        Some(t) if t == "digital" || t == "dtv" => Technology::Digital,
        _ => Technology::Analog,
    }
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

/// Raw station row from JSON
#[derive(Debug, Deserialize)]
struct RawStation {
    id: Option<String>,
    name: Option<String>,
    service: Option<String>,
    technology: Option<String>,
    channel: Option<u32>,
    class: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    frequency_mhz: Option<f64>,
    erp_kw: Option<f64>,
    erp_w: Option<f64>,
    hnmt_m: Option<f64>,
    gain_pattern_db: Option<Vec<f64>>,
}

/// Load stations from a JSON array, or an object with a `stations` array.
///
/// Rows with an unknown service or no identifier are skipped. Rows with
/// out-of-range coordinates are kept without a position, so jobs for them
/// fail with a clear message instead of the station vanishing.
pub fn load_stations(path: impl AsRef<Path>) -> Result<Vec<Station>> {
    let path = path.as_ref();
    info!("Loading stations from {:?}", path);

    let reader = BufReader::new(File::open(path)?);
    let raw: serde_json::Value = serde_json::from_reader(reader)?;
    let rows: Vec<RawStation> = match raw.get("stations") {
        Some(list) => serde_json::from_value(list.clone())?,
        None => serde_json::from_value(raw)?,
    };

    let mut stations = Vec::new();
    let mut skipped = 0;
    let mut unpositioned = 0;

    for (i, row) in rows.into_iter().enumerate() {
        let Some(service) = row.service.as_deref().and_then(parse_service) else {
            debug!("Row {}: unknown service {:?}", i, row.service);
            skipped += 1;
            continue;
        };
        let id = clean_station_id(row.id.as_deref().unwrap_or_default());
        if id.is_empty() {
            skipped += 1;
            continue;
        }

        let position = site(row.latitude, row.longitude);
        if position.is_none() {
            unpositioned += 1;
        }

        let gain_pattern_db = match row.gain_pattern_db {
            Some(g) if g.len() == GAIN_TABLE_LEN => Some(g),
            Some(g) => {
                debug!("Station {}: ignoring gain table with {} entries", id, g.len());
                None
            }
            None => None,
        };

        stations.push(Station {
            name: row.name.as_deref().map(clean_station_name).filter(|n| !n.is_empty()),
            service,
            technology: parse_technology(row.technology.as_deref()),
            channel: row.channel,
            class: row.class.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            position,
            frequency_mhz: positive(row.frequency_mhz),
            erp_kw: positive(row.erp_kw).or_else(|| positive(row.erp_w).map(|w| w / 1000.0)),
            hnmt_m: row.hnmt_m.filter(|h| h.is_finite()),
            gain_pattern_db,
            id,
        });
    }

    info!(
        "Loaded {} stations ({} skipped, {} without valid coordinates)",
        stations.len(),
        skipped,
        unpositioned
    );

    Ok(stations)
}

/// Load normative tables; missing sections are empty.
pub fn load_normative(path: impl AsRef<Path>) -> Result<NormativeTables> {
    let path = path.as_ref();
    info!("Loading normative tables from {:?}", path);

    let reader = BufReader::new(File::open(path)?);
    let tables: NormativeTables = serde_json::from_reader(reader)?;
    info!(
        "Loaded {} FM classes, {} TV classes, {} FM ratios, {} TV ratios",
        tables.fm_classes.len(),
        tables.tv_digital_classes.len() + tables.tv_analog_classes.len(),
        tables.fm_protection.len(),
        tables.tv_protection.len()
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage::ChannelDelta;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_stations() {
        let file = write(
            r#"[
            {"id": "FM-1", "name": "Rádio Teste <b>", "service": "FM", "class": "C",
             "latitude": -15.9, "longitude": -47.1, "frequency_mhz": 100.1, "erp_kw": 5.0},
            {"id": "RC 2", "service": "RadCom", "latitude": -15.8, "longitude": -47.0, "erp_w": 25.0},
            {"id": "TV-3", "service": "TV", "technology": "Digital", "channel": 30, "latitude": 95.0, "longitude": -47.0},
            {"id": "X-4", "service": "AM"},
            {"service": "FM"}
        ]"#,
        );

        let stations = load_stations(file.path()).unwrap();
        assert_eq!(stations.len(), 3);

        assert_eq!(stations[0].name.as_deref(), Some("Rádio Teste b"));
        assert_eq!(stations[0].class.as_deref(), Some("C"));

        assert_eq!(stations[1].id, "RC2");
        assert_eq!(stations[1].service, Service::RadCom);
        assert!((stations[1].erp_kw.unwrap() - 0.025).abs() < 1e-12);

        assert_eq!(stations[2].technology, Technology::Digital);
        assert!(stations[2].position.is_none());
    }

    #[test]
    fn test_site_bounds() {
        assert_eq!(site(Some(90.0), Some(-180.0)), Some(GeoPoint::new(90.0, -180.0)));
        assert_eq!(site(Some(-90.5), Some(0.0)), None);
        assert_eq!(site(Some(0.0), Some(f64::NAN)), None);
        assert_eq!(site(None, Some(0.0)), None);
    }

    #[test]
    fn test_load_stations_wrapped() {
        let file = write(r#"{"stations": [{"id": "A", "service": "rtr", "latitude": 0.0, "longitude": 0.0}]}"#);
        let stations = load_stations(file.path()).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].service, Service::Rtr);
    }

    #[test]
    fn test_short_gain_table_dropped() {
        let file = write(
            r#"[{"id": "A", "service": "FM", "latitude": 0.0, "longitude": 0.0, "gain_pattern_db": [0.0, -3.0]}]"#,
        );
        assert!(load_stations(file.path()).unwrap()[0].gain_pattern_db.is_none());
    }

    #[test]
    fn test_load_normative() {
        let file = write(
            r#"{
            "fm_classes": [{"class": "C", "max_erp_kw": 0.3, "max_height_m": 60.0, "max_contour_km": 7.5}],
            "tv_protection": [{"desired": "digital", "interfering": "analog", "delta": "n-1", "ci_db": -7.0}],
            "radcom": {"max_erp_w": 25.0}
        }"#,
        );
        let tables = load_normative(file.path()).unwrap();
        assert_eq!(tables.fm_classes[0].max_contour_km, Some(7.5));
        assert_eq!(tables.tv_protection[0].delta, ChannelDelta(-1));
        assert_eq!(tables.radcom.service_radius_km, 1.0);
        assert!(tables.fm_protection.is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        let file = write("not json");
        assert!(load_stations(file.path()).is_err());
        assert!(load_normative(file.path()).is_err());
    }
}
