//! Simulated maritime data for the meridian reference runtime.
//!
//! All data in this module is hardcoded and approximate. No external systems
//! are contacted. It stands in for port databases, routing engines, weather
//! providers, and bunker price feeds.

use serde_json::{json, Value};

// ── Ports ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Port {
    pub code: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
    /// VLSFO price in USD per tonne; `None` when the port does not bunker.
    pub vlsfo_usd_per_t: Option<f64>,
    /// Inside an emission control area.
    pub eca: bool,
}

pub const PORTS: [Port; 10] = [
    Port { code: "SGSIN", name: "Singapore", lat: 1.26, lon: 103.84, vlsfo_usd_per_t: Some(612.0), eca: false },
    Port { code: "NLRTM", name: "Rotterdam", lat: 51.95, lon: 4.14, vlsfo_usd_per_t: Some(598.0), eca: true },
    Port { code: "AEFJR", name: "Fujairah", lat: 25.12, lon: 56.36, vlsfo_usd_per_t: Some(585.0), eca: false },
    Port { code: "LKCMB", name: "Colombo", lat: 6.95, lon: 79.84, vlsfo_usd_per_t: Some(640.0), eca: false },
    Port { code: "EGPSD", name: "Port Said", lat: 31.26, lon: 32.30, vlsfo_usd_per_t: Some(655.0), eca: false },
    Port { code: "GIGIB", name: "Gibraltar", lat: 36.13, lon: -5.35, vlsfo_usd_per_t: Some(603.0), eca: false },
    Port { code: "CNSHA", name: "Shanghai", lat: 31.23, lon: 121.47, vlsfo_usd_per_t: Some(620.0), eca: false },
    Port { code: "USHOU", name: "Houston", lat: 29.73, lon: -95.27, vlsfo_usd_per_t: Some(590.0), eca: true },
    Port { code: "GBFXT", name: "Felixstowe", lat: 51.96, lon: 1.35, vlsfo_usd_per_t: None, eca: true },
    Port { code: "JPYOK", name: "Yokohama", lat: 35.45, lon: 139.65, vlsfo_usd_per_t: Some(648.0), eca: false },
];

/// Resolve a port by UN/LOCODE or name, case-insensitively.
pub fn find_port(text: &str) -> Option<&'static Port> {
    let needle = text.trim().to_lowercase();
    PORTS
        .iter()
        .find(|p| p.code.to_lowercase() == needle || p.name.to_lowercase() == needle)
}

/// Ports mentioned in free text, in order of first mention.
pub fn ports_in_text(text: &str) -> Vec<&'static Port> {
    let lower = text.to_lowercase();
    let mut hits: Vec<(usize, &'static Port)> = PORTS
        .iter()
        .filter_map(|p| {
            let by_name = lower.find(&p.name.to_lowercase());
            let by_code = lower.find(&p.code.to_lowercase());
            by_name.into_iter().chain(by_code).min().map(|at| (at, p))
        })
        .collect();
    hits.sort_by_key(|(at, _)| *at);
    hits.into_iter().map(|(_, p)| p).collect()
}

// ── Routing ───────────────────────────────────────────────────────────────────

const EARTH_RADIUS_NM: f64 = 3440.065;

/// Great-circle distance between two positions in nautical miles.
pub fn haversine_nm(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * h.sqrt().asin()
}

/// Canned corridors between regions. Anything else sails direct.
fn via(origin: &str, destination: &str) -> &'static [&'static str] {
    const SUEZ_WESTBOUND: &[&str] = &["LKCMB", "AEFJR", "EGPSD", "GIGIB"];
    const SUEZ_EASTBOUND: &[&str] = &["GIGIB", "EGPSD", "AEFJR", "LKCMB"];
    let asia = ["SGSIN", "CNSHA", "JPYOK"];
    let europe = ["NLRTM", "GBFXT"];
    if asia.contains(&origin) && europe.contains(&destination) {
        SUEZ_WESTBOUND
    } else if europe.contains(&origin) && asia.contains(&destination) {
        SUEZ_EASTBOUND
    } else {
        &[]
    }
}

/// Compute a route as waypoints plus distance.
pub fn compute_route(origin: &Port, destination: &Port) -> Value {
    let mut legs: Vec<&Port> = vec![origin];
    legs.extend(via(origin.code, destination.code).iter().filter_map(|c| find_port(c)));
    legs.push(destination);

    let distance: f64 = legs
        .windows(2)
        .map(|w| haversine_nm((w[0].lat, w[0].lon), (w[1].lat, w[1].lon)))
        .sum();
    let waypoints: Vec<Value> = legs
        .iter()
        .map(|p| json!({ "port": p.code, "name": p.name, "lat": p.lat, "lon": p.lon }))
        .collect();

    json!({
        "origin": origin.code,
        "destination": destination.code,
        "distance_nm": distance.round(),
        "waypoints": waypoints,
        "eca_segments": legs.iter().filter(|p| p.eca).count(),
    })
}

// ── Weather ───────────────────────────────────────────────────────────────────

/// A deterministic forecast per waypoint: higher latitudes and the Arabian Sea
/// get heavier weather.
pub fn forecast_for(waypoints: &[Value]) -> Value {
    let points: Vec<Value> = waypoints
        .iter()
        .map(|wp| {
            let lat = wp["lat"].as_f64().unwrap_or(0.0);
            let lon = wp["lon"].as_f64().unwrap_or(0.0);
            let monsoon = (10.0..=25.0).contains(&lat) && (55.0..=80.0).contains(&lon);
            let wave = 1.0 + lat.abs() / 20.0 + if monsoon { 2.0 } else { 0.0 };
            let wind = 10.0 + lat.abs() / 2.0 + if monsoon { 15.0 } else { 0.0 };
            json!({
                "port": wp["port"],
                "wave_height_m": (wave * 10.0).round() / 10.0,
                "wind_speed_kts": wind.round(),
            })
        })
        .collect();

    let rough = points
        .iter()
        .filter(|p| p["wave_height_m"].as_f64().unwrap_or(0.0) >= 3.0)
        .count();
    let summary = match rough {
        0 => "moderate seas along the route".to_string(),
        n => format!("rough seas on {n} segment(s)"),
    };

    json!({
        "forecast": points,
        "rough_segments": rough,
        "summary": summary,
    })
}

// ── Bunkering ─────────────────────────────────────────────────────────────────

pub const SERVICE_SPEED_KTS: f64 = 14.0;
pub const CONSUMPTION_T_PER_DAY: f64 = 35.0;

/// Fuel needed for a distance, with a 3% weather margin per rough segment.
pub fn fuel_required_t(distance_nm: f64, rough_segments: u64) -> f64 {
    let days = distance_nm / SERVICE_SPEED_KTS / 24.0;
    let margin = 1.0 + 0.03 * rough_segments as f64;
    (days * CONSUMPTION_T_PER_DAY * margin).round()
}

/// Bunker prices at every route port that sells fuel.
pub fn bunker_options(waypoints: &[Value], fuel_t: f64) -> Vec<Value> {
    let mut options: Vec<Value> = waypoints
        .iter()
        .filter_map(|wp| wp["port"].as_str().and_then(find_port))
        .filter_map(|p| {
            p.vlsfo_usd_per_t.map(|price| {
                json!({
                    "port": p.code,
                    "name": p.name,
                    "price_usd_per_t": price,
                    "cost_usd": (price * fuel_t).round(),
                })
            })
        })
        .collect();
    options.sort_by(|a, b| {
        let (x, y) = (a["cost_usd"].as_f64(), b["cost_usd"].as_f64());
        x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
    });
    options
}

// ── Compliance ────────────────────────────────────────────────────────────────

/// ECA sulphur check: VLSFO (0.5% S) is not enough inside an ECA (0.1% S).
pub fn compliance_for(waypoints: &[Value], fuel: &str) -> Value {
    let zones: Vec<Value> = waypoints
        .iter()
        .filter_map(|wp| wp["port"].as_str().and_then(find_port))
        .filter(|p| p.eca)
        .map(|p| json!({ "port": p.code, "zone": "ECA", "sulphur_limit_pct": 0.1 }))
        .collect();
    let compliant = zones.is_empty() || fuel.eq_ignore_ascii_case("MGO");
    json!({
        "fuel": fuel,
        "compliant": compliant,
        "eca_zones": zones,
        "action": if compliant {
            "none required"
        } else {
            "switch to MGO before entering ECA waters"
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_found_in_mention_order() {
        let ports = ports_in_text("Voyage from Singapore to NLRTM via the canal");
        let codes: Vec<&str> = ports.iter().map(|p| p.code).collect();
        assert_eq!(codes, vec!["SGSIN", "NLRTM"]);
        assert!(find_port("rotterdam").is_some());
        assert!(find_port("Atlantis").is_none());
    }

    #[test]
    fn asia_europe_route_goes_through_suez() {
        let route = compute_route(find_port("SGSIN").unwrap(), find_port("NLRTM").unwrap());
        assert_eq!(route["waypoints"].as_array().unwrap().len(), 6);
        let distance = route["distance_nm"].as_f64().unwrap();
        assert!(distance > 7000.0 && distance < 9000.0, "distance {distance}");
    }

    #[test]
    fn cheapest_option_first() {
        let route = compute_route(find_port("SGSIN").unwrap(), find_port("NLRTM").unwrap());
        let options = bunker_options(route["waypoints"].as_array().unwrap(), 1000.0);
        assert_eq!(options[0]["port"], "AEFJR");
    }

    #[test]
    fn eca_requires_low_sulphur_fuel() {
        let route = compute_route(find_port("SGSIN").unwrap(), find_port("NLRTM").unwrap());
        let waypoints = route["waypoints"].as_array().unwrap();
        assert_eq!(compliance_for(waypoints, "VLSFO")["compliant"], false);
        assert_eq!(compliance_for(waypoints, "MGO")["compliant"], true);
    }
}
