use reqwest::Url;

use crate::error::{AppError, Result};

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Query parameters that carry a position, most specific first.
const COORDINATE_PARAMS: [&str; 7] = ["q", "query", "ll", "sll", "destination", "daddr", "center"];

fn in_range(lat: f64, lng: f64) -> Option<Coordinates> {
    let valid = lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng);
    valid.then_some(Coordinates { lat, lng })
}

/// Parses `"lat,lng"`, tolerating spaces and a `loc:` prefix.
fn parse_pair(text: &str) -> Option<Coordinates> {
    let text = text.trim();
    let text = text.strip_prefix("loc:").unwrap_or(text);
    let (lat, lng) = text.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    in_range(lat, lng)
}

/// Reads the number at the start of `text`.
fn leading_number(text: &str) -> Option<f64> {
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

/// `!3d<lat>!4d<lng>` place markers inside the `data=` path segment.
fn from_place_marker(link: &str) -> Option<Coordinates> {
    let lat_at = link.rfind("!3d")?;
    let rest = &link[lat_at + 3..];
    let lat = leading_number(rest)?;
    let lng_at = rest.find("!4d")?;
    let lng = leading_number(&rest[lng_at + 3..])?;
    in_range(lat, lng)
}

/// `@lat,lng[,zoom]` viewport centres.
fn from_viewport(link: &str) -> Option<Coordinates> {
    let at = link.find('@')?;
    let rest = &link[at + 1..];
    let lat = leading_number(rest)?;
    let after_lat = rest.split_once(',')?.1;
    let lng = leading_number(after_lat)?;
    in_range(lat, lng)
}

fn from_query(link: &str) -> Option<Coordinates> {
    let url = Url::parse(link).ok()?;
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    COORDINATE_PARAMS.iter().find_map(|param| {
        pairs
            .iter()
            .filter(|(key, _)| key == param)
            .find_map(|(_, value)| parse_pair(value))
    })
}

/// Extracts coordinates from a Google Maps link or a bare `lat,lng` pair.
///
/// Place markers win over viewport centres, which win over query parameters.
pub fn parse_maps_link(link: &str) -> Option<Coordinates> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }

    from_place_marker(link)
        .or_else(|| from_viewport(link))
        .or_else(|| from_query(link))
        .or_else(|| parse_pair(link))
}

/// Resolves a maps link, following short-link redirects first.
pub async fn resolve_maps_link(http: &reqwest::Client, link: &str) -> Result<Coordinates> {
    if let Some(coordinates) = parse_maps_link(link) {
        return Ok(coordinates);
    }

    let url = Url::parse(link.trim())
        .map_err(|_| AppError::Validation("Not a maps link or coordinate pair".to_string()))?;
    tracing::debug!("🗺️ Following maps link {}", url);

    let response = http.get(url).send().await?;
    let resolved = response.url().to_string();
    parse_maps_link(&resolved).ok_or_else(|| {
        tracing::debug!("No coordinates in resolved link {}", resolved);
        AppError::Validation("No coordinates found in maps link".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(lat: f64, lng: f64) -> Option<Coordinates> {
        Some(Coordinates { lat, lng })
    }

    #[test]
    fn place_marker_beats_viewport() {
        let link = "https://www.google.com/maps/place/Depot/@-1.2800,36.8100,15z/data=!3m1!4b1!4m6!3m5!1s0x0:0x0!8m2!3d-1.2921!4d36.8219";
        assert_eq!(parse_maps_link(link), coords(-1.2921, 36.8219));
    }

    #[test]
    fn viewport_centre() {
        let link = "https://www.google.com/maps/@6.5244,3.3792,12z";
        assert_eq!(parse_maps_link(link), coords(6.5244, 3.3792));
    }

    #[test]
    fn query_parameters() {
        assert_eq!(
            parse_maps_link("https://maps.google.com/?q=51.5074,-0.1278"),
            coords(51.5074, -0.1278)
        );
        assert_eq!(
            parse_maps_link("https://www.google.com/maps/dir/?api=1&destination=40.7128%2C-74.0060"),
            coords(40.7128, -74.006)
        );
        assert_eq!(
            parse_maps_link("https://maps.google.com/maps?q=Warehouse&ll=-33.8688,151.2093"),
            coords(-33.8688, 151.2093)
        );
    }

    #[test]
    fn bare_pairs() {
        assert_eq!(parse_maps_link(" 12.5, -7.25 "), coords(12.5, -7.25));
        assert_eq!(parse_maps_link("loc:1,2"), coords(1.0, 2.0));
    }

    #[test]
    fn rejects_out_of_range_and_text() {
        assert_eq!(parse_maps_link("95.0,10.0"), None);
        assert_eq!(parse_maps_link("10.0,181"), None);
        assert_eq!(parse_maps_link("https://maps.google.com/?q=Nairobi+Depot"), None);
        assert_eq!(parse_maps_link(""), None);
    }

    #[test]
    fn display_is_fixed_precision() {
        assert_eq!(Coordinates { lat: 1.5, lng: -2.25 }.to_string(), "1.500000,-2.250000");
    }
}
