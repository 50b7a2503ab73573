//! `getWeather`: current conditions plus a two-day forecast for a named place.
//!
//! Uses the Open-Meteo geocoding and forecast APIs (no API key). The result is
//! plain sentences without markup so the speech model can read it aloud.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::base::{ToolError, ToolInvocation, ToolOutcome, ToolResult, ToolSpec};

pub const NAME: &str = "getWeather";

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodedPlace>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeocodedPlace {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    admin1: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl GeocodedPlace {
    fn display_name(&self) -> String {
        match (&self.admin1, &self.country) {
            (Some(region), _) if region != &self.name => format!("{}, {}", self.name, region),
            (_, Some(country)) => format!("{}, {}", self.name, country),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
    daily: DailyForecast,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    weather_code: u8,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DailyForecast {
    #[serde(default)]
    weather_code: Vec<u8>,
    #[serde(default)]
    temperature_2m_max: Vec<f64>,
    #[serde(default)]
    temperature_2m_min: Vec<f64>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

// =============================================================================
// Tool
// =============================================================================

#[derive(Debug, Clone)]
pub struct WeatherTool {
    http: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new(DEFAULT_GEOCODING_URL, DEFAULT_FORECAST_URL)
    }
}

impl WeatherTool {
    pub fn new(geocoding_url: impl Into<String>, forecast_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            geocoding_url: geocoding_url.into(),
            forecast_url: forecast_url.into(),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "Get current weather for a given location",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "Name of the city (e.g. Seattle, WA)"
                    }
                },
                "required": ["location"]
            }),
        }
    }

    pub async fn handle(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let input = match invocation.parse_input() {
            Ok(input) => input,
            Err(e) => {
                warn!(content = %invocation.content, "getWeather input is not valid JSON: {}", e);
                return ToolOutcome::error("Error: Invalid input format for getWeather tool.");
            }
        };

        let location = input
            .get("location")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("the specified location")
            .to_string();

        info!(location = %location, "getWeather called");

        match self.report(&location).await {
            Ok(report) => ToolOutcome::success(report),
            Err(e) => {
                error!(location = %location, "Weather lookup failed: {}", e);
                ToolOutcome::error(format!("Error getting weather for {}.", location))
            }
        }
    }

    async fn report(&self, location: &str) -> ToolResult<String> {
        let place = self.geocode(location).await?;
        let forecast = self.forecast(&place).await?;
        Ok(render_report(&place, &forecast))
    }

    async fn geocode(&self, location: &str) -> ToolResult<GeocodedPlace> {
        // "Seattle, WA" geocodes best on the city part alone
        let query = location.split(',').next().unwrap_or(location).trim();

        let response = self
            .http
            .get(&self.geocoding_url)
            .query(&[("name", query), ("count", "1"), ("language", "en"), ("format", "json")])
            .send()
            .await
            .map_err(|e| ToolError::Backend(format!("Geocoding request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ToolError::Backend(format!("Geocoding request failed: {e}")))?;

        let body: GeocodingResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("Invalid geocoding response: {e}")))?;

        body.results
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::InvalidInput(format!("Unknown location: {location}")))
    }

    async fn forecast(&self, place: &GeocodedPlace) -> ToolResult<ForecastResponse> {
        let latitude = place.latitude.to_string();
        let longitude = place.longitude.to_string();

        let response = self
            .http
            .get(&self.forecast_url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", "temperature_2m,weather_code,wind_speed_10m"),
                (
                    "daily",
                    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_probability_max",
                ),
                ("temperature_unit", "fahrenheit"),
                ("wind_speed_unit", "mph"),
                ("timezone", "auto"),
                ("forecast_days", "2"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Backend(format!("Forecast request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ToolError::Backend(format!("Forecast request failed: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("Invalid forecast response: {e}")))
    }
}

// =============================================================================
// Rendering
// =============================================================================

fn render_report(place: &GeocodedPlace, forecast: &ForecastResponse) -> String {
    let current = &forecast.current;
    let mut report = format!(
        "Currently in {} it is {} degrees Fahrenheit and {}",
        place.display_name(),
        current.temperature_2m.round(),
        describe_weather_code(current.weather_code)
    );
    if let Some(wind) = current.wind_speed_10m {
        report.push_str(&format!(" with wind at {} miles per hour", wind.round()));
    }
    report.push('.');

    for (index, label) in ["Today", "Tomorrow"].iter().enumerate() {
        let daily = &forecast.daily;
        let (Some(code), Some(high), Some(low)) = (
            daily.weather_code.get(index),
            daily.temperature_2m_max.get(index),
            daily.temperature_2m_min.get(index),
        ) else {
            continue;
        };

        report.push_str(&format!(
            " {}: {}, high of {}, low of {}",
            label,
            describe_weather_code(*code),
            high.round(),
            low.round()
        ));
        if let Some(Some(chance)) = daily.precipitation_probability_max.get(index) {
            report.push_str(&format!(", {} percent chance of precipitation", chance.round()));
        }
        report.push('.');
    }

    report
}

/// WMO weather interpretation codes as used by Open-Meteo.
fn describe_weather_code(code: u8) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 | 48 => "foggy",
        51 | 53 | 55 => "drizzle",
        56 | 57 => "freezing drizzle",
        61 => "light rain",
        63 => "moderate rain",
        65 => "heavy rain",
        66 | 67 => "freezing rain",
        71 => "light snow",
        73 => "moderate snow",
        75 => "heavy snow",
        77 => "snow grains",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95 => "thunderstorms",
        96 | 99 => "thunderstorms with hail",
        _ => "unsettled conditions",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn tool_for(server: &MockServer) -> WeatherTool {
        WeatherTool::new(
            format!("{}/v1/search", server.uri()),
            format!("{}/v1/forecast", server.uri()),
        )
    }

    fn forecast_body() -> serde_json::Value {
        json!({
            "current": {"temperature_2m": 55.4, "weather_code": 3, "wind_speed_10m": 4.6},
            "daily": {
                "time": ["2024-05-01", "2024-05-02"],
                "weather_code": [3, 61],
                "temperature_2m_max": [60.2, 58.0],
                "temperature_2m_min": [47.6, 46.9],
                "precipitation_probability_max": [20, 80]
            }
        })
    }

    #[tokio::test]
    async fn test_reports_current_and_two_day_forecast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("name", "Seattle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "name": "Seattle",
                    "latitude": 47.6,
                    "longitude": -122.33,
                    "admin1": "Washington",
                    "country": "United States"
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&server)
            .await;

        let tool = tool_for(&server).await;
        let outcome = tool
            .handle(&ToolInvocation::new(NAME, "w-1", r#"{"location": "Seattle, WA"}"#))
            .await;

        assert!(!outcome.is_error(), "unexpected error: {}", outcome.result);
        assert!(outcome.result.starts_with("Currently in Seattle, Washington it is 55 degrees"));
        assert!(outcome.result.contains("Today: overcast, high of 60, low of 48"));
        assert!(outcome.result.contains("Tomorrow: light rain"));
        assert!(outcome.result.contains("80 percent chance of precipitation"));
    }

    #[tokio::test]
    async fn test_unknown_location_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let tool = tool_for(&server).await;
        let outcome = tool
            .handle(&ToolInvocation::new(NAME, "w-2", r#"{"location": "Atlantis"}"#))
            .await;

        assert!(outcome.is_error());
        assert_eq!(outcome.result, "Error getting weather for Atlantis.");
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = tool_for(&server).await;
        let outcome = tool
            .handle(&ToolInvocation::new(NAME, "w-3", r#"{"location": "Boston"}"#))
            .await;

        assert_eq!(outcome.result, "Error getting weather for Boston.");
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let outcome = WeatherTool::default()
            .handle(&ToolInvocation::new(NAME, "w-4", "location=Boston"))
            .await;
        assert_eq!(
            outcome.result,
            "Error: Invalid input format for getWeather tool."
        );
    }

    #[test]
    fn test_weather_code_descriptions() {
        assert_eq!(describe_weather_code(0), "clear sky");
        assert_eq!(describe_weather_code(81), "rain showers");
        assert_eq!(describe_weather_code(200), "unsettled conditions");
    }
}
