//! Nominatim / OpenStreetMap search proxy.
//!
//! A free-form query is expanded into regional variants, which are tried in
//! order until one returns at least one result. Each attempt has its own
//! timeout and there are no retries beyond the variant list.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use crate::GeocodeError;
use crate::service_registry::NominatimService;

/// HTTP client bound to one Nominatim service configuration.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    service: NominatimService,
}

impl NominatimClient {
    /// Builds a client with the service's `User-Agent` and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(service: NominatimService) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(service.user_agent.clone())
            .timeout(service.timeout())
            .build()?;
        Ok(Self { client, service })
    }

    /// Searches for `query`, returning the raw result objects of the first
    /// variant that matched anything. An empty list means no variant did.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if a request fails or returns an error
    /// status and [`GeocodeError::Parse`] if a response is not a JSON array.
    pub async fn search(&self, query: &str) -> Result<Vec<serde_json::Value>, GeocodeError> {
        let mut results = Vec::new();

        for variant in query_variants(&self.service, query) {
            results = self.search_once(&variant).await?;
            if !results.is_empty() {
                break;
            }
            log::debug!("No geocoding results for '{variant}'");
        }

        log::info!("Geocoding '{query}': found {} results", results.len());
        Ok(results)
    }

    async fn search_once(&self, query: &str) -> Result<Vec<serde_json::Value>, GeocodeError> {
        let body = self
            .client
            .get(&self.service.base_url)
            .query(&search_params(&self.service, query))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_results(&body)
    }
}

/// Query strings to try, in order.
#[must_use]
pub fn query_variants(service: &NominatimService, query: &str) -> Vec<String> {
    service
        .query_suffixes
        .iter()
        .map(|suffix| format!("{query}{suffix}"))
        .collect()
}

/// Query parameters for one search attempt.
#[must_use]
pub fn search_params(service: &NominatimService, query: &str) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", query.to_string()),
        ("format", "json".to_string()),
        ("limit", service.limit.to_string()),
        ("countrycodes", service.country_codes.clone()),
        ("viewbox", service.viewbox.clone()),
    ];
    if service.bounded {
        params.push(("bounded", "1".to_string()));
    }
    params
}

/// Parses a search response body.
fn parse_results(body: &str) -> Result<Vec<serde_json::Value>, GeocodeError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| GeocodeError::Parse {
        message: format!("Invalid Nominatim response: {e}"),
    })?;

    match value {
        serde_json::Value::Array(results) => Ok(results),
        _ => Err(GeocodeError::Parse {
            message: "Nominatim response is not an array".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_add_region_then_fall_back_to_bare_query() {
        let service = NominatimService::builtin();
        assert_eq!(
            query_variants(&service, "Lark Street"),
            vec![
                "Lark Street, New York, USA",
                "Lark Street, NY, USA",
                "Lark Street",
            ]
        );
    }

    #[test]
    fn params_bound_search_to_region() {
        let service = NominatimService::builtin();
        let params = search_params(&service, "Empire State Plaza, NY, USA");
        assert_eq!(
            params,
            vec![
                ("q", "Empire State Plaza, NY, USA".to_string()),
                ("format", "json".to_string()),
                ("limit", "5".to_string()),
                ("countrycodes", "us".to_string()),
                ("viewbox", "-74.9865,41.4775,-72.9322,44.0081".to_string()),
                ("bounded", "1".to_string()),
            ]
        );
    }

    #[test]
    fn unbounded_service_omits_bounded_flag() {
        let mut service = NominatimService::builtin();
        service.bounded = false;
        assert!(
            search_params(&service, "Troy")
                .iter()
                .all(|(k, _)| *k != "bounded")
        );
    }

    #[test]
    fn parses_result_list_verbatim() {
        let body = serde_json::json!([{
            "lat": "42.6526",
            "lon": "-73.7562",
            "display_name": "Albany, Albany County, New York, United States",
            "place_id": 123
        }])
        .to_string();
        let results = parse_results(&body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["lat"], "42.6526");
        assert_eq!(results[0]["place_id"], 123);
    }

    #[test]
    fn parses_empty_list() {
        assert!(parse_results("[]").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_array_body() {
        assert!(matches!(
            parse_results(r#"{"error": "bad request"}"#),
            Err(GeocodeError::Parse { .. })
        ));
        assert!(matches!(
            parse_results("<html>"),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_http_error() {
        let service = NominatimService::builtin().with_base_url("http://127.0.0.1:9/search");
        let client = NominatimClient::new(service).unwrap();
        assert!(matches!(
            client.search("Albany").await,
            Err(GeocodeError::Http(_))
        ));
    }
}
