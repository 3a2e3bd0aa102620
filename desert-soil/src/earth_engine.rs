//! Earth Engine REST client.
//!
//! Each query is encoded as an expression graph and evaluated with one
//! `value:compute` call. Authentication is a bearer token taken from the
//! configuration or the `EARTHENGINE_TOKEN` environment variable.

use log::debug;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::error::SourceError;
use crate::source::{
    BandValues, CollectionWindow, Composite, GeoSource, Geometry, Layer, Reducer, RegionQuery,
};

pub const DEFAULT_BASE_URL: &str = "https://earthengine.googleapis.com/v1";
pub const TOKEN_ENV: &str = "EARTHENGINE_TOKEN";

pub struct EarthEngineClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl EarthEngineClient {
    /// Client for `project`; `token` falls back to `EARTHENGINE_TOKEN`.
    pub fn new(
        project: &str,
        token: Option<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        if project.trim().is_empty() {
            return Err(SourceError::Setup("Earth Engine project id is empty".into()));
        }
        let token = token
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                SourceError::Setup(format!("no access token configured and {} is unset", TOKEN_ENV))
            })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Setup(e.to_string()))?;
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Ok(EarthEngineClient {
            http,
            endpoint: format!("{}/projects/{}/value:compute", base, project),
            token,
        })
    }

    async fn compute(&self, expression: Value) -> Result<Value, SourceError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "expression": expression }))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(SourceError::Decode("response has no result".into())),
        }
    }
}

fn classify(e: reqwest::Error) -> SourceError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        SourceError::Transient(e.to_string())
    } else {
        SourceError::Upstream(e.to_string())
    }
}

impl GeoSource for EarthEngineClient {
    async fn reduce_region(&self, query: &RegionQuery) -> Result<BandValues, SourceError> {
        let result = self.compute(region_expression(query)).await?;
        let values = parse_band_values(result)?;
        debug!("reduceRegion at {}m -> {:?}", query.scale, values);
        Ok(values)
    }

    async fn collection_size(&self, window: &CollectionWindow) -> Result<u64, SourceError> {
        let result = self.compute(size_expression(window)).await?;
        result
            .as_u64()
            .or_else(|| result.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .ok_or_else(|| SourceError::Decode(format!("collection size is not a count: {}", result)))
    }
}

fn constant(value: Value) -> Value {
    json!({ "constantValue": value })
}

fn invoke(function: &str, arguments: Vec<(&str, Value)>) -> Value {
    let arguments: Map<String, Value> = arguments
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments,
        }
    })
}

/// Wrap a value node as a complete expression.
fn expression(root: Value) -> Value {
    json!({ "values": { "0": root }, "result": "0" })
}

fn geometry_node(geometry: &Geometry) -> Value {
    let point = |latitude: f64, longitude: f64| {
        invoke(
            "GeometryConstructors.Point",
            vec![("coordinates", constant(json!([longitude, latitude])))],
        )
    };
    match *geometry {
        Geometry::Point {
            latitude,
            longitude,
        } => point(latitude, longitude),
        Geometry::Buffer {
            latitude,
            longitude,
            meters,
        } => invoke(
            "Geometry.buffer",
            vec![
                ("geometry", point(latitude, longitude)),
                ("distance", constant(json!(meters))),
            ],
        ),
    }
}

fn date_node(date: chrono::NaiveDate) -> Value {
    invoke(
        "Date",
        vec![("value", constant(json!(date.format("%Y-%m-%d").to_string())))],
    )
}

fn filtered_collection(window: &CollectionWindow) -> Value {
    let loaded = invoke(
        "ImageCollection.load",
        vec![("id", constant(json!(window.collection)))],
    );
    let by_date = invoke(
        "Collection.filter",
        vec![
            ("collection", loaded),
            (
                "filter",
                invoke(
                    "Filter.dateRangeContains",
                    vec![
                        (
                            "leftValue",
                            invoke(
                                "DateRange",
                                vec![
                                    ("start", date_node(window.start)),
                                    ("end", date_node(window.end)),
                                ],
                            ),
                        ),
                        ("rightField", constant(json!("system:time_start"))),
                    ],
                ),
            ),
        ],
    );
    invoke(
        "Collection.filter",
        vec![
            ("collection", by_date),
            (
                "filter",
                invoke(
                    "Filter.intersects",
                    vec![
                        ("leftField", constant(json!(".all"))),
                        ("rightValue", geometry_node(&window.bounds)),
                    ],
                ),
            ),
        ],
    )
}

fn select(image: Value, band: &str) -> Value {
    invoke(
        "Image.select",
        vec![("input", image), ("bandSelectors", constant(json!([band])))],
    )
}

fn layer_node(layer: &Layer) -> Value {
    match layer {
        Layer::Image(selections) => selections
            .iter()
            .map(|s| {
                select(
                    invoke("Image.load", vec![("id", constant(json!(s.asset)))]),
                    &s.band,
                )
            })
            .reduce(|stack, next| invoke("Image.addBands", vec![("dstImg", stack), ("srcImg", next)]))
            .unwrap_or_else(|| invoke("Image.constant", vec![("value", constant(json!(0)))])),
        Layer::Composite {
            window,
            band,
            composite,
            scale_factor,
        } => {
            let reducer = match composite {
                Composite::Mean => "reduce.mean",
                Composite::Sum => "reduce.sum",
            };
            let image = select(
                invoke(reducer, vec![("collection", filtered_collection(window))]),
                band,
            );
            match scale_factor {
                Some(factor) => invoke(
                    "Image.multiply",
                    vec![
                        ("image1", image),
                        (
                            "image2",
                            invoke("Image.constant", vec![("value", constant(json!(factor)))]),
                        ),
                    ],
                ),
                None => image,
            }
        }
    }
}

fn reducer_node(reducer: Reducer) -> Value {
    let name = match reducer {
        Reducer::First => "Reducer.first",
        Reducer::Mean => "Reducer.mean",
        Reducer::Mode => "Reducer.mode",
    };
    invoke(name, vec![])
}

/// Expression for `Image.reduceRegion` over the query's layer.
pub fn region_expression(query: &RegionQuery) -> Value {
    expression(invoke(
        "Image.reduceRegion",
        vec![
            ("image", layer_node(&query.layer)),
            ("reducer", reducer_node(query.reducer)),
            ("geometry", geometry_node(&query.geometry)),
            ("scale", constant(json!(query.scale))),
            ("bestEffort", constant(json!(query.best_effort))),
            ("maxPixels", constant(json!(query.max_pixels))),
        ],
    ))
}

pub fn size_expression(window: &CollectionWindow) -> Value {
    expression(invoke(
        "Collection.size",
        vec![("collection", filtered_collection(window))],
    ))
}

/// Read a reduceRegion dictionary; non-numeric entries count as missing.
pub fn parse_band_values(result: Value) -> Result<BandValues, SourceError> {
    match result {
        Value::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, v.as_f64())).collect()),
        Value::Null => Ok(BandValues::new()),
        other => Err(SourceError::Decode(format!(
            "expected a dictionary of band values, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BandSelection;
    use chrono::NaiveDate;

    fn node<'a>(expr: &'a Value) -> &'a Value {
        &expr["values"]["0"]["functionInvocationValue"]
    }

    #[test]
    fn soil_stack_reduces_with_first() {
        let query = RegionQuery::new(
            Layer::Image(vec![
                BandSelection::new("projects/soilgrids-isric/sand_mean", "sand_0-5cm_mean"),
                BandSelection::new("projects/soilgrids-isric/clay_mean", "clay_0-5cm_mean"),
            ]),
            Geometry::point(31.15, 29.92),
            Reducer::First,
            2000,
        );
        let expr = region_expression(&query);
        let call = node(&expr);
        assert_eq!(call["functionName"], "Image.reduceRegion");

        let args = &call["arguments"];
        assert_eq!(args["scale"]["constantValue"], 2000);
        assert_eq!(args["bestEffort"]["constantValue"], true);
        assert_eq!(args["maxPixels"]["constantValue"], 1e9);
        assert_eq!(
            args["reducer"]["functionInvocationValue"]["functionName"],
            "Reducer.first"
        );
        // longitude first
        assert_eq!(
            args["geometry"]["functionInvocationValue"]["arguments"]["coordinates"]["constantValue"],
            json!([29.92, 31.15])
        );

        let image = &args["image"]["functionInvocationValue"];
        assert_eq!(image["functionName"], "Image.addBands");
        let src = &image["arguments"]["srcImg"]["functionInvocationValue"];
        assert_eq!(src["arguments"]["bandSelectors"]["constantValue"], json!(["clay_0-5cm_mean"]));
    }

    #[test]
    fn scaled_composite_multiplies_after_mean() {
        let window = CollectionWindow {
            collection: "MODIS/061/MOD13A2".to_string(),
            start: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
            bounds: Geometry::point(30.0, 31.0),
        };
        let query = RegionQuery::new(
            Layer::Composite {
                window,
                band: "NDVI".to_string(),
                composite: Composite::Mean,
                scale_factor: Some(0.0001),
            },
            Geometry::buffered(30.0, 31.0, 10_000.0),
            Reducer::Mean,
            1000,
        );
        let expr = region_expression(&query);
        let args = &node(&expr)["arguments"];

        let image = &args["image"]["functionInvocationValue"];
        assert_eq!(image["functionName"], "Image.multiply");
        let selected = &image["arguments"]["image1"]["functionInvocationValue"];
        assert_eq!(selected["functionName"], "Image.select");
        assert_eq!(
            selected["arguments"]["input"]["functionInvocationValue"]["functionName"],
            "reduce.mean"
        );

        let geometry = &args["geometry"]["functionInvocationValue"];
        assert_eq!(geometry["functionName"], "Geometry.buffer");
        assert_eq!(geometry["arguments"]["distance"]["constantValue"], 10_000.0);
    }

    #[test]
    fn size_filters_by_date_then_bounds() {
        let window = CollectionWindow {
            collection: "ECMWF/ERA5_LAND/HOURLY".to_string(),
            start: NaiveDate::from_ymd_opt(2019, 12, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            bounds: Geometry::point(30.0, 31.0),
        };
        let expr = size_expression(&window);
        let call = node(&expr);
        assert_eq!(call["functionName"], "Collection.size");

        let by_bounds = &call["arguments"]["collection"]["functionInvocationValue"];
        assert_eq!(
            by_bounds["arguments"]["filter"]["functionInvocationValue"]["functionName"],
            "Filter.intersects"
        );
        let by_date = &by_bounds["arguments"]["collection"]["functionInvocationValue"];
        let range = &by_date["arguments"]["filter"]["functionInvocationValue"]["arguments"]["leftValue"]
            ["functionInvocationValue"]["arguments"];
        assert_eq!(
            range["end"]["functionInvocationValue"]["arguments"]["value"]["constantValue"],
            "2020-01-01"
        );
    }

    #[test]
    fn band_values_accept_nulls() {
        let values = parse_band_values(json!({"Map": 40, "NDVI": null})).unwrap();
        assert_eq!(values["Map"], Some(40.0));
        assert_eq!(values["NDVI"], None);
        assert!(parse_band_values(Value::Null).unwrap().is_empty());
        assert!(matches!(parse_band_values(json!([1, 2])), Err(SourceError::Decode(_))));
    }

    #[test]
    fn missing_token_is_setup_error() {
        std::env::remove_var(TOKEN_ENV);
        let result = EarthEngineClient::new("my-project", None, None, Duration::from_secs(5));
        assert!(matches!(result, Err(SourceError::Setup(_))));

        let client =
            EarthEngineClient::new("my-project", Some("abc".into()), None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.endpoint,
            "https://earthengine.googleapis.com/v1/projects/my-project/value:compute"
        );
    }
}
