use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::core::{BreakEvenMethod, Inputs, Projection, run_projection};
use crate::fx::{InputCurrency, RateProvider, conversion_rate};
use crate::report::{ChartSeries, Summary, TableRow, chart_series, summary, table_rows};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliCurrency {
    Usd,
    Gbp,
}

impl From<CliCurrency> for InputCurrency {
    fn from(value: CliCurrency) -> Self {
        match value {
            CliCurrency::Usd => InputCurrency::Usd,
            CliCurrency::Gbp => InputCurrency::Gbp,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliBreakEvenMethod {
    Interpolate,
    FirstCrossing,
}

impl From<CliBreakEvenMethod> for BreakEvenMethod {
    fn from(value: CliBreakEvenMethod) -> Self {
        match value {
            CliBreakEvenMethod::Interpolate => BreakEvenMethod::Interpolate,
            CliBreakEvenMethod::FirstCrossing => BreakEvenMethod::FirstCrossing,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiCurrency {
    #[serde(alias = "USD")]
    Usd,
    #[serde(alias = "GBP")]
    Gbp,
}

impl From<ApiCurrency> for CliCurrency {
    fn from(value: ApiCurrency) -> Self {
        match value {
            ApiCurrency::Usd => CliCurrency::Usd,
            ApiCurrency::Gbp => CliCurrency::Gbp,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiBreakEvenMethod {
    Interpolate,
    #[serde(alias = "firstCrossing", alias = "first_crossing")]
    FirstCrossing,
}

impl From<ApiBreakEvenMethod> for CliBreakEvenMethod {
    fn from(value: ApiBreakEvenMethod) -> Self {
        match value {
            ApiBreakEvenMethod::Interpolate => CliBreakEvenMethod::Interpolate,
            ApiBreakEvenMethod::FirstCrossing => CliBreakEvenMethod::FirstCrossing,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    unit_price: Option<f64>,
    tax_rate: Option<f64>,
    gpu_per_system: Option<i32>,
    num_systems: Option<i32>,

    currency: Option<ApiCurrency>,
    hourly_rate: Option<f64>,
    utilization: Option<f64>,
    rate_decline: Option<f64>,
    platform_fee: Option<f64>,

    electricity_price: Option<f64>,
    power_consumption: Option<f64>,
    internet_cost: Option<f64>,
    misc_cost: Option<f64>,

    break_even_method: Option<ApiBreakEvenMethod>,
}

/// Dashboard inputs as entered, before the hourly rate is settled in GBP.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, default_value_t = 25000.0, help = "Unit price in GBP per system")]
    pub unit_price: f64,
    #[arg(long, default_value_t = 24.0, help = "Tax rate in percent")]
    pub tax_rate: f64,
    #[arg(long, default_value_t = 5, help = "GPU cards per system")]
    pub gpu_per_system: i32,
    #[arg(
        long,
        default_value_t = 6,
        help = "Number of systems (6 to a rack), 1 to 24"
    )]
    pub num_systems: i32,
    #[arg(
        long,
        value_enum,
        default_value_t = CliCurrency::Usd,
        help = "Currency the hourly rate is quoted in"
    )]
    pub currency: CliCurrency,
    #[arg(long, default_value_t = 0.45, help = "Hourly rate per GPU, 0 to 1")]
    pub hourly_rate: f64,
    #[arg(long, default_value_t = 80.0, help = "GPU utilisation in percent")]
    pub utilization: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Expected fall of charge rate per year in percent, 0 to 50"
    )]
    pub rate_decline: f64,
    #[arg(long, default_value_t = 25.0, help = "Platform fees in percent, 0 to 50")]
    pub platform_fee: f64,
    #[arg(
        long,
        default_value_t = 0.25,
        help = "Electricity unit price in GBP per kWh, 0 to 0.5"
    )]
    pub electricity_price: f64,
    #[arg(
        long,
        default_value_t = 244.0,
        help = "Power consumption in kWh per card per month at 100% utilisation, 0 to 500"
    )]
    pub power_consumption: f64,
    #[arg(
        long,
        default_value_t = 292.0,
        help = "Monthly internet cost in GBP, 0 to 1000"
    )]
    pub internet_cost: f64,
    #[arg(
        long,
        default_value_t = 50.0,
        help = "Monthly other costs in GBP, 0 to 1000"
    )]
    pub misc_cost: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliBreakEvenMethod::Interpolate,
        help = "How the break-even year is estimated"
    )]
    pub break_even_method: CliBreakEvenMethod,
}

impl Default for ProjectArgs {
    fn default() -> Self {
        Self {
            unit_price: 25_000.0,
            tax_rate: 24.0,
            gpu_per_system: 5,
            num_systems: 6,
            currency: CliCurrency::Usd,
            hourly_rate: 0.45,
            utilization: 80.0,
            rate_decline: 10.0,
            platform_fee: 25.0,
            electricity_price: 0.25,
            power_consumption: 244.0,
            internet_cost: 292.0,
            misc_cost: 50.0,
            break_even_method: CliBreakEvenMethod::Interpolate,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub rates: Arc<dyn RateProvider>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    currency: &'static str,
    conversion_rate: f64,
    hourly_rate_gbp: f64,
    projection: Projection,
    table: Vec<TableRow>,
    chart: ChartSeries,
    summary: Summary,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), String> {
    if !value.is_finite() || value < min || value > max {
        return Err(format!("--{name} must be between {min} and {max}"));
    }
    Ok(())
}

/// Validates dashboard ranges and settles the hourly rate with
/// `conversion_rate`.
pub fn build_inputs(args: &ProjectArgs, conversion_rate: f64) -> Result<Inputs, String> {
    if !args.unit_price.is_finite() {
        return Err("--unit-price must be a finite number".to_string());
    }
    if !args.tax_rate.is_finite() {
        return Err("--tax-rate must be a finite number".to_string());
    }
    if args.gpu_per_system < 0 {
        return Err("--gpu-per-system must be >= 0".to_string());
    }
    if !(1..=24).contains(&args.num_systems) {
        return Err("--num-systems must be between 1 and 24".to_string());
    }
    if !conversion_rate.is_finite() || conversion_rate < 0.0 {
        return Err("conversion rate must be a finite number >= 0".to_string());
    }

    for (name, value, min, max) in [
        ("hourly-rate", args.hourly_rate, 0.0, 1.0),
        ("utilization", args.utilization, 0.0, 100.0),
        ("rate-decline", args.rate_decline, 0.0, 50.0),
        ("platform-fee", args.platform_fee, 0.0, 50.0),
        ("electricity-price", args.electricity_price, 0.0, 0.5),
        ("power-consumption", args.power_consumption, 0.0, 500.0),
        ("internet-cost", args.internet_cost, 0.0, 1000.0),
        ("misc-cost", args.misc_cost, 0.0, 1000.0),
    ] {
        check_range(name, value, min, max)?;
    }

    Ok(Inputs {
        unit_price_gbp: args.unit_price,
        tax_rate_pct: args.tax_rate,
        gpu_per_system: args.gpu_per_system,
        num_systems: args.num_systems,
        hourly_rate_gbp: args.hourly_rate * conversion_rate,
        utilization_pct: args.utilization,
        rate_decline_pct_per_year: args.rate_decline,
        platform_fee_pct: args.platform_fee,
        electricity_unit_price_gbp: args.electricity_price,
        power_consumption_kwh_per_card_per_month: args.power_consumption,
        monthly_internet_gbp: args.internet_cost,
        monthly_misc_gbp: args.misc_cost,
        break_even_method: args.break_even_method.into(),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_http_server(host: &str, port: u16, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(%addr, "GPU earnings dashboard listening");
    tracing::info!("Local access: http://127.0.0.1:{}/", addr.port());

    axum::serve(listener, router(state)).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<ProjectPayload>,
) -> Response {
    project_handler_impl(&state, payload).await
}

async fn project_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProjectPayload>,
) -> Response {
    project_handler_impl(&state, payload).await
}

async fn project_handler_impl(state: &AppState, payload: ProjectPayload) -> Response {
    let args = args_from_payload(payload);
    match build_project_response(&args, state.rates.as_ref()).await {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => {
            tracing::debug!(error = %msg, "rejected projection request");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

async fn build_project_response(
    args: &ProjectArgs,
    rates: &dyn RateProvider,
) -> Result<ProjectResponse, String> {
    let currency: InputCurrency = args.currency.into();
    let rate = conversion_rate(currency, rates).await;
    let inputs = build_inputs(args, rate)?;
    let projection = run_projection(&inputs);
    tracing::debug!(
        total_investment = projection.total_investment,
        break_even = ?projection.break_even,
        "projection computed"
    );

    Ok(ProjectResponse {
        currency: currency.code(),
        conversion_rate: rate,
        hourly_rate_gbp: inputs.hourly_rate_gbp,
        table: table_rows(&projection),
        chart: chart_series(&projection),
        summary: summary(&projection, inputs.hourly_rate_gbp, inputs.num_systems),
        projection,
    })
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn args_from_json(json: &str) -> Result<ProjectArgs, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    Ok(args_from_payload(payload))
}

fn args_from_payload(payload: ProjectPayload) -> ProjectArgs {
    let mut args = ProjectArgs::default();

    if let Some(v) = payload.unit_price {
        args.unit_price = v;
    }
    if let Some(v) = payload.tax_rate {
        args.tax_rate = v;
    }
    if let Some(v) = payload.gpu_per_system {
        args.gpu_per_system = v;
    }
    if let Some(v) = payload.num_systems {
        args.num_systems = v;
    }

    if let Some(v) = payload.currency {
        args.currency = v.into();
    }
    if let Some(v) = payload.hourly_rate {
        args.hourly_rate = v;
    }
    if let Some(v) = payload.utilization {
        args.utilization = v;
    }
    if let Some(v) = payload.rate_decline {
        args.rate_decline = v;
    }
    if let Some(v) = payload.platform_fee {
        args.platform_fee = v;
    }

    if let Some(v) = payload.electricity_price {
        args.electricity_price = v;
    }
    if let Some(v) = payload.power_consumption {
        args.power_consumption = v;
    }
    if let Some(v) = payload.internet_cost {
        args.internet_cost = v;
    }
    if let Some(v) = payload.misc_cost {
        args.misc_cost = v;
    }

    if let Some(v) = payload.break_even_method {
        args.break_even_method = v.into();
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BreakEven;
    use crate::fx::{FixedRateProvider, FxError};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use tower::ServiceExt;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    struct OfflineProvider;

    #[async_trait]
    impl RateProvider for OfflineProvider {
        async fn usd_to_gbp(&self) -> Result<f64, FxError> {
            Err(FxError::MissingRate)
        }
    }

    #[test]
    fn build_inputs_applies_conversion_rate() {
        let args = ProjectArgs::default();
        let inputs = build_inputs(&args, 0.8).expect("valid inputs");
        assert_approx(inputs.hourly_rate_gbp, 0.36);
        assert_eq!(inputs.num_systems, 6);
        assert_eq!(inputs.gpu_per_system, 5);
        assert_eq!(inputs.break_even_method, BreakEvenMethod::Interpolate);
    }

    #[test]
    fn build_inputs_rejects_num_systems_outside_slider() {
        let mut args = ProjectArgs::default();
        args.num_systems = 25;
        let err = build_inputs(&args, 1.0).expect_err("must reject 25 systems");
        assert!(err.contains("--num-systems"));

        args.num_systems = 0;
        assert!(build_inputs(&args, 1.0).is_err());
    }

    #[test]
    fn build_inputs_rejects_out_of_range_percentages() {
        let mut args = ProjectArgs::default();
        args.platform_fee = 60.0;
        let err = build_inputs(&args, 1.0).expect_err("must reject 60% fee");
        assert!(err.contains("--platform-fee"));

        let mut args = ProjectArgs::default();
        args.utilization = f64::NAN;
        let err = build_inputs(&args, 1.0).expect_err("must reject NaN utilisation");
        assert!(err.contains("--utilization"));
    }

    #[test]
    fn build_inputs_accepts_range_bounds() {
        let mut args = ProjectArgs::default();
        args.hourly_rate = 1.0;
        args.rate_decline = 50.0;
        args.electricity_price = 0.0;
        args.internet_cost = 1000.0;
        assert!(build_inputs(&args, 1.0).is_ok());
    }

    #[test]
    fn args_from_json_parses_web_keys() {
        let json = r#"{
          "unitPrice": 30000,
          "taxRate": 20,
          "gpuPerSystem": 8,
          "numSystems": 12,
          "currency": "gbp",
          "hourlyRate": 0.6,
          "utilization": 65,
          "rateDecline": 12.5,
          "platformFee": 15,
          "electricityPrice": 0.3,
          "powerConsumption": 300,
          "internetCost": 400,
          "miscCost": 75,
          "breakEvenMethod": "first-crossing"
        }"#;
        let args = args_from_json(json).expect("json should parse");

        assert_approx(args.unit_price, 30_000.0);
        assert_approx(args.tax_rate, 20.0);
        assert_eq!(args.gpu_per_system, 8);
        assert_eq!(args.num_systems, 12);
        assert_eq!(args.currency, CliCurrency::Gbp);
        assert_approx(args.hourly_rate, 0.6);
        assert_approx(args.utilization, 65.0);
        assert_approx(args.rate_decline, 12.5);
        assert_approx(args.platform_fee, 15.0);
        assert_approx(args.electricity_price, 0.3);
        assert_approx(args.power_consumption, 300.0);
        assert_approx(args.internet_cost, 400.0);
        assert_approx(args.misc_cost, 75.0);
        assert_eq!(args.break_even_method, CliBreakEvenMethod::FirstCrossing);
    }

    #[test]
    fn args_from_empty_json_uses_dashboard_defaults() {
        let args = args_from_json("{}").expect("json should parse");
        let defaults = ProjectArgs::default();
        assert_eq!(args.currency, CliCurrency::Usd);
        assert_approx(args.unit_price, defaults.unit_price);
        assert_approx(args.hourly_rate, 0.45);
        assert_eq!(args.num_systems, 6);
    }

    #[test]
    fn args_from_json_accepts_upper_case_currency() {
        let args = args_from_json(r#"{"currency":"USD"}"#).expect("json should parse");
        assert_eq!(args.currency, CliCurrency::Usd);
    }

    #[tokio::test]
    async fn gbp_request_projects_default_scenario() {
        let mut args = ProjectArgs::default();
        args.currency = CliCurrency::Gbp;
        let response = build_project_response(&args, &OfflineProvider)
            .await
            .expect("valid request");

        assert_eq!(response.currency, "GBP");
        assert_eq!(response.conversion_rate, 1.0);
        assert_approx(response.projection.total_investment, 114_000.0);
        assert_approx(response.projection.years[0].net_profit, 48_312.0);
        assert_eq!(response.chart.investment.len(), 5);
        for value in &response.chart.investment {
            assert_approx(*value, 114_000.0);
        }
    }

    #[tokio::test]
    async fn usd_request_uses_fallback_rate_when_offline() {
        let response = build_project_response(&ProjectArgs::default(), &OfflineProvider)
            .await
            .expect("valid request");

        assert_eq!(response.currency, "USD");
        assert_eq!(response.conversion_rate, 0.79);
        assert_approx(response.hourly_rate_gbp, 0.45 * 0.79);
        assert_eq!(response.summary.gbp_rate, "rate in GBP: 0.36");
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_projection() {
        let mut args = ProjectArgs::default();
        args.hourly_rate = 2.0;
        let err = build_project_response(&args, &FixedRateProvider::default())
            .await
            .expect_err("must reject rate above 1");
        assert!(err.contains("--hourly-rate"));
    }

    #[tokio::test]
    async fn project_response_serialization_contains_expected_fields() {
        let response = build_project_response(&ProjectArgs::default(), &FixedRateProvider(1.0))
            .await
            .expect("valid request");
        let json = serde_json::to_string(&response).expect("response should serialize");

        assert!(json.contains("\"conversionRate\""));
        assert!(json.contains("\"hourlyRateGbp\""));
        assert!(json.contains("\"totalInvestment\""));
        assert!(json.contains("\"cumulativeProfit\""));
        assert!(json.contains("\"electricityCost\""));
        assert!(json.contains("\"breakEven\":{\"kind\":\"within\""));
        assert!(json.contains("\"annualProfit\""));
        assert!(json.contains("\"finalYearChargeRate\""));
        assert!(json.contains("\"table\":[{\"year\":\"Year 1\""));
    }

    #[tokio::test]
    async fn no_break_even_serializes_as_kind_only() {
        let mut args = ProjectArgs::default();
        args.unit_price = 10_000_000.0;
        let response = build_project_response(&args, &FixedRateProvider(1.0))
            .await
            .expect("valid request");
        assert_eq!(response.projection.break_even, BreakEven::NotWithinHorizon);

        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"breakEven\":{\"kind\":\"not-within-horizon\"}"));
    }

    fn test_router() -> Router {
        router(AppState {
            rates: Arc::new(OfflineProvider),
        })
    }

    async fn get(uri: &str) -> Response {
        test_router()
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
            .expect("router is infallible")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn get_project_route_returns_projection() {
        let response = get("/api/project?currency=gbp&numSystems=12").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );

        let body = body_json(response).await;
        assert_eq!(body["currency"], "GBP");
        assert_eq!(body["projection"]["totalGpus"], 60);
        assert_eq!(body["projection"]["years"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn post_project_route_accepts_json() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/project")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"currency":"gbp","utilization":0}"#))
                    .expect("valid request"),
            )
            .await
            .expect("router is infallible");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["projection"]["years"][0]["revenue"], 0.0);
        assert_eq!(body["projection"]["breakEven"]["kind"], "not-within-horizon");
        assert_eq!(body["table"][0]["netProfit"], "£-4,104");
        assert_eq!(body["table"][4]["cumulativeProfit"], "£-20,520");
    }

    #[tokio::test]
    async fn out_of_range_query_is_bad_request() {
        let response = get("/api/project?numSystems=30").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(
            body["error"]
                .as_str()
                .is_some_and(|msg| msg.contains("--num-systems"))
        );
    }

    #[tokio::test]
    async fn static_assets_and_unknown_routes() {
        let index = get("/").await;
        assert_eq!(index.status(), StatusCode::OK);

        let script = get("/app.js").await;
        assert_eq!(
            script.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"application/javascript; charset=utf-8"[..])
        );

        for trace in ["Annual Profit", "Cumulative Profit", "Initial Investment"] {
            assert!(APP_JS.contains(trace), "chart legend misses {trace}");
        }

        let missing = get("/nope").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(missing).await["error"], "Not found");
    }
}
