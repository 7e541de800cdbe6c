//! Generative-search content provider client
//!
//! Talks to the Gemini `generateContent` REST endpoint with Google Search
//! grounding enabled, retries transient failures with exponential backoff,
//! and parses the model's free-text replies into the typed dashboard
//! payloads. The cache policy treats this module as an opaque fetch function
//! that may fail; grounding-source lists are surfaced so callers can reject
//! uncorroborated ("disguised failure") results.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cache::FetchError;
use crate::data::{MarketData, SearchBundle, ShockScenarioData, TickerData, Trend};

/// Model used for all search-grounded requests
pub const MODEL_NAME: &str = "gemini-2.5-flash";

/// Model used to render the daily whiteboard brief image
pub const IMAGE_MODEL_NAME: &str = "gemini-3-pro-image-preview";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Ingredient list used for the whiteboard when the context lookup fails
const FALLBACK_IMAGE_TOPICS: &str =
    "Global markets update, Tech innovation, Sunny weather, Coffee break, Learning AI";

/// Retries after the first attempt for transient failures
const MAX_RETRIES: u32 = 2;

/// Initial backoff delay, doubled per retry
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Client for the generative-search backend
#[derive(Debug, Clone)]
pub struct SearchProvider {
    /// HTTP client for making requests
    http_client: Client,
    /// Provider credential, resolved once at startup; `None` means the
    /// provider is unconfigured and every fetch fails fast
    api_key: Option<String>,
    /// Base URL for the API (allows override for testing)
    base_url: String,
}

/// Text and grounding sources extracted from one model reply
#[derive(Debug)]
struct GenerateReply {
    text: String,
    sources: Vec<String>,
}

/// Transport-level failure of a single request attempt.
///
/// Kept internal so retry classification can inspect the client error; what
/// leaves this module is the client-agnostic [`FetchError`].
#[derive(Debug)]
enum RequestError {
    Http(reqwest::Error),
    RateLimited,
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<RequestError> for FetchError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Http(http_err) => FetchError::Http(http_err.to_string()),
            RequestError::RateLimited => FetchError::RateLimited,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
}

impl SearchProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key,
            base_url: API_BASE.to_string(),
        }
    }

    /// Whether a credential is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetches the daily search bundle: risk metrics, news, and the
    /// economic brief in one grounded request.
    ///
    /// Grounding URLs are attached positionally to news items the model left
    /// without a link.
    pub async fn fetch_search_bundle(&self) -> Result<SearchBundle, FetchError> {
        let prompt = "\
            Use Google Search to collect the latest (past 24h) macro/geo insights.\n\
            Return STRICT JSON with keys:\n\
            {\n\
              \"riskMetrics\": {\n\
                \"gprValue\": string, \"gprTrend\": string,\n\
                \"energyVolatility\": { \"status\": string, \"trend\": string },\n\
                \"conflictZones\": { \"count\": string, \"status\": string },\n\
                \"marketResilience\": { \"status\": string, \"change\": string },\n\
                \"supplyChain\": { \"status\": string, \"value\": string },\n\
                \"lastUpdated\": string\n\
              },\n\
              \"news\": [ { \"headline\": string, \"source\": string, \"snippet\": string, \
                \"time\": string, \"impactLevel\": \"High\"|\"Medium\"|\"Low\", \"url\": string } ],\n\
              \"economicBrief\": string\n\
            }";

        let reply = self.generate(prompt, true).await?;
        let json_str = extract_json_object(&reply.text)
            .ok_or_else(|| FetchError::MalformedPayload("no JSON object in reply".to_string()))?;
        let mut bundle: SearchBundle = serde_json::from_str(json_str)
            .map_err(|err| FetchError::MalformedPayload(err.to_string()))?;

        if let Some(news) = bundle.news.as_mut() {
            for (item, source) in news.iter_mut().zip(reply.sources.iter()) {
                if item.url == "#" {
                    item.url = source.clone();
                }
            }
        }
        Ok(bundle)
    }

    /// Fetches live prices for the given instruments.
    ///
    /// A reply with an empty `sources` list means the model answered without
    /// corroborating search results; the caller's usability predicate should
    /// reject it so it is never cached.
    pub async fn fetch_market_data(
        &self,
        current: &[TickerData],
    ) -> Result<MarketData, FetchError> {
        let symbols: Vec<&str> = current.iter().map(|t| t.symbol.as_str()).collect();
        let prompt = format!(
            "Fetch the latest real-time market price and percentage change for these financial \
             instruments: {}.\n\
             For 'GPR.IDX', find the most recent Geopolitical Risk Index value or a proxy.\n\
             Return the data strictly as a valid JSON array of objects with keys: \"symbol\", \
             \"price\" (string with currency symbol), \"change\" (24h change with %), \
             \"trend\" (\"up\" or \"down\").\n\
             Do not include markdown formatting code blocks. Just the JSON string.",
            symbols.join(", ")
        );

        let reply = self.generate(&prompt, true).await?;
        let json_str = extract_json_array(&reply.text)
            .ok_or_else(|| FetchError::MalformedPayload("no JSON array in reply".to_string()))?;
        let tickers = parse_ticker_array(json_str)?;

        let mut sources = reply.sources;
        sources.sort_unstable();
        sources.dedup();

        Ok(MarketData { tickers, sources })
    }

    /// Fetches transmission-model parameters for a named shock scenario
    pub async fn fetch_scenario_analysis(
        &self,
        scenario_name: &str,
        description: &str,
    ) -> Result<ShockScenarioData, FetchError> {
        let prompt = format!(
            "Analyze the economic impact of a \"{scenario_name}\" shock ({description}) based on \
             CURRENT real-time global economic conditions. Use Google Search to find recent data \
             on correlation, supply chain vulnerabilities, and regional exposures.\n\
             Return a strictly valid JSON object with keys:\n\
             \"probability\" (0-1), \"gdpRange\" ([min, max] negative percentages),\n\
             \"channelSpeeds\" (5 objects {{\"channel\", \"days\", \"impact\"}}; channels must \
             include \"Stock Markets\", \"Energy\", \"Credit\", \"Trade\", \"Employment\"),\n\
             \"sectorExposure\" (5 objects {{\"sector\", \"exposure\"}}),\n\
             \"regionalRisk\" (4 objects {{\"region\", \"risk\", \"gdp\", \"exposure\"}} for \
             \"Europe\", \"North America\", \"Asia Pacific\", \"Emerging Markets\"),\n\
             \"keyRisks\" (4 objects {{\"risk\", \"severity\", \"likelihood\"}}),\n\
             \"mitigationEffectiveness\" (4 strategy keys with 0-100 values),\n\
             \"nodeImpacts\" (node id -> {{\"magnitude\", \"timeToImpact\", \"confidence\", \
             \"detail\"}}).\n\
             Format strictly as JSON. No markdown."
        );

        let reply = self.generate(&prompt, true).await?;
        let json_str = extract_json_object(&reply.text)
            .ok_or_else(|| FetchError::MalformedPayload("no JSON object in reply".to_string()))?;
        serde_json::from_str(json_str)
            .map_err(|err| FetchError::MalformedPayload(err.to_string()))
    }

    /// Fetches the daily whiteboard brief as a base64 data URL.
    ///
    /// Two requests: a search-grounded lookup for notable topics of the day
    /// (falling back to a canned list when it yields nothing), then an image
    /// render of those topics. A reply that carries no image resolves to
    /// `Ok(None)`; callers treat that as a disguised failure and keep the
    /// previous day's image.
    pub async fn fetch_daily_brief_image(
        &self,
        brief: Option<&str>,
    ) -> Result<Option<String>, FetchError> {
        let context_prompt = match brief {
            Some(brief) => format!(
                "Given today's economic briefing: \"{brief}\"\n\
                 Find 5 interesting, positive, or notable short facts/events for today or this\n\
                 week (mix of world news, tech, weather, or a fun fact).\n\
                 Return them as a simple, comma-separated list of strings. No bullets or numbers."
            ),
            None => "\
                Find 5 interesting, positive, or notable short facts/events for today or this\n\
                week (mix of world news, tech, weather, or a fun fact).\n\
                Return them as a simple, comma-separated list of strings. No bullets or numbers."
                .to_string(),
        };
        let topics = match self.generate(&context_prompt, true).await {
            Ok(reply) if !reply.text.trim().is_empty() => reply.text,
            Ok(_) => FALLBACK_IMAGE_TOPICS.to_string(),
            Err(FetchError::Unconfigured) => return Err(FetchError::Unconfigured),
            Err(err) => {
                debug!(error = %err, "topic lookup failed, using fallback list");
                FALLBACK_IMAGE_TOPICS.to_string()
            }
        };

        let image_prompt = format!(
            "Create a fun, hand-drawn infographic on a whiteboard, visualized in colorful \
             dry-erase marker style. The title at the top should be today's date in bold blue \
             marker, slightly imperfect, with playful doodles and underlines.\n\
             The layout uses hand-sketched boxes, arrows, and callouts drawn in red, blue, \
             green, and black marker ink. Each item is written in big, casual lettering with \
             little cartoon icons beside it.\n\
             There should be 5 items based on these topics: {topics}.\n\
             Style: white dry-erase board background, vivid marker colors, slightly glossy \
             surface reflections, natural shadows, energetic hand-drawn doodle aesthetic."
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": image_prompt }] }],
        });
        let response = self.request(IMAGE_MODEL_NAME, &body).await?;
        Ok(extract_inline_image(response))
    }

    /// Issues one `generateContent` text request, extracting the reply text
    /// and grounding sources
    async fn generate(&self, prompt: &str, with_search: bool) -> Result<GenerateReply, FetchError> {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if with_search {
            body["tools"] = json!([{ "googleSearch": {} }]);
        }
        let response = self.request(MODEL_NAME, &body).await?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::MalformedPayload("no candidates in reply".to_string()))?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        let sources = candidate
            .grounding_metadata
            .map(|meta| {
                meta.grounding_chunks
                    .into_iter()
                    .filter_map(|chunk| chunk.web.and_then(|web| web.uri))
                    .collect()
            })
            .unwrap_or_default();

        Ok(GenerateReply { text, sources })
    }

    /// Posts one `generateContent` body to the given model, retrying
    /// transient failures
    async fn request(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<GenerateResponse, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::Unconfigured)?;
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, model, api_key
        );

        let response = with_retries(|| async {
            let resp = self.http_client.post(&url).json(body).send().await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(RequestError::RateLimited);
            }
            let resp = resp.error_for_status()?;
            Ok(resp.json::<GenerateResponse>().await?)
        })
        .await?;
        Ok(response)
    }
}

/// Retries an operation with exponential backoff on transient errors.
///
/// Rate limiting (429) is not retried: the quota will not recover within the
/// backoff window, and the caller's stale-fallback path handles it.
async fn with_retries<T, F, Fut>(mut operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut delay = INITIAL_BACKOFF;
    let mut attempts_left = MAX_RETRIES;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempts_left > 0 && is_transient(&err) => {
                debug!(error = ?err, attempts_left, "retrying provider request");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempts_left -= 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Transient means worth retrying: timeouts, connection failures, and 5xx
fn is_transient(err: &RequestError) -> bool {
    match err {
        RequestError::Http(http_err) => {
            http_err.is_timeout()
                || http_err.is_connect()
                || http_err
                    .status()
                    .map_or(false, |status| status.is_server_error())
        }
        RequestError::RateLimited => false,
    }
}

/// First inline image across the reply's parts, rendered as a data URL.
/// `None` when the model replied without an image.
fn extract_inline_image(response: GenerateResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .flat_map(|candidate| {
            candidate
                .content
                .map(|content| content.parts)
                .unwrap_or_default()
        })
        .find_map(|part| {
            part.inline_data
                .map(|image| format!("data:{};base64,{}", image.mime_type, image.data))
        })
}

/// Extracts the outermost JSON object from free text, tolerating prose or
/// markdown fences around it
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Extracts the outermost JSON array from free text
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end >= start).then(|| &text[start..=end])
}

/// Parses a ticker array, defaulting fields the model omitted or mangled
fn parse_ticker_array(json_str: &str) -> Result<Vec<TickerData>, FetchError> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json_str)
        .map_err(|err| FetchError::MalformedPayload(err.to_string()))?;

    Ok(raw
        .into_iter()
        .map(|item| TickerData {
            symbol: item["symbol"].as_str().unwrap_or("UNKNOWN").to_string(),
            price: item["price"].as_str().unwrap_or("N/A").to_string(),
            change: item["change"].as_str().unwrap_or("0%").to_string(),
            trend: match item["trend"].as_str() {
                Some("down") => Trend::Down,
                _ => Trend::Up,
            },
        })
        .collect())
}
