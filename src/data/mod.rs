//! Core data models for the Outpost dashboard backend
//!
//! These types mirror the JSON shapes exchanged with the generative-search
//! provider and persisted by the daily cache, so most carry camelCase serde
//! renames.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A single market instrument shown in the dashboard ticker strip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerData {
    /// Instrument symbol (e.g., "SPX", "OIL.WTI")
    pub symbol: String,
    /// Current price as a display string, currency symbol included
    pub price: String,
    /// 24h change as a display string (e.g., "+0.5%")
    pub change: String,
    /// Direction of the 24h change
    pub trend: Trend,
}

/// Direction of a price change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

/// Market tickers together with the provider's grounding sources
///
/// An empty `sources` list means the provider could not corroborate the
/// numbers with a live search; callers treat that as a disguised failure and
/// must not cache the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub tickers: Vec<TickerData>,
    pub sources: Vec<String>,
}

/// Potential market impact of a news item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactLevel {
    High,
    Medium,
    Low,
}

/// A single geopolitical news headline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub headline: String,
    pub source: String,
    /// Very short summary of the story
    pub snippet: String,
    /// Link to the story; "#" when no grounding source was available
    #[serde(default = "default_url")]
    pub url: String,
    /// Relative age as reported by the provider (e.g., "2h ago")
    pub time: String,
    pub impact_level: ImpactLevel,
}

fn default_url() -> String {
    "#".to_string()
}

/// Status/trend pair for the energy volatility indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyVolatility {
    pub status: String,
    pub trend: String,
}

/// Count/status pair for active conflict zones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictZones {
    pub count: String,
    pub status: String,
}

/// Status/change pair for global market resilience
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketResilience {
    pub status: String,
    pub change: String,
}

/// Status/value pair for supply chain pressure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyChain {
    pub status: String,
    pub value: String,
}

/// Headline risk indicators shown on the dashboard's top row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRiskMetrics {
    /// Geopolitical Risk Index value (e.g., "185.4")
    pub gpr_value: String,
    /// GPR trend (e.g., "+2.1%")
    pub gpr_trend: String,
    pub energy_volatility: EnergyVolatility,
    pub conflict_zones: ConflictZones,
    pub market_resilience: MarketResilience,
    pub supply_chain: SupplyChain,
    /// Freshness label supplied by the provider (month/year)
    pub last_updated: String,
}

/// The daily search bundle served by the cache endpoint
///
/// All fields are optional because the provider returns whatever subset it
/// managed to ground; a bundle with no content at all is treated as a
/// disguised failure and never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_metrics: Option<GlobalRiskMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news: Option<Vec<NewsItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic_brief: Option<String>,
}

impl SearchBundle {
    /// True when the provider produced no usable content at all
    pub fn is_empty(&self) -> bool {
        self.risk_metrics.is_none()
            && self.news.as_ref().map_or(true, |n| n.is_empty())
            && self
                .economic_brief
                .as_ref()
                .map_or(true, |b| b.trim().is_empty())
    }
}

// --- Shock scenario transmission model ---

/// How fast a transmission channel reacts and how hard it is hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpeed {
    pub channel: String,
    /// Reaction time in days
    pub days: f64,
    /// Magnitude 0-100
    pub impact: f64,
}

/// Exposure of an economic sector, -100 to 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorExposure {
    pub sector: String,
    pub exposure: f64,
}

/// Regional risk breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalRisk {
    pub region: String,
    /// Risk score 0-100
    pub risk: f64,
    /// GDP impact in percent (negative)
    pub gdp: f64,
    /// Qualitative exposure label (High/Medium/Low/Very High)
    pub exposure: String,
}

/// One point on the post-shock GDP recovery path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPoint {
    pub month: u32,
    pub gdp: f64,
}

/// Severity grade of a key risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// A named risk with severity and likelihood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRisk {
    pub risk: String,
    pub severity: Severity,
    /// Probability 0-1
    pub likelihood: f64,
}

/// Provider confidence in a node impact estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Impact detail for one node of the transmission map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeImpact {
    /// Magnitude 0-100
    pub magnitude: f64,
    /// Human-readable lag (e.g., "2-5 days")
    pub time_to_impact: String,
    pub confidence: Confidence,
    pub detail: String,
}

/// Full transmission-model parameters for one shock scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShockScenarioData {
    /// Annual probability of the shock occurring/escalating, 0-1
    #[serde(default)]
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_label: Option<String>,
    /// [min, max] percentage impact on global GDP (negative numbers)
    #[serde(default)]
    pub gdp_range: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdp_timeline: Option<String>,
    #[serde(default)]
    pub channel_speeds: Vec<ChannelSpeed>,
    #[serde(default)]
    pub sector_exposure: Vec<SectorExposure>,
    #[serde(default)]
    pub regional_risk: Vec<RegionalRisk>,
    #[serde(default)]
    pub recovery_path: Vec<RecoveryPoint>,
    #[serde(default)]
    pub key_risks: Vec<KeyRisk>,
    /// Mitigation strategy name -> effectiveness 0-100
    #[serde(default)]
    pub mitigation_effectiveness: BTreeMap<String, f64>,
    /// Transmission-map node id -> impact detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_impacts: Option<HashMap<String, NodeImpact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl ShockScenarioData {
    /// True when the analysis carries enough structure to render the
    /// transmission map; used as the cache-usability predicate.
    pub fn is_populated(&self) -> bool {
        !self.channel_speeds.is_empty() && !self.regional_risk.is_empty()
    }
}

/// Baseline ticker list used to seed the market data fetch prompt and as the
/// offline fallback display.
pub fn default_market_tickers() -> Vec<TickerData> {
    let seed = [
        ("GPR.IDX", "142.5", "+2.4%", Trend::Up),
        ("OIL.WTI", "$74.12", "-0.8%", Trend::Down),
        ("GOLD", "$2,541.20", "+0.5%", Trend::Up),
        ("VIX", "14.85", "-1.2%", Trend::Down),
        ("EUR/USD", "1.0920", "+0.1%", Trend::Up),
        ("SPX", "5,421.15", "+0.3%", Trend::Up),
        ("UST10Y", "3.95%", "-0.02%", Trend::Down),
        ("BTC-USD", "72,150.00", "+1.5%", Trend::Up),
    ];
    seed.iter()
        .map(|(symbol, price, change, trend)| TickerData {
            symbol: symbol.to_string(),
            price: price.to_string(),
            change: change.to_string(),
            trend: *trend,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_metrics_wire_format_is_camel_case() {
        let metrics = GlobalRiskMetrics {
            gpr_value: "185.4".to_string(),
            gpr_trend: "+2.1%".to_string(),
            energy_volatility: EnergyVolatility {
                status: "Moderate".to_string(),
                trend: "Stable".to_string(),
            },
            conflict_zones: ConflictZones {
                count: "5".to_string(),
                status: "Active".to_string(),
            },
            market_resilience: MarketResilience {
                status: "High".to_string(),
                change: "+1.2%".to_string(),
            },
            supply_chain: SupplyChain {
                status: "Stable".to_string(),
                value: "95%".to_string(),
            },
            last_updated: "March 2025".to_string(),
        };

        let json = serde_json::to_string(&metrics).expect("serialize metrics");
        assert!(json.contains("\"gprValue\""));
        assert!(json.contains("\"energyVolatility\""));
        assert!(json.contains("\"conflictZones\""));
        assert!(json.contains("\"lastUpdated\""));

        let back: GlobalRiskMetrics = serde_json::from_str(&json).expect("deserialize metrics");
        assert_eq!(back, metrics);
    }

    #[test]
    fn test_news_item_defaults_url_when_missing() {
        let json = r#"{
            "headline": "Central Banks Signal Caution",
            "source": "Wire",
            "snippet": "Inflation remains sticky.",
            "time": "1h ago",
            "impactLevel": "High"
        }"#;

        let item: NewsItem = serde_json::from_str(json).expect("deserialize news item");
        assert_eq!(item.url, "#");
        assert_eq!(item.impact_level, ImpactLevel::High);
    }

    #[test]
    fn test_trend_serializes_lowercase() {
        let ticker = TickerData {
            symbol: "SPX".to_string(),
            price: "5,200.00".to_string(),
            change: "+0.5%".to_string(),
            trend: Trend::Up,
        };

        let json = serde_json::to_string(&ticker).expect("serialize ticker");
        assert!(json.contains("\"trend\":\"up\""));
    }

    #[test]
    fn test_search_bundle_empty_detection() {
        assert!(SearchBundle::default().is_empty());

        let with_news = SearchBundle {
            news: Some(vec![NewsItem {
                headline: "h".to_string(),
                source: "s".to_string(),
                snippet: "sn".to_string(),
                url: "#".to_string(),
                time: "now".to_string(),
                impact_level: ImpactLevel::Low,
            }]),
            ..Default::default()
        };
        assert!(!with_news.is_empty());

        let blank_brief = SearchBundle {
            economic_brief: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(blank_brief.is_empty());
    }

    #[test]
    fn test_scenario_tolerates_partial_payload() {
        // Providers routinely omit optional sections; everything defaults.
        let json = r#"{
            "probability": 0.2,
            "gdpRange": [-1.5, -0.4],
            "channelSpeeds": [{"channel": "Energy", "days": 2, "impact": 80}],
            "regionalRisk": [{"region": "Europe", "risk": 70, "gdp": -1.1, "exposure": "High"}]
        }"#;

        let scenario: ShockScenarioData = serde_json::from_str(json).expect("deserialize scenario");
        assert!(scenario.is_populated());
        assert!(scenario.key_risks.is_empty());
        assert!(scenario.node_impacts.is_none());
        assert!((scenario.probability - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scenario_without_channels_is_not_populated() {
        let scenario = ShockScenarioData::default();
        assert!(!scenario.is_populated());
    }

    #[test]
    fn test_default_market_tickers_are_unique() {
        let tickers = default_market_tickers();
        assert_eq!(tickers.len(), 8);

        let mut symbols: Vec<_> = tickers.iter().map(|t| t.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), 8, "ticker symbols should be unique");
    }
}
