use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::db::models::property::Property;

const SYSTEM_PROMPT: &str = "You are a property verification assistant for a rental marketplace. \
Reply with a single JSON object and nothing else.";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No LLM API key configured")]
    NotConfigured,

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("LLM reply had no message content")]
    EmptyCompletion,

    #[error("LLM reply was not a valid analysis: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PriceRating {
    #[serde(alias = "underpriced", alias = "UNDERPRICED", alias = "Below Market")]
    Underpriced,
    #[serde(alias = "fair", alias = "FAIR", alias = "Fair Price")]
    Fair,
    #[serde(alias = "overpriced", alias = "OVERPRICED", alias = "Above Market")]
    Overpriced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RiskLevel {
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "high", alias = "HIGH")]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Recommendation {
    #[serde(alias = "approve", alias = "APPROVE")]
    Approve,
    #[serde(alias = "review", alias = "REVIEW", alias = "Manual Review")]
    Review,
    #[serde(alias = "reject", alias = "REJECT")]
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceAnalysis {
    pub rating: PriceRating,
    pub analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    #[serde(default)]
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerMetrics {
    pub verification_status: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub profile_completeness: u8,
    #[serde(default)]
    pub notes: String,
}

/// Structured trust/risk assessment of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAnalysis {
    #[serde(deserialize_with = "deserialize_score")]
    pub trust_score: u8,
    pub price_analysis: PriceAnalysis,
    pub risk_assessment: RiskAssessment,
    #[serde(deserialize_with = "deserialize_score")]
    pub completeness_score: u8,
    pub recommendation: Recommendation,
    pub owner_metrics: OwnerMetrics,
}

impl PropertyAnalysis {
    /// Assessment shown when the model cannot be reached or understood.
    pub fn fallback() -> Self {
        PropertyAnalysis {
            trust_score: 85,
            price_analysis: PriceAnalysis {
                rating: PriceRating::Fair,
                analysis: "Price appears to be within the typical range for the area.".to_string(),
            },
            risk_assessment: RiskAssessment {
                level: RiskLevel::Low,
                factors: vec!["Standard manual verification recommended".to_string()],
            },
            completeness_score: 90,
            recommendation: Recommendation::Approve,
            owner_metrics: OwnerMetrics {
                verification_status: "Unverified".to_string(),
                profile_completeness: 80,
                notes: "Owner details were not assessed.".to_string(),
            },
        }
    }
}

/// Models answer with any JSON number; scores are rounded and clamped to 0..=100.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

/// Either a real model answer or a clearly labelled fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success { analysis: PropertyAnalysis },
    Unavailable { reason: String, fallback: PropertyAnalysis },
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> &PropertyAnalysis {
        match self {
            AnalysisOutcome::Success { analysis } => analysis,
            AnalysisOutcome::Unavailable { fallback, .. } => fallback,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AnalysisOutcome::Unavailable { .. })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct PropertyAnalyzer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl PropertyAnalyzer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
        })
    }

    /// Never fails: any problem is reported as `Unavailable` with the fallback.
    pub async fn analyze(&self, property: &Property) -> AnalysisOutcome {
        match self.request_analysis(property).await {
            Ok(analysis) => {
                info!(
                    "✅ Analysis for {}: trust {} / {:?}",
                    property.id, analysis.trust_score, analysis.recommendation
                );
                AnalysisOutcome::Success { analysis }
            }
            Err(e) => {
                warn!("Analysis unavailable for {}: {}", property.id, e);
                AnalysisOutcome::Unavailable {
                    reason: e.to_string(),
                    fallback: PropertyAnalysis::fallback(),
                }
            }
        }
    }

    async fn request_analysis(&self, property: &Property) -> Result<PropertyAnalysis, AnalysisError> {
        let api_key = self.api_key.as_deref().ok_or(AnalysisError::NotConfigured)?;

        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(property) },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AnalysisError::Status { status, body: text });
        }

        let completion: ChatCompletion = serde_json::from_str(&text)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AnalysisError::EmptyCompletion)?;

        parse_analysis(&content)
    }
}

/// Parses model output, tolerating a surrounding ``` or ```json fence.
pub fn parse_analysis(content: &str) -> Result<PropertyAnalysis, AnalysisError> {
    Ok(serde_json::from_str(strip_code_fences(content))?)
}

pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json", "JSON", ...) up to the first newline
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn build_prompt(property: &Property) -> String {
    format!(
        r#"Analyze this rental listing and assess its trustworthiness.

Name: {name}
Type: {kind:?}
Description: {description}
Monthly rent: {rent}
Bedrooms: {bedrooms}, Bathrooms: {bathrooms}, Area: {area} sq ft
Address: {address}, {locality}, {city}, {state}
Owner: {owner} <{email}>
Photos provided: {photos}

Respond with JSON of exactly this shape:
{{
  "trustScore": 0-100,
  "priceAnalysis": {{ "rating": "Underpriced" | "Fair" | "Overpriced", "analysis": string }},
  "riskAssessment": {{ "level": "Low" | "Medium" | "High", "factors": [string] }},
  "completenessScore": 0-100,
  "recommendation": "Approve" | "Review" | "Reject",
  "ownerMetrics": {{ "verificationStatus": string, "profileCompleteness": 0-100, "notes": string }}
}}"#,
        name = property.name,
        kind = property.property_type,
        description = property.description,
        rent = property.rent,
        bedrooms = property.bedrooms,
        bathrooms = property.bathrooms,
        area = property.area_sqft,
        address = property.address,
        locality = property.locality,
        city = property.city,
        state = property.state,
        owner = property.owner_name,
        email = property.owner_email,
        photos = property.images.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::property::PropertyType;
    use crate::utils::search::tests::listing;
    use axum::{routing::post, Router};
    use tokio::net::TcpListener;

    const GOOD_ANALYSIS: &str = r#"{
        "trustScore": 72,
        "priceAnalysis": { "rating": "overpriced", "analysis": "Above comparable listings" },
        "riskAssessment": { "level": "Medium", "factors": ["Few photos"] },
        "completenessScore": 140,
        "recommendation": "Review",
        "ownerMetrics": { "verificationStatus": "Email verified", "profileCompleteness": 60 }
    }"#;

    /// Serves `router` on an ephemeral port and returns its base URL.
    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn analyzer(endpoint: String) -> PropertyAnalyzer {
        PropertyAnalyzer::new(endpoint, Some("test-key".to_string()), "test-model", Duration::from_secs(5))
            .unwrap()
    }

    fn property() -> Property {
        listing("Hillside", PropertyType::House, "Pune", "Baner", "Baner Rd", 40_000)
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn parsed_scores_are_clamped_and_enums_lenient() {
        let analysis = parse_analysis(&format!("```json\n{GOOD_ANALYSIS}\n```")).unwrap();
        assert_eq!(analysis.trust_score, 72);
        assert_eq!(analysis.completeness_score, 100);
        assert_eq!(analysis.price_analysis.rating, PriceRating::Overpriced);
        assert_eq!(analysis.recommendation, Recommendation::Review);
        assert_eq!(analysis.owner_metrics.notes, "");
    }

    #[test]
    fn out_of_range_and_fractional_scores_are_normalised() {
        let reply = GOOD_ANALYSIS
            .replace("\"trustScore\": 72", "\"trustScore\": 300")
            .replace("\"completenessScore\": 140", "\"completenessScore\": -5")
            .replace("\"profileCompleteness\": 60", "\"profileCompleteness\": 92.5");

        let analysis = parse_analysis(&reply).unwrap();
        assert_eq!(analysis.trust_score, 100);
        assert_eq!(analysis.completeness_score, 0);
        assert_eq!(analysis.owner_metrics.profile_completeness, 93);
    }

    #[test]
    fn non_numeric_score_is_still_a_parse_error() {
        let reply = GOOD_ANALYSIS.replace("\"trustScore\": 72", "\"trustScore\": \"high\"");
        assert!(matches!(parse_analysis(&reply), Err(AnalysisError::Parse(_))));
    }

    #[tokio::test]
    async fn non_json_reply_yields_labelled_fallback() {
        let url = serve(Router::new().route(
            "/v1/chat/completions",
            post(|| async { "<html>gateway hiccup</html>" }),
        ))
        .await;

        let outcome = analyzer(url).analyze(&property()).await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.analysis().trust_score, 85);
        assert_eq!(outcome.analysis().recommendation, Recommendation::Approve);
    }

    #[tokio::test]
    async fn non_json_message_content_yields_fallback() {
        let url = serve(Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                axum::Json(json!({ "choices": [{ "message": { "content": "Looks fine to me!" } }] }))
            }),
        ))
        .await;

        let outcome = analyzer(url).analyze(&property()).await;
        match outcome {
            AnalysisOutcome::Unavailable { reason, fallback } => {
                assert!(reason.contains("not a valid analysis"));
                assert_eq!(fallback, PropertyAnalysis::fallback());
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_yields_fallback() {
        let url = serve(Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        ))
        .await;

        let outcome = analyzer(url).analyze(&property()).await;
        let AnalysisOutcome::Unavailable { reason, .. } = outcome else {
            panic!("expected fallback");
        };
        assert!(reason.contains("429"));
    }

    #[tokio::test]
    async fn fenced_json_reply_is_a_success() {
        let url = serve(Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let content = format!("```json\n{GOOD_ANALYSIS}\n```");
                axum::Json(json!({ "choices": [{ "message": { "content": content } }] }))
            }),
        ))
        .await;

        let outcome = analyzer(url).analyze(&property()).await;
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.analysis().trust_score, 72);
        assert_eq!(outcome.analysis().risk_assessment.factors, vec!["Few photos"]);
    }

    #[tokio::test]
    async fn missing_key_never_calls_out() {
        let analyzer = PropertyAnalyzer::new(
            "http://127.0.0.1:9/unreachable",
            None,
            "test-model",
            Duration::from_secs(1),
        )
        .unwrap();
        let outcome = analyzer.analyze(&property()).await;
        let AnalysisOutcome::Unavailable { reason, .. } = outcome else {
            panic!("expected fallback");
        };
        assert_eq!(reason, "No LLM API key configured");
    }

    #[test]
    fn outcome_is_tagged_on_the_wire() {
        let outcome = AnalysisOutcome::Unavailable {
            reason: "timeout".to_string(),
            fallback: PropertyAnalysis::fallback(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "unavailable");
        assert_eq!(value["fallback"]["trustScore"], 85);
        assert_eq!(value["fallback"]["recommendation"], "Approve");
    }
}
