use serde::{Deserialize, Serialize};

use crate::models::{EstimateResult, ImageSource};
use crate::services::estimator::{DishEstimator, DishIdentifier, EstimateError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const NOT_FOOD_MESSAGE: &str =
    "The input does not appear to be a food item. Please enter the name of a dish or meal.";

const IDENTIFY_PROMPT: &str = "Analyze this food image and identify the main dish.\n\
     Return only the name of the dish (e.g., \"Chicken Biryani\", \"Pizza Margherita\", \"Caesar Salad\").\n\
     Be specific about the type of dish if you can identify it clearly.\n\
     If you see multiple dishes, identify the main/primary dish.";

fn estimate_prompt(dish: &str) -> String {
    format!(
        "You are a carbon footprint estimation assistant.\n\
         Given a dish name, output a JSON object with the format:\n\
         {{\n  \"dish\": \"<dish name>\",\n  \"estimated_carbon_kg\": <float>,\n  \"ingredients\": [\n    {{ \"name\": \"<ingredient>\", \"carbon_kg\": <float> }}\n  ]\n}}\n\
         If the input is not a food, dish or meal, output instead:\n\
         {{ \"error\": \"not_food\", \"message\": \"<short explanation>\" }}\n\
         Dish: {}",
        dish
    )
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiService {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiService {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn estimate_request(&self, dish: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Text(estimate_prompt(dish)),
            }],
            temperature: 0.0,
            max_tokens: None,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }

    fn identify_request(&self, image: &ImageSource) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        content_type: "text".to_string(),
                        text: IDENTIFY_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        content_type: "image_url".to_string(),
                        image_url: ImageData {
                            url: image.to_image_url(),
                            detail: "low".to_string(),
                        },
                    },
                ]),
            }],
            temperature: 0.0,
            max_tokens: Some(100),
            response_format: None,
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, EstimateError> {
        log::info!("🤖 Sending request to OpenAI with model: {}", self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 OpenAI response status: {}", status);

        if !status.is_success() {
            let body = response.text().await?;
            log::error!("❌ OpenAI API error ({}): {}", status, body);
            return Err(EstimateError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| EstimateError::InvalidResponse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EstimateError::InvalidResponse("response had no content".to_string()))
    }
}

#[async_trait::async_trait]
impl DishEstimator for OpenAiService {
    async fn estimate_carbon(&self, dish: &str) -> Result<EstimateResult, EstimateError> {
        let content = self.complete(&self.estimate_request(dish)).await?;
        log::debug!("💬 Estimate response content: {}", content);
        parse_estimate(&content)
    }
}

#[async_trait::async_trait]
impl DishIdentifier for OpenAiService {
    async fn identify_dish(&self, image: &ImageSource) -> Result<String, EstimateError> {
        log::debug!("📸 Identifying dish from {}", image.describe());
        let content = self.complete(&self.identify_request(image)).await?;
        let dish = parse_dish_name(&content)?;
        log::info!("🍽️ Identified dish: {}", dish);
        Ok(dish)
    }
}

/// Drops a surrounding markdown code fence, if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => rest
            .trim_start_matches("json")
            .trim_end_matches("```")
            .trim(),
        None => trimmed,
    }
}

fn parse_estimate(content: &str) -> Result<EstimateResult, EstimateError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| EstimateError::InvalidResponse(format!("not JSON: {}", e)))?;

    if let Some(error) = value.get("error") {
        log::warn!("🚫 Model rejected input as non-food: {}", error);
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(NOT_FOOD_MESSAGE);
        return Err(EstimateError::NotFood(message.to_string()));
    }

    serde_json::from_value(value)
        .map_err(|e| EstimateError::InvalidResponse(format!("unexpected estimate shape: {}", e)))
}

fn parse_dish_name(content: &str) -> Result<String, EstimateError> {
    let dish = content
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_end_matches('.')
        .trim();

    if dish.is_empty() {
        return Err(EstimateError::InvalidResponse(
            "vision model returned an empty dish name".to_string(),
        ));
    }

    Ok(dish.to_string())
}
