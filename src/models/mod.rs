use serde::{Deserialize, Serialize};

/// Carbon footprint estimate for a single dish, as produced by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResult {
    pub dish: String,
    pub estimated_carbon_kg: f64,
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub carbon_kg: f64,
}

/// Body of `POST /estimate`
#[derive(Debug, Clone, Deserialize)]
pub struct EstimateRequest {
    pub dish: String,
}

/// Where a food photo comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Publicly reachable image URL, passed through to the vision API as-is
    Url(String),
    /// Raw uploaded bytes
    Upload {
        bytes: Vec<u8>,
        content_type: Option<String>,
        filename: Option<String>,
    },
}

impl ImageSource {
    /// Value for the vision API `image_url.url` field.
    ///
    /// Uploads become base64 `data:` URLs; anything that isn't an `image/*`
    /// content type falls back to JPEG.
    pub fn to_image_url(&self) -> String {
        use base64::{engine::general_purpose, Engine};

        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Upload {
                bytes,
                content_type,
                ..
            } => {
                let mime_type = content_type
                    .as_deref()
                    .filter(|ct| ct.starts_with("image/"))
                    .unwrap_or("image/jpeg");
                format!(
                    "data:{};base64,{}",
                    mime_type,
                    general_purpose::STANDARD.encode(bytes)
                )
            }
        }
    }

    /// Short description for log lines (never the image data itself)
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Url(url) => format!("url {}", url),
            ImageSource::Upload {
                bytes, filename, ..
            } => format!(
                "upload {} ({} bytes)",
                filename.as_deref().unwrap_or("<unnamed>"),
                bytes.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_result_deserialization() {
        let json = r#"{
            "dish": "Caesar Salad",
            "estimated_carbon_kg": 1.2,
            "ingredients": [
                { "name": "romaine lettuce", "carbon_kg": 0.1 },
                { "name": "parmesan", "carbon_kg": 0.8 }
            ]
        }"#;

        let result: EstimateResult = serde_json::from_str(json).unwrap();

        assert_eq!(result.dish, "Caesar Salad");
        assert_eq!(result.estimated_carbon_kg, 1.2);
        assert_eq!(result.ingredients.len(), 2);
        assert_eq!(result.ingredients[1].name, "parmesan");
    }

    #[test]
    fn test_upload_becomes_data_url() {
        let source = ImageSource::Upload {
            bytes: b"abc".to_vec(),
            content_type: Some("image/png".to_string()),
            filename: Some("lunch.png".to_string()),
        };

        assert_eq!(source.to_image_url(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_upload_without_image_content_type_defaults_to_jpeg() {
        let source = ImageSource::Upload {
            bytes: b"abc".to_vec(),
            content_type: Some("application/octet-stream".to_string()),
            filename: None,
        };

        assert!(source.to_image_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_url_passes_through() {
        let source = ImageSource::Url("https://example.com/pizza.jpg".to_string());
        assert_eq!(source.to_image_url(), "https://example.com/pizza.jpg");
    }
}
