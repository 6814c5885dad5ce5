//! Parameter Validator (C4): coerces and bounds-checks a canonical request
//! against a model's parameter schema.
//!
//! Per spec.md §4.4: null/absent -> schema default, numeric coercion by
//! truncation for `int`, numeric-string acceptance for `float`,
//! closed-interval min/max, enum membership. Unknown parameters pass through
//! untouched. Pure function, no side effects (P6: idempotent after the first
//! coercion).

use serde_json::Value;

use crate::domain::canonical::CanonicalRequest;
use crate::domain::{ModelRecord, ParameterSchema};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("messages must not be empty")]
    EmptyMessages,
    #[error("message contains an image but model {0} does not support image input")]
    ImageNotSupported(String),
    #[error("parameter '{0}' must be numeric")]
    NotNumeric(String),
    #[error("parameter '{0}' is below the minimum of {1}")]
    BelowMin(String, String),
    #[error("parameter '{0}' is above the maximum of {1}")]
    AboveMax(String, String),
    #[error("parameter '{0}' must be one of {1:?}")]
    NotInEnum(String, Vec<String>),
    #[error("parameter '{0}' must be a string")]
    NotString(String),
}

pub fn validate(mut request: CanonicalRequest, model: &ModelRecord) -> Result<CanonicalRequest, ValidationError> {
    if request.messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }

    if !model.capabilities.image && request.messages.iter().any(|m| m.content.has_image()) {
        return Err(ValidationError::ImageNotSupported(model.model_id.to_string()));
    }

    let named = request.named_params();
    for (name, schema) in &model.parameters {
        let Some(current) = named.get(name).cloned() else {
            continue;
        };
        if let Some(coerced) = coerce(name, current, schema)? {
            request.set_param(name, coerced);
        }
    }

    Ok(request)
}

fn coerce(name: &str, value: Value, schema: &ParameterSchema) -> Result<Option<Value>, ValidationError> {
    let is_null = value.is_null();

    match schema {
        ParameterSchema::Float { min, max, default } => {
            if is_null {
                return Ok(default.map(Value::from));
            }
            let f = as_f64(&value).ok_or_else(|| ValidationError::NotNumeric(name.to_string()))?;
            if let Some(min) = min {
                if f < *min {
                    return Err(ValidationError::BelowMin(name.to_string(), min.to_string()));
                }
            }
            if let Some(max) = max {
                if f > *max {
                    return Err(ValidationError::AboveMax(name.to_string(), max.to_string()));
                }
            }
            Ok(Some(Value::from(f)))
        }
        ParameterSchema::Int { min, max, default } => {
            if is_null {
                return Ok(default.map(Value::from));
            }
            let f = as_f64(&value).ok_or_else(|| ValidationError::NotNumeric(name.to_string()))?;
            let i = f as i64;
            if let Some(min) = min {
                if i < *min {
                    return Err(ValidationError::BelowMin(name.to_string(), min.to_string()));
                }
            }
            if let Some(max) = max {
                if i > *max {
                    return Err(ValidationError::AboveMax(name.to_string(), max.to_string()));
                }
            }
            Ok(Some(Value::from(i)))
        }
        ParameterSchema::Enum { values, default } => {
            if is_null {
                return Ok(default.clone().map(Value::from));
            }
            let s = value
                .as_str()
                .ok_or_else(|| ValidationError::NotString(name.to_string()))?;
            if !values.iter().any(|v| v == s) {
                return Err(ValidationError::NotInEnum(name.to_string(), values.clone()));
            }
            Ok(Some(Value::from(s)))
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ModelId;
    use crate::domain::canonical::{ContentItem, ImageUrl, Message, MessageContent, Role};
    use crate::domain::model::{Capabilities, ModelStatus, Pricing};
    use std::collections::HashMap;

    fn model_with(parameters: HashMap<String, ParameterSchema>, image: bool) -> ModelRecord {
        ModelRecord {
            model_id: ModelId::from("test-model"),
            provider: crate::domain::model::Provider::OpenAi,
            capability_level: 1,
            capabilities: Capabilities { text: true, image, reply: true },
            pricing: Pricing {
                input_price: Default::default(),
                output_price: Default::default(),
                image_input_price: None,
            },
            max_tokens: 100,
            parameters,
            status: ModelStatus::Active,
            display_name: None,
            description: None,
        }
    }

    fn request_with(temperature: Option<Value>) -> CanonicalRequest {
        CanonicalRequest {
            model: "test-model".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Text("hi".to_string()),
                name: None,
            }],
            temperature,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            response_format: None,
            stream: false,
            extra_params: HashMap::new(),
        }
    }

    #[test]
    fn rejects_empty_messages() {
        let model = model_with(HashMap::new(), false);
        let mut req = request_with(None);
        req.messages.clear();
        assert!(matches!(validate(req, &model), Err(ValidationError::EmptyMessages)));
    }

    #[test]
    fn clamps_out_of_range_float() {
        let mut params = HashMap::new();
        params.insert(
            "temperature".to_string(),
            ParameterSchema::Float { min: Some(0.0), max: Some(2.0), default: Some(1.0) },
        );
        let model = model_with(params, false);
        let req = request_with(Some(Value::from(5.0)));
        let err = validate(req, &model).unwrap_err();
        assert!(matches!(err, ValidationError::AboveMax(_, _)));
    }

    #[test]
    fn null_substitutes_default() {
        let mut params = HashMap::new();
        params.insert(
            "temperature".to_string(),
            ParameterSchema::Float { min: Some(0.0), max: Some(2.0), default: Some(0.7) },
        );
        let model = model_with(params, false);
        let req = request_with(Some(Value::Null));
        let validated = validate(req, &model).unwrap();
        assert_eq!(validated.temperature, Some(Value::from(0.7)));
    }

    #[test]
    fn unknown_parameter_passes_through() {
        let model = model_with(HashMap::new(), false);
        let mut req = request_with(None);
        req.extra_params.insert("foo".to_string(), Value::from("bar"));
        let validated = validate(req, &model).unwrap();
        assert_eq!(validated.extra_params.get("foo"), Some(&Value::from("bar")));
    }

    #[test]
    fn image_rejected_when_model_lacks_capability() {
        let model = model_with(HashMap::new(), false);
        let mut req = request_with(None);
        req.messages[0].content = MessageContent::Items(vec![ContentItem::ImageUrl {
            image_url: ImageUrl { url: "https://x/y.png".to_string(), detail: None },
        }]);
        assert!(matches!(validate(req, &model), Err(ValidationError::ImageNotSupported(_))));
    }

    #[test]
    fn validation_is_idempotent() {
        let mut params = HashMap::new();
        params.insert(
            "temperature".to_string(),
            ParameterSchema::Float { min: Some(0.0), max: Some(2.0), default: Some(1.0) },
        );
        let model = model_with(params, false);
        let req = request_with(Some(Value::from(1.5)));
        let once = validate(req.clone(), &model).unwrap();
        let twice = validate(once.clone(), &model).unwrap();
        assert_eq!(once.temperature, twice.temperature);
    }
}
