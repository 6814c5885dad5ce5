//! Model Record (C7 data) and its parameter schema.
//!
//! Design Notes (spec.md §9) call for re-architecting the source's nested
//! parameter-schema maps as tagged variants so coercion is total and
//! validator errors are localised. `ParameterSchema` below is that variant.

use std::collections::HashMap;

use crate::core_types::ModelId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Inactive,
}

/// Which upstream adapter a model dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Xai,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    pub text: bool,
    pub image: bool,
    pub reply: bool,
}

impl Capabilities {
    /// True iff every capability `required` asks for (as `true`) is also
    /// `true` on `self`. Used by `find_lower_tier` (C7).
    pub fn satisfies(&self, required: &Capabilities) -> bool {
        (!required.text || self.text) && (!required.image || self.image) && (!required.reply || self.reply)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Pricing {
    /// Price per 1,000,000 input tokens.
    pub input_price: Decimal,
    /// Price per 1,000,000 output tokens.
    pub output_price: Decimal,
    /// Price per image input item, if the model accepts images.
    pub image_input_price: Option<Decimal>,
}

/// One parameter's schema entry. A tagged variant per type instead of a
/// nested `{type, min, max, values, default}` map: coercion on a variant is
/// total (every arm is handled at compile time) and a mismatched `default`
/// type is a construction-time bug, not a runtime surprise.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterSchema {
    Float {
        min: Option<f64>,
        max: Option<f64>,
        default: Option<f64>,
    },
    Int {
        min: Option<i64>,
        max: Option<i64>,
        default: Option<i64>,
    },
    Enum {
        values: Vec<String>,
        default: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: ModelId,
    pub provider: Provider,
    pub capability_level: i32,
    pub capabilities: Capabilities,
    pub pricing: Pricing,
    pub max_tokens: u32,
    pub parameters: HashMap<String, ParameterSchema>,
    pub status: ModelStatus,
    /// Display metadata only, never consulted by the pipeline (SPEC_FULL §3).
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl ModelRecord {
    pub fn is_active(&self) -> bool {
        matches!(self.status, ModelStatus::Active)
    }
}

/// A partial update to a `ModelRecord`, as accepted by `PUT /v1/admin/models/{id}`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ModelPatch {
    pub capability_level: Option<i32>,
    pub capabilities: Option<Capabilities>,
    pub pricing: Option<Pricing>,
    pub max_tokens: Option<u32>,
    pub parameters: Option<HashMap<String, ParameterSchema>>,
    pub status: Option<ModelStatus>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl ModelPatch {
    pub fn apply(self, mut record: ModelRecord) -> ModelRecord {
        if let Some(v) = self.capability_level {
            record.capability_level = v;
        }
        if let Some(v) = self.capabilities {
            record.capabilities = v;
        }
        if let Some(v) = self.pricing {
            record.pricing = v;
        }
        if let Some(v) = self.max_tokens {
            record.max_tokens = v;
        }
        if let Some(v) = self.parameters {
            record.parameters = v;
        }
        if let Some(v) = self.status {
            record.status = v;
        }
        if let Some(v) = self.display_name {
            record.display_name = Some(v);
        }
        if let Some(v) = self.description {
            record.description = Some(v);
        }
        record
    }
}
