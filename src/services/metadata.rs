use serde_json::{json, Value};

use crate::models::job::Job;
use crate::models::params::GenerationParams;

/// Build the ERC-721 style metadata document for a generated card.
pub fn build_metadata(job: &Job, asset_url: &str) -> Value {
    let params = &job.params;
    let name = format!("{} of {}", params.rank().name(), title_case(&params.suit().to_string()));

    let mut attributes = vec![
        trait_value("Rank", params.rank().to_string()),
        trait_value("Suit", title_case(&params.suit().to_string())),
        trait_value("Rarity", title_case(&params.rarity().to_string())),
        trait_value("Variant", title_case(params.variant_name())),
    ];

    if let GenerationParams::Custom(custom) = params {
        attributes.push(trait_value("Style", custom.style_prompt.clone()));
    }

    json!({
        "name": name,
        "description": format!("A {} {} collectible card.", params.rarity(), name),
        "image": asset_url,
        "external_id": job.id,
        "attributes": attributes,
    })
}

fn trait_value(trait_type: &str, value: String) -> Value {
    json!({ "trait_type": trait_type, "value": value })
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
