use base64::Engine;
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::QueueError;

/// Largest decoded style reference image accepted on a custom request.
pub const MAX_STYLE_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Card rank, serialized in its short face form ("A", "10", "K").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Rank {
    #[serde(rename = "A")]
    #[strum(serialize = "A")]
    Ace,
    #[serde(rename = "2")]
    #[strum(serialize = "2")]
    Two,
    #[serde(rename = "3")]
    #[strum(serialize = "3")]
    Three,
    #[serde(rename = "4")]
    #[strum(serialize = "4")]
    Four,
    #[serde(rename = "5")]
    #[strum(serialize = "5")]
    Five,
    #[serde(rename = "6")]
    #[strum(serialize = "6")]
    Six,
    #[serde(rename = "7")]
    #[strum(serialize = "7")]
    Seven,
    #[serde(rename = "8")]
    #[strum(serialize = "8")]
    Eight,
    #[serde(rename = "9")]
    #[strum(serialize = "9")]
    Nine,
    #[serde(rename = "10")]
    #[strum(serialize = "10")]
    Ten,
    #[serde(rename = "J")]
    #[strum(serialize = "J")]
    Jack,
    #[serde(rename = "Q")]
    #[strum(serialize = "Q")]
    Queen,
    #[serde(rename = "K")]
    #[strum(serialize = "K")]
    King,
}

impl Rank {
    /// Long display name used in collectible metadata.
    pub fn name(self) -> &'static str {
        match self {
            Rank::Ace => "Ace",
            Rank::Two => "Two",
            Rank::Three => "Three",
            Rank::Four => "Four",
            Rank::Five => "Five",
            Rank::Six => "Six",
            Rank::Seven => "Seven",
            Rank::Eight => "Eight",
            Rank::Nine => "Nine",
            Rank::Ten => "Ten",
            Rank::Jack => "Jack",
            Rank::Queen => "Queen",
            Rank::King => "King",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// What to generate. The variant tag travels in the `variant` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant")]
pub enum GenerationParams {
    #[serde(rename = "random", alias = "Random")]
    Random(RandomParams),
    #[serde(rename = "custom", alias = "Custom")]
    Custom(CustomParams),
}

/// A card with generated artwork chosen by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomParams {
    pub rank: Rank,
    pub suit: Suit,
    pub rarity: Rarity,
}

/// A card rendered in a caller-supplied style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomParams {
    #[garde(skip)]
    pub rank: Rank,

    #[garde(skip)]
    pub suit: Suit,

    #[garde(skip)]
    pub rarity: Rarity,

    /// Free-text art direction handed to the renderer.
    #[garde(length(chars, min = 1, max = 500), custom(not_blank))]
    pub style_prompt: String,

    /// Optional base64-encoded reference image (PNG, JPEG or WebP).
    #[garde(custom(validate_style_image))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_image: Option<String>,
}

#[allow(clippy::ptr_arg)]
fn not_blank(value: &String, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must contain non-whitespace text"));
    }
    Ok(())
}

fn validate_style_image(value: &Option<String>, _ctx: &()) -> garde::Result {
    let Some(encoded) = value else {
        return Ok(());
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| garde::Error::new("style image is not valid base64"))?;

    if bytes.len() > MAX_STYLE_IMAGE_BYTES {
        return Err(garde::Error::new(format!(
            "style image exceeds {} bytes",
            MAX_STYLE_IMAGE_BYTES
        )));
    }

    match image::guess_format(&bytes) {
        Ok(image::ImageFormat::Png | image::ImageFormat::Jpeg | image::ImageFormat::WebP) => Ok(()),
        _ => Err(garde::Error::new("style image must be PNG, JPEG or WebP")),
    }
}

impl GenerationParams {
    /// Check the variant-specific required fields.
    pub fn validate(&self) -> Result<(), QueueError> {
        match self {
            GenerationParams::Random(_) => Ok(()),
            GenerationParams::Custom(custom) => custom
                .validate()
                .map_err(|report| QueueError::Validation(report.to_string())),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            GenerationParams::Random(_) => "random",
            GenerationParams::Custom(_) => "custom",
        }
    }

    pub fn rank(&self) -> Rank {
        match self {
            GenerationParams::Random(p) => p.rank,
            GenerationParams::Custom(p) => p.rank,
        }
    }

    pub fn suit(&self) -> Suit {
        match self {
            GenerationParams::Random(p) => p.suit,
            GenerationParams::Custom(p) => p.suit,
        }
    }

    pub fn rarity(&self) -> Rarity {
        match self {
            GenerationParams::Random(p) => p.rarity,
            GenerationParams::Custom(p) => p.rarity,
        }
    }
}
